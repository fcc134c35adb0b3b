//! Per-message render targets: the mount/unmount state machine, generation
//! tokens for last-write-wins, and the board that keeps targets in sync with
//! the chat.

mod board;
mod container;
mod snapshot;
mod target;
mod ticket;

pub use board::{ChartBoard, ChatMessage, Role};
pub use container::{Container, ContainerStats, DisplayNode, RenderRoot};
pub use snapshot::{TARGET_SNAPSHOT_JSON_SCHEMA_V1, TargetSnapshot, TargetSnapshotJsonContractV1};
pub use target::{CommitOutcome, RENDER_ERROR_PREFIX, RenderState, RenderTarget};
pub use ticket::{ChartSource, MessageId, RenderTicket};
