//! dynchart: capability-limited renderer for AI-authored chart components.
//!
//! Chart source arrives as the text of one exported component. The
//! [`transform`] module rewrites its imports and default export into a single
//! closure expression, [`sandbox`] parses and evaluates it with nothing but the
//! UI runtime and the charting namespace in scope, [`chart`] lays the
//! resulting element tree out into a [`render::RenderFrame`], and [`mount`]
//! keeps one live chart per chat message. [`export`] turns a mounted chart
//! into a PNG download.

pub mod chart;
pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod mount;
pub mod render;
pub mod sandbox;
pub mod telemetry;
pub mod transform;

pub use config::{EvalLimits, RendererConfig, TransformOptions};
pub use error::{ChartError, ChartResult, EvalError, ExportError, MountError, TransformError};
pub use export::{DirectoryDownloadSink, DownloadSink, ExportReceipt, MemoryDownloadSink, export_as_image};
pub use mount::{ChartBoard, ChatMessage, CommitOutcome, MessageId, RenderState, RenderTarget};
pub use sandbox::{ComponentValue, Sandbox};
pub use transform::{SourceTransformer, TransformOutput};
