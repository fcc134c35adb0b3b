//! Charting library exposed to chart sources under the namespace binding,
//! and the layout that turns an instantiated element tree into a
//! [`RenderFrame`](crate::render::RenderFrame).

mod cartesian;
mod color;
mod dataset;
mod kinds;
mod layout;
mod pie;

pub use color::{DEFAULT_PALETTE, palette_color, parse_color};
pub use dataset::DataSet;
pub use kinds::ChartKind;
pub use layout::{build_frame, build_frame_with};
