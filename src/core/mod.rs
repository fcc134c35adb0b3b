pub mod scale;
pub mod ticks;
pub mod types;

pub use scale::{CategoryScale, LinearScale};
pub use ticks::{format_tick_value, nice_ticks};
pub use types::{Margins, PlotRect, Viewport};
