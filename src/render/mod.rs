pub mod font;
mod frame;
mod null_renderer;
mod primitives;
mod raster;

pub use frame::RenderFrame;
pub use null_renderer::NullRenderer;
pub use primitives::{
    Color, LinePrimitive, LineStrokeStyle, MIN_DASH_PX, PolygonPrimitive, RectPrimitive,
    TextHAlign, TextPrimitive,
};
pub use raster::{RasterRenderStats, RasterRenderer};

use crate::error::ChartResult;

/// Contract implemented by any rendering backend.
///
/// Backends receive a fully materialized, deterministic `RenderFrame` so
/// drawing code remains isolated from evaluation and mounting logic.
pub trait Renderer {
    fn render(&mut self, frame: &RenderFrame) -> ChartResult<()>;
}

/// Backends whose last rendered frame can be encoded as a PNG file.
pub trait PngRenderer: Renderer {
    fn encode_png(&self) -> ChartResult<Vec<u8>>;
}

impl PngRenderer for RasterRenderer {
    fn encode_png(&self) -> ChartResult<Vec<u8>> {
        RasterRenderer::encode_png(self)
    }
}

#[cfg(feature = "cairo-backend")]
mod cairo_backend;
#[cfg(feature = "cairo-backend")]
pub use cairo_backend::{CairoContextRenderer, CairoRenderStats, CairoRenderer};
