use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::error::{ChartError, ChartResult};
use crate::render::{
    Color, LinePrimitive, LineStrokeStyle, MIN_DASH_PX, PolygonPrimitive, RectPrimitive,
    RenderFrame, Renderer, TextHAlign, TextPrimitive, font,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RasterRenderStats {
    pub polygons_drawn: usize,
    pub rects_drawn: usize,
    pub lines_drawn: usize,
    pub texts_drawn: usize,
}

/// Pure-software renderer into an RGBA buffer, used for PNG export.
///
/// Lines get distance-based edge coverage; polygons and rects are filled at
/// pixel centers. Text uses the built-in 5x7 bitmap face from [`font`].
#[derive(Debug, Clone)]
pub struct RasterRenderer {
    image: RgbaImage,
    last_stats: RasterRenderStats,
}

impl RasterRenderer {
    pub fn new(width: u32, height: u32) -> ChartResult<Self> {
        if width == 0 || height == 0 {
            return Err(ChartError::InvalidViewport { width, height });
        }
        Ok(Self {
            image: RgbaImage::new(width, height),
            last_stats: RasterRenderStats::default(),
        })
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn last_stats(&self) -> RasterRenderStats {
        self.last_stats
    }

    /// Encodes the current buffer as PNG bytes.
    pub fn encode_png(&self) -> ChartResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(self.image.clone())
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| ChartError::InvalidData(format!("PNG encode failed: {e}")))?;
        Ok(buf.into_inner())
    }

    fn fill(&mut self, color: Color) {
        let [r, g, b, a] = color.to_rgba8();
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([r, g, b, a]);
        }
    }

    fn blend(&mut self, x: i64, y: i64, color: Color, coverage: f64) {
        if x < 0 || y < 0 || x >= i64::from(self.image.width()) || y >= i64::from(self.image.height())
        {
            return;
        }
        let alpha = (color.alpha * coverage).clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let pixel = self.image.get_pixel_mut(x as u32, y as u32);
        let src = [color.red, color.green, color.blue];
        let dst_alpha = f64::from(pixel.0[3]) / 255.0;
        let out_alpha = alpha + dst_alpha * (1.0 - alpha);
        for (channel, src_value) in src.iter().enumerate() {
            let dst_value = f64::from(pixel.0[channel]) / 255.0;
            let blended = if out_alpha > 0.0 {
                (src_value * alpha + dst_value * dst_alpha * (1.0 - alpha)) / out_alpha
            } else {
                0.0
            };
            pixel.0[channel] = (blended.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
        pixel.0[3] = (out_alpha * 255.0).round() as u8;
    }

    fn fill_rect_area(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) {
        let image_w = i64::from(self.image.width());
        let image_h = i64::from(self.image.height());
        let x_start = (x.round() as i64).max(0);
        let x_end = ((x + width).round() as i64).min(image_w);
        let y_start = (y.round() as i64).max(0);
        let y_end = ((y + height).round() as i64).min(image_h);
        for py in y_start..y_end {
            for px in x_start..x_end {
                self.blend(px, py, color, 1.0);
            }
        }
    }

    fn draw_rect(&mut self, rect: RectPrimitive) {
        self.fill_rect_area(rect.x, rect.y, rect.width, rect.height, rect.fill_color);
        if rect.border_width > 0.0 {
            let (left, top) = (rect.x, rect.y);
            let (right, bottom) = (rect.x + rect.width, rect.y + rect.height);
            for (x1, y1, x2, y2) in [
                (left, top, right, top),
                (right, top, right, bottom),
                (right, bottom, left, bottom),
                (left, bottom, left, top),
            ] {
                self.stroke_segment(x1, y1, x2, y2, rect.border_width, rect.border_color);
            }
        }
    }

    fn draw_line(&mut self, line: LinePrimitive) {
        match line.stroke_style {
            LineStrokeStyle::Solid => self.stroke_segment(
                line.x1,
                line.y1,
                line.x2,
                line.y2,
                line.stroke_width,
                line.color,
            ),
            LineStrokeStyle::Dashed { on, off } => {
                let dx = line.x2 - line.x1;
                let dy = line.y2 - line.y1;
                let length = dx.hypot(dy);
                if length == 0.0 {
                    return;
                }
                let (ux, uy) = (dx / length, dy / length);
                let on = on.max(MIN_DASH_PX);
                let period = on + off.max(0.0);
                let image_w = f64::from(self.image.width());
                let image_h = f64::from(self.image.height());
                let margin = line.stroke_width.min(image_w.max(image_h)) + 1.0;
                let bounds = (-margin, -margin, image_w + margin, image_h + margin);
                let Some((visible_start, visible_end)) =
                    clip_to_box(line.x1, line.y1, ux, uy, length, bounds)
                else {
                    return;
                };
                // Start on a period boundary so off-screen dashes keep their phase.
                let mut offset = (visible_start / period).floor() * period;
                while offset < visible_end {
                    let end = (offset + on).min(length);
                    self.stroke_segment(
                        line.x1 + ux * offset,
                        line.y1 + uy * offset,
                        line.x1 + ux * end,
                        line.y1 + uy * end,
                        line.stroke_width,
                        line.color,
                    );
                    offset += period;
                }
            }
        }
    }

    fn stroke_segment(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, width: f64, color: Color) {
        let half = width * 0.5;
        let x_min = (x1.min(x2) - half - 1.0).floor() as i64;
        let x_max = (x1.max(x2) + half + 1.0).ceil() as i64;
        let y_min = (y1.min(y2) - half - 1.0).floor() as i64;
        let y_max = (y1.max(y2) + half + 1.0).ceil() as i64;
        let image_w = i64::from(self.image.width());
        let image_h = i64::from(self.image.height());

        for py in y_min.max(0)..=y_max.min(image_h - 1) {
            for px in x_min.max(0)..=x_max.min(image_w - 1) {
                let distance =
                    distance_to_segment(px as f64 + 0.5, py as f64 + 0.5, x1, y1, x2, y2);
                let coverage = (half + 0.5 - distance).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.blend(px, py, color, coverage);
                }
            }
        }
    }

    fn draw_polygon(&mut self, polygon: &PolygonPrimitive) {
        let points = &polygon.points;
        let y_min = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let y_max = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        let row_start = y_min.floor().max(0.0) as i64;
        let row_end = y_max.ceil().min(f64::from(self.image.height())) as i64;

        let mut crossings = Vec::with_capacity(points.len());
        for py in row_start..row_end {
            let sample_y = py as f64 + 0.5;
            crossings.clear();
            for (index, &(ax, ay)) in points.iter().enumerate() {
                let (bx, by) = points[(index + 1) % points.len()];
                if (ay <= sample_y && by > sample_y) || (by <= sample_y && ay > sample_y) {
                    let t = (sample_y - ay) / (by - ay);
                    crossings.push(ax + t * (bx - ax));
                }
            }
            crossings.sort_by(f64::total_cmp);
            let last_column = i64::from(self.image.width()) - 1;
            for span in crossings.chunks_exact(2) {
                let start = ((span[0] - 0.5).ceil() as i64).max(0);
                let end = ((span[1] - 0.5).floor() as i64).min(last_column);
                for px in start..=end {
                    self.blend(px, py, polygon.fill_color, 1.0);
                }
            }
        }
    }

    fn draw_text(&mut self, text: &TextPrimitive) {
        let scale = text.font_size_px / f64::from(font::CELL_HEIGHT);
        let width = font::text_width(&text.text, text.font_size_px);
        let mut pen_x = match text.h_align {
            TextHAlign::Left => text.x,
            TextHAlign::Center => text.x - width / 2.0,
            TextHAlign::Right => text.x - width,
        };
        for ch in text.text.chars() {
            let rows = font::glyph(ch);
            for (row, bits) in rows.iter().enumerate() {
                for column in 0..font::GLYPH_WIDTH {
                    if bits & (1 << (font::GLYPH_WIDTH - 1 - column)) != 0 {
                        self.fill_rect_area(
                            pen_x + f64::from(column) * scale,
                            text.y + (row as f64) * scale,
                            scale.max(1.0),
                            scale.max(1.0),
                            text.color,
                        );
                    }
                }
            }
            pen_x += f64::from(font::CELL_WIDTH) * scale;
        }
    }
}

impl Renderer for RasterRenderer {
    fn render(&mut self, frame: &RenderFrame) -> ChartResult<()> {
        frame.validate()?;
        if frame.viewport.width != self.image.width() || frame.viewport.height != self.image.height()
        {
            self.image = RgbaImage::new(frame.viewport.width, frame.viewport.height);
        }
        self.fill(frame.background);

        let mut stats = RasterRenderStats::default();
        for polygon in &frame.polygons {
            self.draw_polygon(polygon);
            stats.polygons_drawn += 1;
        }
        for rect in &frame.rects {
            self.draw_rect(*rect);
            stats.rects_drawn += 1;
        }
        for line in &frame.lines {
            self.draw_line(*line);
            stats.lines_drawn += 1;
        }
        for text in &frame.texts {
            self.draw_text(text);
            stats.texts_drawn += 1;
        }
        self.last_stats = stats;
        Ok(())
    }
}

/// Distances along the ray `(x, y) + t * (ux, uy)`, `t` in `[0, length]`,
/// that fall inside `(min_x, min_y, max_x, max_y)`.
fn clip_to_box(
    x: f64,
    y: f64,
    ux: f64,
    uy: f64,
    length: f64,
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<(f64, f64)> {
    let mut t0: f64 = 0.0;
    let mut t1 = length;
    for (origin, direction, low, high) in [(x, ux, min_x, max_x), (y, uy, min_y, max_y)] {
        if direction == 0.0 {
            if origin < low || origin > high {
                return None;
            }
            continue;
        }
        let a = (low - origin) / direction;
        let b = (high - origin) / direction;
        t0 = t0.max(a.min(b));
        t1 = t1.min(a.max(b));
    }
    (t0 <= t1).then_some((t0, t1))
}

fn distance_to_segment(px: f64, py: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return (px - x1).hypot(py - y1);
    }
    let t = (((px - x1) * dx + (py - y1) * dy) / length_sq).clamp(0.0, 1.0);
    (px - (x1 + t * dx)).hypot(py - (y1 + t * dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Viewport;

    #[test]
    fn fills_background_and_strokes_lines() {
        let mut renderer = RasterRenderer::new(20, 10).expect("renderer");
        let frame = RenderFrame::new(Viewport::new(20, 10)).with_line(LinePrimitive::new(
            0.0,
            5.0,
            20.0,
            5.0,
            2.0,
            Color::rgb(1.0, 0.0, 0.0),
        ));
        renderer.render(&frame).expect("render");

        assert_eq!(renderer.image().get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(renderer.image().get_pixel(10, 5).0, [255, 0, 0, 255]);
        assert_eq!(renderer.last_stats().lines_drawn, 1);
    }

    #[test]
    fn polygon_fill_stays_inside_bounds() {
        let mut renderer = RasterRenderer::new(10, 10).expect("renderer");
        let frame = RenderFrame::new(Viewport::new(10, 10)).with_polygon(PolygonPrimitive::new(
            vec![(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)],
            Color::rgb(0.0, 0.0, 1.0),
        ));
        renderer.render(&frame).expect("render");

        assert_eq!(renderer.image().get_pixel(5, 5).0, [0, 0, 255, 255]);
        assert_eq!(renderer.image().get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(renderer.image().get_pixel(8, 8).0, [255, 255, 255, 255]);
    }

    #[test]
    fn oversized_shapes_are_clipped_to_the_image() {
        let mut renderer = RasterRenderer::new(10, 10).expect("renderer");
        let frame = RenderFrame::new(Viewport::new(10, 10))
            .with_rect(RectPrimitive::new(-1e12, 0.0, 2e12, 5.0, Color::rgb(0.0, 1.0, 0.0)))
            .with_polygon(PolygonPrimitive::new(
                vec![(-1e12, 5.0), (1e12, 5.0), (1e12, 10.0), (-1e12, 10.0)],
                Color::rgb(0.0, 0.0, 1.0),
            ));
        renderer.render(&frame).expect("render");

        assert_eq!(renderer.image().get_pixel(9, 0).0, [0, 255, 0, 255]);
        assert_eq!(renderer.image().get_pixel(0, 9).0, [0, 0, 255, 255]);
    }

    #[test]
    fn long_lines_with_minimal_dashes_finish() {
        let mut renderer = RasterRenderer::new(20, 10).expect("renderer");
        let frame = RenderFrame::new(Viewport::new(20, 10)).with_line(
            LinePrimitive::new(-1e9, 5.0, 1e9, 5.0, 2.0, Color::rgb(1.0, 0.0, 0.0))
                .with_stroke_style(LineStrokeStyle::Dashed {
                    on: MIN_DASH_PX,
                    off: 0.0,
                }),
        );
        renderer.render(&frame).expect("render");
        assert_eq!(renderer.image().get_pixel(10, 5).0, [255, 0, 0, 255]);
    }

    #[test]
    fn clipping_keeps_the_visible_part_of_a_ray() {
        let bounds = (0.0, 0.0, 10.0, 10.0);
        assert_eq!(clip_to_box(-5.0, 5.0, 1.0, 0.0, 100.0, bounds), Some((5.0, 15.0)));
        assert_eq!(clip_to_box(-5.0, 20.0, 1.0, 0.0, 100.0, bounds), None);
        assert_eq!(clip_to_box(20.0, 5.0, 1.0, 0.0, 100.0, bounds), None);
    }

    #[test]
    fn encodes_png_signature() {
        let mut renderer = RasterRenderer::new(4, 4).expect("renderer");
        renderer
            .render(&RenderFrame::new(Viewport::new(4, 4)))
            .expect("render");
        let png = renderer.encode_png().expect("png");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
