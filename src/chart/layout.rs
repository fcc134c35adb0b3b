use serde_json::Value;
use tracing::{debug, trace};

use crate::core::{Margins, PlotRect, Viewport};
use crate::error::{ChartError, ChartResult, MountError};
use crate::render::{
    Color, LineStrokeStyle, MIN_DASH_PX, RectPrimitive, RenderFrame, TextHAlign, TextPrimitive,
    font,
};
use crate::sandbox::{CallbackInvoker, ChartElement, ChartNode, ElementKind, ElementTree, PropValue};

use super::color::parse_color;
use super::dataset::DataSet;
use super::{ChartKind, cartesian, pie};

pub(super) const AXIS_COLOR: Color = Color::rgb(0.4, 0.4, 0.4);
pub(super) const TEXT_COLOR: Color = Color::rgb(0.2, 0.2, 0.2);
pub(super) const TICK_FONT_PX: f64 = 11.0;
pub(super) const LEGEND_FONT_PX: f64 = 12.0;
pub(super) const LEGEND_HEIGHT_PX: f64 = 28.0;

const LEGEND_SWATCH_PX: f64 = 10.0;
const LEGEND_ITEM_GAP_PX: f64 = 16.0;
const TEXT_BLOCK_PADDING_PX: f64 = 6.0;
const TEXT_BLOCK_INDENT_PX: f64 = 8.0;

/// Lays out the first chart found in `tree` into a frame of `viewport` size.
pub fn build_frame(
    tree: &mut ElementTree,
    viewport: Viewport,
    background: Color,
) -> ChartResult<RenderFrame> {
    build_frame_with(&tree.nodes, &mut tree.callbacks, viewport, background)
}

/// Same as [`build_frame`] with nodes and callbacks supplied separately.
pub fn build_frame_with(
    nodes: &[ChartNode],
    invoker: &mut dyn CallbackInvoker,
    viewport: Viewport,
    background: Color,
) -> ChartResult<RenderFrame> {
    if !viewport.is_valid() {
        return Err(ChartError::InvalidViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }
    if nodes.is_empty() {
        return Err(MountError::EmptyTree.into());
    }

    let mut blocks = Vec::new();
    let mut root = None;
    locate(nodes, &mut blocks, &mut root)?;
    let root = root.ok_or(MountError::NoChart)?;

    let mut frame = RenderFrame::new(viewport).with_background(background);
    let mut area = viewport.bounds();
    for block in &blocks {
        let (band, rest) = area.take_top(block.font_px + TEXT_BLOCK_PADDING_PX);
        area = rest;
        frame.texts.push(TextPrimitive::new(
            block.text.clone(),
            band.x + TEXT_BLOCK_INDENT_PX,
            band.y + TEXT_BLOCK_PADDING_PX * 0.5,
            block.font_px,
            TEXT_COLOR,
            TextHAlign::Left,
        ));
    }

    let kind = root.chart_kind().ok_or(MountError::NoChart)?;
    let data = DataSet::from_prop(root.prop("data")).unwrap_or_default();
    let mut ctx = LayoutContext {
        frame,
        invoker,
        bounds: area,
    };
    match kind {
        ChartKind::PieChart => pie::layout(&mut ctx, root, &data)?,
        _ => cartesian::layout(&mut ctx, root, kind, &data)?,
    }

    let frame = ctx.frame;
    frame.validate()?;
    debug!(
        chart = kind.name(),
        primitives = frame.primitive_count(),
        text_blocks = blocks.len(),
        "chart frame built"
    );
    Ok(frame)
}

/// Shared state while one chart is laid out.
pub(super) struct LayoutContext<'a> {
    pub frame: RenderFrame,
    pub invoker: &'a mut dyn CallbackInvoker,
    /// Area left for the chart after text blocks.
    pub bounds: PlotRect,
}

impl LayoutContext<'_> {
    /// Resolves a label-like prop: `true` or an options object yields the
    /// fallback text, a callback is invoked with `args`, `false` hides it.
    pub fn label_text(
        &mut self,
        element: &ChartElement,
        name: &str,
        args: &[Value],
        fallback: impl FnOnce() -> String,
    ) -> ChartResult<Option<String>> {
        let text = match element.prop(name) {
            None => return Ok(None),
            Some(PropValue::Callback(id)) => self.invoker.format(*id, args)?,
            Some(PropValue::Json(Value::Bool(false) | Value::Null)) => return Ok(None),
            Some(PropValue::Json(_)) => fallback(),
        };
        Ok((!text.trim().is_empty()).then_some(text))
    }

    /// Runs `tickFormatter` when the axis has one.
    pub fn tick_text(
        &mut self,
        axis: Option<&ChartElement>,
        value: Value,
        index: usize,
        fallback: impl FnOnce(&Value) -> String,
    ) -> ChartResult<String> {
        match axis.and_then(|axis| axis.prop("tickFormatter")).and_then(PropValue::callback) {
            Some(id) => Ok(self.invoker.format(id, &[value, Value::from(index)])?),
            None => Ok(fallback(&value)),
        }
    }

    pub fn push_text(&mut self, text: String, x: f64, y: f64, font_px: f64, h_align: TextHAlign) {
        if text.is_empty() {
            return;
        }
        self.frame
            .texts
            .push(TextPrimitive::new(text, x, y, font_px, TEXT_COLOR, h_align));
    }

    /// Centered row of swatches and names inside `rect`.
    pub fn draw_legend(&mut self, rect: PlotRect, items: &[(String, Color)]) {
        let widths: Vec<f64> = items
            .iter()
            .map(|(name, _)| LEGEND_SWATCH_PX + 4.0 + font::text_width(name, LEGEND_FONT_PX))
            .collect();
        let total = widths.iter().sum::<f64>()
            + LEGEND_ITEM_GAP_PX * (items.len().saturating_sub(1) as f64);
        let (_, center_y) = rect.center();
        let mut x = rect.x + ((rect.width - total) * 0.5).max(0.0);
        for ((name, color), width) in items.iter().zip(widths) {
            self.frame.rects.push(RectPrimitive::new(
                x,
                center_y - LEGEND_SWATCH_PX * 0.5,
                LEGEND_SWATCH_PX,
                LEGEND_SWATCH_PX,
                *color,
            ));
            self.push_text(
                name.clone(),
                x + LEGEND_SWATCH_PX + 4.0,
                center_y - LEGEND_FONT_PX * 0.5,
                LEGEND_FONT_PX,
                TextHAlign::Left,
            );
            x += width + LEGEND_ITEM_GAP_PX;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TextBlock {
    text: String,
    font_px: f64,
}

/// Collects text blocks and the first chart root, rejecting chart parts that
/// sit outside any chart.
fn locate<'a>(
    nodes: &'a [ChartNode],
    blocks: &mut Vec<TextBlock>,
    root: &mut Option<&'a ChartElement>,
) -> ChartResult<()> {
    for node in nodes {
        match node {
            ChartNode::Text(text) => push_block(blocks, text, 14.0),
            ChartNode::Element(element) => match &element.kind {
                ElementKind::Chart(ChartKind::ResponsiveContainer) => {
                    locate(&element.children, blocks, root)?;
                }
                ElementKind::Chart(kind) if kind.is_chart_root() => {
                    if root.is_none() {
                        *root = Some(element);
                    } else {
                        trace!(chart = kind.name(), "extra chart ignored");
                    }
                }
                ElementKind::Chart(kind) => {
                    return Err(MountError::Misplaced {
                        element: kind.name().to_owned(),
                    }
                    .into());
                }
                ElementKind::Intrinsic(tag) => {
                    if contains_chart(&element.children) {
                        locate(&element.children, blocks, root)?;
                    } else {
                        push_block(blocks, &element.text_content(), heading_font_px(tag));
                    }
                }
            },
        }
    }
    Ok(())
}

fn contains_chart(nodes: &[ChartNode]) -> bool {
    nodes.iter().any(|node| match node {
        ChartNode::Element(element) => {
            matches!(element.kind, ElementKind::Chart(_)) || contains_chart(&element.children)
        }
        ChartNode::Text(_) => false,
    })
}

fn push_block(blocks: &mut Vec<TextBlock>, text: &str, font_px: f64) {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !text.is_empty() {
        blocks.push(TextBlock { text, font_px });
    }
}

fn heading_font_px(tag: &str) -> f64 {
    match tag {
        "h1" => 22.0,
        "h2" => 19.0,
        "h3" => 16.0,
        "h4" | "h5" | "h6" => 14.0,
        _ => 12.0,
    }
}

/// Reads a `margin={{ top, right, bottom, left }}` prop; missing sides keep
/// the default.
pub(super) fn margins_prop(element: &ChartElement) -> Margins {
    let mut margins = Margins::default();
    let Some(Value::Object(map)) = element.prop("margin").and_then(PropValue::as_json) else {
        return margins;
    };
    let side = |key: &str| map.get(key).and_then(super::dataset::json_number);
    if let Some(top) = side("top") {
        margins.top = top;
    }
    if let Some(right) = side("right") {
        margins.right = right;
    }
    if let Some(bottom) = side("bottom") {
        margins.bottom = bottom;
    }
    if let Some(left) = side("left") {
        margins.left = left;
    }
    margins
}

pub(super) fn color_prop(element: &ChartElement, name: &str) -> Option<Color> {
    element.prop_str(name).and_then(parse_color)
}

/// `strokeDasharray="3 3"` (or `"5,5"`, or a single number) as a dash style.
pub(super) fn dash_style(element: &ChartElement) -> LineStrokeStyle {
    let lengths: Vec<f64> = match element.prop("strokeDasharray").and_then(PropValue::as_json) {
        Some(Value::String(text)) => text
            .split(|ch: char| ch == ',' || ch.is_whitespace())
            .filter_map(|part| part.trim().parse::<f64>().ok())
            .filter(|length| length.is_finite())
            .collect(),
        Some(Value::Number(number)) => number.as_f64().into_iter().collect(),
        _ => Vec::new(),
    };
    match lengths.as_slice() {
        [on] if *on > 0.0 => {
            let on = on.max(MIN_DASH_PX);
            LineStrokeStyle::Dashed { on, off: on }
        }
        [on, off, ..] if *on > 0.0 && *off >= 0.0 => LineStrokeStyle::Dashed {
            on: on.max(MIN_DASH_PX),
            off: *off,
        },
        _ => LineStrokeStyle::Solid,
    }
}

/// `Cell` children in order, used for per-item fills.
pub(super) fn cell_colors(element: &ChartElement) -> Vec<Option<Color>> {
    element
        .children
        .iter()
        .filter_map(|node| match node {
            ChartNode::Element(cell) if cell.chart_kind() == Some(ChartKind::Cell) => {
                Some(color_prop(cell, "fill"))
            }
            _ => None,
        })
        .collect()
}

/// Numeric or percentage length (`120`, `"80%"`) against `reference`.
pub(super) fn length_prop(element: &ChartElement, name: &str, reference: f64) -> Option<f64> {
    match element.prop(name)?.as_json()? {
        Value::String(text) => match text.trim().strip_suffix('%') {
            Some(percent) => percent.trim().parse::<f64>().ok().map(|p| p / 100.0 * reference),
            None => text.trim().parse().ok(),
        },
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::CallbackTable;
    use serde_json::json;

    fn chart(kind: ChartKind) -> ChartElement {
        ChartElement::new(ElementKind::Chart(kind))
    }

    fn json(value: Value) -> PropValue {
        PropValue::Json(value)
    }

    fn build(nodes: Vec<ChartNode>) -> ChartResult<RenderFrame> {
        build_frame_with(
            &nodes,
            &mut CallbackTable::empty(),
            Viewport::new(400, 240),
            Color::rgb(1.0, 1.0, 1.0),
        )
    }

    #[test]
    fn empty_output_is_rejected() {
        let err = build(Vec::new()).expect_err("empty");
        assert!(matches!(err, ChartError::Mount(MountError::EmptyTree)));
    }

    #[test]
    fn text_without_chart_is_no_chart() {
        let nodes = vec![ChartNode::Element(
            ChartElement::new(ElementKind::Intrinsic("p".to_owned()))
                .with_child(ChartNode::Text("sem dados".to_owned())),
        )];
        let err = build(nodes).expect_err("no chart");
        assert!(matches!(err, ChartError::Mount(MountError::NoChart)));
    }

    #[test]
    fn series_outside_chart_is_misplaced() {
        let nodes = vec![ChartNode::Element(chart(ChartKind::Line))];
        let err = build(nodes).expect_err("misplaced");
        assert!(matches!(
            err,
            ChartError::Mount(MountError::Misplaced { ref element }) if element == "Line"
        ));
    }

    #[test]
    fn headings_stack_above_chart() {
        let line_chart = chart(ChartKind::LineChart)
            .with_prop("data", json(json!([{ "v": 1 }, { "v": 3 }])))
            .with_child(ChartNode::Element(
                chart(ChartKind::Line).with_prop("dataKey", json(json!("v"))),
            ));
        let nodes = vec![
            ChartNode::Element(
                ChartElement::new(ElementKind::Intrinsic("h3".to_owned()))
                    .with_child(ChartNode::Text("  Vendas   mensais ".to_owned())),
            ),
            ChartNode::Element(
                chart(ChartKind::ResponsiveContainer).with_child(ChartNode::Element(line_chart)),
            ),
        ];
        let frame = build(nodes).expect("frame");
        let title = &frame.texts[0];
        assert_eq!(title.text, "Vendas mensais");
        assert_eq!(title.h_align, TextHAlign::Left);
        assert!(frame.lines.iter().all(|line| line.y1.min(line.y2) >= 22.0));
    }

    #[test]
    fn dash_styles_parse_common_forms() {
        let grid = chart(ChartKind::CartesianGrid).with_prop("strokeDasharray", json(json!("3 3")));
        assert_eq!(dash_style(&grid), LineStrokeStyle::Dashed { on: 3.0, off: 3.0 });
        let grid = chart(ChartKind::CartesianGrid).with_prop("strokeDasharray", json(json!("5,2")));
        assert_eq!(dash_style(&grid), LineStrokeStyle::Dashed { on: 5.0, off: 2.0 });
        assert_eq!(dash_style(&chart(ChartKind::CartesianGrid)), LineStrokeStyle::Solid);
        let grid = chart(ChartKind::CartesianGrid).with_prop("strokeDasharray", json(json!("1e-7 0")));
        assert_eq!(
            dash_style(&grid),
            LineStrokeStyle::Dashed {
                on: MIN_DASH_PX,
                off: 0.0
            }
        );
    }

    #[test]
    fn lengths_accept_percentages() {
        let pie = chart(ChartKind::Pie)
            .with_prop("outerRadius", json(json!("80%")))
            .with_prop("innerRadius", json(json!(40)));
        assert_eq!(length_prop(&pie, "outerRadius", 100.0), Some(80.0));
        assert_eq!(length_prop(&pie, "innerRadius", 100.0), Some(40.0));
        assert_eq!(length_prop(&pie, "cx", 100.0), None);
    }

    #[test]
    fn partial_margins_keep_defaults() {
        let line_chart = chart(ChartKind::LineChart)
            .with_prop("margin", json(json!({ "top": 20, "left": 0 })));
        let margins = margins_prop(&line_chart);
        assert_eq!(margins.top, 20.0);
        assert_eq!(margins.left, 0.0);
        assert_eq!(margins.right, Margins::default().right);
    }
}
