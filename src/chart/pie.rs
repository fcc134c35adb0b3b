use serde_json::json;

use crate::core::format_tick_value;
use crate::error::{ChartResult, MountError};
use crate::render::{Color, PolygonPrimitive, TextHAlign};
use crate::sandbox::{ChartElement, ChartNode};

use super::ChartKind;
use super::color::palette_color;
use super::dataset::DataSet;
use super::layout::{
    LEGEND_HEIGHT_PX, LayoutContext, TICK_FONT_PX, cell_colors, color_prop, length_prop,
    margins_prop,
};

const LABEL_OFFSET_PX: f64 = 14.0;
/// Arc resolution in degrees per polygon segment.
const ARC_STEP_DEG: f64 = 4.0;
const FULL_TURN_DEG: f64 = 360.0;

struct Slice {
    name: String,
    color: Color,
}

pub(super) fn layout(
    ctx: &mut LayoutContext<'_>,
    root: &ChartElement,
    chart_data: &DataSet,
) -> ChartResult<()> {
    let pies: Vec<&ChartElement> = root
        .children
        .iter()
        .filter_map(|node| match node {
            ChartNode::Element(element) if element.chart_kind() == Some(ChartKind::Pie) => {
                Some(element)
            }
            _ => None,
        })
        .collect();
    let legend = root.children.iter().any(|node| {
        matches!(node, ChartNode::Element(element) if element.chart_kind() == Some(ChartKind::Legend))
    });

    let mut area = ctx.bounds.inset(margins_prop(root))?;
    let legend_rect = legend.then(|| {
        let (band, rest) = area.take_bottom(LEGEND_HEIGHT_PX);
        area = rest;
        band
    });

    let mut legend_items = Vec::new();
    let mut drawn = 0;
    for pie in pies {
        let own_data = DataSet::from_prop(pie.prop("data"));
        let data = own_data.as_ref().unwrap_or(chart_data);
        let slices = draw_pie(ctx, pie, data, area)?;
        if !slices.is_empty() {
            drawn += 1;
        }
        legend_items.extend(slices.into_iter().map(|slice| (slice.name, slice.color)));
    }
    if drawn == 0 {
        return Err(MountError::NoData {
            chart: ChartKind::PieChart.name().to_owned(),
        }
        .into());
    }

    if let Some(rect) = legend_rect {
        ctx.draw_legend(rect, &legend_items);
    }
    Ok(())
}

fn draw_pie(
    ctx: &mut LayoutContext<'_>,
    pie: &ChartElement,
    data: &DataSet,
    area: crate::core::PlotRect,
) -> ChartResult<Vec<Slice>> {
    let value_key = pie.prop_str("dataKey").unwrap_or("value");
    let name_key = pie.prop_str("nameKey").unwrap_or("name");
    let values: Vec<f64> = (0..data.len())
        .map(|row| data.number(row, value_key).unwrap_or(0.0).max(0.0))
        .collect();
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Ok(Vec::new());
    }

    let max_radius = area.width.min(area.height) * 0.5;
    let cx = length_prop(pie, "cx", area.width).map_or(area.x + area.width * 0.5, |cx| area.x + cx);
    let cy = length_prop(pie, "cy", area.height).map_or(area.y + area.height * 0.5, |cy| area.y + cy);
    let outer = length_prop(pie, "outerRadius", max_radius)
        .unwrap_or(max_radius * 0.8)
        .clamp(1.0, max_radius.max(1.0));
    let inner = length_prop(pie, "innerRadius", max_radius)
        .unwrap_or(0.0)
        .clamp(0.0, outer - 0.5);
    let angle_prop = |name: &str, default: f64| {
        pie.prop_f64(name)
            .filter(|angle| angle.is_finite())
            .unwrap_or(default)
    };
    let raw_start = angle_prop("startAngle", 0.0);
    let end_angle = angle_prop("endAngle", FULL_TURN_DEG);
    let padding = angle_prop("paddingAngle", 0.0).clamp(0.0, FULL_TURN_DEG);
    let start_angle = raw_start % FULL_TURN_DEG;
    let sweep = (end_angle - raw_start).clamp(-FULL_TURN_DEG, FULL_TURN_DEG);
    let direction = sweep.signum();
    let available = (sweep.abs() - padding * values.len() as f64).max(0.0);

    let cells = cell_colors(pie);
    let shared_fill = color_prop(pie, "fill");
    let mut slices = Vec::with_capacity(values.len());
    let mut angle = start_angle;
    for (index, value) in values.iter().copied().enumerate() {
        let color = cells
            .get(index)
            .copied()
            .flatten()
            .or(shared_fill)
            .unwrap_or_else(|| palette_color(index));
        slices.push(Slice {
            name: data.label(index, name_key),
            color,
        });
        if value <= 0.0 {
            continue;
        }

        let slice_sweep = available * value / total * direction;
        let from = angle;
        let to = angle + slice_sweep;
        angle = to + padding * direction;
        ctx.frame
            .polygons
            .push(PolygonPrimitive::new(sector(cx, cy, inner, outer, from, to), color));

        let percent = value / total;
        let args = [json!({
            "name": data.label(index, name_key),
            "value": value,
            "percent": percent,
            "index": index,
            "payload": data.row_json(index),
        })];
        if let Some(text) = ctx.label_text(pie, "label", &args, || format_tick_value(value))? {
            let mid = (from + to) * 0.5;
            let (x, y) = polar(cx, cy, outer + LABEL_OFFSET_PX, mid);
            let h_align = if mid.to_radians().cos() >= 0.0 {
                TextHAlign::Left
            } else {
                TextHAlign::Right
            };
            ctx.push_text(text, x, y - TICK_FONT_PX * 0.5, TICK_FONT_PX, h_align);
        }
    }
    Ok(slices)
}

/// Angles in degrees, counter-clockwise from three o'clock in screen space.
fn polar(cx: f64, cy: f64, radius: f64, angle_deg: f64) -> (f64, f64) {
    let radians = angle_deg.to_radians();
    (cx + radius * radians.cos(), cy - radius * radians.sin())
}

/// Outline of an annular sector; a zero inner radius closes on the center.
fn sector(cx: f64, cy: f64, inner: f64, outer: f64, from: f64, to: f64) -> Vec<(f64, f64)> {
    let steps = ((to - from).abs() / ARC_STEP_DEG).ceil().max(2.0) as usize;
    let arc = |radius: f64| {
        (0..=steps).map(move |step| {
            let angle = from + (to - from) * step as f64 / steps as f64;
            polar(cx, cy, radius, angle)
        })
    };
    let mut points: Vec<(f64, f64)> = arc(outer).collect();
    if inner > 0.0 {
        let mut inner_arc: Vec<(f64, f64)> = arc(inner).collect();
        inner_arc.reverse();
        points.extend(inner_arc);
    } else {
        points.push((cx, cy));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Viewport;
    use crate::render::RenderFrame;
    use crate::sandbox::{CallbackTable, ElementKind, PropValue};
    use approx::assert_relative_eq;

    fn element(kind: ChartKind) -> ChartElement {
        ChartElement::new(ElementKind::Chart(kind))
    }

    #[test]
    fn polar_grows_counter_clockwise() {
        let (x, y) = polar(0.0, 0.0, 10.0, 90.0);
        assert_relative_eq!(x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(y, -10.0);
    }

    #[test]
    fn donut_sectors_trace_both_arcs() {
        let points = sector(0.0, 0.0, 5.0, 10.0, 0.0, 90.0);
        assert!(points.len() >= 6);
        let (first_x, _) = points[0];
        assert_relative_eq!(first_x, 10.0);
        let (last_x, _) = points[points.len() - 1];
        assert_relative_eq!(last_x, 5.0);
    }

    #[test]
    fn one_polygon_per_positive_slice_with_cell_fills() {
        let mut callbacks = CallbackTable::empty();
        let mut ctx = LayoutContext {
            frame: RenderFrame::new(Viewport::new(300, 300)),
            invoker: &mut callbacks,
            bounds: Viewport::new(300, 300).bounds(),
        };
        let pie = element(ChartKind::Pie)
            .with_prop(
                "data",
                PropValue::Json(json!([
                    { "name": "A", "value": 3 },
                    { "name": "B", "value": 0 },
                    { "name": "C", "value": 1 }
                ])),
            )
            .with_prop("label", PropValue::Json(json!(true)))
            .with_child(ChartNode::Element(
                element(ChartKind::Cell).with_prop("fill", PropValue::Json(json!("#ff0000"))),
            ));
        let root = element(ChartKind::PieChart)
            .with_child(ChartNode::Element(pie))
            .with_child(ChartNode::Element(element(ChartKind::Legend)));
        layout(&mut ctx, &root, &DataSet::default()).expect("layout");

        assert_eq!(ctx.frame.polygons.len(), 2);
        assert_eq!(ctx.frame.polygons[0].fill_color, Color::from_rgb8(255, 0, 0));
        assert!(ctx.frame.texts.iter().any(|text| text.text == "3"));
        // Legend keeps zero-valued entries.
        assert!(ctx.frame.texts.iter().any(|text| text.text == "B"));
        ctx.frame.validate().expect("valid");
    }

    #[test]
    fn huge_angles_are_limited_to_one_turn() {
        let mut callbacks = CallbackTable::empty();
        let mut ctx = LayoutContext {
            frame: RenderFrame::new(Viewport::new(300, 300)),
            invoker: &mut callbacks,
            bounds: Viewport::new(300, 300).bounds(),
        };
        let pie = element(ChartKind::Pie)
            .with_prop("data", PropValue::Json(json!([{ "value": 1 }, { "value": 2 }])))
            .with_prop("startAngle", PropValue::Json(json!(-1e13)))
            .with_prop("endAngle", PropValue::Json(json!(1e13)));
        let root = element(ChartKind::PieChart).with_child(ChartNode::Element(pie));
        layout(&mut ctx, &root, &DataSet::default()).expect("layout");

        assert_eq!(ctx.frame.polygons.len(), 2);
        let outline: usize = ctx.frame.polygons.iter().map(|polygon| polygon.points.len()).sum();
        assert!(outline < 400, "outline has {outline} points");
    }

    #[test]
    fn all_zero_values_are_no_data() {
        let mut callbacks = CallbackTable::empty();
        let mut ctx = LayoutContext {
            frame: RenderFrame::new(Viewport::new(300, 300)),
            invoker: &mut callbacks,
            bounds: Viewport::new(300, 300).bounds(),
        };
        let root = element(ChartKind::PieChart).with_child(ChartNode::Element(
            element(ChartKind::Pie).with_prop("data", PropValue::Json(json!([{ "value": 0 }]))),
        ));
        assert!(layout(&mut ctx, &root, &DataSet::default()).is_err());
    }
}
