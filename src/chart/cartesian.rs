use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::trace;

use crate::core::ticks::{
    MAX_TICK_COUNT, VALUE_AXIS_MAX_TICKS, VALUE_AXIS_MIN_TICKS, VALUE_AXIS_TARGET_SPACING_PX,
    axis_tick_target_count,
};
use crate::core::{CategoryScale, LinearScale, PlotRect, format_tick_value, nice_ticks};
use crate::error::{ChartResult, MountError};
use crate::render::{
    Color, LinePrimitive, LineStrokeStyle, PolygonPrimitive, RectPrimitive, TextHAlign, font,
};
use crate::sandbox::{ChartElement, ChartNode};

use super::ChartKind;
use super::color::palette_color;
use super::dataset::{DataSet, json_label, json_number};
use super::layout::{
    AXIS_COLOR, LEGEND_HEIGHT_PX, LayoutContext, TICK_FONT_PX, cell_colors, color_prop,
    dash_style, margins_prop,
};

const X_AXIS_HEIGHT_PX: f64 = 30.0;
const Y_AXIS_WIDTH_PX: f64 = 60.0;
const TICK_SIZE_PX: f64 = 6.0;
const TICK_LABEL_GAP_PX: f64 = 8.0;
const DOT_RADIUS_PX: f64 = 3.0;
const GRID_COLOR: Color = Color::rgb(0.8, 0.8, 0.8);

/// One `Line`, `Bar` or `Area` with its values projected onto categories.
struct Series<'e> {
    element: &'e ChartElement,
    kind: ChartKind,
    name: String,
    color: Color,
    /// Stack group; unstacked series get their own group.
    group: usize,
    values: Vec<Option<f64>>,
    baselines: Vec<f64>,
}

impl Series<'_> {
    fn top(&self, index: usize) -> Option<f64> {
        self.values[index].map(|value| self.baselines[index] + value)
    }
}

#[derive(Default)]
struct Parts<'e> {
    x_axis: Option<&'e ChartElement>,
    y_axis: Option<&'e ChartElement>,
    grid: Option<&'e ChartElement>,
    legend: Option<&'e ChartElement>,
    series: Vec<&'e ChartElement>,
}

fn collect_parts(root: &ChartElement) -> Parts<'_> {
    let mut parts = Parts::default();
    for node in &root.children {
        let ChartNode::Element(element) = node else {
            continue;
        };
        match element.chart_kind() {
            Some(ChartKind::XAxis) => {
                parts.x_axis.get_or_insert(element);
            }
            Some(ChartKind::YAxis) => {
                parts.y_axis.get_or_insert(element);
            }
            Some(ChartKind::CartesianGrid) => {
                parts.grid.get_or_insert(element);
            }
            Some(ChartKind::Legend) => {
                parts.legend.get_or_insert(element);
            }
            Some(kind) if kind.is_cartesian_series() => parts.series.push(element),
            Some(kind) => trace!(element = kind.name(), "ignored inside cartesian chart"),
            None => {}
        }
    }
    parts
}

pub(super) fn layout(
    ctx: &mut LayoutContext<'_>,
    root: &ChartElement,
    kind: ChartKind,
    data: &DataSet,
) -> ChartResult<()> {
    if data.is_empty() {
        return Err(MountError::NoData {
            chart: kind.name().to_owned(),
        }
        .into());
    }
    let parts = collect_parts(root);
    let series = project_series(&parts.series, data);

    let mut area = ctx.bounds.inset(margins_prop(root))?;
    let legend_rect = parts.legend.map(|_| {
        let (band, rest) = area.take_bottom(LEGEND_HEIGHT_PX);
        area = rest;
        band
    });
    let x_axis = parts.x_axis.filter(|axis| !axis.prop_flag("hide", false));
    if x_axis.is_some() {
        let x_height = x_axis
            .and_then(|axis| axis.prop_f64("height"))
            .unwrap_or(X_AXIS_HEIGHT_PX);
        area = area.take_bottom(x_height).1;
    }
    let y_axis = parts.y_axis.filter(|axis| !axis.prop_flag("hide", false));
    if y_axis.is_some() {
        let y_width = y_axis
            .and_then(|axis| axis.prop_f64("width"))
            .unwrap_or(Y_AXIS_WIDTH_PX);
        area = area.take_left(y_width).1;
    }
    let plot = area;
    if plot.width <= 0.0 || plot.height <= 0.0 {
        return Err(MountError::Frame("chart area is too small".to_owned()).into());
    }

    let (domain_start, domain_end, ticks) = value_domain(&series, parts.y_axis, plot.height);
    let y_scale = LinearScale::new(domain_start, domain_end)?.with_range(plot.bottom(), plot.y)?;
    let banded = kind == ChartKind::BarChart
        || series.iter().any(|series| series.kind == ChartKind::Bar);
    let x_scale = if banded {
        CategoryScale::Band {
            start: plot.x,
            end: plot.right(),
            count: data.len(),
        }
    } else {
        CategoryScale::Point {
            start: plot.x,
            end: plot.right(),
            count: data.len(),
        }
    };
    let clamp = |value: f64| value.clamp(domain_start.min(domain_end), domain_start.max(domain_end));

    if let Some(grid) = parts.grid {
        draw_grid(ctx, grid, plot, &ticks, y_scale, x_scale)?;
    }

    let groups = bar_groups(&series);
    for series in &series {
        match series.kind {
            ChartKind::Bar => draw_bars(ctx, series, data, x_scale, y_scale, &groups, &clamp)?,
            ChartKind::Area => draw_area(ctx, series, x_scale, y_scale, &clamp)?,
            _ => draw_line(ctx, series, x_scale, y_scale, &clamp)?,
        }
    }

    if let Some(axis) = x_axis {
        draw_x_axis(ctx, axis, data, plot, x_scale)?;
    }
    if let Some(axis) = y_axis {
        draw_y_axis(ctx, axis, plot, &ticks, y_scale)?;
    }
    if let Some(rect) = legend_rect {
        let items: Vec<(String, Color)> = series
            .iter()
            .map(|series| (series.name.clone(), series.color))
            .collect();
        ctx.draw_legend(rect, &items);
    }
    Ok(())
}

fn project_series<'e>(elements: &[&'e ChartElement], data: &DataSet) -> Vec<Series<'e>> {
    let mut stacks: IndexMap<String, (usize, Vec<f64>, Vec<f64>)> = IndexMap::new();
    let mut next_group = 0;
    let mut series = Vec::new();
    for (index, element) in elements.iter().copied().enumerate() {
        let Some(kind) = element.chart_kind() else {
            continue;
        };
        let Some(data_key) = element.prop_str("dataKey") else {
            trace!(element = kind.name(), "series without dataKey skipped");
            continue;
        };
        let values: Vec<Option<f64>> = (0..data.len())
            .map(|row| data.number(row, data_key))
            .collect();

        let stack_id = element
            .prop("stackId")
            .and_then(|prop| prop.as_json())
            .map(json_label)
            .filter(|id| !id.is_empty());
        let (group, baselines) = match stack_id {
            Some(id) => {
                let (group, positive, negative) = stacks.entry(id).or_insert_with(|| {
                    next_group += 1;
                    (next_group - 1, vec![0.0; data.len()], vec![0.0; data.len()])
                });
                let mut baselines = Vec::with_capacity(values.len());
                for (row, value) in values.iter().enumerate() {
                    let running = if value.unwrap_or(0.0) < 0.0 {
                        &mut negative[row]
                    } else {
                        &mut positive[row]
                    };
                    baselines.push(*running);
                    *running += value.unwrap_or(0.0);
                }
                (*group, baselines)
            }
            None => {
                next_group += 1;
                (next_group - 1, vec![0.0; data.len()])
            }
        };

        let color = match kind {
            ChartKind::Bar => color_prop(element, "fill"),
            ChartKind::Area => color_prop(element, "stroke").or_else(|| color_prop(element, "fill")),
            _ => color_prop(element, "stroke"),
        }
        .unwrap_or_else(|| palette_color(index));
        let name = element
            .prop_str("name")
            .unwrap_or(data_key)
            .to_owned();
        series.push(Series {
            element,
            kind,
            name,
            color,
            group,
            values,
            baselines,
        });
    }
    series
}

/// Value domain and ticks; zero is always included like the default
/// `[0, 'auto']` domain. A numeric `domain` on the y axis overrides either end.
fn value_domain(
    series: &[Series<'_>],
    y_axis: Option<&ChartElement>,
    plot_height: f64,
) -> (f64, f64, Vec<f64>) {
    let mut min = 0.0_f64;
    let mut max = 0.0_f64;
    for series in series {
        for index in 0..series.values.len() {
            if let Some(top) = series.top(index) {
                min = min.min(top).min(series.baselines[index]);
                max = max.max(top).max(series.baselines[index]);
            }
        }
    }

    let fixed = y_axis
        .and_then(|axis| axis.prop("domain"))
        .and_then(|prop| prop.as_json())
        .and_then(Value::as_array)
        .map(|bounds| {
            (
                bounds.first().and_then(json_number),
                bounds.get(1).and_then(json_number),
            )
        })
        .unwrap_or((None, None));
    let count = y_axis
        .and_then(|axis| axis.prop_f64("tickCount"))
        .filter(|count| *count >= 2.0)
        .map_or_else(
            || {
                axis_tick_target_count(
                    plot_height,
                    VALUE_AXIS_TARGET_SPACING_PX,
                    VALUE_AXIS_MIN_TICKS,
                    VALUE_AXIS_MAX_TICKS,
                )
            },
            |count| count.min(MAX_TICK_COUNT as f64) as usize,
        );

    match fixed {
        (Some(low), Some(high)) if low < high => {
            let (_, _, ticks) = nice_ticks(low, high, count);
            let ticks = ticks
                .into_iter()
                .filter(|tick| *tick >= low - 1e-9 && *tick <= high + 1e-9)
                .collect();
            (low, high, ticks)
        }
        (low, high) => {
            let (start, end, ticks) = nice_ticks(low.unwrap_or(min), high.unwrap_or(max), count);
            (start, end, ticks)
        }
    }
}

/// Distinct stack groups among bar series, in drawing order.
fn bar_groups(series: &[Series<'_>]) -> Vec<usize> {
    let mut groups: Vec<usize> = series
        .iter()
        .filter(|series| series.kind == ChartKind::Bar)
        .map(|series| series.group)
        .collect();
    groups.sort_unstable();
    groups.dedup();
    groups
}

fn draw_grid(
    ctx: &mut LayoutContext<'_>,
    grid: &ChartElement,
    plot: PlotRect,
    ticks: &[f64],
    y_scale: LinearScale,
    x_scale: CategoryScale,
) -> ChartResult<()> {
    let color = color_prop(grid, "stroke").unwrap_or(GRID_COLOR);
    let style = dash_style(grid);
    if grid.prop_flag("horizontal", true) {
        for tick in ticks {
            let y = y_scale.to_pixel(*tick)?;
            ctx.frame.lines.push(
                LinePrimitive::new(plot.x, y, plot.right(), y, 1.0, color).with_stroke_style(style),
            );
        }
    }
    if grid.prop_flag("vertical", true) {
        for index in 0..x_scale.count() {
            let x = x_scale.position(index);
            ctx.frame.lines.push(
                LinePrimitive::new(x, plot.y, x, plot.bottom(), 1.0, color).with_stroke_style(style),
            );
        }
    }
    Ok(())
}

fn draw_bars(
    ctx: &mut LayoutContext<'_>,
    series: &Series<'_>,
    data: &DataSet,
    x_scale: CategoryScale,
    y_scale: LinearScale,
    groups: &[usize],
    clamp: &impl Fn(f64) -> f64,
) -> ChartResult<()> {
    let rank = groups
        .iter()
        .position(|group| *group == series.group)
        .unwrap_or_default();
    let band = x_scale.bandwidth();
    let slot = band * 0.8 / groups.len().max(1) as f64;
    let width = series
        .element
        .prop_f64("barSize")
        .filter(|size| *size > 0.0)
        .map_or(slot * 0.9, |size| size.min(slot));
    let cells = cell_colors(series.element);
    let group_offset = -band * 0.4 + slot * (rank as f64 + 0.5);

    for index in 0..series.values.len() {
        let Some(top) = series.top(index) else {
            continue;
        };
        let center = x_scale.position(index) + group_offset;
        let y_top = y_scale.to_pixel(clamp(top))?;
        let y_base = y_scale.to_pixel(clamp(series.baselines[index]))?;
        let fill = cells
            .get(index)
            .copied()
            .flatten()
            .unwrap_or(series.color);
        ctx.frame.rects.push(RectPrimitive::new(
            center - width * 0.5,
            y_top.min(y_base),
            width,
            (y_base - y_top).abs(),
            fill,
        ));

        let value = series.values[index].unwrap_or_default();
        let args = [json!({ "value": value, "index": index, "x": center, "y": y_top, "payload": data.row_json(index) })];
        if let Some(text) = ctx.label_text(series.element, "label", &args, || format_tick_value(value))? {
            ctx.push_text(
                text,
                center,
                y_top.min(y_base) - TICK_FONT_PX - 2.0,
                TICK_FONT_PX,
                TextHAlign::Center,
            );
        }
    }
    Ok(())
}

fn points(
    series: &Series<'_>,
    x_scale: CategoryScale,
    y_scale: LinearScale,
    clamp: &impl Fn(f64) -> f64,
) -> ChartResult<Vec<Option<(f64, f64)>>> {
    (0..series.values.len())
        .map(|index| match series.top(index) {
            Some(top) => Ok(Some((x_scale.position(index), y_scale.to_pixel(clamp(top))?))),
            None => Ok(None),
        })
        .collect()
}

/// Runs of consecutive defined points; gaps split runs unless `connectNulls`.
fn runs(points: &[Option<(f64, f64)>], connect_nulls: bool) -> Vec<Vec<(f64, f64)>> {
    if connect_nulls {
        return vec![points.iter().flatten().copied().collect()];
    }
    points
        .split(Option::is_none)
        .map(|run| run.iter().flatten().copied().collect::<Vec<_>>())
        .filter(|run| !run.is_empty())
        .collect()
}

fn stroke_width(element: &ChartElement) -> f64 {
    element
        .prop_f64("strokeWidth")
        .filter(|width| width.is_finite() && *width > 0.0)
        .unwrap_or(2.0)
}

fn push_polyline(
    ctx: &mut LayoutContext<'_>,
    run: &[(f64, f64)],
    width: f64,
    color: Color,
    style: LineStrokeStyle,
) {
    for pair in run.windows(2) {
        let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
        ctx.frame
            .lines
            .push(LinePrimitive::new(x1, y1, x2, y2, width, color).with_stroke_style(style));
    }
}

fn draw_line(
    ctx: &mut LayoutContext<'_>,
    series: &Series<'_>,
    x_scale: CategoryScale,
    y_scale: LinearScale,
    clamp: &impl Fn(f64) -> f64,
) -> ChartResult<()> {
    let points = points(series, x_scale, y_scale, clamp)?;
    let width = stroke_width(series.element);
    let style = dash_style(series.element);
    for run in runs(&points, series.element.prop_flag("connectNulls", false)) {
        push_polyline(ctx, &run, width, series.color, style);
    }
    let dots = series.element.prop_flag("dot", true);
    for (index, point) in points.iter().enumerate() {
        let Some((x, y)) = *point else {
            continue;
        };
        if dots {
            ctx.frame
                .polygons
                .push(PolygonPrimitive::new(circle(x, y, DOT_RADIUS_PX), series.color));
        }
        let value = series.values[index].unwrap_or_default();
        let args = [json!({ "value": value, "index": index, "x": x, "y": y })];
        if let Some(text) = ctx.label_text(series.element, "label", &args, || format_tick_value(value))? {
            ctx.push_text(text, x, y - TICK_FONT_PX - 4.0, TICK_FONT_PX, TextHAlign::Center);
        }
    }
    Ok(())
}

fn draw_area(
    ctx: &mut LayoutContext<'_>,
    series: &Series<'_>,
    x_scale: CategoryScale,
    y_scale: LinearScale,
    clamp: &impl Fn(f64) -> f64,
) -> ChartResult<()> {
    let tops = points(series, x_scale, y_scale, clamp)?;
    let opacity = series
        .element
        .prop_f64("fillOpacity")
        .unwrap_or(0.6)
        .clamp(0.0, 1.0);
    let fill = color_prop(series.element, "fill")
        .unwrap_or(series.color)
        .with_alpha(opacity);
    let width = stroke_width(series.element);
    let style = dash_style(series.element);

    let mut indices: Vec<Option<usize>> = Vec::with_capacity(tops.len());
    for (index, point) in tops.iter().enumerate() {
        indices.push(point.map(|_| index));
    }
    let connect = series.element.prop_flag("connectNulls", false);
    let index_runs: Vec<Vec<usize>> = if connect {
        vec![indices.iter().flatten().copied().collect()]
    } else {
        indices
            .split(Option::is_none)
            .map(|run| run.iter().flatten().copied().collect::<Vec<_>>())
            .filter(|run| !run.is_empty())
            .collect()
    };

    for run in index_runs {
        let mut top_line = Vec::with_capacity(run.len());
        let mut polygon = Vec::with_capacity(run.len() * 2);
        for &index in &run {
            if let Some(point) = tops[index] {
                top_line.push(point);
                polygon.push(point);
            }
        }
        for &index in run.iter().rev() {
            let base = y_scale.to_pixel(clamp(series.baselines[index]))?;
            polygon.push((x_scale.position(index), base));
        }
        if run.len() >= 2 {
            ctx.frame.polygons.push(PolygonPrimitive::new(polygon, fill));
        }
        push_polyline(ctx, &top_line, width, series.color, style);
    }
    Ok(())
}

fn draw_x_axis(
    ctx: &mut LayoutContext<'_>,
    axis: &ChartElement,
    data: &DataSet,
    plot: PlotRect,
    x_scale: CategoryScale,
) -> ChartResult<()> {
    let color = color_prop(axis, "stroke").unwrap_or(AXIS_COLOR);
    let baseline = plot.bottom();
    if axis.prop_flag("axisLine", true) {
        ctx.frame
            .lines
            .push(LinePrimitive::new(plot.x, baseline, plot.right(), baseline, 1.0, color));
    }

    let key = axis.prop_str("dataKey");
    let mut labels = Vec::with_capacity(data.len());
    for index in 0..data.len() {
        let raw = key.map_or_else(|| Value::from(index), |key| data.raw(index, key));
        labels.push(ctx.tick_text(Some(axis), raw, index, json_label)?);
    }

    // Skip labels evenly when they would overlap.
    let widest = labels
        .iter()
        .map(|label| font::text_width(label, TICK_FONT_PX))
        .fold(0.0_f64, f64::max);
    let slot = plot.width / (labels.len().max(1) as f64);
    let stride = if slot > 0.0 {
        ((widest + 4.0) / slot).ceil().max(1.0) as usize
    } else {
        1
    };

    for (index, label) in labels.into_iter().enumerate() {
        let x = x_scale.position(index);
        if axis.prop_flag("tickLine", true) {
            ctx.frame
                .lines
                .push(LinePrimitive::new(x, baseline, x, baseline + TICK_SIZE_PX, 1.0, color));
        }
        if index % stride == 0 {
            ctx.push_text(
                label,
                x,
                baseline + TICK_LABEL_GAP_PX,
                TICK_FONT_PX,
                TextHAlign::Center,
            );
        }
    }
    Ok(())
}

fn draw_y_axis(
    ctx: &mut LayoutContext<'_>,
    axis: &ChartElement,
    plot: PlotRect,
    ticks: &[f64],
    y_scale: LinearScale,
) -> ChartResult<()> {
    let color = color_prop(axis, "stroke").unwrap_or(AXIS_COLOR);
    if axis.prop_flag("axisLine", true) {
        ctx.frame
            .lines
            .push(LinePrimitive::new(plot.x, plot.y, plot.x, plot.bottom(), 1.0, color));
    }
    let unit = axis.prop_str("unit").unwrap_or_default().to_owned();
    for (index, tick) in ticks.iter().enumerate() {
        let y = y_scale.to_pixel(*tick)?;
        if axis.prop_flag("tickLine", true) {
            ctx.frame
                .lines
                .push(LinePrimitive::new(plot.x - TICK_SIZE_PX, y, plot.x, y, 1.0, color));
        }
        let text = ctx.tick_text(Some(axis), Value::from(*tick), index, |value| {
            value.as_f64().map(format_tick_value).unwrap_or_default()
        })?;
        ctx.push_text(
            format!("{text}{unit}"),
            plot.x - TICK_LABEL_GAP_PX,
            y - TICK_FONT_PX * 0.5,
            TICK_FONT_PX,
            TextHAlign::Right,
        );
    }
    Ok(())
}

/// Polygon approximation of a circle, used for line dots.
pub(super) fn circle(cx: f64, cy: f64, radius: f64) -> Vec<(f64, f64)> {
    const SEGMENTS: usize = 12;
    (0..SEGMENTS)
        .map(|step| {
            let angle = std::f64::consts::TAU * step as f64 / SEGMENTS as f64;
            (cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}
