pub const VALUE_AXIS_TARGET_SPACING_PX: f64 = 40.0;
pub const VALUE_AXIS_MIN_TICKS: usize = 2;
pub const VALUE_AXIS_MAX_TICKS: usize = 10;
/// Most ticks an explicit `tickCount` may request.
pub const MAX_TICK_COUNT: usize = VALUE_AXIS_MAX_TICKS * 5;

pub fn axis_tick_target_count(
    axis_span_px: f64,
    target_spacing_px: f64,
    min_ticks: usize,
    max_ticks: usize,
) -> usize {
    if !axis_span_px.is_finite() || axis_span_px <= 0.0 {
        return min_ticks;
    }
    if !target_spacing_px.is_finite() || target_spacing_px <= 0.0 {
        return min_ticks;
    }

    let raw = (axis_span_px / target_spacing_px).floor() as usize + 1;
    raw.clamp(min_ticks, max_ticks)
}

/// Rounds `raw_step` up to the next 1/2/2.5/5 x 10^k step.
#[must_use]
pub fn nice_step(raw_step: f64) -> f64 {
    if !raw_step.is_finite() || raw_step <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let normalized = raw_step / magnitude;
    let nice = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 2.5 {
        2.5
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Nice domain and evenly spaced ticks covering `[min, max]`.
///
/// Degenerate spans are widened around the single value so callers always get
/// a usable, non-zero domain.
#[must_use]
pub fn nice_ticks(min: f64, max: f64, tick_count: usize) -> (f64, f64, Vec<f64>) {
    let (mut min, mut max) = if min <= max { (min, max) } else { (max, min) };
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0, vec![0.0, 1.0]);
    }
    if min == max {
        if min == 0.0 {
            max = 1.0;
        } else {
            let pad = min.abs() * 0.5;
            min -= pad;
            max += pad;
        }
    }

    let intervals = tick_count.clamp(2, MAX_TICK_COUNT) - 1;
    let step = nice_step((max - min) / (intervals as f64));
    let start = (min / step).floor() * step;
    let end = (max / step).ceil() * step;

    // The nice step is never below the raw step, so `[start, end]` spans at
    // most `intervals + 2` steps even when float precision runs out.
    let mut ticks = Vec::new();
    for index in 0..=intervals + 2 {
        let value = start + step * index as f64;
        if value > end + step * 1e-9 {
            break;
        }
        // Snap float noise like 0.30000000000000004.
        ticks.push((value / step).round() * step);
    }
    (start, end, ticks)
}

/// Formats an axis value without trailing zero noise.
#[must_use]
pub fn format_tick_value(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let text = format!("{value:.4}");
    text.trim_end_matches('0').trim_end_matches('.').to_owned()
}
