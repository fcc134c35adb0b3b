use crate::error::{ChartError, ChartResult};

/// Linear mapping from a value domain onto a pixel range.
///
/// The pixel range may be reversed (`range_start > range_end`) which is how
/// value axes grow upwards in screen space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    domain_start: f64,
    domain_end: f64,
    range_start: f64,
    range_end: f64,
}

impl LinearScale {
    pub fn new(domain_start: f64, domain_end: f64) -> ChartResult<Self> {
        if !domain_start.is_finite() || !domain_end.is_finite() || domain_start == domain_end {
            return Err(ChartError::InvalidData(
                "scale domain must be finite and non-zero".to_owned(),
            ));
        }

        Ok(Self {
            domain_start,
            domain_end,
            range_start: 0.0,
            range_end: 1.0,
        })
    }

    pub fn with_range(mut self, range_start: f64, range_end: f64) -> ChartResult<Self> {
        if !range_start.is_finite() || !range_end.is_finite() {
            return Err(ChartError::InvalidData(
                "scale range must be finite".to_owned(),
            ));
        }
        self.range_start = range_start;
        self.range_end = range_end;
        Ok(self)
    }

    #[must_use]
    pub fn domain(self) -> (f64, f64) {
        (self.domain_start, self.domain_end)
    }

    #[must_use]
    pub fn range(self) -> (f64, f64) {
        (self.range_start, self.range_end)
    }

    pub fn to_pixel(self, value: f64) -> ChartResult<f64> {
        if !value.is_finite() {
            return Err(ChartError::InvalidData("value must be finite".to_owned()));
        }

        let span = self.domain_end - self.domain_start;
        let normalized = (value - self.domain_start) / span;
        Ok(self.range_start + normalized * (self.range_end - self.range_start))
    }

    pub fn to_domain(self, pixel: f64) -> ChartResult<f64> {
        if !pixel.is_finite() {
            return Err(ChartError::InvalidData("pixel must be finite".to_owned()));
        }

        let range_span = self.range_end - self.range_start;
        if range_span == 0.0 {
            return Ok(self.domain_start);
        }
        let normalized = (pixel - self.range_start) / range_span;
        Ok(self.domain_start + normalized * (self.domain_end - self.domain_start))
    }
}

/// Categorical scale placing `count` slots across a pixel range.
///
/// `Point` puts the first and last category on the range edges (line/area
/// charts); `Band` splits the range into equal bands and reports band centers
/// (bar charts).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CategoryScale {
    Point { start: f64, end: f64, count: usize },
    Band { start: f64, end: f64, count: usize },
}

impl CategoryScale {
    #[must_use]
    pub fn count(self) -> usize {
        match self {
            Self::Point { count, .. } | Self::Band { count, .. } => count,
        }
    }

    /// Pixel center of category `index`.
    #[must_use]
    pub fn position(self, index: usize) -> f64 {
        match self {
            Self::Point { start, end, count } => {
                if count <= 1 {
                    return (start + end) * 0.5;
                }
                start + (end - start) * (index as f64) / ((count - 1) as f64)
            }
            Self::Band { start, .. } => start + self.bandwidth() * (index as f64 + 0.5),
        }
    }

    /// Width of one band; zero for point scales.
    #[must_use]
    pub fn bandwidth(self) -> f64 {
        match self {
            Self::Point { .. } => 0.0,
            Self::Band { start, end, count } => {
                if count == 0 {
                    0.0
                } else {
                    (end - start) / (count as f64)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reversed_range_maps_upwards() {
        let scale = LinearScale::new(0.0, 100.0)
            .and_then(|s| s.with_range(200.0, 0.0))
            .expect("scale");
        assert_relative_eq!(scale.to_pixel(0.0).expect("px"), 200.0);
        assert_relative_eq!(scale.to_pixel(25.0).expect("px"), 150.0);
        assert_relative_eq!(scale.to_domain(150.0).expect("domain"), 25.0);
    }

    #[test]
    fn band_scale_centers_categories() {
        let scale = CategoryScale::Band {
            start: 0.0,
            end: 300.0,
            count: 3,
        };
        assert_relative_eq!(scale.bandwidth(), 100.0);
        assert_relative_eq!(scale.position(0), 50.0);
        assert_relative_eq!(scale.position(2), 250.0);
    }

    #[test]
    fn point_scale_with_single_category_is_centered() {
        let scale = CategoryScale::Point {
            start: 10.0,
            end: 30.0,
            count: 1,
        };
        assert_relative_eq!(scale.position(0), 20.0);
    }
}
