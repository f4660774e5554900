// Y axis tick values
use serde::Serialize;

/// Upper bound on ticks for one axis; the step choice keeps real axes
/// well below it.
const MAX_TICKS: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YTicks {
    pub values: Vec<f64>,
    pub decimals: usize,
    /// `values` formatted with `decimals` fraction digits.
    pub labels: Vec<String>,
}

impl YTicks {
    /// Ticks at 1, 2 or 5 times a power of ten, from at or below `min` to at
    /// or above `max`. `None` for an empty range or one whose ticks are not
    /// representable.
    pub fn for_range(min: f64, max: f64) -> Option<Self> {
        if !(min.is_finite() && max.is_finite()) || max <= min {
            return None;
        }

        let diff = max - min;
        if !diff.is_finite() {
            return None;
        }
        let power10 = diff.log10().floor() as i32 - 1;
        let magnitude = 10_f64.powi(power10);
        let normalized = (diff / magnitude).floor();
        let multiplier = if normalized >= 50.0 {
            10.0
        } else if normalized >= 20.0 {
            5.0
        } else {
            2.0
        };
        let interval = multiplier * magnitude;
        let start = (min / interval).floor() * interval;
        if !(interval.is_finite() && interval > 0.0 && start.is_finite()) {
            return None;
        }

        let mut values = Vec::new();
        for k in 0..MAX_TICKS {
            let value = start + k as f64 * interval;
            if !value.is_finite() {
                return None;
            }
            values.push(value);
            if value >= max {
                break;
            }
        }
        if values.last().is_none_or(|last| *last < max) {
            return None;
        }

        let decimals = (-power10 - if multiplier == 10.0 { 1 } else { 0 }).max(0) as usize;
        let labels = values.iter().map(|v| format!("{:.*}", decimals, v)).collect();
        Some(Self {
            values,
            decimals,
            labels,
        })
    }
}
