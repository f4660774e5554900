// Aggregation levels offered by the metrics store and level selection
use super::time_series::Timestamp;
use serde::{Serialize, Serializer};
use std::fmt;

/// Coarsest level offered by the store.
pub const MAX_AGGREGATION_LEVEL: u8 = 6;

const SECONDS_PER_HOUR: Timestamp = 3600;

/// Downsampling granularity. `Raw` orders before every aggregated level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregationLevel {
    Raw,
    Level(u8),
}

impl AggregationLevel {
    pub fn is_aggregated(&self) -> bool {
        matches!(self, AggregationLevel::Level(_))
    }

    /// Bucket width in seconds; `None` for raw data.
    pub fn bucket_seconds(&self) -> Option<Timestamp> {
        match self {
            AggregationLevel::Raw => None,
            AggregationLevel::Level(level) => Some(SECONDS_PER_HOUR * 3_i64.pow(u32::from(*level))),
        }
    }

    /// Numeric form, `-1` standing for raw data.
    pub fn as_i8(&self) -> i8 {
        match self {
            AggregationLevel::Raw => -1,
            AggregationLevel::Level(level) => *level as i8,
        }
    }

    /// Value of the `a` query parameter understood by the store.
    pub fn query_value(&self) -> String {
        match self {
            AggregationLevel::Raw => "no".to_string(),
            AggregationLevel::Level(level) => level.to_string(),
        }
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationLevel::Raw => write!(f, "raw"),
            AggregationLevel::Level(level) => write!(f, "L{}", level),
        }
    }
}

impl Serialize for AggregationLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

/// Picks the aggregation level for a visible span and pixel width.
///
/// Pure and monotonic: for a fixed width a wider span never yields a finer
/// level.
#[derive(Debug, Clone, Copy)]
pub struct AggregationPolicy {
    /// Horizontal pixels reserved for each drawn point.
    pub px_per_point: f64,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self { px_per_point: 10.0 }
    }
}

impl AggregationPolicy {
    pub fn new(px_per_point: f64) -> Self {
        Self { px_per_point }
    }

    pub fn select(&self, span_seconds: Timestamp, width_px: f64) -> AggregationLevel {
        let max_points = self.point_budget(width_px);
        let n_hours = (span_seconds.max(0) as f64 / SECONDS_PER_HOUR as f64).ceil();

        // raw data is assumed to arrive a few times per hour
        if n_hours * 3.0 <= max_points {
            return AggregationLevel::Raw;
        }
        for level in 0..MAX_AGGREGATION_LEVEL {
            if n_hours / 3_f64.powi(i32::from(level)) <= max_points {
                return AggregationLevel::Level(level);
            }
        }
        AggregationLevel::Level(MAX_AGGREGATION_LEVEL)
    }

    fn point_budget(&self, width_px: f64) -> f64 {
        if !(width_px.is_finite() && self.px_per_point > 0.0) {
            return 1.0;
        }
        (width_px / self.px_per_point).floor().max(1.0)
    }
}
