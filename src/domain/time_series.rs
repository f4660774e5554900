// Time series domain models
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// UNIX timestamp in seconds.
pub type Timestamp = i64;

/// A single sample. `minv`/`maxv` are only present at aggregated levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub t: Timestamp,
    pub v: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxv: Option<f64>,
}

impl TimeSeriesPoint {
    pub fn raw(t: Timestamp, v: f64) -> Self {
        Self {
            t,
            v,
            minv: None,
            maxv: None,
        }
    }

    pub fn aggregated(t: Timestamp, v: f64, minv: f64, maxv: f64) -> Self {
        Self {
            t,
            v,
            minv: Some(minv),
            maxv: Some(maxv),
        }
    }

    /// Lower and upper value bounds of this point.
    /// Aggregated points use their envelope, raw points use `v` for both.
    pub fn bounds(&self, aggregated: bool) -> (f64, f64) {
        if aggregated {
            (self.minv.unwrap_or(self.v), self.maxv.unwrap_or(self.v))
        } else {
            (self.v, self.v)
        }
    }
}

/// A gap-free range of fetched data at one aggregation level.
///
/// `[from_ts, to_ts)` is authoritative: every series present has all of its
/// points for that range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBlock {
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
    pub series_data: HashMap<String, Vec<TimeSeriesPoint>>,
}

impl DataBlock {
    pub fn new(
        from_ts: Timestamp,
        to_ts: Timestamp,
        series_data: HashMap<String, Vec<TimeSeriesPoint>>,
    ) -> Self {
        Self {
            from_ts,
            to_ts,
            series_data,
        }
    }

    pub fn points(&self, series_id: &str) -> &[TimeSeriesPoint] {
        self.series_data
            .get(series_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if the block's range intersects the closed range `[from, to]`.
    pub fn intersects(&self, from: f64, to: f64) -> bool {
        !((self.to_ts as f64) < from || (self.from_ts as f64) > to)
    }
}

/// One line on a chart. Immutable for the lifetime of a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub id: String,
    pub path: String,
    pub unit: String,
    pub display_index: usize,
}

impl ChartSeries {
    pub fn new(id: String, path: String, unit: String, display_index: usize) -> Self {
        Self {
            id,
            path,
            unit,
            display_index,
        }
    }
}

/// Observed value range of all series sharing a unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRange {
    pub min_value: f64,
    pub max_value: f64,
}

impl UnitRange {
    pub fn new(min_value: f64, max_value: f64) -> Self {
        Self {
            min_value,
            max_value,
        }
    }

    /// Widen to include `[min, max]`. Never narrows.
    pub fn widen(&mut self, min: f64, max: f64) {
        self.min_value = self.min_value.min(min);
        self.max_value = self.max_value.max(max);
    }
}
