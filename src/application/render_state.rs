// Render state published to the UI after every coordinator transition
use crate::domain::aggregation::AggregationLevel;
use crate::domain::error::ErrorReport;
use crate::domain::ticks::YTicks;
use crate::domain::time_series::{ChartSeries, DataBlock, TimeSeriesPoint, UnitRange};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSnapshot {
    pub fetching: bool,
    pub last_error: Option<ErrorReport>,
    pub aggregation_level: AggregationLevel,
    /// Cached blocks at `aggregation_level`, ordered by time.
    pub blocks: Vec<Arc<DataBlock>>,
    pub unit_ranges: BTreeMap<String, UnitRange>,
    /// One y axis per unit that has data.
    pub y_axes_count: usize,
    pub y_ticks: BTreeMap<String, YTicks>,
}

impl Default for RenderSnapshot {
    fn default() -> Self {
        Self {
            fetching: false,
            last_error: None,
            aggregation_level: AggregationLevel::Raw,
            blocks: Vec::new(),
            unit_ranges: BTreeMap::new(),
            y_axes_count: 0,
            y_ticks: BTreeMap::new(),
        }
    }
}

/// Result of a tooltip lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestHit {
    pub series: ChartSeries,
    pub point: TimeSeriesPoint,
    pub distance_px: f64,
    pub aggregated: bool,
}
