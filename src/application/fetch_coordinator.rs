// Fetch coordinator - Decides what to fetch for a viewport and owns the cache
use crate::application::render_state::{NearestHit, RenderSnapshot};
use crate::application::values_repository::{ValuesRequest, ValuesResponse};
use crate::domain::aggregation::{AggregationLevel, AggregationPolicy};
use crate::domain::coordinates::{CoordinateMapper, Viewport};
use crate::domain::error::{ChartError, ErrorReport};
use crate::domain::interval::{Interval, missing_intervals};
use crate::domain::interval_cache::IntervalCache;
use crate::domain::nearest::{NearestPointFinder, Pointer};
use crate::domain::ticks::YTicks;
use crate::domain::time_series::{ChartSeries, UnitRange};
use std::collections::{BTreeMap, HashMap};

pub type RequestId = u64;

/// A fetch that has been started and not yet settled.
#[derive(Debug, Clone, PartialEq)]
struct PendingRequest {
    id: RequestId,
    level: AggregationLevel,
    range: Interval,
    generation: u64,
}

/// A fetch the caller must run and report back through `complete`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub id: RequestId,
    pub request: ValuesRequest,
}

/// How a completed fetch was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Merged,
    Failed,
    /// Issued before the last invalidation; its data was dropped.
    Stale,
    Unknown,
}

/// Owns the interval cache, the pending request set and the unit ranges of
/// one chart. All mutation goes through `ensure_coverage`, `complete`,
/// `invalidate` and `abort_all`; `snapshot` is a pure projection.
pub struct FetchCoordinator {
    series: Vec<ChartSeries>,
    paths: Vec<String>,
    policy: AggregationPolicy,
    cache: IntervalCache,
    pending: Vec<PendingRequest>,
    unit_ranges: BTreeMap<String, UnitRange>,
    level: AggregationLevel,
    last_error: Option<ChartError>,
    last_viewport: Option<Viewport>,
    generation: u64,
    next_id: RequestId,
}

impl FetchCoordinator {
    pub fn new(series: Vec<ChartSeries>, policy: AggregationPolicy) -> Self {
        let mut paths: Vec<String> = Vec::with_capacity(series.len());
        for s in &series {
            if !paths.contains(&s.path) {
                paths.push(s.path.clone());
            }
        }

        Self {
            series,
            paths,
            policy,
            cache: IntervalCache::new(),
            pending: Vec::new(),
            unit_ranges: BTreeMap::new(),
            level: AggregationLevel::Raw,
            last_error: None,
            last_viewport: None,
            generation: 0,
            next_id: 1,
        }
    }

    /// Distinct series paths, in series order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Level chosen for the last valid viewport.
    pub fn level(&self) -> AggregationLevel {
        self.level
    }

    pub fn last_viewport(&self) -> Option<Viewport> {
        self.last_viewport
    }

    /// Select the level for `viewport` and start fetches for whatever is
    /// missing around it. Returns nothing when coverage is sufficient.
    pub fn ensure_coverage(&mut self, viewport: &Viewport) -> Vec<FetchTicket> {
        if !viewport.is_valid() {
            tracing::debug!(?viewport, "Ignoring invalid viewport");
            return Vec::new();
        }
        self.last_viewport = Some(*viewport);
        self.level = self.policy.select(viewport.span(), viewport.width_px);
        if self.paths.is_empty() {
            return Vec::new();
        }

        let level = self.level;
        let covered = self.coverage(level);
        let visible = Interval::new(viewport.from_ts, viewport.to_ts);
        let span = visible.span();

        let check = Self::window(visible.padded(span / 2, span / 2), level);
        if missing_intervals(&covered, check).is_empty() {
            return Vec::new();
        }

        let wanted = Self::window(visible.padded(span, span), level);
        let gaps = missing_intervals(&covered, wanted);
        tracing::debug!(level = %level, gaps = gaps.len(), "Coverage insufficient");

        let fresh: Vec<Interval> = gaps
            .into_iter()
            .filter(|range| !self.is_pending(level, *range))
            .collect();
        fresh
            .into_iter()
            .map(|range| self.start(level, range))
            .collect()
    }

    /// Settle a fetch. The pending entry is removed whatever the outcome.
    pub fn complete(
        &mut self,
        id: RequestId,
        outcome: Result<ValuesResponse, ChartError>,
    ) -> Settled {
        let Some(position) = self.pending.iter().position(|p| p.id == id) else {
            tracing::warn!(id, "Completion for unknown request");
            return Settled::Unknown;
        };
        let request = self.pending.remove(position);

        if request.generation != self.generation {
            tracing::debug!(id, "Dropping result of request issued before invalidation");
            return Settled::Stale;
        }

        match outcome {
            Ok(response) => {
                self.merge(request.level, request.range, response);
                Settled::Merged
            }
            Err(error) => {
                tracing::warn!(
                    id,
                    level = %request.level,
                    from_ts = request.range.from_ts,
                    to_ts = request.range.to_ts,
                    "Fetch failed: {}",
                    error
                );
                self.last_error = Some(error);
                Settled::Failed
            }
        }
    }

    /// Forget all cached data so the next `ensure_coverage` refetches it.
    /// Unit ranges are kept; in-flight results become stale.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.generation += 1;
        tracing::debug!(generation = self.generation, "Cache invalidated");
    }

    /// Settle every pending request as aborted. Returns their ids.
    pub fn abort_all(&mut self) -> Vec<RequestId> {
        let ids: Vec<RequestId> = self.pending.drain(..).map(|p| p.id).collect();
        if !ids.is_empty() {
            self.last_error = Some(ChartError::Network("request aborted".to_string()));
        }
        ids
    }

    pub fn record_error(&mut self, error: ChartError) {
        self.last_error = Some(error);
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        let y_ticks = self
            .unit_ranges
            .iter()
            .filter_map(|(unit, range)| {
                YTicks::for_range(range.min_value, range.max_value).map(|t| (unit.clone(), t))
            })
            .collect();

        RenderSnapshot {
            fetching: !self.pending.is_empty(),
            last_error: self.last_error.as_ref().map(ErrorReport::from),
            aggregation_level: self.level,
            blocks: self.cache.blocks(self.level).to_vec(),
            unit_ranges: self.unit_ranges.clone(),
            y_axes_count: self.unit_ranges.len(),
            y_ticks,
        }
    }

    /// Tooltip lookup at pixel position `(x, y)` of `viewport`, restricted to
    /// `visible` series ids (all series when `None`).
    pub fn nearest_point(
        &self,
        viewport: &Viewport,
        x: f64,
        y: f64,
        radius_px: f64,
        visible: Option<&[String]>,
    ) -> Option<NearestHit> {
        if !viewport.is_valid() {
            return None;
        }
        let level = self.policy.select(viewport.span(), viewport.width_px);
        let mapper = CoordinateMapper::new(viewport, &self.unit_ranges);
        let shown: Vec<&ChartSeries> = self
            .series
            .iter()
            .filter(|s| visible.is_none_or(|ids| ids.contains(&s.id)))
            .collect();

        NearestPointFinder::new(&mapper, radius_px)
            .find(
                self.cache.blocks(level),
                &shown,
                Pointer::from_pixels(x, y, &mapper),
            )
            .map(|hit| NearestHit {
                series: hit.series.clone(),
                point: hit.point,
                distance_px: hit.distance_px,
                aggregated: level.is_aggregated(),
            })
    }

    fn coverage(&self, level: AggregationLevel) -> Vec<Interval> {
        let mut covered = self.cache.covered(level);
        covered.extend(
            self.pending
                .iter()
                .filter(|p| p.level == level)
                .map(|p| p.range),
        );
        covered
    }

    /// The store only accepts aggregated ranges aligned to the bucket size.
    fn window(interval: Interval, level: AggregationLevel) -> Interval {
        match level.bucket_seconds() {
            Some(bucket) => interval.aligned_outward(bucket),
            None => interval,
        }
    }

    fn is_pending(&self, level: AggregationLevel, range: Interval) -> bool {
        self.pending
            .iter()
            .any(|p| p.level == level && p.range == range)
    }

    fn start(&mut self, level: AggregationLevel, range: Interval) -> FetchTicket {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(PendingRequest {
            id,
            level,
            range,
            generation: self.generation,
        });
        tracing::debug!(
            id,
            level = %level,
            from_ts = range.from_ts,
            to_ts = range.to_ts,
            "Starting fetch"
        );

        FetchTicket {
            id,
            request: ValuesRequest {
                paths: self.paths.clone(),
                from_ts: range.from_ts,
                to_ts: range.to_ts,
                level,
            },
        }
    }

    fn merge(&mut self, level: AggregationLevel, range: Interval, response: ValuesResponse) {
        let aggregated = level.is_aggregated();
        let mut missing_path: Option<String> = None;
        let mut arrived = HashMap::with_capacity(self.series.len());

        for series in &self.series {
            let points = match response.paths.get(&series.path) {
                Some(values) => values.data.clone(),
                None => {
                    missing_path = Some(series.path.clone());
                    Vec::new()
                }
            };

            for point in &points {
                let (low, high) = point.bounds(aggregated);
                self.unit_ranges
                    .entry(series.unit.clone())
                    .and_modify(|r| r.widen(low, high))
                    .or_insert_with(|| UnitRange::new(low, high));
            }
            arrived.insert(series.id.clone(), points);
        }

        self.cache.merge(level, range, arrived);

        self.last_error = match missing_path {
            Some(path) => {
                tracing::warn!(path = %path, "Response is missing a series path, treating it as empty");
                Some(ChartError::MalformedResponse(path))
            }
            None => None,
        };
    }
}
