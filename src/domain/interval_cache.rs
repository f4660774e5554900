// Per aggregation level cache of merged, non-overlapping data blocks
use super::aggregation::AggregationLevel;
use super::interval::Interval;
use super::time_series::{DataBlock, TimeSeriesPoint};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Blocks per level, sorted by `from_ts`. Blocks at one level never overlap
/// or touch: `blocks[i].to_ts < blocks[i + 1].from_ts`.
#[derive(Debug, Default, Clone)]
pub struct IntervalCache {
    levels: HashMap<AggregationLevel, Vec<Arc<DataBlock>>>,
}

impl IntervalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self, level: AggregationLevel) -> &[Arc<DataBlock>] {
        self.levels.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn covered(&self, level: AggregationLevel) -> Vec<Interval> {
        self.blocks(level)
            .iter()
            .map(|b| Interval::new(b.from_ts, b.to_ts))
            .collect()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Merge freshly fetched data for `range` into the cache.
    ///
    /// Neighbors touching the range are concatenated with the new data into a
    /// single block. Any other block reaching into the range is absorbed as
    /// well, with the fetched data replacing its points inside `range`.
    /// Returns the resulting block.
    pub fn merge(
        &mut self,
        level: AggregationLevel,
        range: Interval,
        arrived: HashMap<String, Vec<TimeSeriesPoint>>,
    ) -> Arc<DataBlock> {
        let blocks = self.levels.entry(level).or_default();

        let (absorbed, mut kept): (Vec<Arc<DataBlock>>, Vec<Arc<DataBlock>>) = blocks
            .drain(..)
            .partition(|b| b.to_ts >= range.from_ts && b.from_ts <= range.to_ts);

        let from_ts = absorbed
            .first()
            .map_or(range.from_ts, |b| b.from_ts.min(range.from_ts));
        let to_ts = absorbed
            .last()
            .map_or(range.to_ts, |b| b.to_ts.max(range.to_ts));

        let series_ids: BTreeSet<&String> = arrived
            .keys()
            .chain(absorbed.iter().flat_map(|b| b.series_data.keys()))
            .collect();

        let mut series_data = HashMap::with_capacity(series_ids.len());
        for id in series_ids {
            let mut points: Vec<TimeSeriesPoint> = Vec::new();
            for block in &absorbed {
                points.extend(block.points(id).iter().filter(|p| p.t < range.from_ts));
            }
            if let Some(fresh) = arrived.get(id) {
                points.extend_from_slice(fresh);
            }
            for block in &absorbed {
                points.extend(block.points(id).iter().filter(|p| p.t >= range.to_ts));
            }
            ensure_strictly_increasing(&mut points);
            series_data.insert(id.clone(), points);
        }

        let merged = Arc::new(DataBlock::new(from_ts, to_ts, series_data));
        let position = kept.partition_point(|b| b.from_ts < merged.from_ts);
        kept.insert(position, merged.clone());
        *blocks = kept;

        tracing::debug!(
            level = %level,
            from_ts,
            to_ts,
            absorbed = absorbed.len(),
            blocks = blocks.len(),
            "Merged block into cache"
        );
        merged
    }
}

/// Concatenated pieces are normally already in order; only sort and drop
/// duplicate timestamps when the store sent overlapping points.
fn ensure_strictly_increasing(points: &mut Vec<TimeSeriesPoint>) {
    if points.windows(2).all(|w| w[0].t < w[1].t) {
        return;
    }
    points.sort_by_key(|p| p.t);
    points.dedup_by_key(|p| p.t);
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL: AggregationLevel = AggregationLevel::Raw;

    fn series(id: &str, ts: &[i64]) -> HashMap<String, Vec<TimeSeriesPoint>> {
        let points = ts.iter().map(|t| TimeSeriesPoint::raw(*t, *t as f64)).collect();
        HashMap::from([(id.to_string(), points)])
    }

    fn timestamps(block: &DataBlock, id: &str) -> Vec<i64> {
        block.points(id).iter().map(|p| p.t).collect()
    }

    #[test]
    fn test_merge_right_neighbor_into_single_block() {
        let mut cache = IntervalCache::new();
        cache.merge(LEVEL, Interval::new(1000, 2000), series("a", &[1000, 1500]));
        cache.merge(LEVEL, Interval::new(2000, 3000), series("a", &[2000, 2500]));

        let blocks = cache.blocks(LEVEL);
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].from_ts, blocks[0].to_ts), (1000, 3000));
        assert_eq!(timestamps(&blocks[0], "a"), vec![1000, 1500, 2000, 2500]);
    }

    #[test]
    fn test_merge_fills_gap_between_two_blocks() {
        let mut cache = IntervalCache::new();
        cache.merge(LEVEL, Interval::new(0, 100), series("a", &[10]));
        cache.merge(LEVEL, Interval::new(200, 300), series("a", &[210]));
        assert_eq!(cache.blocks(LEVEL).len(), 2);

        cache.merge(LEVEL, Interval::new(100, 200), series("a", &[110]));
        let blocks = cache.blocks(LEVEL);
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].from_ts, blocks[0].to_ts), (0, 300));
        assert_eq!(timestamps(&blocks[0], "a"), vec![10, 110, 210]);
    }

    #[test]
    fn test_disjoint_blocks_stay_sorted() {
        let mut cache = IntervalCache::new();
        cache.merge(LEVEL, Interval::new(500, 600), series("a", &[550]));
        cache.merge(LEVEL, Interval::new(0, 100), series("a", &[50]));
        cache.merge(LEVEL, Interval::new(200, 300), series("a", &[250]));

        let covered = cache.covered(LEVEL);
        assert_eq!(
            covered,
            vec![Interval::new(0, 100), Interval::new(200, 300), Interval::new(500, 600)]
        );
        for pair in covered.windows(2) {
            assert!(pair[0].to_ts < pair[1].from_ts);
        }
    }

    #[test]
    fn test_levels_are_independent() {
        let mut cache = IntervalCache::new();
        cache.merge(LEVEL, Interval::new(0, 100), series("a", &[50]));
        cache.merge(AggregationLevel::Level(0), Interval::new(100, 200), series("a", &[150]));

        assert_eq!(cache.blocks(LEVEL).len(), 1);
        assert_eq!(cache.blocks(AggregationLevel::Level(0)).len(), 1);
        assert!(cache.blocks(AggregationLevel::Level(1)).is_empty());
    }

    #[test]
    fn test_overlapping_block_is_absorbed_without_duplicates() {
        let mut cache = IntervalCache::new();
        cache.merge(LEVEL, Interval::new(0, 100), series("a", &[10, 60, 90]));
        // overlaps the tail of the first block; the new data wins inside [50, 150)
        cache.merge(LEVEL, Interval::new(50, 150), series("a", &[60, 120]));

        let blocks = cache.blocks(LEVEL);
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].from_ts, blocks[0].to_ts), (0, 150));
        assert_eq!(timestamps(&blocks[0], "a"), vec![10, 60, 120]);
    }

    #[test]
    fn test_series_missing_from_one_side() {
        let mut cache = IntervalCache::new();
        cache.merge(LEVEL, Interval::new(0, 100), series("a", &[10]));
        cache.merge(LEVEL, Interval::new(100, 200), series("b", &[110]));

        let block = &cache.blocks(LEVEL)[0];
        assert_eq!(timestamps(block, "a"), vec![10]);
        assert_eq!(timestamps(block, "b"), vec![110]);
    }

    #[test]
    fn test_unsorted_response_is_repaired() {
        let mut cache = IntervalCache::new();
        cache.merge(LEVEL, Interval::new(0, 100), series("a", &[30, 10, 30, 20]));
        assert_eq!(timestamps(&cache.blocks(LEVEL)[0], "a"), vec![10, 20, 30]);
    }
}
