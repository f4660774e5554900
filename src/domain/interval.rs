// Half-open time intervals and interval set difference
use super::time_series::Timestamp;
use serde::Serialize;

/// Half-open interval `[from_ts, to_ts)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
}

impl Interval {
    pub fn new(from_ts: Timestamp, to_ts: Timestamp) -> Self {
        Self { from_ts, to_ts }
    }

    pub fn is_empty(&self) -> bool {
        self.to_ts <= self.from_ts
    }

    pub fn span(&self) -> Timestamp {
        self.to_ts.saturating_sub(self.from_ts)
    }

    /// Grow by `before` on the left and `after` on the right, clamped to the
    /// timestamp range.
    pub fn padded(&self, before: Timestamp, after: Timestamp) -> Self {
        Self::new(
            self.from_ts.saturating_sub(before),
            self.to_ts.saturating_add(after),
        )
    }

    /// Grow outward to multiples of `bucket` seconds. Bounds with no
    /// representable multiple beyond them stay where they are.
    pub fn aligned_outward(&self, bucket: Timestamp) -> Self {
        if bucket <= 1 {
            return *self;
        }
        let from_ts = self
            .from_ts
            .div_euclid(bucket)
            .checked_mul(bucket)
            .unwrap_or(self.from_ts);
        let to_ts = if self.to_ts.rem_euclid(bucket) == 0 {
            self.to_ts
        } else {
            (self.to_ts.div_euclid(bucket) + 1)
                .checked_mul(bucket)
                .unwrap_or(self.to_ts)
        };
        Self::new(from_ts, to_ts)
    }
}

/// Sort intervals and coalesce those that overlap or touch.
pub fn normalize(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.iter().filter(|i| !i.is_empty()).copied().collect();
    sorted.sort_by_key(|i| (i.from_ts, i.to_ts));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if interval.from_ts <= last.to_ts => {
                last.to_ts = last.to_ts.max(interval.to_ts);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Parts of `wanted` not covered by any of `covered`, in time order.
///
/// `covered` may be unsorted and may overlap; the result is always the
/// minimal list of disjoint gaps.
pub fn missing_intervals(covered: &[Interval], wanted: Interval) -> Vec<Interval> {
    let mut missing = Vec::new();
    if wanted.is_empty() {
        return missing;
    }

    let mut cursor = wanted.from_ts;
    for interval in normalize(covered) {
        if interval.to_ts <= cursor {
            continue;
        }
        if interval.from_ts >= wanted.to_ts {
            break;
        }
        if interval.from_ts > cursor {
            missing.push(Interval::new(cursor, interval.from_ts));
        }
        cursor = interval.to_ts;
        if cursor >= wanted.to_ts {
            break;
        }
    }

    if cursor < wanted.to_ts {
        missing.push(Interval::new(cursor, wanted.to_ts));
    }
    missing
}
