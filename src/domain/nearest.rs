// Nearest cached point to the pointer, measured in pixels
use super::coordinates::CoordinateMapper;
use super::time_series::{ChartSeries, DataBlock, TimeSeriesPoint};
use std::sync::Arc;

/// Tooltip hit radius used when the caller does not pick one.
pub const DEFAULT_RADIUS_PX: f64 = 10.0;

/// Pointer position: a timestamp on the x axis and a pixel offset on the
/// y axis, which every unit translates to its own value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub ts: f64,
    pub y: f64,
}

impl Pointer {
    pub fn new(ts: f64, y: f64) -> Self {
        Self { ts, y }
    }

    /// Pointer at pixel coordinates relative to the plot area.
    pub fn from_pixels(x: f64, y: f64, mapper: &CoordinateMapper) -> Self {
        Self::new(mapper.x2t(x), y)
    }

    /// Pointer given as a value in a reference unit.
    pub fn at_value(ts: f64, value: f64, unit: &str, mapper: &CoordinateMapper) -> Option<Self> {
        mapper.v2y(value, unit).map(|y| Self::new(ts, y))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearestPoint<'a> {
    pub series: &'a ChartSeries,
    pub point: TimeSeriesPoint,
    pub distance_px: f64,
}

pub struct NearestPointFinder<'m> {
    mapper: &'m CoordinateMapper,
    radius_px: f64,
}

impl<'m> NearestPointFinder<'m> {
    pub fn new(mapper: &'m CoordinateMapper, radius_px: f64) -> Self {
        Self { mapper, radius_px }
    }

    /// Closest point within the radius over the visible series.
    ///
    /// Series are visited in display order and points in time order; on
    /// equal distance the first candidate wins.
    pub fn find<'s>(
        &self,
        blocks: &[Arc<DataBlock>],
        visible: &[&'s ChartSeries],
        pointer: Pointer,
    ) -> Option<NearestPoint<'s>> {
        let max_dt = self.mapper.dx2dt(self.radius_px);
        let candidates: Vec<&Arc<DataBlock>> = blocks
            .iter()
            .filter(|b| b.intersects(pointer.ts - max_dt, pointer.ts + max_dt))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let mut ordered: Vec<&'s ChartSeries> = visible.to_vec();
        ordered.sort_by_key(|s| s.display_index);

        let mut closest: Option<NearestPoint<'s>> = None;
        for series in ordered {
            let Some(axis) = self.mapper.axis(&series.unit) else {
                continue;
            };
            let (pointer_v, max_dv) = if axis.is_flat() {
                if (pointer.y - axis.midpoint()).abs() > self.radius_px {
                    continue;
                }
                (axis.min, 0.0)
            } else {
                (axis.y2v(pointer.y), axis.dy2dv(self.radius_px))
            };

            for block in &candidates {
                for point in block.points(&series.id) {
                    let dt = (point.t as f64 - pointer.ts).abs();
                    let dv = (point.v - pointer_v).abs();
                    if dt > max_dt || dv > max_dv {
                        continue;
                    }
                    let dx = self.mapper.dt2dx(dt);
                    let dy = axis.v2y(point.v) - pointer.y;
                    let distance_px = (dx * dx + dy * dy).sqrt();
                    if distance_px > self.radius_px {
                        continue;
                    }
                    if closest.as_ref().is_none_or(|c| distance_px < c.distance_px) {
                        closest = Some(NearestPoint {
                            series,
                            point: *point,
                            distance_px,
                        });
                    }
                }
            }
        }
        closest
    }
}
