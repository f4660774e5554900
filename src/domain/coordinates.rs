// Timestamp/value to pixel transforms
use super::time_series::{Timestamp, UnitRange};
use std::collections::BTreeMap;

/// Visible part of the chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
    /// Width of the time axis in pixels.
    pub width_px: f64,
    /// Height of the value axis in pixels.
    pub height_px: f64,
}

impl Viewport {
    pub fn new(from_ts: Timestamp, to_ts: Timestamp, width_px: f64, height_px: f64) -> Self {
        Self {
            from_ts,
            to_ts,
            width_px,
            height_px,
        }
    }

    pub fn span(&self) -> Timestamp {
        self.to_ts.saturating_sub(self.from_ts)
    }

    pub fn is_valid(&self) -> bool {
        self.to_ts > self.from_ts
            && self.width_px.is_finite()
            && self.width_px > 0.0
            && self.height_px.is_finite()
            && self.height_px > 0.0
    }

    /// Pixels per second.
    pub fn scale(&self) -> f64 {
        self.width_px / self.span() as f64
    }
}

/// Linear mapping of one unit's values onto the (inverted) y axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueAxis {
    pub min: f64,
    pub max: f64,
    pub height: f64,
}

impl ValueAxis {
    pub fn new(range: UnitRange, height: f64) -> Self {
        Self {
            min: range.min_value,
            max: range.max_value,
            height,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.max == self.min
    }

    pub fn midpoint(&self) -> f64 {
        self.height / 2.0
    }

    pub fn v2y(&self, v: f64) -> f64 {
        if self.is_flat() {
            return self.midpoint();
        }
        self.height - (v - self.min) * self.height / (self.max - self.min)
    }

    pub fn y2v(&self, y: f64) -> f64 {
        if self.is_flat() {
            return self.min;
        }
        self.min + (self.height - y) * (self.max - self.min) / self.height
    }

    pub fn dy2dv(&self, dy: f64) -> f64 {
        dy * (self.max - self.min) / self.height
    }

    pub fn dv2dy(&self, dv: f64) -> f64 {
        if self.is_flat() {
            return 0.0;
        }
        dv * self.height / (self.max - self.min)
    }
}

/// Time axis plus one value axis per unit, for a single frame.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    from_ts: f64,
    scale: f64,
    axes: BTreeMap<String, ValueAxis>,
}

impl CoordinateMapper {
    pub fn new(viewport: &Viewport, unit_ranges: &BTreeMap<String, UnitRange>) -> Self {
        let axes = unit_ranges
            .iter()
            .map(|(unit, range)| (unit.clone(), ValueAxis::new(*range, viewport.height_px)))
            .collect();
        Self {
            from_ts: viewport.from_ts as f64,
            scale: viewport.scale(),
            axes,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Horizontal translation that places `from_ts` at x = 0.
    pub fn pan_x(&self) -> f64 {
        -self.from_ts * self.scale
    }

    pub fn t2x(&self, t: f64) -> f64 {
        (t - self.from_ts) * self.scale
    }

    pub fn x2t(&self, x: f64) -> f64 {
        self.from_ts + x / self.scale
    }

    pub fn dx2dt(&self, dx: f64) -> f64 {
        dx / self.scale
    }

    pub fn dt2dx(&self, dt: f64) -> f64 {
        dt * self.scale
    }

    /// Value axis for `unit`; `None` until data for the unit has been seen.
    pub fn axis(&self, unit: &str) -> Option<&ValueAxis> {
        self.axes.get(unit)
    }

    pub fn v2y(&self, v: f64, unit: &str) -> Option<f64> {
        self.axis(unit).map(|a| a.v2y(v))
    }

    pub fn y2v(&self, y: f64, unit: &str) -> Option<f64> {
        self.axis(unit).map(|a| a.y2v(y))
    }

    pub fn dy2dv(&self, dy: f64, unit: &str) -> Option<f64> {
        self.axis(unit).map(|a| a.dy2dv(dy))
    }

    pub fn dv2dy(&self, dv: f64, unit: &str) -> Option<f64> {
        self.axis(unit).map(|a| a.dv2dy(dv))
    }
}
