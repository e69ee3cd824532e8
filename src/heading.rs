// Compass Relay - Heading Estimation
//
// Raw (x, y) counts -> hard-iron correction -> bearing -> north rotation ->
// circular exponential smoothing.  Smoothing happens on unit vectors so the
// 0°/360° wrap does not drag the estimate through the opposite side.

use crate::events::{Bearing, RawSample};

/// Fixed calibration applied before any bearing is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingCalibration {
    pub x_offset: f64,
    pub y_offset: f64,
    pub north_deg_raw: f64,
}

impl HeadingCalibration {
    /// No offsets and no rotation.
    pub const IDENTITY: Self = Self { x_offset: 0.0, y_offset: 0.0, north_deg_raw: 0.0 };
}

/// Wrap any finite angle into [0, 360).
pub fn normalize_deg(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Bearing of the vector (x, y) in degrees, [0, 360).
pub fn deg_from_xy(x: f64, y: f64) -> f64 {
    normalize_deg(y.atan2(x).to_degrees())
}

/// Minimal circular distance between two bearings, [0, 180].
pub fn ang_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Exponential moving average of an angle.
///
/// `alpha` weights the new sample.  With no previous value the new sample is
/// returned unchanged.
pub fn ema_angle(prev_deg: Option<f64>, new_deg: f64, alpha: f64) -> f64 {
    let Some(prev_deg) = prev_deg else {
        return new_deg;
    };

    let (pr, nr) = (prev_deg.to_radians(), new_deg.to_radians());
    let mx = (1.0 - alpha) * pr.cos() + alpha * nr.cos();
    let my = (1.0 - alpha) * pr.sin() + alpha * nr.sin();
    normalize_deg(my.atan2(mx).to_degrees())
}

pub struct HeadingEstimator {
    calibration: HeadingCalibration,
    alpha: f64,
    smoothed: Option<f64>,
}

impl HeadingEstimator {
    pub fn new(calibration: HeadingCalibration, alpha: f64) -> Self {
        Self {
            calibration,
            alpha,
            smoothed: None,
        }
    }

    /// Current filtered bearing, `None` until the first sample.
    pub fn smoothed(&self) -> Option<f64> {
        self.smoothed
    }

    /// Feed one accepted sample and return this tick's bearings.
    pub fn update(&mut self, sample: RawSample) -> Bearing {
        let x = f64::from(sample.x) - self.calibration.x_offset;
        let y = f64::from(sample.y) - self.calibration.y_offset;

        let raw = normalize_deg(deg_from_xy(x, y) - self.calibration.north_deg_raw);
        let smoothed = ema_angle(self.smoothed, raw, self.alpha);
        self.smoothed = Some(smoothed);

        Bearing { raw, smoothed }
    }
}
