// Compass Relay - Direction Classifier

use crate::events::{BearingTarget, Classification, TARGETS};
use crate::heading::ang_diff;

pub struct DirectionClassifier {
    targets: [BearingTarget; 4],
    window_deg: f64,
}

impl DirectionClassifier {
    pub fn new(targets: [BearingTarget; 4], window_deg: f64) -> Self {
        Self { targets, window_deg }
    }

    /// Classifier over the standard north/east/south/west targets.
    pub fn cardinal(window_deg: f64) -> Self {
        Self::new(TARGETS, window_deg)
    }

    /// Nearest target to `bearing`; earlier targets win exact ties.
    pub fn classify(&self, bearing: f64) -> Classification {
        let mut best = self.targets[0].direction;
        let mut best_d = f64::INFINITY;

        for target in &self.targets {
            let d = ang_diff(bearing, target.bearing_deg);
            if d < best_d {
                best_d = d;
                best = target.direction;
            }
        }

        Classification {
            direction: (best_d <= self.window_deg).then_some(best),
            distance: best_d,
        }
    }
}
