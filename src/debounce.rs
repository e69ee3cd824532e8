// Compass Relay - Direction Debounce & Arming
//
// Turns a stream of per-tick classifications into at most one fire per
// approach.  A direction must be seen on `stable_count_threshold` consecutive
// ticks, the armer must be armed, and either the direction changed or the
// cooldown has passed.  After firing, the armer stays disarmed until the
// heading moves clearly away (window + release margin) from the fired target.

use std::time::{Duration, Instant};

use crate::events::{Classification, Direction};

#[derive(Debug, Clone, Copy)]
pub struct ArmerConfig {
    pub stable_count_threshold: u32,
    pub cooldown: Duration,
    pub window_deg: f64,
    pub release_extra_deg: f64,
}

/// Consecutive-classification tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StabilityState {
    pub candidate: Option<Direction>,
    pub run_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmState {
    pub last_fired_direction: Option<Direction>,
    pub last_fired_at: Option<Instant>,
    pub armed: bool,
}

impl Default for ArmState {
    fn default() -> Self {
        Self {
            last_fired_direction: None,
            last_fired_at: None,
            armed: true,
        }
    }
}

/// What one tick decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArmerOutcome {
    /// Direction to enqueue this tick.
    pub fire: Option<Direction>,
    /// The armer went from disarmed to armed this tick.
    pub rearmed: bool,
}

pub struct DebounceArmer {
    config: ArmerConfig,
    stability: StabilityState,
    arm: ArmState,
}

impl DebounceArmer {
    pub fn new(config: ArmerConfig) -> Self {
        Self {
            config,
            stability: StabilityState::default(),
            arm: ArmState::default(),
        }
    }

    pub fn stability(&self) -> StabilityState {
        self.stability
    }

    pub fn arm_state(&self) -> ArmState {
        self.arm
    }

    pub fn is_armed(&self) -> bool {
        self.arm.armed
    }

    /// Call once per loop tick with that tick's classification.
    pub fn update(&mut self, classification: &Classification, now: Instant) -> ArmerOutcome {
        let mut outcome = ArmerOutcome::default();
        let direction = classification.direction;

        // ---- 1. stability ----
        if direction.is_some() && direction == self.stability.candidate {
            self.stability.run_length = self.stability.run_length.saturating_add(1);
        } else {
            self.stability.candidate = direction;
            self.stability.run_length = 1;
        }

        // ---- 2. fire ----
        if self.stability.run_length >= self.config.stable_count_threshold && self.arm.armed {
            if let Some(candidate) = self.stability.candidate {
                if self.arm.last_fired_direction != Some(candidate) || self.cooldown_elapsed(now) {
                    outcome.fire = Some(candidate);
                    self.arm = ArmState {
                        last_fired_direction: Some(candidate),
                        last_fired_at: Some(now),
                        armed: false,
                    };
                }
            }
            self.stability.run_length = self.config.stable_count_threshold;
        }

        // ---- 3. re-arm ----
        if !self.arm.armed
            && direction != self.arm.last_fired_direction
            && classification.distance > self.config.window_deg + self.config.release_extra_deg
        {
            self.arm.armed = true;
            outcome.rearmed = true;
        }

        outcome
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.arm
            .last_fired_at
            .map_or(true, |t| now.saturating_duration_since(t) >= self.config.cooldown)
    }
}
