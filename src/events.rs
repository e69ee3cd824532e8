// Compass Relay - Pipeline Events & Data Types

use std::fmt;
use std::time::Instant;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Raw magnetometer reading (QMC5883L counts)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

// ---------------------------------------------------------------------------
// Cardinal directions
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// Wire name used by both transports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East  => "east",
            Self::South => "south",
            Self::West  => "west",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::North => 0,
            Self::East  => 1,
            Self::South => 2,
            Self::West  => 3,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Targets (north, east, south, west; listing order breaks ties)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BearingTarget {
    pub direction: Direction,
    pub bearing_deg: f64,
}

pub const TARGETS: [BearingTarget; 4] = [
    BearingTarget { direction: Direction::North, bearing_deg: 0.0 },
    BearingTarget { direction: Direction::East,  bearing_deg: 90.0 },
    BearingTarget { direction: Direction::South, bearing_deg: 180.0 },
    BearingTarget { direction: Direction::West,  bearing_deg: 270.0 },
];

// ---------------------------------------------------------------------------
// Per-tick results
// ---------------------------------------------------------------------------

/// Bearing for one tick: the instantaneous value and the filtered estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bearing {
    pub raw: f64,
    pub smoothed: f64,
}

/// Nearest target, or `None` when it lies outside the capture window.
/// `distance` is always the distance to the nearest target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub direction: Option<Direction>,
    pub distance: f64,
}

/// A fire request waiting for the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEvent {
    pub direction: Direction,
    pub enqueued_at: Instant,
}
