//! External phase/direction codes → internal display vocabulary.

use crate::{Direction, SignalStatus};

/// External phase codes.
pub mod phase {
    pub const RED: i64 = 1;
    pub const GREEN: i64 = 2;
    pub const YELLOW: i64 = 3;
    /// Green with a visible countdown; the timer arrives in the red-countdown field.
    pub const GREEN_COUNTDOWN: i64 = 4;
    /// Short amber pulse between phases.
    pub const TRANSITION: i64 = -1;
}

/// External lane direction codes.
pub mod lane {
    /// Sender omitted the direction on this tick.
    pub const UNSET: i64 = 0;
    pub const LEFT: i64 = 1;
    pub const RIGHT: i64 = 2;
    pub const STRAIGHT: i64 = 4;
}

/// Result of normalizing one raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub status: SignalStatus,
    pub direction: Direction,
    pub countdown: u32,
}

/// Maps an external phase code to the internal status and the countdown it
/// should display.
fn map_status(raw_status: i64, red_countdown: i64) -> (SignalStatus, i64) {
    match raw_status {
        phase::RED => (SignalStatus::Red, red_countdown),
        phase::GREEN => (SignalStatus::Green, 0),
        phase::YELLOW => (SignalStatus::Yellow, 0),
        phase::GREEN_COUNTDOWN => (SignalStatus::Green, red_countdown),
        phase::TRANSITION => (SignalStatus::Yellow, red_countdown),
        _ => (SignalStatus::None, 0),
    }
}

fn clamp_countdown(seconds: i64) -> u32 {
    u32::try_from(seconds.max(0)).unwrap_or(u32::MAX)
}

/// Owns the one-slot direction history used to fill in ticks where the
/// sender omits the lane.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    history: Direction,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last concrete direction seen, `Straight` if none yet.
    pub fn history(&self) -> Direction {
        self.history
    }

    pub fn reset_history(&mut self) {
        self.history = Direction::Straight;
    }

    /// Only concrete codes write the history; ambiguous and unknown codes
    /// leave it untouched.
    pub fn resolve_direction(&mut self, raw_direction: i64) -> Direction {
        let concrete = match raw_direction {
            lane::LEFT => Direction::Left,
            lane::RIGHT => Direction::Right,
            lane::STRAIGHT => Direction::Straight,
            lane::UNSET => return self.history,
            _ => return Direction::Straight,
        };
        self.history = concrete;
        concrete
    }

    pub fn normalize(
        &mut self,
        raw_status: i64,
        raw_direction: i64,
        red_countdown: i64,
        // Not a countdown source for any phase; accepted to keep the
        // full field set at the call site.
        _green_last: i64,
    ) -> Normalized {
        let (status, countdown) = map_status(raw_status, red_countdown);
        Normalized {
            status,
            direction: self.resolve_direction(raw_direction),
            countdown: clamp_countdown(countdown),
        }
    }
}
