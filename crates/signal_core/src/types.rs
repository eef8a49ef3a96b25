//! Type definitions for `signal_core`.
//!
//! Internal display vocabulary, the normalized signal handed to the sink,
//! and the raw field bundle shared by the live and test entry points.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// String-keyed heterogeneous payload as delivered by the event source.
pub type Payload = HashMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Internal vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalStatus {
    /// No active signal. Never emitted to the sink.
    None,
    Red,
    Green,
    Yellow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    #[default]
    Straight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Navigation,
    Test,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SignalSource::Navigation => "navigation",
            SignalSource::Test => "test",
        })
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// The five raw fields of a traffic-light payload, still in the external
/// vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignal {
    pub status: i64,
    pub red_countdown: i64,
    pub direction: i64,
    #[serde(default)]
    pub wait_round: i64,
    #[serde(default)]
    pub green_last: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedSignal {
    pub status: SignalStatus,
    /// Seconds remaining in the current phase.
    pub countdown: u32,
    pub direction: Direction,
    pub wait_round: i64,
    pub source: SignalSource,
    /// Milliseconds since pipeline start at emission time.
    pub timestamp_ms: u64,
    pub raw_status: i64,
    pub raw_direction: i64,
    /// Green-last seconds, carried for diagnostics only.
    pub raw_countdown_alt: i64,
}

impl NormalizedSignal {
    pub fn is_valid(&self) -> bool {
        self.status != SignalStatus::None
    }

    pub fn is_expired(&self, now_ms: u64, expire_window_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) > expire_window_ms
    }
}

// ---------------------------------------------------------------------------
// Sink updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClearReason {
    /// Heartbeat found no valid event within the expiry window.
    Stale,
    /// The per-signal auto-clear deadline elapsed.
    AutoClear,
}

/// Everything the display sink can receive. "No data" is only ever the
/// `Clear` variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayUpdate {
    Signal(NormalizedSignal),
    Clear { reason: ClearReason },
}

impl DisplayUpdate {
    pub fn signal(&self) -> Option<&NormalizedSignal> {
        match self {
            DisplayUpdate::Signal(signal) => Some(signal),
            DisplayUpdate::Clear { .. } => None,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, DisplayUpdate::Clear { .. })
    }
}
