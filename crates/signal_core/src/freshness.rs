//! Freshness engine: staleness sweep plus per-signal auto-clear deadline.
//!
//! Time is passed in as milliseconds since pipeline start. The engine never
//! reads a clock and never sleeps; whoever owns the task queue decides when
//! to call `on_heartbeat` and `on_auto_clear`.

use crate::{ClearReason, DisplayUpdate, NormalizedSignal, PipelineConfig};

#[derive(Debug, Clone)]
pub struct FreshnessEngine {
    config: PipelineConfig,
    last_valid_event_ms: u64,
    auto_clear_at_ms: Option<u64>,
    /// Set once the heartbeat has cleared the display; released by the next
    /// emitted signal.
    stale_cleared: bool,
    last_emitted_ms: u64,
}

impl FreshnessEngine {
    pub fn new(config: PipelineConfig, start_ms: u64) -> Self {
        Self {
            config,
            last_valid_event_ms: start_ms,
            auto_clear_at_ms: None,
            stale_cleared: false,
            last_emitted_ms: start_ms,
        }
    }

    pub fn last_valid_event_ms(&self) -> u64 {
        self.last_valid_event_ms
    }

    pub fn next_auto_clear_ms(&self) -> Option<u64> {
        self.auto_clear_at_ms
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one accepted signal through the freshness rules. Returns the
    /// signal to emit (timestamped) or `Err` with the dropped signal when it
    /// fails validation.
    pub fn on_signal(
        &mut self,
        now_ms: u64,
        mut signal: NormalizedSignal,
    ) -> Result<NormalizedSignal, NormalizedSignal> {
        // Any accepted payload refreshes liveness, valid or not.
        self.last_valid_event_ms = now_ms;

        if !signal.is_valid() {
            return Err(signal);
        }

        // Countdown is already non-negative by construction (u32).
        self.cancel_auto_clear();

        let emitted_at = now_ms.max(self.last_emitted_ms);
        self.last_emitted_ms = emitted_at;
        signal.timestamp_ms = emitted_at;
        self.stale_cleared = false;

        self.auto_clear_at_ms =
            Some(now_ms.saturating_add(self.config.auto_clear_delay_ms(signal.countdown)));
        Ok(signal)
    }

    /// Heartbeat tick. Returns a stale clear at most once per quiet period.
    pub fn on_heartbeat(&mut self, now_ms: u64) -> Option<DisplayUpdate> {
        let age = now_ms.saturating_sub(self.last_valid_event_ms);
        if age <= self.config.expire_window_ms || self.stale_cleared {
            return None;
        }
        self.stale_cleared = true;
        Some(DisplayUpdate::Clear {
            reason: ClearReason::Stale,
        })
    }

    /// Fires the pending auto-clear if its deadline has been reached.
    pub fn on_auto_clear(&mut self, now_ms: u64) -> Option<DisplayUpdate> {
        match self.auto_clear_at_ms {
            Some(deadline) if now_ms >= deadline => {
                self.auto_clear_at_ms = None;
                Some(DisplayUpdate::Clear {
                    reason: ClearReason::AutoClear,
                })
            }
            _ => None,
        }
    }

    pub fn cancel_auto_clear(&mut self) {
        self.auto_clear_at_ms = None;
    }
}
