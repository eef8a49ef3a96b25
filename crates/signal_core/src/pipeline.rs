use crate::decoder::decode_payload;
use crate::freshness::FreshnessEngine;
use crate::normalize::Normalizer;
use crate::{
    Direction, DisplayUpdate, NormalizedSignal, Payload, PipelineConfig, RawSignal, SignalSource,
};

/// What happened to one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    /// Type tag did not match; nothing was touched.
    Foreign,
    /// Decoded but normalized to no signal. Liveness was refreshed.
    Dropped(NormalizedSignal),
    Emitted(NormalizedSignal),
}

impl Ingest {
    pub fn into_update(self) -> Option<DisplayUpdate> {
        match self {
            Ingest::Emitted(signal) => Some(DisplayUpdate::Signal(signal)),
            Ingest::Foreign | Ingest::Dropped(_) => None,
        }
    }
}

/// State of one pipeline instance: direction history and the freshness
/// engine. Created on start, dropped on stop.
#[derive(Debug, Clone)]
pub struct SignalPipeline {
    normalizer: Normalizer,
    freshness: FreshnessEngine,
}

impl SignalPipeline {
    pub fn new(config: PipelineConfig, start_ms: u64) -> Self {
        Self {
            normalizer: Normalizer::new(),
            freshness: FreshnessEngine::new(config, start_ms),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        self.freshness.config()
    }

    pub fn direction_history(&self) -> Direction {
        self.normalizer.history()
    }

    pub fn last_valid_event_ms(&self) -> u64 {
        self.freshness.last_valid_event_ms()
    }

    pub fn next_auto_clear_ms(&self) -> Option<u64> {
        self.freshness.next_auto_clear_ms()
    }

    /// Live path: decode, drop foreign payloads, then normalize and apply
    /// the freshness rules.
    pub fn handle_payload(&mut self, now_ms: u64, payload: &Payload) -> Ingest {
        match decode_payload(payload, self.config().signal_type_tag) {
            Some(raw) => self.process(now_ms, raw, SignalSource::Navigation),
            None => Ingest::Foreign,
        }
    }

    /// Simulation entry point: same path as a live payload after decoding.
    pub fn inject(&mut self, now_ms: u64, raw: RawSignal) -> Ingest {
        self.process(now_ms, raw, SignalSource::Test)
    }

    /// Order of operations:
    /// 1. Normalize status, direction and countdown.
    /// 2. Refresh liveness and validate; invalid signals stop here.
    /// 3. Replace the pending auto-clear and emit.
    fn process(&mut self, now_ms: u64, raw: RawSignal, source: SignalSource) -> Ingest {
        let normalized = self.normalizer.normalize(
            raw.status,
            raw.direction,
            raw.red_countdown,
            raw.green_last,
        );
        let signal = NormalizedSignal {
            status: normalized.status,
            countdown: normalized.countdown,
            direction: normalized.direction,
            wait_round: raw.wait_round,
            source,
            timestamp_ms: now_ms,
            raw_status: raw.status,
            raw_direction: raw.direction,
            raw_countdown_alt: raw.green_last,
        };
        match self.freshness.on_signal(now_ms, signal) {
            Ok(emitted) => Ingest::Emitted(emitted),
            Err(dropped) => Ingest::Dropped(dropped),
        }
    }

    /// Heartbeat tick. A stale clear also forgets the direction history.
    pub fn heartbeat(&mut self, now_ms: u64) -> Option<DisplayUpdate> {
        let update = self.freshness.on_heartbeat(now_ms)?;
        self.normalizer.reset_history();
        Some(update)
    }

    pub fn fire_auto_clear(&mut self, now_ms: u64) -> Option<DisplayUpdate> {
        self.freshness.on_auto_clear(now_ms)
    }
}
