//! Offline replay: drives `SignalPipeline` on a virtual clock with the same
//! turn order as the runtime actor (input, then heartbeat, then auto-clear).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use signal_core::{DisplayUpdate, Ingest, Payload, PipelineConfig, RawSignal, SignalPipeline};
use std::path::Path;

/// Quiet time simulated after the last scripted input when the script does
/// not set `duration_ms`.
const DEFAULT_TAIL_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
pub struct Script {
    pub name: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub events: Vec<ScriptEvent>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptEvent {
    pub at_ms: u64,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub raw: Option<RawSignal>,
}

#[derive(Debug, Clone)]
pub enum Input {
    Payload(Payload),
    Raw(RawSignal),
}

#[derive(Debug, Clone)]
pub struct TimedInput {
    pub at_ms: u64,
    pub input: Input,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub at_ms: u64,
    pub update: DisplayUpdate,
}

#[derive(Debug, Default)]
pub struct ReplayReport {
    pub timeline: Vec<TimelineEntry>,
    pub foreign: usize,
    pub dropped: usize,
}

impl Script {
    /// Inputs sorted by time; ties keep script order.
    pub fn inputs(&self) -> Vec<TimedInput> {
        let mut inputs: Vec<TimedInput> = self
            .events
            .iter()
            .filter_map(|event| {
                let input = match (&event.payload, &event.raw) {
                    (Some(payload), None) => Input::Payload(payload.clone()),
                    (None, Some(raw)) => Input::Raw(*raw),
                    _ => return None,
                };
                Some(TimedInput {
                    at_ms: event.at_ms,
                    input,
                })
            })
            .collect();
        inputs.sort_by_key(|i| i.at_ms);
        inputs
    }

    pub fn end_ms(&self) -> u64 {
        self.duration_ms.unwrap_or_else(|| {
            let last = self.events.iter().map(|e| e.at_ms).max().unwrap_or(0);
            last.saturating_add(DEFAULT_TAIL_MS)
        })
    }
}

pub fn load_script(path: &Path) -> Result<Script> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading script file: {}", path.display()))?;
    let script: Script = serde_json::from_str(&json)
        .with_context(|| format!("parsing script file: {}", path.display()))?;
    if script.name.is_empty() {
        bail!("script 'name' must not be empty");
    }
    for (index, event) in script.events.iter().enumerate() {
        if event.payload.is_some() == event.raw.is_some() {
            bail!("script event {index} must set exactly one of 'payload' or 'raw'");
        }
    }
    Ok(script)
}

/// Runs `inputs` (sorted by `at_ms`) through a fresh pipeline until
/// `until_ms` and records every display update.
pub fn simulate(config: &PipelineConfig, inputs: &[TimedInput], until_ms: u64) -> ReplayReport {
    let mut pipeline = SignalPipeline::new(config.clone(), 0);
    let mut report = ReplayReport::default();
    let interval = config.heartbeat_interval_ms.max(1);
    let mut next_heartbeat = interval;
    let mut pending = inputs.iter().peekable();

    loop {
        let next_input = pending.peek().map(|i| i.at_ms);
        let next_clear = pipeline.next_auto_clear_ms();
        let now = [next_input, Some(next_heartbeat), next_clear]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(next_heartbeat);
        if now > until_ms {
            break;
        }

        let update = if next_input == Some(now) {
            let Some(timed) = pending.next() else { break };
            let ingest = match &timed.input {
                Input::Payload(payload) => pipeline.handle_payload(now, payload),
                Input::Raw(raw) => pipeline.inject(now, *raw),
            };
            match ingest {
                Ingest::Foreign => report.foreign += 1,
                Ingest::Dropped(_) => report.dropped += 1,
                Ingest::Emitted(_) => {}
            }
            ingest.into_update()
        } else if next_heartbeat == now {
            next_heartbeat += interval;
            pipeline.heartbeat(now)
        } else {
            pipeline.fire_auto_clear(now)
        };

        if let Some(update) = update {
            report.timeline.push(TimelineEntry { at_ms: now, update });
        }
    }
    report
}

pub fn format_entry(entry: &TimelineEntry) -> String {
    match &entry.update {
        DisplayUpdate::Signal(signal) => format!(
            "[t={:>8}ms]  SIGNAL  {:?} {}s {:?}  wait_round={} source={}",
            entry.at_ms,
            signal.status,
            signal.countdown,
            signal.direction,
            signal.wait_round,
            signal.source,
        ),
        DisplayUpdate::Clear { reason } => {
            format!("[t={:>8}ms]  CLEAR   {reason:?}", entry.at_ms)
        }
    }
}
