//! Seeded random soak: throws loosely-typed, partly foreign payloads at the
//! pipeline and checks the display invariants on the resulting timeline.

use anyhow::{bail, Result};
use rand::Rng;
use signal_core::decoder::fields;
use signal_core::{ClearReason, DisplayUpdate, NormalizedSignal, Payload, TRAFFIC_LIGHT_TYPE_TAG};

use crate::replay::{Input, ReplayReport, TimedInput};

/// Longest gap between generated payloads. Large enough to cross the
/// default expiry window now and then.
const MAX_GAP_MS: u64 = 15_000;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SoakSummary {
    pub signals: usize,
    pub stale_clears: usize,
    pub auto_clears: usize,
    pub foreign: usize,
    pub dropped: usize,
}

/// Encodes `value` the way a sloppy sender might: integer, float, string,
/// or occasionally garbage.
fn loose_value(rng: &mut impl Rng, value: i64) -> serde_json::Value {
    match rng.gen_range(0..10) {
        0..=4 => serde_json::json!(value),
        5 | 6 => serde_json::json!(value.to_string()),
        7 => serde_json::json!(value as f64 + 0.5),
        8 => serde_json::json!("n/a"),
        _ => serde_json::Value::Bool(true),
    }
}

fn random_payload(rng: &mut impl Rng) -> Payload {
    let mut payload = Payload::new();
    let type_tag = if rng.gen_bool(0.9) {
        TRAFFIC_LIGHT_TYPE_TAG
    } else {
        rng.gen_range(1..70_000)
    };
    payload.insert(fields::TYPE_TAG.to_string(), loose_value(rng, type_tag));
    let status = [1, 2, 3, 4, -1, 0, 9][rng.gen_range(0..7)];
    payload.insert(fields::STATUS.to_string(), loose_value(rng, status));
    if rng.gen_bool(0.9) {
        let red = rng.gen_range(-5..90);
        payload.insert(fields::RED_COUNTDOWN.to_string(), loose_value(rng, red));
    }
    if rng.gen_bool(0.8) {
        let dir = [0, 0, 1, 2, 4, 3][rng.gen_range(0..6)];
        payload.insert(fields::DIRECTION.to_string(), loose_value(rng, dir));
    }
    if rng.gen_bool(0.5) {
        let green = rng.gen_range(0..60);
        payload.insert(fields::GREEN_LAST.to_string(), loose_value(rng, green));
    }
    if rng.gen_bool(0.5) {
        let wait = rng.gen_range(0..4);
        payload.insert(fields::WAIT_ROUND.to_string(), loose_value(rng, wait));
    }
    payload
}

pub fn generate_inputs(rng: &mut impl Rng, count: usize) -> Vec<TimedInput> {
    let mut inputs = Vec::with_capacity(count);
    let mut at_ms = 0;
    for _ in 0..count {
        at_ms += rng.gen_range(0..=MAX_GAP_MS);
        inputs.push(TimedInput {
            at_ms,
            input: Input::Payload(random_payload(rng)),
        });
    }
    inputs
}

/// Checks the timeline and tallies it. Fails on the first violation.
pub fn check_timeline(report: &ReplayReport, expire_window_ms: u64) -> Result<SoakSummary> {
    let mut summary = SoakSummary {
        foreign: report.foreign,
        dropped: report.dropped,
        ..SoakSummary::default()
    };
    let mut last_timestamp = 0;
    let mut stale_latched = false;
    let mut auto_clear_armed = false;
    let mut last_signal: Option<&NormalizedSignal> = None;

    for entry in &report.timeline {
        match &entry.update {
            DisplayUpdate::Signal(signal) => {
                if !signal.is_valid() {
                    bail!("t={}: emitted a signal with no status", entry.at_ms);
                }
                if signal.timestamp_ms < last_timestamp {
                    bail!(
                        "t={}: timestamp went backwards ({} < {last_timestamp})",
                        entry.at_ms,
                        signal.timestamp_ms
                    );
                }
                last_timestamp = signal.timestamp_ms;
                last_signal = Some(signal);
                stale_latched = false;
                auto_clear_armed = true;
                summary.signals += 1;
            }
            DisplayUpdate::Clear {
                reason: ClearReason::Stale,
            } => {
                if stale_latched {
                    bail!("t={}: repeated stale clear without a new signal", entry.at_ms);
                }
                if let Some(signal) = last_signal {
                    if !signal.is_expired(entry.at_ms, expire_window_ms) {
                        bail!(
                            "t={}: stale clear while signal from t={} is still fresh",
                            entry.at_ms,
                            signal.timestamp_ms
                        );
                    }
                }
                stale_latched = true;
                summary.stale_clears += 1;
            }
            DisplayUpdate::Clear {
                reason: ClearReason::AutoClear,
            } => {
                if !auto_clear_armed {
                    bail!("t={}: auto-clear fired with nothing armed", entry.at_ms);
                }
                auto_clear_armed = false;
                summary.auto_clears += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{simulate, TimelineEntry};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use signal_core::PipelineConfig;

    #[test]
    fn generation_is_deterministic_per_seed() {
        let a = generate_inputs(&mut ChaCha8Rng::seed_from_u64(42), 50);
        let b = generate_inputs(&mut ChaCha8Rng::seed_from_u64(42), 50);
        let times_a: Vec<u64> = a.iter().map(|i| i.at_ms).collect();
        let times_b: Vec<u64> = b.iter().map(|i| i.at_ms).collect();
        assert_eq!(times_a, times_b);
    }

    #[test]
    fn soak_many_seeds_holds_invariants() {
        let config = PipelineConfig::default();
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let inputs = generate_inputs(&mut rng, 300);
            let end = inputs.last().map_or(0, |i| i.at_ms) + 60_000;
            let report = simulate(&config, &inputs, end);
            let summary = check_timeline(&report, config.expire_window_ms)
                .unwrap_or_else(|err| panic!("seed {seed}: {err}"));
            assert!(summary.signals > 0, "seed {seed} produced no signals");
            assert_eq!(
                summary.signals + summary.foreign + summary.dropped,
                inputs.len(),
                "seed {seed}: every input is accounted for"
            );
        }
    }

    #[test]
    fn check_rejects_repeated_stale_clear() {
        let stale = || TimelineEntry {
            at_ms: 11_000,
            update: DisplayUpdate::Clear {
                reason: ClearReason::Stale,
            },
        };
        let report = ReplayReport {
            timeline: vec![stale(), stale()],
            foreign: 0,
            dropped: 0,
        };
        assert!(check_timeline(&report, 10_000).is_err());
    }

    #[test]
    fn check_rejects_unarmed_auto_clear() {
        let report = ReplayReport {
            timeline: vec![TimelineEntry {
                at_ms: 15_000,
                update: DisplayUpdate::Clear {
                    reason: ClearReason::AutoClear,
                },
            }],
            foreign: 0,
            dropped: 0,
        };
        assert!(check_timeline(&report, 10_000).is_err());
    }

    #[test]
    fn check_rejects_stale_clear_on_fresh_signal() {
        let config = PipelineConfig::default();
        let red = TimedInput {
            at_ms: 5_000,
            input: Input::Raw(signal_core::RawSignal {
                status: 1,
                red_countdown: 20,
                direction: 1,
                wait_round: 0,
                green_last: 0,
            }),
        };
        let mut report = simulate(&config, &[red], 5_000);
        assert_eq!(report.timeline.len(), 1);
        report.timeline.push(TimelineEntry {
            at_ms: 9_000,
            update: DisplayUpdate::Clear {
                reason: ClearReason::Stale,
            },
        });
        assert!(check_timeline(&report, config.expire_window_ms).is_err());

        report.timeline[1].at_ms = 15_001;
        assert!(check_timeline(&report, config.expire_window_ms).is_ok());
    }
}
