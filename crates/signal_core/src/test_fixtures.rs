//! Shared test fixtures for `signal_core` and downstream crates.
//!
//! Payload builders speak the wire field names so tests read like captured
//! broadcasts.

use crate::decoder::fields;
use crate::{Payload, RawSignal, TRAFFIC_LIGHT_TYPE_TAG};

/// A traffic-light payload with the given status, red countdown and direction.
pub fn light_payload(status: i64, red_countdown: i64, direction: i64) -> Payload {
    tagged_payload(TRAFFIC_LIGHT_TYPE_TAG, status, red_countdown, direction)
}

/// Same as [`light_payload`] but with an arbitrary type tag.
pub fn tagged_payload(type_tag: i64, status: i64, red_countdown: i64, direction: i64) -> Payload {
    Payload::from([
        (fields::TYPE_TAG.to_string(), serde_json::json!(type_tag)),
        (fields::STATUS.to_string(), serde_json::json!(status)),
        (
            fields::RED_COUNTDOWN.to_string(),
            serde_json::json!(red_countdown),
        ),
        (fields::DIRECTION.to_string(), serde_json::json!(direction)),
    ])
}

pub fn raw(status: i64, red_countdown: i64, direction: i64) -> RawSignal {
    RawSignal {
        status,
        red_countdown,
        direction,
        wait_round: 0,
        green_last: 0,
    }
}
