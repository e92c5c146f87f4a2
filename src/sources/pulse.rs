//! Pulse source: a simulated physiological signal.
//!
//! No upstream and therefore no failure mode. Every reading is
//! synthesized from a resting baseline, a time-of-day offset, bounded
//! jitter, and an occasional stress addend, then classified into fixed
//! BPM bands. `is_fallback` is always false here.

use async_trait::async_trait;
use chrono::{Local, Timelike};
use rand::seq::IndexedRandom;
use rand::Rng;
use rand::RngExt;
use serde::Serialize;

use crate::sources::SourceAdapter;
use crate::types::{Emotion, Reading, Source};

/// Resting baseline.
const BASE_BPM: f64 = 72.0;

/// Occasional stress spikes; the repeated zeros keep them rare.
const STRESS_ADDENDS: &[f64] = &[0.0, 0.0, 1.0, 0.0, 2.0];

/// Uniform jitter bound, ± BPM.
const JITTER_BPM: f64 = 3.0;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PulseMetrics {
    bpm: i64,
    quality: &'static str,
}

pub struct PulseAdapter;

impl PulseAdapter {
    pub fn new() -> PulseAdapter {
        PulseAdapter
    }
}

impl Default for PulseAdapter {
    fn default() -> Self {
        PulseAdapter::new()
    }
}

#[async_trait]
impl SourceAdapter for PulseAdapter {
    fn source(&self) -> Source {
        Source::Pulse
    }

    async fn poll(&mut self) -> Reading {
        let bpm = synthesize_bpm(Local::now().hour(), &mut rand::rng());
        let metrics = PulseMetrics {
            bpm,
            quality: quality(bpm),
        };
        Reading::from_metrics(Source::Pulse, &metrics, classify_bpm(bpm))
    }
}

// ---------------------------------------------------------------------------
// Simulation and classification
// ---------------------------------------------------------------------------

fn synthesize_bpm(hour: u32, rng: &mut impl Rng) -> i64 {
    let jitter = rng.random_range(-JITTER_BPM..=JITTER_BPM);
    let stress = *STRESS_ADDENDS.choose(rng).unwrap_or(&0.0);
    (BASE_BPM + time_of_day_offset(hour) + jitter + stress) as i64
}

/// The day's rhythm: elevated mornings, a midday bump, a calmer evening.
fn time_of_day_offset(hour: u32) -> f64 {
    match hour {
        6..=8 => 5.0,
        12..=13 => 3.0,
        19..=21 => -2.0,
        _ => 0.0,
    }
}

/// Fixed bands: <60 calm, [60, 80] neutral, (80, 100] energetic,
/// >100 anxious.
pub fn classify_bpm(bpm: i64) -> Emotion {
    if bpm < 60 {
        Emotion::Calm
    } else if bpm <= 80 {
        Emotion::Neutral
    } else if bpm <= 100 {
        Emotion::Energetic
    } else {
        Emotion::Anxious
    }
}

fn quality(bpm: i64) -> &'static str {
    if (50..=100).contains(&bpm) {
        "good"
    } else {
        "warning"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
