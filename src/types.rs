//! Core value types shared across the pipeline.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Emotion
// ---------------------------------------------------------------------------

/// Closed set of emotion labels a source can derive. Wire format is the
/// lowercase name; consumers never see a null or out-of-set label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Calm,
    Energetic,
    Melancholic,
    Anxious,
    Neutral,
}

impl Emotion {
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Calm => "calm",
            Emotion::Energetic => "energetic",
            Emotion::Melancholic => "melancholic",
            Emotion::Anxious => "anxious",
            Emotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// The signal sources feeding the pipeline. Each owns its bus topic, its
/// fusion weight, and its tie-break priority, so no code branches on topic
/// strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Weather,
    Transit,
    Pulse,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Weather, Source::Transit, Source::Pulse];

    /// Fixed bus topic carrying this source's readings.
    pub fn topic(self) -> &'static str {
        match self {
            Source::Weather => "weather",
            Source::Transit => "transit",
            Source::Pulse => "pulse",
        }
    }

    pub fn from_topic(topic: &str) -> Option<Source> {
        Source::ALL.into_iter().find(|s| s.topic() == topic)
    }

    /// Vote weight in fusion. The live physiological signal outranks the
    /// cached or slow feeds.
    pub fn fusion_weight(self) -> u32 {
        match self {
            Source::Pulse => 2,
            Source::Weather | Source::Transit => 1,
        }
    }

    /// Tie-break rank in fusion: Pulse > Transit > Weather.
    pub fn priority(self) -> u8 {
        match self {
            Source::Pulse => 3,
            Source::Transit => 2,
            Source::Weather => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.topic()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One timestamped, classified measurement from a single source.
///
/// Immutable once built: a new poll produces a new Reading, and a fallback
/// reuse of the last good value produces a re-stamped copy, never an
/// in-place update. `is_fallback` is the only way consumers may distinguish
/// degraded data; fallback readings satisfy every shape invariant real
/// ones do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub source: Source,
    /// Source-specific fields (temperature, arrivals, bpm, …) as a JSON
    /// object; fusion never looks inside it.
    pub metrics: serde_json::Map<String, serde_json::Value>,
    pub emotion: Emotion,
    pub timestamp: DateTime<Utc>,
    pub is_fallback: bool,
}

impl Reading {
    /// Build a fresh (non-fallback) reading from a serializable metrics
    /// struct, stamped now.
    pub fn from_metrics<T: Serialize>(source: Source, metrics: &T, emotion: Emotion) -> Reading {
        let metrics = match serde_json::to_value(metrics) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        Reading {
            source,
            metrics,
            emotion,
            timestamp: Utc::now(),
            is_fallback: false,
        }
    }

    /// A copy of this reading re-stamped at `now` and flagged as fallback.
    pub fn restamped(&self, now: DateTime<Utc>) -> Reading {
        Reading {
            timestamp: now,
            is_fallback: true,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// AggregatedState
// ---------------------------------------------------------------------------

/// Latest reading per source plus the fused global label.
///
/// Owned and mutated only by the aggregator task; everyone else sees
/// whole-value snapshots. `global_emotion` is always recomputed from
/// `latest` by the fusion rule, never set independently.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedState {
    pub latest: HashMap<Source, Reading>,
    pub global_emotion: Emotion,
    pub updated_at: DateTime<Utc>,
}

impl AggregatedState {
    pub fn new() -> AggregatedState {
        AggregatedState {
            latest: HashMap::new(),
            global_emotion: Emotion::Neutral,
            updated_at: Utc::now(),
        }
    }
}

impl Default for AggregatedState {
    fn default() -> Self {
        AggregatedState::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
