//! Weighted-vote fusion of per-source emotion labels.
//!
//! Each source's own derived label is the unit of fusion; raw metrics
//! never cross this boundary, so the rule stays independent of each
//! source's internal scale.

use std::collections::HashMap;

use crate::types::{Emotion, Reading, Source};

/// Reduce the latest reading per source to one global label.
///
/// Every present source votes for its label: Pulse with weight 2, the
/// rest with weight 1. The label with the highest total weight wins; a
/// weight tie goes to the label backed by the highest-priority source
/// (Pulse > Transit > Weather). With no source present the result is
/// neutral.
///
/// Depends only on the final contents of `latest`, so any arrival
/// interleaving that produces the same map produces the same label, and
/// recomputing without an update is a no-op.
pub fn fuse(latest: &HashMap<Source, Reading>) -> Emotion {
    let mut tally: HashMap<Emotion, (u32, u8)> = HashMap::new();
    for (source, reading) in latest {
        let entry = tally.entry(reading.emotion).or_insert((0, 0));
        entry.0 += source.fusion_weight();
        entry.1 = entry.1.max(source.priority());
    }

    tally
        .into_iter()
        .max_by_key(|&(_, score)| score)
        .map(|(emotion, _)| emotion)
        .unwrap_or(Emotion::Neutral)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading(source: Source, emotion: Emotion) -> Reading {
        Reading::from_metrics(source, &json!({}), emotion)
    }

    fn state_of(entries: &[(Source, Emotion)]) -> HashMap<Source, Reading> {
        entries
            .iter()
            .map(|&(source, emotion)| (source, reading(source, emotion)))
            .collect()
    }

    #[test]
    fn test_empty_state_is_neutral() {
        assert_eq!(fuse(&HashMap::new()), Emotion::Neutral);
    }

    #[test]
    fn test_pulse_outvotes_two_agreeing_slow_sources_on_tie() {
        // happy carries weight 2 (weather + transit), anxious carries
        // weight 2 (pulse alone); pulse priority breaks the tie
        let state = state_of(&[
            (Source::Weather, Emotion::Happy),
            (Source::Transit, Emotion::Happy),
            (Source::Pulse, Emotion::Anxious),
        ]);
        assert_eq!(fuse(&state), Emotion::Anxious);
    }

    #[test]
    fn test_pulse_weight_dominates_split_sources() {
        let state = state_of(&[
            (Source::Weather, Emotion::Happy),
            (Source::Transit, Emotion::Calm),
            (Source::Pulse, Emotion::Anxious),
        ]);
        assert_eq!(fuse(&state), Emotion::Anxious);
    }

    #[test]
    fn test_tie_without_pulse_goes_to_transit() {
        let state = state_of(&[
            (Source::Weather, Emotion::Calm),
            (Source::Transit, Emotion::Energetic),
        ]);
        assert_eq!(fuse(&state), Emotion::Energetic);
    }

    #[test]
    fn test_single_source_passes_through() {
        let state = state_of(&[(Source::Weather, Emotion::Melancholic)]);
        assert_eq!(fuse(&state), Emotion::Melancholic);
    }

    #[test]
    fn test_agreeing_slow_sources_win_without_pulse() {
        let state = state_of(&[
            (Source::Weather, Emotion::Happy),
            (Source::Transit, Emotion::Happy),
        ]);
        assert_eq!(fuse(&state), Emotion::Happy);
    }

    #[test]
    fn test_order_independent() {
        let forward = state_of(&[
            (Source::Weather, Emotion::Happy),
            (Source::Transit, Emotion::Calm),
            (Source::Pulse, Emotion::Energetic),
        ]);
        let reverse = state_of(&[
            (Source::Pulse, Emotion::Energetic),
            (Source::Transit, Emotion::Calm),
            (Source::Weather, Emotion::Happy),
        ]);
        assert_eq!(fuse(&forward), fuse(&reverse));
    }

    #[test]
    fn test_idempotent_on_unchanged_state() {
        let state = state_of(&[
            (Source::Weather, Emotion::Happy),
            (Source::Pulse, Emotion::Neutral),
        ]);
        assert_eq!(fuse(&state), fuse(&state));
    }

    #[test]
    fn test_fallback_readings_vote_like_real_ones() {
        let mut state = state_of(&[(Source::Transit, Emotion::Energetic)]);
        let stale = state[&Source::Transit].restamped(chrono::Utc::now());
        state.insert(Source::Transit, stale);
        assert_eq!(fuse(&state), Emotion::Energetic);
    }
}
