//! Transit source: next-arrival minutes for one stop.
//!
//! Fetches the arrivals feed for the configured stop, keeps the nearest
//! three departures sorted ascending, and classifies the stop as
//! energetic when something arrives inside the urgency window. On
//! failure it synthesizes a plausible arrival list instead; fallback
//! data satisfies the same invariants as real data (non-empty, sorted,
//! classifiable), so downstream code can only tell them apart through
//! `is_fallback`.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::RngExt;
use serde::{Deserialize, Serialize};

use crate::config::TransitConfig;
use crate::error::AcquisitionError;
use crate::sources::SourceAdapter;
use crate::types::{Emotion, Reading, Source};

/// How many of the nearest arrivals a reading carries.
const KEPT_ARRIVALS: usize = 3;

/// Per-line synthetic arrival bounds in minutes (inclusive), used when
/// the upstream feed is unavailable.
const SYNTHETIC_LINES: &[(&str, i64, i64)] = &[("V13", 2, 8), ("H16", 3, 10), ("7", 1, 5)];

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TransitResponse {
    #[serde(default)]
    arrivals: Vec<ArrivalWire>,
}

#[derive(Debug, Deserialize)]
struct ArrivalWire {
    line: String,
    minutes: i64,
}

// ---------------------------------------------------------------------------
// Wire metrics
// ---------------------------------------------------------------------------

/// One upcoming departure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrival {
    pub line: String,
    pub minutes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransitMetrics {
    stop_id: String,
    stop_name: String,
    next_buses: Vec<Arrival>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct TransitAdapter {
    client: reqwest::Client,
    config: TransitConfig,
}

impl TransitAdapter {
    pub fn new(config: TransitConfig) -> TransitAdapter {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("HTTP client init");
        TransitAdapter { client, config }
    }

    async fn fetch(&self) -> Result<Vec<Arrival>, AcquisitionError> {
        let (app_id, app_key) = match (&self.config.app_id, &self.config.app_key) {
            (Some(id), Some(key)) => (id.as_str(), key.as_str()),
            _ => return Err(AcquisitionError::MissingCredential),
        };

        let url = format!(
            "{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.stop_id
        );
        let resp = self
            .client
            .get(&url)
            .query(&[("app_id", app_id), ("app_key", app_key)])
            .send()
            .await
            .map_err(AcquisitionError::from_transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AcquisitionError::AuthRejected(status.as_u16()));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AcquisitionError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body: TransitResponse = resp
            .json()
            .await
            .map_err(AcquisitionError::from_transport)?;
        if body.arrivals.is_empty() {
            return Err(AcquisitionError::Malformed(
                "no arrivals reported for stop".to_string(),
            ));
        }

        let mut arrivals: Vec<Arrival> = body
            .arrivals
            .into_iter()
            .map(|a| Arrival {
                line: a.line,
                minutes: a.minutes,
            })
            .collect();
        arrivals.sort_by_key(|a| a.minutes);
        arrivals.truncate(KEPT_ARRIVALS);
        Ok(arrivals)
    }

    fn reading_from(&self, arrivals: Vec<Arrival>) -> Reading {
        let emotion = classify_arrivals(&arrivals, self.config.urgency_minutes);
        let metrics = TransitMetrics {
            stop_id: self.config.stop_id.clone(),
            stop_name: self.config.stop_name.clone(),
            next_buses: arrivals,
        };
        Reading::from_metrics(Source::Transit, &metrics, emotion)
    }
}

#[async_trait]
impl SourceAdapter for TransitAdapter {
    fn source(&self) -> Source {
        Source::Transit
    }

    async fn poll(&mut self) -> Reading {
        match self.fetch().await {
            Ok(arrivals) => self.reading_from(arrivals),
            Err(err) => {
                if err.is_auth() {
                    log::warn!("transit: credential rejected, synthesizing arrivals (retry will not help): {err}");
                } else {
                    log::warn!("transit: acquisition failed, synthesizing arrivals: {err}");
                }
                let arrivals = synthetic_arrivals(&mut rand::rng());
                self.reading_from(arrivals)
                    .restamped(chrono::Utc::now())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Classification and fallback
// ---------------------------------------------------------------------------

/// Energetic when the nearest arrival is strictly inside the urgency
/// window, calm otherwise. Callers guarantee a sorted, non-empty list.
pub fn classify_arrivals(arrivals: &[Arrival], urgency_minutes: i64) -> Emotion {
    match arrivals.first() {
        Some(nearest) if nearest.minutes < urgency_minutes => Emotion::Energetic,
        _ => Emotion::Calm,
    }
}

/// Plausible arrivals drawn from the per-line bounds, sorted ascending.
fn synthetic_arrivals(rng: &mut impl Rng) -> Vec<Arrival> {
    let mut arrivals: Vec<Arrival> = SYNTHETIC_LINES
        .iter()
        .map(|&(line, min, max)| Arrival {
            line: line.to_string(),
            minutes: rng.random_range(min..=max),
        })
        .collect();
    arrivals.sort_by_key(|a| a.minutes);
    arrivals
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn arrivals_of(minutes: &[i64]) -> Vec<Arrival> {
        minutes
            .iter()
            .map(|&m| Arrival {
                line: "L".to_string(),
                minutes: m,
            })
            .collect()
    }

    #[test]
    fn test_urgency_is_strictly_below_threshold() {
        assert_eq!(classify_arrivals(&arrivals_of(&[2, 5]), 3), Emotion::Energetic);
        assert_eq!(classify_arrivals(&arrivals_of(&[3, 5]), 3), Emotion::Calm);
        assert_eq!(classify_arrivals(&arrivals_of(&[4]), 3), Emotion::Calm);
    }

    #[test]
    fn test_synthetic_arrivals_are_sorted_and_in_bounds() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let arrivals = synthetic_arrivals(&mut rng);
            assert_eq!(arrivals.len(), SYNTHETIC_LINES.len());
            assert!(arrivals.windows(2).all(|w| w[0].minutes <= w[1].minutes));
            for arrival in &arrivals {
                let (_, min, max) = SYNTHETIC_LINES
                    .iter()
                    .find(|(line, _, _)| *line == arrival.line)
                    .expect("known line");
                assert!((*min..=*max).contains(&arrival.minutes));
            }
        }
    }

    #[tokio::test]
    async fn test_poll_without_credential_synthesizes_sorted_fallback() {
        let mut adapter = TransitAdapter::new(TransitConfig::default());
        let reading = adapter.poll().await;

        assert!(reading.is_fallback);
        assert_eq!(reading.source, Source::Transit);
        let buses = reading.metrics["nextBuses"].as_array().expect("array");
        assert!(!buses.is_empty());
        let minutes: Vec<i64> = buses
            .iter()
            .map(|b| b["minutes"].as_i64().expect("minutes"))
            .collect();
        assert!(minutes.windows(2).all(|w| w[0] <= w[1]));
        assert!(matches!(reading.emotion, Emotion::Energetic | Emotion::Calm));
    }

    #[test]
    fn test_reading_keeps_nearest_three_sorted() {
        let adapter = TransitAdapter::new(TransitConfig::default());
        // emulate the post-fetch normalization: sorted + truncated
        let mut arrivals = arrivals_of(&[9, 2, 7, 4, 11]);
        arrivals.sort_by_key(|a| a.minutes);
        arrivals.truncate(3);
        let reading = adapter.reading_from(arrivals);

        let buses = reading.metrics["nextBuses"].as_array().expect("array");
        let minutes: Vec<i64> = buses
            .iter()
            .map(|b| b["minutes"].as_i64().expect("minutes"))
            .collect();
        assert_eq!(minutes, vec![2, 4, 7]);
        assert_eq!(reading.emotion, Emotion::Energetic);
        assert_eq!(reading.metrics["stopName"], "Plaça Catalunya");
    }
}
