//! Weather source: current conditions for a fixed city.
//!
//! Fetches an OpenWeatherMap-style endpoint, normalizes units, and
//! classifies the (temperature, condition) pair against the ordered
//! emotion threshold table. On any acquisition failure the last good
//! reading is re-served, re-stamped and flagged; before the first success
//! a bundled synthetic reading stands in.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{EmotionThreshold, WeatherConfig};
use crate::error::AcquisitionError;
use crate::sources::SourceAdapter;
use crate::types::{Emotion, Reading, Source};

/// Synthetic stand-in served before the first successful fetch.
const SYNTHETIC_TEMP_C: f64 = 22.5;
const SYNTHETIC_CONDITION: &str = "Clear";
const SYNTHETIC_EMOTION: Emotion = Emotion::Calm;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    #[serde(default)]
    name: String,
    main: MainSection,
    wind: WindSection,
    #[serde(default)]
    weather: Vec<ConditionSection>,
}

#[derive(Debug, Deserialize)]
struct MainSection {
    temp: f64,
    feels_like: f64,
    humidity: u32,
    pressure: u32,
}

#[derive(Debug, Deserialize)]
struct WindSection {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionSection {
    main: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

// ---------------------------------------------------------------------------
// Wire metrics
// ---------------------------------------------------------------------------

/// Metric fields of one weather reading. Optional fields are absent on
/// the synthetic fallback, which carries only the minimal set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WeatherMetrics {
    city: String,
    temp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    feels_like: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    humidity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pressure: Option<u32>,
    /// km/h, one decimal.
    #[serde(skip_serializing_if = "Option::is_none")]
    wind_speed: Option<f64>,
    condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct WeatherAdapter {
    client: reqwest::Client,
    config: WeatherConfig,
    last_good: Option<Reading>,
}

impl WeatherAdapter {
    pub fn new(config: WeatherConfig) -> WeatherAdapter {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("HTTP client init");
        WeatherAdapter {
            client,
            config,
            last_good: None,
        }
    }

    async fn fetch(&self) -> Result<Reading, AcquisitionError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(AcquisitionError::MissingCredential)?;

        let resp = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("q", self.config.city.as_str()),
                ("appid", api_key),
                ("units", "metric"),
            ])
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

        let body: WeatherResponse = resp
            .json()
            .await
            .map_err(AcquisitionError::from_transport)?;
        let condition = body
            .weather
            .first()
            .ok_or_else(|| AcquisitionError::Malformed("empty condition list".to_string()))?;

        let temp = round1(body.main.temp);
        let emotion = classify(temp, &condition.main, &self.config.thresholds);
        let metrics = WeatherMetrics {
            city: if body.name.is_empty() {
                self.config.city.clone()
            } else {
                body.name
            },
            temp,
            feels_like: Some(round1(body.main.feels_like)),
            humidity: Some(body.main.humidity),
            pressure: Some(body.main.pressure),
            wind_speed: Some(round1(body.wind.speed * 3.6)),
            condition: condition.main.clone(),
            description: Some(condition.description.clone()),
            icon: Some(condition.icon.clone()),
        };

        Ok(Reading::from_metrics(Source::Weather, &metrics, emotion))
    }

    fn fallback(&self, now: DateTime<Utc>) -> Reading {
        match &self.last_good {
            Some(prev) => prev.restamped(now),
            None => {
                let metrics = WeatherMetrics {
                    city: self.config.city.clone(),
                    temp: SYNTHETIC_TEMP_C,
                    feels_like: None,
                    humidity: None,
                    pressure: None,
                    wind_speed: None,
                    condition: SYNTHETIC_CONDITION.to_string(),
                    description: None,
                    icon: None,
                };
                Reading::from_metrics(Source::Weather, &metrics, SYNTHETIC_EMOTION)
                    .restamped(now)
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for WeatherAdapter {
    fn source(&self) -> Source {
        Source::Weather
    }

    async fn poll(&mut self) -> Reading {
        match self.fetch().await {
            Ok(reading) => {
                self.last_good = Some(reading.clone());
                reading
            }
            Err(err) if err.is_auth() => {
                log::warn!("weather: credential rejected, serving fallback (retry will not help): {err}");
                self.fallback(Utc::now())
            }
            Err(err) => {
                log::warn!("weather: acquisition failed, serving fallback: {err}");
                self.fallback(Utc::now())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// First table entry whose inclusive temperature band contains `temp` and
/// whose condition set contains `condition`; no match yields neutral.
pub fn classify(temp: f64, condition: &str, table: &[EmotionThreshold]) -> Emotion {
    table
        .iter()
        .find(|entry| {
            temp >= entry.temp_min
                && temp <= entry.temp_max
                && entry.conditions.iter().any(|c| c == condition)
        })
        .map(|entry| entry.emotion)
        .unwrap_or(Emotion::Neutral)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
