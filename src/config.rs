//! Runtime configuration.
//!
//! Loaded from `~/.citymood/config.json` when present. Every field has a
//! default, so a missing file runs the bundled Barcelona setup; a file
//! that exists but does not parse is a startup error, never silently
//! ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Emotion;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub transit: TransitConfig,
    #[serde(default)]
    pub pulse: PulseConfig,
}

impl Config {
    /// `~/.citymood/config.json`, or None when no home directory resolves.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".citymood").join("config.json"))
    }

    /// Load the user config, falling back to defaults when no file exists.
    pub fn load() -> Result<Config, ConfigError> {
        match Config::path() {
            Some(path) if path.exists() => Config::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Client-id prefix; a random suffix is appended per session so two
    /// processes never evict each other from the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            host: default_broker_host(),
            port: default_broker_port(),
            username: None,
            password: None,
            client_id: default_client_id(),
        }
    }
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "citymood".to_string()
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherConfig {
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_weather_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_weather_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Scanned in declared order; the first matching entry wins, so
    /// overlapping ranges resolve by position, not specificity.
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<EmotionThreshold>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        WeatherConfig {
            city: default_city(),
            api_key: None,
            endpoint: default_weather_endpoint(),
            poll_secs: default_weather_poll_secs(),
            timeout_secs: default_timeout_secs(),
            thresholds: default_thresholds(),
        }
    }
}

/// One row of the weather emotion table: an inclusive temperature band
/// plus the condition codes it applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionThreshold {
    pub emotion: Emotion,
    pub temp_min: f64,
    pub temp_max: f64,
    pub conditions: Vec<String>,
}

fn default_city() -> String {
    "Barcelona".to_string()
}

fn default_weather_endpoint() -> String {
    "https://api.openweathermap.org/data/2.5/weather".to_string()
}

fn default_weather_poll_secs() -> u64 {
    300
}

fn default_timeout_secs() -> u64 {
    10
}

/// The bundled weather emotion table. Declaration order is significant.
pub fn default_thresholds() -> Vec<EmotionThreshold> {
    fn entry(
        emotion: Emotion,
        temp_min: f64,
        temp_max: f64,
        conditions: &[&str],
    ) -> EmotionThreshold {
        EmotionThreshold {
            emotion,
            temp_min,
            temp_max,
            conditions: conditions.iter().map(|c| c.to_string()).collect(),
        }
    }

    vec![
        entry(Emotion::Happy, 18.0, 28.0, &["Clear", "Clouds"]),
        entry(Emotion::Calm, 12.0, 22.0, &["Clouds", "Drizzle"]),
        entry(Emotion::Energetic, 22.0, 35.0, &["Clear"]),
        entry(
            Emotion::Melancholic,
            -5.0,
            12.0,
            &["Rain", "Snow", "Thunderstorm"],
        ),
    ]
}

// ---------------------------------------------------------------------------
// Transit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitConfig {
    #[serde(default = "default_stop_id")]
    pub stop_id: String,
    #[serde(default = "default_stop_name")]
    pub stop_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    #[serde(default = "default_transit_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_transit_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// An arrival strictly under this many minutes classifies the stop as
    /// energetic.
    #[serde(default = "default_urgency_minutes")]
    pub urgency_minutes: i64,
}

impl Default for TransitConfig {
    fn default() -> Self {
        TransitConfig {
            stop_id: default_stop_id(),
            stop_name: default_stop_name(),
            app_id: None,
            app_key: None,
            endpoint: default_transit_endpoint(),
            poll_secs: default_transit_poll_secs(),
            timeout_secs: default_timeout_secs(),
            urgency_minutes: default_urgency_minutes(),
        }
    }
}

fn default_stop_id() -> String {
    "791".to_string()
}

fn default_stop_name() -> String {
    "Plaça Catalunya".to_string()
}

fn default_transit_endpoint() -> String {
    "https://api.tmb.cat/v1/ibus/stops".to_string()
}

fn default_transit_poll_secs() -> u64 {
    60
}

fn default_urgency_minutes() -> i64 {
    3
}

// ---------------------------------------------------------------------------
// Pulse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseConfig {
    #[serde(default = "default_pulse_poll_secs")]
    pub poll_secs: u64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        PulseConfig {
            poll_secs: default_pulse_poll_secs(),
        }
    }
}

fn default_pulse_poll_secs() -> u64 {
    2
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
