use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload shape emitted by the engine bridge for both push events.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAppEvent {
    package_name: String,
    #[serde(default)]
    app_name: Option<String>,
    /// Milliseconds since the epoch, sent as a double.
    timestamp: f64,
}

/// Any foreground-app change reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedAppEvent {
    pub app_identifier: String,
    pub display_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The engine intercepted a launch of a blocked app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedAppEvent {
    pub app_identifier: String,
    pub display_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("payload has an empty packageName")]
    MissingIdentifier,
    #[error("payload timestamp {0} is not a valid epoch ms value")]
    InvalidTimestamp(f64),
}

fn parse_raw(payload: &serde_json::Value) -> Result<(String, Option<String>, DateTime<Utc>), PayloadError> {
    let raw: RawAppEvent = serde_json::from_value(payload.clone())
        .map_err(|err| PayloadError::Malformed(err.to_string()))?;

    let identifier = raw.package_name.trim();
    if identifier.is_empty() {
        return Err(PayloadError::MissingIdentifier);
    }

    if !raw.timestamp.is_finite() || raw.timestamp < 0.0 {
        return Err(PayloadError::InvalidTimestamp(raw.timestamp));
    }
    let timestamp = DateTime::from_timestamp_millis(raw.timestamp as i64)
        .ok_or(PayloadError::InvalidTimestamp(raw.timestamp))?;

    let display_name = raw
        .app_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    Ok((identifier.to_string(), display_name, timestamp))
}

impl DetectedAppEvent {
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, PayloadError> {
        let (app_identifier, display_name, timestamp) = parse_raw(payload)?;
        Ok(Self {
            app_identifier,
            display_name,
            timestamp,
        })
    }

    /// Name to show in lists; falls back like the dashboard did.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Unknown App")
    }
}

impl BlockedAppEvent {
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, PayloadError> {
        let (app_identifier, display_name, timestamp) = parse_raw(payload)?;
        Ok(Self {
            app_identifier,
            display_name,
            timestamp,
        })
    }
}
