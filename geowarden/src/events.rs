// geowarden/src/events.rs
//
// Domain types flowing through geowarden:
//   stream record bytes → LocationEvent → FraudAlert → AlertNotification
//
// The wire record is the game client's `location_exploration` event:
//   { event_type, timestamp, user_id, session_id,
//     device_info: { platform, device_id },
//     location:    { latitude, longitude, accuracy, speed } }
// Every other event_type is ignored before detection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub const LOCATION_EVENT_TYPE: &str = "location_exploration";

// ── Wire record ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(deserialize_with = "epoch_millis")]
    timestamp:   i64,
    user_id:     String,
    session_id:  String,
    device_info: RawDeviceInfo,
    location:    RawLocation,
}

#[derive(Debug, Deserialize)]
struct RawDeviceInfo {
    platform:  String,
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    latitude:  f64,
    longitude: f64,
    accuracy:  f64,
    #[serde(default)]
    speed:     Option<f64>,
}

/// Integer milliseconds, or a float some clients send; fractions are truncated.
fn epoch_millis<'de, D: serde::Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    let n = serde_json::Number::deserialize(de)?;
    if let Some(ms) = n.as_i64() {
        return Ok(ms);
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f.trunc() as i64),
        _ => Err(serde::de::Error::custom(format!("timestamp out of range: {}", n))),
    }
}

// ── Location event ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub user_id:    String,
    pub timestamp:  i64, // ms since epoch
    pub latitude:   f64,
    pub longitude:  f64,
    pub accuracy:   f64, // meters
    pub speed:      Option<f64>,
    pub platform:   String,
    pub session_id: String,
    pub device_id:  String,
}

impl LocationEvent {
    /// Decode one stream record. `Ok(None)` means a well-formed record of
    /// another event type.
    pub fn decode(data: &[u8]) -> Result<Option<Self>, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(data)?;

        match value.get("event_type").and_then(|t| t.as_str()) {
            None => return Err(DecodeError::MissingEventType),
            Some(t) if t != LOCATION_EVENT_TYPE => return Ok(None),
            Some(_) => {}
        }

        let raw: RawRecord = serde_json::from_value(value)?;
        Ok(Some(Self {
            user_id:    raw.user_id,
            timestamp:  raw.timestamp,
            latitude:   raw.location.latitude,
            longitude:  raw.location.longitude,
            accuracy:   raw.location.accuracy,
            speed:      raw.location.speed,
            platform:   raw.device_info.platform,
            session_id: raw.session_id,
            device_id:  raw.device_info.device_id,
        }))
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

// ── Alerts ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ImpossibleSpeed,
    Teleportation,
    RapidLocationUpdates,
    PoorGpsAccuracy,
    IdenticalCoordinates,
    RoboticTiming,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImpossibleSpeed      => write!(f, "impossible_speed"),
            Self::Teleportation        => write!(f, "teleportation"),
            Self::RapidLocationUpdates => write!(f, "rapid_location_updates"),
            Self::PoorGpsAccuracy      => write!(f, "poor_gps_accuracy"),
            Self::IdenticalCoordinates => write!(f, "identical_coordinates"),
            Self::RoboticTiming        => write!(f, "robotic_timing"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            Self::High
        } else if score >= 60 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low    => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High   => write!(f, "HIGH"),
        }
    }
}

/// Clamp a raw detector score into the 0..=100 integer range.
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub user_id:    String,
    pub alert_type: AlertType,
    pub risk_score: u8,
    pub timestamp:  i64,
    pub details:    HashMap<String, serde_json::Value>,
    pub location:   Option<(f64, f64)>,
}

impl FraudAlert {
    pub fn new(
        user_id:    &str,
        alert_type: AlertType,
        raw_score:  f64,
        timestamp:  i64,
        location:   Option<(f64, f64)>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            alert_type,
            risk_score: clamp_score(raw_score),
            timestamp,
            details: HashMap::new(),
            location,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn severity(&self) -> Severity {
        Severity::from_score(self.risk_score)
    }

    /// Cooldown key shared by the in-process and Redis stores.
    pub fn cooldown_key(&self) -> String {
        format!("alert:{}:{}", self.user_id, self.alert_type)
    }
}

// ── Outbound notification ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub alert_id:   String, // SHA256[:8] of user/type/timestamp, stable across redeliveries
    pub alert_type: AlertType,
    pub user_id:    String,
    pub risk_score: u8,
    pub timestamp:  i64,
    pub details:    HashMap<String, serde_json::Value>,
    pub location:   Option<(f64, f64)>,
    pub severity:   Severity,
}

impl AlertNotification {
    pub fn from_alert(alert: &FraudAlert) -> Self {
        use sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        h.update(alert.user_id.as_bytes());
        h.update(b":");
        h.update(alert.alert_type.to_string().as_bytes());
        h.update(b":");
        h.update(alert.timestamp.to_le_bytes());
        Self {
            alert_id:   hex::encode(&h.finalize()[..8]),
            alert_type: alert.alert_type,
            user_id:    alert.user_id.clone(),
            risk_score: alert.risk_score,
            timestamp:  alert.timestamp,
            details:    alert.details.clone(),
            location:   alert.location,
            severity:   alert.severity(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Fraud Alert: {} (Score: {})", self.alert_type, self.risk_score)
    }
}
