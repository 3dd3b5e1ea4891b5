//! Typed view of a validated telemetry snapshot.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::validation::{ValidationError, parse_observation_time};

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryPayload {
    pub schema_version: String,
    pub host: HostIdentity,
    pub timestamp_utc: String,
    pub interval_seconds: i64,
    pub cpu: Option<CpuGroup>,
    pub memory: Option<MemoryGroup>,
    pub users: Option<UsersGroup>,
    pub disk: Option<DiskGroup>,
    pub network: Option<NetworkGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostIdentity {
    pub hostname: String,
    pub machine_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuGroup {
    pub utilization_pct: Option<f64>,
    pub idle_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryGroup {
    pub total_bytes: Option<i64>,
    pub used_bytes: Option<i64>,
    pub free_bytes: Option<i64>,
    pub used_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsersGroup {
    pub count: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub logged_in: Vec<LoggedInUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggedInUser {
    pub username: String,
    pub session_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskGroup {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub physical: Vec<PhysicalDisk>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhysicalDisk {
    pub instance: String,
    pub reads_per_sec: f64,
    pub writes_per_sec: f64,
    pub avg_queue_length: f64,
    pub read_latency_ms: f64,
    pub write_latency_ms: f64,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    pub mount: String,
    pub filesystem: Option<String>,
    pub total_bytes: i64,
    pub free_bytes: i64,
    pub free_pct: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkGroup {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    pub bytes_total_per_sec: f64,
    pub bits_total_per_sec: f64,
    pub utilization_pct: Option<f64>,
    pub packets_in_errors: i64,
    pub packets_out_errors: i64,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Scalars pulled out of a payload and coerced to their storage types.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationHeader {
    pub observed_at: DateTime<Utc>,
    pub interval_seconds: i32,
    pub users_count: Option<i32>,
}

impl TelemetryPayload {
    /// Decodes an already schema-checked document.
    pub fn from_document(document: &Map<String, Value>) -> Result<Self, ValidationError> {
        serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| ValidationError::new("payload", format!("Could not coerce payload: {e}")))
    }

    pub fn header(&self) -> Result<ObservationHeader, ValidationError> {
        let observed_at = parse_observation_time(&self.timestamp_utc).map_err(|e| {
            ValidationError::new("timestamp_utc", format!("Invalid timestamp: {e}"))
        })?;

        let interval_seconds = i32::try_from(self.interval_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ValidationError::new(
                    "interval_seconds",
                    format!("{} is not a positive 32-bit integer", self.interval_seconds),
                )
            })?;

        let users_count = match self.users.as_ref().and_then(|u| u.count) {
            Some(count) => Some(i32::try_from(count).map_err(|_| {
                ValidationError::new("users.count", format!("{count} is out of range"))
            })?),
            None => None,
        };

        Ok(ObservationHeader {
            observed_at,
            interval_seconds,
            users_count,
        })
    }
}
