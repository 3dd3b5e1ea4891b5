//! Telemetry payload handling ahead of storage.

pub mod payload;
pub mod validation;

pub use payload::TelemetryPayload;
pub use validation::{ValidationError, unwrap_envelope, validate_snapshot};
