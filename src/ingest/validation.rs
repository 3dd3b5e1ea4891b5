//! Telemetry payload validation against the versioned schema document.
//!
//! The schema is a JSON-Schema subset compiled into the binary. Validation is
//! pure logic over `serde_json::Value`: every violation is collected, sorted by
//! field path, and the first one is reported so the error is stable no
//! matter how many fields are wrong.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const CURRENT_SCHEMA_VERSION: &str = "1.0";

static TELEMETRY_SCHEMA_V1: Lazy<SchemaNode> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/telemetry-1.0.schema.json"))
        .expect("embedded telemetry schema is valid JSON")
});

/// The first schema or coercion violation found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schema validation failed at '{field}': {message}")]
pub struct ValidationError {
    /// Dotted path, e.g. `disk.volumes.0.free_pct`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The request body was neither an object nor a one-element array of one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Expected a single snapshot object or a one-element array")]
pub struct MalformedEnvelope;

/// Accepts a bare object or a one-element array holding an object.
pub fn unwrap_envelope(body: Value) -> Result<Map<String, Value>, MalformedEnvelope> {
    match body {
        Value::Object(map) => Ok(map),
        Value::Array(mut items) if items.len() == 1 => match items.pop() {
            Some(Value::Object(map)) => Ok(map),
            _ => Err(MalformedEnvelope),
        },
        _ => Err(MalformedEnvelope),
    }
}

/// Validates a snapshot payload against the 1.0 schema.
pub fn validate_snapshot(payload: &Map<String, Value>) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    let mut path = Vec::new();
    TELEMETRY_SCHEMA_V1.check_object(payload, &mut path, &mut violations);

    violations.sort_by(|a, b| a.path.cmp(&b.path));
    match violations.into_iter().next() {
        Some(v) => Err(ValidationError::new(dotted(&v.path), v.message)),
        None => Ok(()),
    }
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_observation_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(rfc_err) => ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
            .ok_or(rfc_err),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PathSegment {
    Key(String),
    Index(usize),
}

fn dotted(path: &[PathSegment]) -> String {
    path.iter()
        .map(|segment| match segment {
            PathSegment::Key(key) => key.clone(),
            PathSegment::Index(i) => i.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

struct Violation {
    path: Vec<PathSegment>,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JsonType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl JsonType {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Null => value.is_null(),
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Null => "null",
        };
        write!(f, "'{name}'")
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeSpec {
    One(JsonType),
    Many(Vec<JsonType>),
}

impl TypeSpec {
    fn as_slice(&self) -> &[JsonType] {
        match self {
            TypeSpec::One(t) => std::slice::from_ref(t),
            TypeSpec::Many(ts) => ts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SchemaNode {
    #[serde(rename = "type")]
    types: Option<TypeSpec>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    properties: BTreeMap<String, SchemaNode>,
    items: Option<Box<SchemaNode>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    #[serde(rename = "exclusiveMinimum")]
    exclusive_minimum: Option<f64>,
    #[serde(rename = "minLength")]
    min_length: Option<usize>,
    #[serde(rename = "enum")]
    allowed: Option<Vec<Value>>,
    format: Option<String>,
}

impl SchemaNode {
    fn check(&self, value: &Value, path: &mut Vec<PathSegment>, out: &mut Vec<Violation>) {
        if let Some(types) = &self.types {
            let types = types.as_slice();
            if !types.iter().any(|t| t.matches(value)) {
                let expected = types.iter().map(ToString::to_string).collect::<Vec<_>>();
                out.push(Violation {
                    path: path.clone(),
                    message: format!("{value} is not of type {}", expected.join(", ")),
                });
                return;
            }
        }

        if value.is_null() {
            return;
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                out.push(Violation {
                    path: path.clone(),
                    message: format!("{value} is not one of {}", Value::from(allowed.clone())),
                });
            }
        }

        match value {
            Value::Object(map) => self.check_object(map, path, out),
            Value::Array(items) => {
                if let Some(item_schema) = &self.items {
                    for (i, item) in items.iter().enumerate() {
                        path.push(PathSegment::Index(i));
                        item_schema.check(item, path, out);
                        path.pop();
                    }
                }
            }
            Value::Number(n) => {
                if self.declares(JsonType::Integer) && n.is_u64() && n.as_i64().is_none() {
                    out.push(Violation {
                        path: path.clone(),
                        message: format!("{value} does not fit a signed 64-bit integer"),
                    });
                }
                if let Some(n) = n.as_f64() {
                    self.check_bounds(n, value, path, out);
                }
            }
            Value::String(s) => self.check_string(s, path, out),
            _ => {}
        }
    }

    fn declares(&self, wanted: JsonType) -> bool {
        self.types
            .as_ref()
            .is_some_and(|types| types.as_slice().contains(&wanted))
    }

    fn check_object(
        &self,
        map: &Map<String, Value>,
        path: &mut Vec<PathSegment>,
        out: &mut Vec<Violation>,
    ) {
        for name in &self.required {
            if !map.contains_key(name) {
                path.push(PathSegment::Key(name.clone()));
                out.push(Violation {
                    path: path.clone(),
                    message: format!("'{name}' is a required property"),
                });
                path.pop();
            }
        }

        for (name, child) in &self.properties {
            if let Some(child_value) = map.get(name) {
                path.push(PathSegment::Key(name.clone()));
                child.check(child_value, path, out);
                path.pop();
            }
        }
    }

    fn check_bounds(&self, n: f64, value: &Value, path: &[PathSegment], out: &mut Vec<Violation>) {
        let mut fail = |message: String| {
            out.push(Violation {
                path: path.to_vec(),
                message,
            })
        };
        if let Some(min) = self.minimum {
            if n < min {
                fail(format!("{value} is less than the minimum of {min}"));
            }
        }
        if let Some(min) = self.exclusive_minimum {
            if n <= min {
                fail(format!("{value} is less than or equal to the minimum of {min}"));
            }
        }
        if let Some(max) = self.maximum {
            if n > max {
                fail(format!("{value} is greater than the maximum of {max}"));
            }
        }
    }

    fn check_string(&self, s: &str, path: &[PathSegment], out: &mut Vec<Violation>) {
        if let Some(min) = self.min_length {
            if s.chars().count() < min {
                out.push(Violation {
                    path: path.to_vec(),
                    message: format!("'{s}' is shorter than {min} character(s)"),
                });
            }
        }
        if self.format.as_deref() == Some("date-time") && parse_observation_time(s).is_err() {
            out.push(Violation {
                path: path.to_vec(),
                message: format!("'{s}' is not a 'date-time'"),
            });
        }
    }
}
