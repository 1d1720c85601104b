//! Dotted-path knob overrides layered onto a [`StickfolkConfig`] before the world starts.

use serde_json::{Number, Value};
use stickfolk_core::StickfolkConfig;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OverrideError {
    #[error("{0}")]
    InvalidPatch(String),
    #[error("unknown knob path: {0}")]
    UnknownPath(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl OverrideError {
    fn serialization(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A single `path=value` override, e.g. `crowd.eps=120` or `crowd.rally_band.1=4`.
#[derive(Debug, Clone, PartialEq)]
pub struct KnobUpdate {
    pub path: String,
    pub value: Value,
}

impl KnobUpdate {
    /// Parse `path=value`; the value is read as JSON, falling back to a raw string.
    pub fn parse(raw: &str) -> Result<Self, OverrideError> {
        let Some((path, value)) = raw.split_once('=') else {
            return Err(OverrideError::InvalidPatch(format!(
                "expected path=value, got '{raw}'"
            )));
        };
        let value = serde_json::from_str::<Value>(value.trim())
            .unwrap_or_else(|_| Value::String(value.trim().to_string()));
        Ok(Self {
            path: path.trim().to_string(),
            value,
        })
    }

    /// JSON pointer addressing this knob inside the serialized config.
    fn pointer(&self) -> Result<String, OverrideError> {
        let mut pointer = String::new();
        for segment in self.path.split('.').map(str::trim) {
            if segment.is_empty() {
                return Err(OverrideError::InvalidPatch(format!(
                    "malformed knob path '{}'",
                    self.path
                )));
            }
            pointer.push('/');
            pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        }
        Ok(pointer)
    }

    fn apply_to(&self, root: &mut Value) -> Result<(), OverrideError> {
        let pointer = self.pointer()?;
        let slot = root
            .pointer_mut(&pointer)
            .ok_or_else(|| OverrideError::UnknownPath(self.path.clone()))?;
        *slot = coerce(slot, &self.value).ok_or_else(|| {
            OverrideError::InvalidPatch(format!("type mismatch at {}", self.path))
        })?;
        Ok(())
    }
}

/// Value to store when `incoming` replaces `current`; whole sections cannot be replaced.
fn coerce(current: &Value, incoming: &Value) -> Option<Value> {
    match (current, incoming) {
        // Unset optional knobs such as `rng_seed`; serde checks the final shape.
        (Value::Null, _) => Some(incoming.clone()),
        (Value::Number(_), Value::Number(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::String(_), Value::String(_))
        | (Value::Array(_), Value::Array(_)) => Some(incoming.clone()),
        (Value::Number(_), Value::String(raw)) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (Value::Bool(_), Value::String(raw)) => raw.trim().parse::<bool>().ok().map(Value::Bool),
        _ => None,
    }
}

/// Apply every update in order to `config`, returning the patched configuration.
pub fn apply_updates(
    config: &StickfolkConfig,
    updates: &[KnobUpdate],
) -> Result<StickfolkConfig, OverrideError> {
    let mut value = serde_json::to_value(config).map_err(OverrideError::serialization)?;
    for update in updates {
        update.apply_to(&mut value)?;
    }
    serde_json::from_value(value).map_err(OverrideError::serialization)
}
