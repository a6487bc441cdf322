//! Per-car decisions from the external oracle
//!
//! The oracle's raw output is parsed once here. Anything the world cannot
//! understand becomes `DecisionKind::None`, which falls back to cruise.

use serde::Serialize;
use serde_json::Value;

use super::car::MlPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Go,
    Stop,
    #[default]
    None,
}

impl DecisionKind {
    /// Case-insensitive; unknown strings are `None`
    pub fn parse_lossy(text: &str) -> DecisionKind {
        match text.trim().to_ascii_uppercase().as_str() {
            "GO" => DecisionKind::Go,
            "STOP" => DecisionKind::Stop,
            _ => DecisionKind::None,
        }
    }
}

/// What the oracle wants one car to do this tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub confidence_go: f64,
    pub confidence_stop: f64,
    /// Explicit target; overrides the kind when present
    pub target_speed_kmh: Option<f64>,
}

impl Decision {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn go() -> Self {
        Self {
            kind: DecisionKind::Go,
            confidence_go: 1.0,
            ..Self::default()
        }
    }

    pub fn stop() -> Self {
        Self {
            kind: DecisionKind::Stop,
            confidence_stop: 1.0,
            ..Self::default()
        }
    }

    pub fn with_target_speed(mut self, target_speed_kmh: f64) -> Self {
        self.target_speed_kmh = Some(target_speed_kmh);
        self
    }

    /// Parse `{decision, confidence_go, confidence_stop, target_speed_kmh}`.
    ///
    /// Numbers may arrive as JSON numbers or numeric strings. A payload that
    /// is not an object, or has no usable `decision`, is `Decision::none()`.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::none();
        };
        let Some(kind) = object.get("decision").and_then(Value::as_str) else {
            return Self::none();
        };

        Self {
            kind: DecisionKind::parse_lossy(kind),
            confidence_go: object.get("confidence_go").and_then(lossy_f64).unwrap_or(0.0),
            confidence_stop: object.get("confidence_stop").and_then(lossy_f64).unwrap_or(0.0),
            target_speed_kmh: object
                .get("target_speed_kmh")
                .and_then(lossy_f64)
                .filter(|speed| *speed >= 0.0),
        }
    }
}

fn lossy_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Anything that can turn a car's view of the world into a decision
pub trait DecisionOracle {
    fn decide(&mut self, payload: &MlPayload) -> Decision;
}

/// Oracle that never has an opinion, leaving cars to cruise under the
/// world's own safety layers
#[derive(Debug, Clone, Copy, Default)]
pub struct FailOpen;

impl DecisionOracle for FailOpen {
    fn decide(&mut self, _payload: &MlPayload) -> Decision {
        Decision::none()
    }
}

impl<F> DecisionOracle for F
where
    F: FnMut(&MlPayload) -> Decision,
{
    fn decide(&mut self, payload: &MlPayload) -> Decision {
        self(payload)
    }
}
