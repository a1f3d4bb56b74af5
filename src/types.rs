use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Sentinel state reported for entities the backend cannot reach.
pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_OFF: &str = "off";

/// One point-in-time view of a controllable numeric entity.
///
/// Snapshots are replaced wholesale on every delivery; two snapshots with
/// equal fields are interchangeable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    /// Raw state string, e.g. `"72"`, `"5.0"` or `"unavailable"`.
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl EntitySnapshot {
    pub fn new(
        entity_id: impl Into<String>,
        state: impl Into<String>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_changed: changed_at,
            last_updated: changed_at,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Numeric view of `state`. Non-numeric sentinels yield `None`, never NaN.
    pub fn numeric_state(&self) -> Option<f64> {
        parse_number(&self.state)
    }

    pub fn min(&self) -> Option<f64> {
        self.numeric_attribute("min")
    }

    pub fn max(&self) -> Option<f64> {
        self.numeric_attribute("max")
    }

    pub fn step(&self) -> Option<f64> {
        self.numeric_attribute("step")
    }

    fn numeric_attribute(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_number(s),
            _ => None,
        }
    }
}

pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Entity registry entry; only consulted for number formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub entity_id: String,
    #[serde(default)]
    pub display_precision: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub language: String,
    #[serde(default)]
    pub number_format: String,
    #[serde(default)]
    pub time_format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSystem {
    #[serde(default)]
    pub length: String,
    #[serde(default)]
    pub mass: String,
    #[serde(default)]
    pub temperature: String,
    #[serde(default)]
    pub volume: String,
    /// Remaining units (`pressure`, `wind_speed`, ...) kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub unit_system: UnitSystem,
}

/// The host dashboard's world as delivered to the widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostContext {
    #[serde(default)]
    pub connected: bool,
    #[serde(default, rename = "panelUrl")]
    pub panel_url: String,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub config: HostConfig,
    /// Current entity snapshots keyed by entity id.
    #[serde(default)]
    pub states: HashMap<String, EntitySnapshot>,
    /// Registry metadata keyed by entity id.
    #[serde(default)]
    pub entities: HashMap<String, EntityMetadata>,
}

impl HostContext {
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn state(&self, entity_id: &str) -> Option<&EntitySnapshot> {
        self.states.get(entity_id)
    }

    pub fn metadata(&self, entity_id: &str) -> Option<&EntityMetadata> {
        self.entities.get(entity_id)
    }

    pub fn with_state(mut self, snapshot: EntitySnapshot) -> Self {
        self.states.insert(snapshot.entity_id.clone(), snapshot);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Slider,
    Buttons,
}

/// Fraction-digit bounds handed to the stepper; the widget never formats itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_fraction_digits: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_fraction_digits: Option<u32>,
}

impl FormatOptions {
    pub fn fraction_digits(min: u32, max: u32) -> Self {
        Self {
            minimum_fraction_digits: Some(min),
            maximum_fraction_digits: Some(max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliderProps {
    pub value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub disabled: bool,
    pub inactive: bool,
    pub show_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepperProps {
    pub locale: Locale,
    pub value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub disabled: bool,
    pub format: FormatOptions,
}

/// Description of the primitive the host should paint.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Slider(SliderProps),
    Stepper(StepperProps),
}

impl Primitive {
    pub fn value(&self) -> Option<f64> {
        match self {
            Primitive::Slider(p) => p.value,
            Primitive::Stepper(p) => p.value,
        }
    }

    /// `(min, max, step)` regardless of variant.
    pub fn bounds(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        match self {
            Primitive::Slider(p) => (p.min, p.max, p.step),
            Primitive::Stepper(p) => (p.min, p.max, p.step),
        }
    }

    pub fn is_slider(&self) -> bool {
        matches!(self, Primitive::Slider(_))
    }
}

/// Payload of the re-emitted `current-change` event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurrentChange {
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Previewing {
        value: Option<f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        "2024-05-01T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn numeric_state_parses_numbers() {
        let e = EntitySnapshot::new("number.kitchen_brightness", "72", ts());
        assert_eq!(e.numeric_state(), Some(72.0));
        let e = EntitySnapshot::new("number.kitchen_brightness", " 5.5 ", ts());
        assert_eq!(e.numeric_state(), Some(5.5));
    }

    #[test]
    fn numeric_state_rejects_sentinels() {
        for raw in ["unavailable", "unknown", "", "NaN", "inf"] {
            let e = EntitySnapshot::new("number.x", raw, ts());
            assert_eq!(e.numeric_state(), None, "state {raw:?}");
        }
    }

    #[test]
    fn bounds_accept_numbers_and_numeric_strings() {
        let e = EntitySnapshot::new("number.x", "1", ts())
            .with_attribute("min", 0)
            .with_attribute("max", "100")
            .with_attribute("step", json!(null));
        assert_eq!(e.min(), Some(0.0));
        assert_eq!(e.max(), Some(100.0));
        assert_eq!(e.step(), None);
    }

    #[test]
    fn host_context_from_hass_json() {
        let body = json!({
            "connected": true,
            "panelUrl": "lovelace",
            "locale": {"language": "en", "number_format": "language"},
            "language": "en",
            "config": {"unit_system": {"temperature": "°C", "length": "km"}},
            "states": {
                "number.kitchen_brightness": {
                    "entity_id": "number.kitchen_brightness",
                    "state": "40",
                    "attributes": {"min": 0, "max": 100, "step": 1},
                    "last_changed": "2024-05-01T10:00:00.123456+00:00",
                    "last_updated": "2024-05-01T10:00:00.123456+00:00"
                }
            },
            "entities": {
                "number.kitchen_brightness": {
                    "entity_id": "number.kitchen_brightness",
                    "display_precision": 1
                }
            }
        });
        let ctx = HostContext::from_json(&body.to_string()).unwrap();
        assert!(ctx.connected);
        assert_eq!(ctx.panel_url, "lovelace");
        assert_eq!(ctx.config.unit_system.temperature, "°C");
        let entity = ctx.state("number.kitchen_brightness").unwrap();
        assert_eq!(entity.numeric_state(), Some(40.0));
        assert_eq!(entity.max(), Some(100.0));
        assert_eq!(
            ctx.metadata("number.kitchen_brightness").unwrap().display_precision,
            Some(1)
        );
    }

    #[test]
    fn unit_system_keeps_unmodelled_units() {
        let body = json!({
            "config": {
                "unit_system": {"temperature": "°C", "pressure": "hPa", "wind_speed": "m/s"}
            }
        });
        let ctx = HostContext::from_json(&body.to_string()).unwrap();
        let units = &ctx.config.unit_system;
        assert_eq!(units.temperature, "°C");
        assert_eq!(units.extra["pressure"], "hPa");
        assert_eq!(units.extra["wind_speed"], "m/s");
        assert!(!units.extra.contains_key("temperature"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = EntitySnapshot::from_json("{\"state\": 1}").unwrap_err();
        assert!(matches!(err, crate::Error::Json(_)));
    }

    #[test]
    fn display_mode_serde_names() {
        let mode: DisplayMode = serde_json::from_value(json!("buttons")).unwrap();
        assert_eq!(mode, DisplayMode::Buttons);
        assert_eq!(DisplayMode::default(), DisplayMode::Slider);
    }
}
