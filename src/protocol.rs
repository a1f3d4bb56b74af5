use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

pub const SERVICE_SET_VALUE: &str = "set_value";

const DOMAIN_SEPARATOR: char = '.';

/// Domain part of an entity id: `number` for `number.kitchen_brightness`.
/// An id without a separator is its own domain.
pub fn service_domain(entity_id: &str) -> &str {
    entity_id
        .split_once(DOMAIN_SEPARATOR)
        .map_or(entity_id, |(domain, _)| domain)
}

/// Outbound command produced on commit. Dispatched once and dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall {
    pub call_id: Uuid,
    pub domain: String,
    pub service: String,
    pub entity_id: String,
    pub value: f64,
}

impl ServiceCall {
    pub fn set_value(entity_id: &str, value: f64) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            domain: service_domain(entity_id).to_string(),
            service: SERVICE_SET_VALUE.to_string(),
            entity_id: entity_id.to_string(),
            value,
        }
    }

    /// Service data as the backend expects it.
    pub fn payload(&self) -> Value {
        json!({
            "entity_id": self.entity_id,
            "value": self.value,
        })
    }
}
