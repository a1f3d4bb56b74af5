use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::types::{EntitySnapshot, HostContext};

/// A field whose value differs between two host deliveries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "field", content = "key")]
pub enum ChangedField {
    State,
    LastChanged,
    LastUpdated,
    Attribute(String),
    Connected,
    PanelUrl,
    Locale,
    Language,
    UnitSystem,
}

impl ChangedField {
    pub fn is_entity_field(&self) -> bool {
        matches!(
            self,
            ChangedField::State
                | ChangedField::LastChanged
                | ChangedField::LastUpdated
                | ChangedField::Attribute(_)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateDecision {
    pub should_notify: bool,
    pub changed_fields: BTreeSet<ChangedField>,
}

impl GateDecision {
    pub fn changed_attributes(&self) -> impl Iterator<Item = &str> {
        self.changed_fields.iter().filter_map(|f| match f {
            ChangedField::Attribute(key) => Some(key.as_str()),
            _ => None,
        })
    }

    pub fn has(&self, field: &ChangedField) -> bool {
        self.changed_fields.contains(field)
    }
}

/// Decide whether a new host delivery warrants a refresh for `entity_id`.
///
/// Pure function of its inputs. Entity fields compare by equality (`state`
/// as a string, so `"5"` and `"5.0"` differ); attributes compare per key
/// over the union of both key sets.
pub fn evaluate(prev: &HostContext, next: &HostContext, entity_id: Option<&str>) -> GateDecision {
    let mut changed = BTreeSet::new();

    let prev_entity = entity_id.and_then(|id| prev.state(id));
    let next_entity = entity_id.and_then(|id| next.state(id));
    diff_entity(prev_entity, next_entity, &mut changed);

    if prev.connected != next.connected {
        changed.insert(ChangedField::Connected);
    }
    if prev.panel_url != next.panel_url {
        changed.insert(ChangedField::PanelUrl);
    }
    if prev.locale != next.locale {
        changed.insert(ChangedField::Locale);
    }
    if prev.language != next.language {
        changed.insert(ChangedField::Language);
    }
    if prev.config.unit_system != next.config.unit_system {
        changed.insert(ChangedField::UnitSystem);
    }

    GateDecision {
        should_notify: !changed.is_empty(),
        changed_fields: changed,
    }
}

pub(crate) fn diff_entity(
    prev: Option<&EntitySnapshot>,
    next: Option<&EntitySnapshot>,
    changed: &mut BTreeSet<ChangedField>,
) {
    if prev.is_none() && next.is_none() {
        return;
    }

    if prev.map(|e| e.state.as_str()) != next.map(|e| e.state.as_str()) {
        changed.insert(ChangedField::State);
    }
    if prev.map(|e| e.last_changed) != next.map(|e| e.last_changed) {
        changed.insert(ChangedField::LastChanged);
    }
    if prev.map(|e| e.last_updated) != next.map(|e| e.last_updated) {
        changed.insert(ChangedField::LastUpdated);
    }

    let prev_attrs = prev.map(|e| &e.attributes);
    let next_attrs = next.map(|e| &e.attributes);
    let keys: HashSet<&String> = prev_attrs
        .into_iter()
        .flat_map(|m| m.keys())
        .chain(next_attrs.into_iter().flat_map(|m| m.keys()))
        .collect();

    for key in keys {
        let before: Option<&Value> = prev_attrs.and_then(|m| m.get(key));
        let after: Option<&Value> = next_attrs.and_then(|m| m.get(key));
        if !same_attribute(before, after) {
            changed.insert(ChangedField::Attribute(key.clone()));
        }
    }
}

/// Numbers compare by value so `1` and `1.0` are the same attribute.
fn same_attribute(before: Option<&Value>, after: Option<&Value>) -> bool {
    match (before, after) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        _ => before == after,
    }
}
