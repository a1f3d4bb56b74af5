use std::fs::{File, OpenOptions};
use std::io::Write;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::diff::{ChangedField, GateDecision};
use crate::types::{DisplayMode, EntitySnapshot};

pub const DEFAULT_DIAG_INTERVAL: Duration = Duration::from_millis(1000);

/// Rate limit for housekeeping diagnostics. Only gates log output,
/// never a render.
#[derive(Debug, Clone)]
pub(crate) struct DiagThrottle {
    interval: Duration,
    last_emitted: Option<Instant>,
}

impl DiagThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emitted: None,
        }
    }

    /// Whether a non-semantic probe may be emitted at `now`. Records the
    /// emission when allowed.
    pub fn allow(&mut self, now: Instant) -> bool {
        let allowed = match self.last_emitted {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        };
        if allowed {
            self.last_emitted = Some(now);
        }
        allowed
    }

    /// Semantic probes always go out but still restart the window.
    pub fn record(&mut self, now: Instant) {
        self.last_emitted = Some(now);
    }
}

pub enum ProbeLogMode {
    /// Every probe carries both complete entity snapshots.
    Full,
    /// Probes carry only the changed fields.
    Diffed,
}

/// NDJSON sink for update, render and event probes.
pub(crate) struct ProbeLogger {
    mode: ProbeLogMode,
    file: File,
}

impl ProbeLogger {
    pub fn new(mode: ProbeLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { mode, file })
    }

    pub fn log_update(
        &mut self,
        entity_id: Option<&str>,
        decision: &GateDecision,
        prev: Option<&EntitySnapshot>,
        next: Option<&EntitySnapshot>,
    ) {
        let mut entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "kind": "update",
            "entity_id": entity_id,
            "notify": decision.should_notify,
            "changed": decision.changed_fields,
        });

        match self.mode {
            ProbeLogMode::Full => {
                entry["prev"] = snapshot_json(prev);
                entry["next"] = snapshot_json(next);
            }
            ProbeLogMode::Diffed => {
                if decision.has(&ChangedField::State) {
                    entry["state"] = json!({
                        "prev": prev.map(|e| e.state.as_str()),
                        "next": next.map(|e| e.state.as_str()),
                    });
                }
            }
        }
        self.write_line(&entry);
    }

    pub fn log_render(&mut self, entity_id: &str, mode: DisplayMode, state: &str) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "kind": "render",
            "entity_id": entity_id,
            "display_mode": mode,
            "state": state,
        });
        self.write_line(&entry);
    }

    pub fn log_event(
        &mut self,
        event: &str,
        entity_id: &str,
        value: Option<f64>,
        call_id: Option<Uuid>,
    ) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "kind": event,
            "entity_id": entity_id,
            "value": value,
            "call_id": call_id,
        });
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write probe entry: {e}");
        }
    }
}

fn snapshot_json(entity: Option<&EntitySnapshot>) -> Value {
    entity
        .and_then(|e| serde_json::to_value(e).ok())
        .unwrap_or(Value::Null)
}
