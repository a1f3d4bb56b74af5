use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::diff::{evaluate, GateDecision};
use crate::host::{EntityPredicates, FormatResolver, HassFormats, HassPredicates};
use crate::logger::{DiagThrottle, ProbeLogMode, ProbeLogger, DEFAULT_DIAG_INTERVAL};
use crate::protocol::ServiceCall;
use crate::types::*;
use crate::Result;

type ServiceCallback = Box<dyn Fn(&ServiceCall) + Send + Sync>;
type CurrentChangeCallback = Box<dyn Fn(&CurrentChange) + Send + Sync>;

pub struct NumberValueControlBuilder {
    entity: EntitySnapshot,
    context: HostContext,
    display_mode: Option<DisplayMode>,
    predicates: Box<dyn EntityPredicates>,
    formats: Box<dyn FormatResolver>,
    service_callbacks: Vec<ServiceCallback>,
    current_change_callbacks: Vec<CurrentChangeCallback>,
    log_mode: Option<ProbeLogMode>,
    log_path: Option<String>,
    diag_interval: Duration,
}

impl NumberValueControlBuilder {
    pub fn new(entity: EntitySnapshot) -> Self {
        Self {
            entity,
            context: HostContext::default(),
            display_mode: None,
            predicates: Box::new(HassPredicates),
            formats: Box::new(HassFormats),
            service_callbacks: Vec::new(),
            current_change_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
            diag_interval: DEFAULT_DIAG_INTERVAL,
        }
    }

    pub fn host_context(mut self, context: HostContext) -> Self {
        self.context = context;
        self
    }

    pub fn display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = Some(mode);
        self
    }

    pub fn predicates(mut self, predicates: impl EntityPredicates + 'static) -> Self {
        self.predicates = Box::new(predicates);
        self
    }

    pub fn formats(mut self, formats: impl FormatResolver + 'static) -> Self {
        self.formats = Box::new(formats);
        self
    }

    /// Outbound channel for committed values. Invoked synchronously and
    /// never awaited.
    pub fn on_service_call(mut self, f: impl Fn(&ServiceCall) + Send + Sync + 'static) -> Self {
        self.service_callbacks.push(Box::new(f));
        self
    }

    pub fn on_current_change(
        mut self,
        f: impl Fn(&CurrentChange) + Send + Sync + 'static,
    ) -> Self {
        self.current_change_callbacks.push(Box::new(f));
        self
    }

    pub fn probe_log(mut self, mode: ProbeLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn diag_interval(mut self, interval: Duration) -> Self {
        self.diag_interval = interval;
        self
    }

    pub fn build(self) -> Result<NumberValueControl> {
        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(ProbeLogger::new(mode, &path)?),
            _ => None,
        };

        Ok(NumberValueControl {
            entity: self.entity,
            context: self.context,
            display_mode: self.display_mode,
            predicates: self.predicates,
            formats: self.formats,
            service_callbacks: self.service_callbacks,
            current_change_callbacks: self.current_change_callbacks,
            logger,
            throttle: DiagThrottle::new(self.diag_interval),
            interaction: Interaction::Idle,
            last_decision: None,
            needs_render: true,
        })
    }
}

/// Slider/stepper control for one numeric entity.
///
/// Host deliveries go through [`set_host_context`](Self::set_host_context),
/// which runs the update gate and marks the control for re-render only when
/// something relevant changed. User gestures come back in through
/// [`on_change`](Self::on_change) (commit, writes to the backend) and
/// [`on_current_change`](Self::on_current_change) (preview, re-emitted only).
pub struct NumberValueControl {
    entity: EntitySnapshot,
    context: HostContext,
    display_mode: Option<DisplayMode>,
    predicates: Box<dyn EntityPredicates>,
    formats: Box<dyn FormatResolver>,
    service_callbacks: Vec<ServiceCallback>,
    current_change_callbacks: Vec<CurrentChangeCallback>,
    logger: Option<ProbeLogger>,
    throttle: DiagThrottle,
    interaction: Interaction,
    last_decision: Option<GateDecision>,
    needs_render: bool,
}

impl NumberValueControl {
    pub fn builder(entity: EntitySnapshot) -> NumberValueControlBuilder {
        NumberValueControlBuilder::new(entity)
    }

    pub fn entity(&self) -> &EntitySnapshot {
        &self.entity
    }

    pub fn host_context(&self) -> &HostContext {
        &self.context
    }

    pub fn display_mode(&self) -> Option<DisplayMode> {
        self.display_mode
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn last_decision(&self) -> Option<&GateDecision> {
        self.last_decision.as_ref()
    }

    pub fn needs_render(&self) -> bool {
        self.needs_render
    }

    /// Replace the host context with a new delivery and run the gate
    /// against the previous one.
    ///
    /// When the delivery carries a changed snapshot for this entity, the
    /// control adopts it.
    pub fn set_host_context(&mut self, next: HostContext) -> GateDecision {
        let entity_id = self.entity.entity_id.clone();
        let decision = evaluate(&self.context, &next, Some(&entity_id));
        self.probe_update(&entity_id, &decision, &next);

        if decision.should_notify {
            if decision.changed_fields.iter().any(|f| f.is_entity_field())
                && let Some(snapshot) = next.state(&entity_id)
            {
                self.entity = snapshot.clone();
            }
            self.needs_render = true;
        }

        self.context = next;
        self.last_decision = Some(decision.clone());
        decision
    }

    /// Returns whether the snapshot differed from the current one.
    pub fn set_entity(&mut self, entity: EntitySnapshot) -> bool {
        if self.entity == entity {
            return false;
        }
        trace!(entity_id = %entity.entity_id, state = %entity.state, "entity replaced");
        self.entity = entity;
        self.needs_render = true;
        true
    }

    pub fn set_display_mode(&mut self, mode: Option<DisplayMode>) -> bool {
        if self.display_mode == mode {
            return false;
        }
        self.display_mode = mode;
        self.needs_render = true;
        true
    }

    /// Describe the primitive for the current inputs without side effects.
    pub fn view(&self) -> Primitive {
        let entity = &self.entity;
        let value = entity.numeric_state();
        let disabled = !self.predicates.is_available(entity);

        match self.display_mode {
            Some(DisplayMode::Buttons) => {
                let metadata = self.context.metadata(&entity.entity_id);
                let format = self
                    .formats
                    .number_format_options(entity, metadata)
                    .unwrap_or_else(|| self.formats.default_format_options(&entity.state));
                Primitive::Stepper(StepperProps {
                    locale: self.context.locale.clone(),
                    value,
                    min: entity.min(),
                    max: entity.max(),
                    step: entity.step(),
                    disabled,
                    format,
                })
            }
            Some(DisplayMode::Slider) | None => Primitive::Slider(SliderProps {
                value,
                min: entity.min(),
                max: entity.max(),
                step: entity.step(),
                disabled,
                inactive: !self.predicates.is_active(entity),
                show_active: true,
            }),
        }
    }

    pub fn render(&mut self) -> Primitive {
        let primitive = self.view();
        self.needs_render = false;

        let mode = self.display_mode.unwrap_or_default();
        trace!(
            entity_id = %self.entity.entity_id,
            state = %self.entity.state,
            display_mode = ?mode,
            "render"
        );
        if let Some(ref mut logger) = self.logger {
            logger.log_render(&self.entity.entity_id, mode, &self.entity.state);
        }
        primitive
    }

    /// Commit from either primitive: one `set_value` call, fire-and-forget.
    pub fn on_change(&mut self, value: f64) {
        let call = ServiceCall::set_value(&self.entity.entity_id, value);
        debug!(
            entity_id = %call.entity_id,
            domain = %call.domain,
            value,
            call_id = %call.call_id,
            "committing value"
        );
        if let Some(ref mut logger) = self.logger {
            logger.log_event("change", &call.entity_id, Some(value), Some(call.call_id));
        }

        self.interaction = Interaction::Idle;
        for cb in &self.service_callbacks {
            cb(&call);
        }
    }

    /// Slider drag preview. Re-emitted unchanged; never written to the backend.
    ///
    /// The stepper has no drag, so previews arriving in buttons mode are
    /// dropped and the control stays in its current interaction state.
    pub fn on_current_change(&mut self, value: Option<f64>) {
        if self.display_mode == Some(DisplayMode::Buttons) {
            trace!(
                entity_id = %self.entity.entity_id,
                ?value,
                "current-change ignored in buttons mode"
            );
            return;
        }
        trace!(entity_id = %self.entity.entity_id, ?value, "current-change");
        if let Some(ref mut logger) = self.logger {
            logger.log_event("current-change", &self.entity.entity_id, value, None);
        }

        self.interaction = Interaction::Previewing { value };
        let event = CurrentChange { value };
        for cb in &self.current_change_callbacks {
            cb(&event);
        }
    }

    fn probe_update(&mut self, entity_id: &str, decision: &GateDecision, next: &HostContext) {
        let now = Instant::now();
        if decision.should_notify {
            self.throttle.record(now);
            debug!(
                entity_id,
                changed = ?decision.changed_fields,
                prev_state = ?self.context.state(entity_id).map(|e| e.state.as_str()),
                next_state = ?next.state(entity_id).map(|e| e.state.as_str()),
                "host update"
            );
        } else if self.throttle.allow(now) {
            trace!(entity_id, "host update without relevant changes");
        } else {
            return;
        }

        if let Some(ref mut logger) = self.logger {
            logger.log_update(
                Some(entity_id),
                decision,
                self.context.state(entity_id),
                next.state(entity_id),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::{Arc, Mutex};

    const EID: &str = "number.kitchen_brightness";

    fn ts() -> DateTime<Utc> {
        "2024-05-01T10:00:00Z".parse().unwrap()
    }

    fn snapshot(state: &str) -> EntitySnapshot {
        EntitySnapshot::new(EID, state, ts())
            .with_attribute("min", 0)
            .with_attribute("max", 100)
            .with_attribute("step", 1)
    }

    fn control(state: &str) -> NumberValueControl {
        NumberValueControl::builder(snapshot(state))
            .host_context(HostContext::default().with_state(snapshot(state)))
            .build()
            .unwrap()
    }

    #[test]
    fn new_control_needs_render() {
        let mut c = control("72");
        assert!(c.needs_render());
        let p = c.render();
        assert!(!c.needs_render());
        assert_eq!(p.value(), Some(72.0));
    }

    #[test]
    fn unchanged_delivery_does_not_mark_render() {
        let mut c = control("72");
        c.render();
        let decision = c.set_host_context(c.host_context().clone());
        assert!(!decision.should_notify);
        assert!(!c.needs_render());
    }

    #[test]
    fn changed_delivery_adopts_snapshot() {
        let mut c = control("72");
        c.render();
        let next = HostContext::default().with_state(snapshot("80"));
        let decision = c.set_host_context(next);
        assert!(decision.should_notify);
        assert!(c.needs_render());
        assert_eq!(c.entity().state, "80");
        assert_eq!(c.render().value(), Some(80.0));
        assert_eq!(c.last_decision(), Some(&decision));
    }

    #[test]
    fn entity_and_mode_setters_report_changes() {
        let mut c = control("72");
        c.render();
        assert!(!c.set_entity(snapshot("72")));
        assert!(!c.needs_render());
        assert!(c.set_entity(snapshot("73")));
        assert!(c.needs_render());

        c.render();
        assert!(!c.set_display_mode(None));
        assert!(c.set_display_mode(Some(DisplayMode::Buttons)));
        assert!(c.needs_render());
    }

    #[test]
    fn unavailable_slider_is_disabled_without_value() {
        let c = control("unavailable");
        match c.view() {
            Primitive::Slider(p) => {
                assert_eq!(p.value, None);
                assert!(p.disabled);
                assert!(p.inactive);
                assert!(p.show_active);
            }
            other => panic!("expected slider, got {other:?}"),
        }
    }

    #[test]
    fn preview_then_commit_state_machine() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let mut c = NumberValueControl::builder(snapshot("40"))
            .on_service_call(move |call| calls_clone.lock().unwrap().push(call.clone()))
            .build()
            .unwrap();

        assert_eq!(c.interaction(), Interaction::Idle);
        c.on_current_change(Some(50.0));
        assert_eq!(c.interaction(), Interaction::Previewing { value: Some(50.0) });
        c.on_current_change(Some(55.0));
        assert_eq!(c.interaction(), Interaction::Previewing { value: Some(55.0) });
        assert!(calls.lock().unwrap().is_empty());

        c.on_change(55.0);
        assert_eq!(c.interaction(), Interaction::Idle);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn stepper_ignores_previews() {
        let previews = Arc::new(Mutex::new(Vec::new()));
        let previews_clone = previews.clone();
        let mut c = NumberValueControl::builder(snapshot("40"))
            .display_mode(DisplayMode::Buttons)
            .on_current_change(move |event| previews_clone.lock().unwrap().push(*event))
            .build()
            .unwrap();

        c.on_current_change(Some(45.0));
        assert_eq!(c.interaction(), Interaction::Idle);
        assert!(previews.lock().unwrap().is_empty());

        c.set_display_mode(Some(DisplayMode::Slider));
        c.on_current_change(Some(45.0));
        assert_eq!(c.interaction(), Interaction::Previewing { value: Some(45.0) });
        assert_eq!(previews.lock().unwrap().len(), 1);
    }
}
