use chrono::{Duration, Utc};
use number_value_control::{DisplayMode, EntitySnapshot, HostContext, NumberValueControl};

/// Feeds a short scripted session through the control and prints what the
/// host would paint and send.
///
/// Run with: cargo run --example replay
fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let start = Utc::now();
    let entity = |state: &str, offset: i64| {
        EntitySnapshot::new("number.kitchen_brightness", state, start + Duration::seconds(offset))
            .with_attribute("min", 0)
            .with_attribute("max", 100)
            .with_attribute("step", 1)
    };
    let hass = |snapshot: EntitySnapshot| {
        HostContext {
            connected: true,
            language: "en".into(),
            ..Default::default()
        }
        .with_state(snapshot)
    };

    let mut control = match NumberValueControl::builder(entity("40", 0))
        .host_context(hass(entity("40", 0)))
        .on_service_call(|call| println!("-> {}.{} {}", call.domain, call.service, call.payload()))
        .on_current_change(|event| println!("~ current-change {:?}", event.value))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to build control: {e}");
            return;
        }
    };

    println!("{:?}", control.render());

    control.set_host_context(hass(entity("40", 0)));
    println!("quiet delivery, needs render: {}", control.needs_render());

    control.on_current_change(Some(45.0));
    control.on_current_change(Some(52.0));
    control.on_change(52.0);

    control.set_host_context(hass(entity("52", 1)));
    if control.needs_render() {
        println!("{:?}", control.render());
    }

    control.set_display_mode(Some(DisplayMode::Buttons));
    println!("{:?}", control.render());
}
