//! A detail observable created in a foreign realm is reported through
//! `tracing` and otherwise accepted.

use std::sync::{Arc, Mutex};

use tether_core::{ObservableValue, Realm, ValueType, WritableValue};
use tether_detail::DetailObservableValue;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

#[derive(Default)]
struct Captured {
    warnings: Vec<(String, Option<String>, Option<String>)>,
}

struct WarnCapture {
    state: Arc<Mutex<Captured>>,
}

impl<S> Layer<S> for WarnCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != tracing::Level::WARN {
            return;
        }
        #[derive(Default)]
        struct Fields {
            message: Option<String>,
            outer: Option<String>,
            detail: Option<String>,
        }
        impl tracing::field::Visit for Fields {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                let rendered = format!("{value:?}").trim_matches('"').to_string();
                match field.name() {
                    "message" => self.message = Some(rendered),
                    "outer_realm" => self.outer = Some(rendered),
                    "detail_realm" => self.detail = Some(rendered),
                    _ => {}
                }
            }
        }
        let mut fields = Fields::default();
        event.record(&mut fields);
        if let Some(message) = fields.message {
            self.state
                .lock()
                .expect("capture lock")
                .warnings
                .push((message, fields.outer, fields.detail));
        }
    }
}

fn capture() -> (Arc<Mutex<Captured>>, tracing::subscriber::DefaultGuard) {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(WarnCapture {
        state: Arc::clone(&state),
    });
    (state, tracing::subscriber::set_default(subscriber))
}

#[test]
fn foreign_realm_detail_warns_and_still_works() {
    let (state, _guard) = capture();
    let home = Realm::new("home");
    let away = Realm::new("away");
    let master = WritableValue::in_realm(&home, Some(3_u32), None);
    let away_for_factory = away.clone();
    let detail = DetailObservableValue::new(
        master.share(),
        move |n: &u32| {
            WritableValue::in_realm(&away_for_factory, n * 2, Some(ValueType::of::<u32>())).share()
        },
        Some(ValueType::of::<u32>()),
    )
    .expect("live master");

    assert_eq!(detail.get(), Some(6));
    let captured = state.lock().expect("capture lock");
    assert_eq!(captured.warnings.len(), 1);
    let (message, outer, inner) = &captured.warnings[0];
    assert_eq!(
        message,
        "detail observable realm differs from its container realm"
    );
    assert_eq!(outer.as_deref(), Some(home.to_string().as_str()));
    assert_eq!(inner.as_deref(), Some(away.to_string().as_str()));
}

#[test]
fn same_realm_detail_is_silent() {
    let (state, _guard) = capture();
    let realm = Realm::new("shared");
    let _override = Realm::push_default(&realm);
    let master = WritableValue::new(Some(1_u32));
    let detail = DetailObservableValue::new(
        master.share(),
        |n: &u32| WritableValue::new(*n).share(),
        None,
    )
    .expect("live master");

    master.set(Some(2)).expect("set");
    assert_eq!(detail.get(), Some(2));
    assert!(state.lock().expect("capture lock").warnings.is_empty());
}
