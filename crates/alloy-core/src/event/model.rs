//! Event and subscription data model.
//!
//! - [`Event`] — immutable record published onto the [`EventBus`](crate::event::EventBus).
//! - [`Subscription`] — a registered interest in one event type (or the `*` wildcard),
//!   optionally narrowed by `filter_criteria`.
//!
//! Neither type carries behaviour beyond the pure [`Subscription::matches`] predicate;
//! dispatch lives in [`crate::event::bus`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

/// An immutable event record flowing through the bus.
///
/// Constructed once by [`EventBus::publish`](crate::event::EventBus::publish) and
/// never mutated afterwards; workers hold shared references (`Arc<Event>`)
/// concurrently.
#[derive(Debug, Clone)]
pub struct Event {
    /// Slash-delimited type string, e.g. `plugin/loaded` or `plugin/my_plugin/tick`.
    pub event_type: String,
    /// Unique id generated at construction, unless the caller supplied `source`-scoped
    /// correlation via `correlation_id` instead.
    pub event_id: String,
    /// Wall-clock creation time.
    pub timestamp: SystemTime,
    /// Opaque tag identifying the producer (usually a plugin name).
    pub source: String,
    /// Arbitrary event data.
    pub payload: HashMap<String, Value>,
    /// Optional id correlating this event with a causally-related one.
    pub correlation_id: Option<String>,
}

impl Event {
    /// Builds a new event, generating a fresh `event_id`.
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: HashMap<String, Value>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            event_id: Uuid::new_v4().to_string(),
            timestamp: SystemTime::now(),
            source: source.into(),
            payload,
            correlation_id,
        }
    }
}

/// The wildcard event-type token. Subscriptions registered under this key
/// receive every published event regardless of its `event_type`.
pub const WILDCARD: &str = "*";

/// A callback invoked by the bus when a matching event is dispatched.
///
/// Callbacks are plain async closures over an owned [`Event`]; they never
/// return a `Result` because the bus itself is responsible for catching and
/// logging failures (per the spec's "handler exceptions never propagate"
/// propagation policy) — callbacks that can fail should report their own
/// errors via the event bus (e.g. publishing a `plugin/error` event).
pub type SubscriptionCallback = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A registered interest in one event type, optionally narrowed by filter.
#[derive(Clone)]
pub struct Subscription {
    /// Caller-supplied or generated unique id for this subscription.
    pub subscriber_id: String,
    /// Exact event type to match, or [`WILDCARD`].
    pub event_type: String,
    /// The dispatch target.
    pub callback: SubscriptionCallback,
    /// Conjunctive equality constraints over the event payload.
    pub filter_criteria: Option<HashMap<String, Value>>,
}

impl Subscription {
    /// Returns `true` when `event` should be delivered to this subscription.
    ///
    /// Per the spec's testable law: matches iff (`event_type` equals the
    /// subscription's type, or the subscription is wildcard) AND every key in
    /// `filter_criteria` is present in the event payload with an equal value.
    /// Value comparison is `serde_json::Value` equality: value-equal for
    /// primitives, structurally equal for arrays/objects — no attempt at
    /// "deep" semantics beyond what `Value`'s own `PartialEq` already gives.
    pub fn matches(&self, event: &Event) -> bool {
        let type_matches = self.event_type == WILDCARD || self.event_type == event.event_type;
        if !type_matches {
            return false;
        }
        match &self.filter_criteria {
            None => true,
            Some(criteria) => criteria
                .iter()
                .all(|(key, expected)| event.payload.get(key) == Some(expected)),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriber_id", &self.subscriber_id)
            .field("event_type", &self.event_type)
            .field("filter_criteria", &self.filter_criteria)
            .finish_non_exhaustive()
    }
}

/// Returns `true` when events of `event_type` must be dispatched on the
/// main-thread executor rather than in-worker.
///
/// Mirrors the reference classifier exactly: `ui/` and `log/` prefixed types
/// always require the main thread; a fixed handful of other types do too.
pub fn requires_main_thread(event_type: &str) -> bool {
    if event_type.starts_with("ui/") || event_type.starts_with("log/") {
        return true;
    }
    matches!(
        event_type,
        "monitoring/alert" | "plugin/error" | "plugin/loaded" | "plugin/unloaded"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with(event_type: &str, payload: &[(&str, Value)]) -> Event {
        Event::new(
            event_type,
            "test",
            payload
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            None,
        )
    }

    fn noop_callback() -> SubscriptionCallback {
        Arc::new(|_| Box::pin(async {}))
    }

    #[test]
    fn exact_type_without_filter_matches() {
        let sub = Subscription {
            subscriber_id: "s1".into(),
            event_type: "ui/update".into(),
            callback: noop_callback(),
            filter_criteria: None,
        };
        let ev = event_with("ui/update", &[]);
        assert!(sub.matches(&ev));
    }

    #[test]
    fn mismatched_type_never_matches() {
        let sub = Subscription {
            subscriber_id: "s1".into(),
            event_type: "ui/update".into(),
            callback: noop_callback(),
            filter_criteria: None,
        };
        let ev = event_with("ui/other", &[]);
        assert!(!sub.matches(&ev));
    }

    #[test]
    fn wildcard_matches_any_type() {
        let sub = Subscription {
            subscriber_id: "s1".into(),
            event_type: WILDCARD.into(),
            callback: noop_callback(),
            filter_criteria: None,
        };
        assert!(sub.matches(&event_with("plugin/loaded", &[])));
        assert!(sub.matches(&event_with("anything/else", &[])));
    }

    #[test]
    fn filter_requires_every_key_present_and_equal() {
        let mut criteria = HashMap::new();
        criteria.insert("panel".to_string(), Value::String("main".into()));
        let sub = Subscription {
            subscriber_id: "s1".into(),
            event_type: "ui/update".into(),
            callback: noop_callback(),
            filter_criteria: Some(criteria),
        };

        let matching = event_with(
            "ui/update",
            &[
                ("panel", Value::String("main".into())),
                ("x", Value::from(1)),
            ],
        );
        assert!(sub.matches(&matching));

        let wrong_value = event_with("ui/update", &[("panel", Value::String("side".into()))]);
        assert!(!sub.matches(&wrong_value));

        let missing_key = event_with("ui/update", &[("x", Value::from(1))]);
        assert!(!sub.matches(&missing_key));
    }

    #[test]
    fn main_thread_classifier_matches_reference() {
        assert!(requires_main_thread("ui/ready"));
        assert!(requires_main_thread("log/error"));
        assert!(requires_main_thread("monitoring/alert"));
        assert!(requires_main_thread("plugin/loaded"));
        assert!(requires_main_thread("plugin/unloaded"));
        assert!(requires_main_thread("plugin/error"));
        assert!(!requires_main_thread("plugin/initialized"));
        assert!(!requires_main_thread("config/changed"));
    }
}
