//! The in-process event bus: bounded queue, worker pool, and synchronous fast path.
//!
//! # Architecture
//!
//! ```text
//! publish() ──sync──────────────────────────────► handlers (caller's thread)
//!           └─async──► bounded mpsc channel ──► worker 0 ──► handler / main-thread executor
//!                                            └─► worker 1 ──► handler / main-thread executor
//!                                            └─► worker N ──► handler / main-thread executor
//! ```
//!
//! Workers share one [`tokio::sync::mpsc::Receiver`] behind an `Arc<tokio::sync::Mutex<..>>`
//! so each `recv` is exclusive but uncontended in the common case — this is the
//! literal reading of "model each worker as a parallel task draining a channel".

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::collaborators::MainThreadExecutor;
use crate::error::{EventBusError, EventBusResult};
use crate::event::model::{Event, Subscription, WILDCARD, requires_main_thread};

/// Default bounded-queue capacity (`event_bus_manager.max_queue_size`).
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
/// Default worker pool size (`event_bus_manager.thread_pool_size`).
pub const DEFAULT_THREAD_POOL_SIZE: usize = 4;
/// Default publish timeout, in milliseconds (`event_bus_manager.publish_timeout`).
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;
/// Maximum time the bus waits for in-flight work to drain on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bus lifecycle state, per §4.1's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// Constructed but not yet started.
    Uninitialized,
    /// `start()` has completed; queue and workers exist but idle.
    Initialized,
    /// Workers are actively draining the queue.
    Running,
    /// `shutdown()` has been called; no new work is accepted, queue is draining.
    Draining,
    /// Workers joined, subscriptions cleared.
    Stopped,
}

/// Read-only snapshot returned by [`EventBus::status`].
#[derive(Debug, Clone)]
pub struct BusStatus {
    /// Number of work items currently queued.
    pub queue_size: usize,
    /// Configured bounded-queue capacity.
    pub queue_capacity: usize,
    /// Whether the queue is currently at capacity.
    pub queue_full: bool,
    /// Configured worker count.
    pub worker_count: usize,
    /// Total subscriptions per event type (including the wildcard bucket under `"*"`).
    pub subscription_totals: HashMap<String, usize>,
}

/// The only runtime-mutable subset of the bus configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventBusPatch {
    /// New `publish_timeout`, if set.
    pub publish_timeout_ms: Option<u64>,
}

type WorkItem = (Arc<Event>, Vec<Subscription>);

struct SubscriptionStore {
    by_type: RwLock<HashMap<String, HashMap<String, Subscription>>>,
}

impl SubscriptionStore {
    fn new() -> Self {
        Self {
            by_type: RwLock::new(HashMap::new()),
        }
    }

    async fn insert(&self, sub: Subscription) {
        let mut guard = self.by_type.write().await;
        guard
            .entry(sub.event_type.clone())
            .or_default()
            .insert(sub.subscriber_id.clone(), sub);
    }

    async fn remove(&self, subscriber_id: &str, event_type: Option<&str>) -> bool {
        let mut guard = self.by_type.write().await;
        match event_type {
            Some(ty) => guard
                .get_mut(ty)
                .map(|bucket| bucket.remove(subscriber_id).is_some())
                .unwrap_or(false),
            None => {
                let mut removed = false;
                for bucket in guard.values_mut() {
                    if bucket.remove(subscriber_id).is_some() {
                        removed = true;
                    }
                }
                removed
            }
        }
    }

    /// Snapshots matching subscriptions for `event` without holding the lock
    /// during handler invocation.
    async fn matching(&self, event: &Event) -> Vec<Subscription> {
        let guard = self.by_type.read().await;
        let mut out = Vec::new();
        if let Some(bucket) = guard.get(&event.event_type) {
            out.extend(bucket.values().cloned());
        }
        if event.event_type != WILDCARD
            && let Some(bucket) = guard.get(WILDCARD)
        {
            out.extend(bucket.values().cloned());
        }
        out.retain(|sub| sub.matches(event));
        out
    }

    async fn totals(&self) -> HashMap<String, usize> {
        self.by_type
            .read()
            .await
            .iter()
            .map(|(ty, bucket)| (ty.clone(), bucket.len()))
            .collect()
    }
}

/// The in-process publish/subscribe event bus.
///
/// Construct with [`EventBus::new`], call [`start`](Self::start) once before
/// publishing, and [`shutdown`](Self::shutdown) to drain and stop workers.
pub struct EventBus {
    max_queue_size: usize,
    thread_pool_size: usize,
    publish_timeout_ms: AtomicU64,
    subscriptions: Arc<SubscriptionStore>,
    state: RwLock<BusState>,
    sender: RwLock<Option<mpsc::Sender<WorkItem>>>,
    receiver: Mutex<Option<Arc<Mutex<mpsc::Receiver<WorkItem>>>>>,
    in_flight: Arc<AtomicUsize>,
    main_thread: Option<Arc<dyn MainThreadExecutor>>,
    worker_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl EventBus {
    /// Builds a new bus with the given configuration. Call [`start`](Self::start)
    /// before publishing.
    pub fn new(
        max_queue_size: usize,
        thread_pool_size: usize,
        publish_timeout_ms: u64,
        main_thread: Option<Arc<dyn MainThreadExecutor>>,
    ) -> Self {
        Self {
            max_queue_size,
            thread_pool_size,
            publish_timeout_ms: AtomicU64::new(publish_timeout_ms),
            subscriptions: Arc::new(SubscriptionStore::new()),
            state: RwLock::new(BusState::Uninitialized),
            sender: RwLock::new(None),
            receiver: Mutex::new(None),
            in_flight: Arc::new(AtomicUsize::new(0)),
            main_thread,
            worker_handles: Mutex::new(Vec::new()),
        }
    }

    /// Builds a bus using the spec's default configuration.
    pub fn with_defaults(main_thread: Option<Arc<dyn MainThreadExecutor>>) -> Self {
        Self::new(
            DEFAULT_MAX_QUEUE_SIZE,
            DEFAULT_THREAD_POOL_SIZE,
            DEFAULT_PUBLISH_TIMEOUT_MS,
            main_thread,
        )
    }

    /// Allocates the channel and spawns the worker pool.
    ///
    /// Idempotent: calling `start` again while already `Initialized` or
    /// `Running` is a no-op.
    pub async fn start(self: &Arc<Self>) {
        {
            let state = self.state.read().await;
            if !matches!(*state, BusState::Uninitialized | BusState::Stopped) {
                return;
            }
        }

        let (tx, rx) = mpsc::channel(self.max_queue_size);
        *self.sender.write().await = Some(tx);
        let shared_rx = Arc::new(Mutex::new(rx));
        *self.receiver.lock().await = Some(Arc::clone(&shared_rx));

        let mut handles = Vec::with_capacity(self.thread_pool_size);
        for worker_id in 0..self.thread_pool_size {
            let rx = Arc::clone(&shared_rx);
            let main_thread = self.main_thread.clone();
            let in_flight = Arc::clone(&self.in_flight);
            handles.push(tokio::spawn(Self::worker_loop(
                worker_id, rx, main_thread, in_flight,
            )));
        }
        *self.worker_handles.lock().await = handles;
        *self.state.write().await = BusState::Running;
        debug!(workers = self.thread_pool_size, queue = self.max_queue_size, "event bus started");
    }

    async fn worker_loop(
        worker_id: usize,
        rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
        main_thread: Option<Arc<dyn MainThreadExecutor>>,
        in_flight: Arc<AtomicUsize>,
    ) {
        loop {
            let item = {
                let mut guard = rx.lock().await;
                guard.recv().await
            };
            let Some((event, subs)) = item else {
                debug!(worker_id, "event bus worker shutting down: channel closed");
                return;
            };
            in_flight.fetch_add(1, Ordering::SeqCst);
            for sub in subs {
                dispatch_one(&event, &sub, main_thread.as_deref()).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Publishes an event, returning its generated id.
    ///
    /// `synchronous = true` bypasses the queue entirely and invokes every
    /// matching handler on the caller's task, in snapshot order.
    pub async fn publish(
        &self,
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: HashMap<String, Value>,
        correlation_id: Option<String>,
        synchronous: bool,
    ) -> EventBusResult<String> {
        let state = *self.state.read().await;
        match state {
            BusState::Uninitialized | BusState::Initialized => {
                return Err(EventBusError::NotRunning {
                    state: state_name(state),
                });
            }
            BusState::Draining | BusState::Stopped => return Err(EventBusError::ShuttingDown),
            BusState::Running => {}
        }

        let event = Arc::new(Event::new(event_type, source, payload, correlation_id));
        let event_id = event.event_id.clone();
        let matching = self.subscriptions.matching(&event).await;

        if synchronous {
            for sub in matching {
                dispatch_one(&event, &sub, self.main_thread.as_deref()).await;
            }
            return Ok(event_id);
        }

        let sender = {
            let guard = self.sender.read().await;
            guard.clone()
        };
        let Some(sender) = sender else {
            return Err(EventBusError::NotRunning {
                state: state_name(state),
            });
        };

        let timeout = Duration::from_millis(self.publish_timeout_ms.load(Ordering::Relaxed));
        match tokio::time::timeout(timeout, sender.send((event, matching))).await {
            Ok(Ok(())) => Ok(event_id),
            Ok(Err(_)) => Err(EventBusError::ShuttingDown),
            Err(_) => Err(EventBusError::PublishTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Registers a subscription, generating a `subscriber_id` when `subscriber_id`
    /// is `None`.
    pub async fn subscribe(
        &self,
        event_type: impl Into<String>,
        callback: crate::event::model::SubscriptionCallback,
        subscriber_id: Option<String>,
        filter_criteria: Option<HashMap<String, Value>>,
    ) -> String {
        let subscriber_id = subscriber_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let sub = Subscription {
            subscriber_id: subscriber_id.clone(),
            event_type: event_type.into(),
            callback,
            filter_criteria,
        };
        self.subscriptions.insert(sub).await;
        subscriber_id
    }

    /// Removes a subscription from one event type, or from every type when
    /// `event_type` is `None`. Returns whether anything was removed.
    pub async fn unsubscribe(&self, subscriber_id: &str, event_type: Option<&str>) -> bool {
        self.subscriptions.remove(subscriber_id, event_type).await
    }

    /// Returns a point-in-time snapshot of bus statistics.
    pub async fn status(&self) -> BusStatus {
        let queue_size = {
            let guard = self.receiver.lock().await;
            match guard.as_ref() {
                Some(rx) => {
                    let rx = rx.lock().await;
                    self.max_queue_size - rx.capacity()
                }
                None => 0,
            }
        };
        BusStatus {
            queue_size,
            queue_capacity: self.max_queue_size,
            queue_full: queue_size >= self.max_queue_size,
            worker_count: self.thread_pool_size,
            subscription_totals: self.subscriptions.totals().await,
        }
    }

    /// Applies a live-mutable configuration patch.
    ///
    /// `max_queue_size` and `thread_pool_size` are read-only at runtime per
    /// the spec; only `publish_timeout` may change without a restart.
    pub fn reconfigure(&self, patch: EventBusPatch) {
        if let Some(ms) = patch.publish_timeout_ms {
            self.publish_timeout_ms.store(ms, Ordering::Relaxed);
        }
    }

    /// Signals shutdown, waits up to 5s for in-flight work to drain, joins
    /// workers, and clears subscriptions.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().await;
            if matches!(*state, BusState::Stopped | BusState::Uninitialized) {
                return;
            }
            *state = BusState::Draining;
        }

        // Dropping the sender closes the channel once all in-flight sends land,
        // which lets workers exit their recv loop once the queue is empty.
        *self.sender.write().await = None;

        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while self.in_flight.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            warn!("event bus shutdown: drain timeout elapsed with handlers still in flight");
        }

        let handles = std::mem::take(&mut *self.worker_handles.lock().await);
        for handle in handles {
            handle.abort();
        }

        *self.subscriptions.by_type.write().await = HashMap::new();
        *self.state.write().await = BusState::Stopped;
        debug!("event bus stopped");
    }
}

fn state_name(state: BusState) -> &'static str {
    match state {
        BusState::Uninitialized => "uninitialized",
        BusState::Initialized => "initialized",
        BusState::Running => "running",
        BusState::Draining => "draining",
        BusState::Stopped => "stopped",
    }
}

async fn dispatch_one(event: &Arc<Event>, sub: &Subscription, main_thread: Option<&dyn MainThreadExecutor>) {
    let callback = sub.callback.clone();
    let event = Arc::clone(event);
    let subscriber_id = sub.subscriber_id.clone();
    let event_id = event.event_id.clone();

    let run = {
        let event = Arc::clone(&event);
        move || callback(event)
    };

    if requires_main_thread(&event.event_type) {
        match main_thread {
            Some(executor) => {
                executor.run_on_main_thread(Box::pin(async move { run().await }));
                return;
            }
            None => {
                warn!(
                    event_id,
                    subscriber_id,
                    event_type = %event.event_type,
                    "no main-thread executor configured, dispatching in-worker"
                );
            }
        }
    }

    // Handler panics/failures are caught at the boundary so they never
    // propagate to the publisher; callbacks that can fail report their own
    // errors (e.g. by publishing a plugin/error event).
    let fut = std::panic::AssertUnwindSafe(run());
    if let Err(panic) = futures::FutureExt::catch_unwind(fut).await {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(event_id, subscriber_id, reason, "subscription handler panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    fn payload(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn sync_publish_invokes_matching_handlers_in_order() {
        let bus = Arc::new(EventBus::with_defaults(None));
        bus.start().await;

        let calls = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let calls_clone = Arc::clone(&calls);
        bus.subscribe(
            WILDCARD,
            Arc::new(move |event| {
                let calls = Arc::clone(&calls_clone);
                Box::pin(async move {
                    calls.lock().await.push(event.event_type.clone());
                })
            }),
            None,
            None,
        )
        .await;

        bus.publish("a/one", "test", payload(&[]), None, true)
            .await
            .unwrap();
        bus.publish("a/two", "test", payload(&[]), None, true)
            .await
            .unwrap();

        assert_eq!(*calls.lock().await, vec!["a/one", "a/two"]);
    }

    #[tokio::test]
    async fn async_publish_dispatches_via_worker_pool() {
        let bus = Arc::new(EventBus::new(10, 2, 1000, None));
        bus.start().await;

        let count = Arc::new(StdAtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        bus.subscribe(
            "plugin/loaded",
            Arc::new(move |_event| {
                let count = Arc::clone(&count_clone);
                Box::pin(async move {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            }),
            None,
            None,
        )
        .await;

        for _ in 0..5 {
            bus.publish("plugin/loaded", "test", payload(&[]), None, false)
                .await
                .unwrap();
        }

        bus.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn publish_before_start_is_rejected() {
        let bus = EventBus::with_defaults(None);
        let result = bus
            .publish("a/b", "test", payload(&[]), None, true)
            .await;
        assert!(matches!(result, Err(EventBusError::NotRunning { .. })));
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let bus = Arc::new(EventBus::with_defaults(None));
        bus.start().await;

        let count = Arc::new(StdAtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let id = bus
            .subscribe(
                "a/b",
                Arc::new(move |_e| {
                    let count = Arc::clone(&count_clone);
                    Box::pin(async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    })
                }),
                Some("s1".to_string()),
                None,
            )
            .await;

        bus.publish("a/b", "test", payload(&[]), None, true).await.unwrap();
        assert!(bus.unsubscribe(&id, None).await);
        bus.publish("a/b", "test", payload(&[]), None, true).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queue_full_fails_publish_after_timeout() {
        let bus = Arc::new(EventBus::new(1, 0, 10, None));
        bus.start().await;

        bus.publish("a/b", "test", payload(&[]), None, false)
            .await
            .unwrap();
        let result = bus.publish("a/b", "test", payload(&[]), None, false).await;
        assert!(matches!(result, Err(EventBusError::PublishTimeout { .. })));
    }
}
