//! Typed publish/subscribe for build progress
//!
//! Queens, workers and the merge controller publish [`BuildEvent`]s here; an
//! external observer (a streaming UI, an audit log) subscribes per
//! [`EventKind`] or to everything. Handlers run synchronously inside
//! `publish`, in registration order, exactly once per event.
//!
//! The bus holds no history. Events published with no subscriber are dropped.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// Name of an event, used to subscribe to a single kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskRouted,
    WorkerStarted,
    WorkerCompleted,
    WorkerFailed,
    MergeStarted,
    MergeStatusChanged,
    GateCompleted,
    MergeApproved,
    MergeRejected,
    MergeCompleted,
    MergeFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskRouted => "task_routed",
            Self::WorkerStarted => "worker_started",
            Self::WorkerCompleted => "worker_completed",
            Self::WorkerFailed => "worker_failed",
            Self::MergeStarted => "merge_started",
            Self::MergeStatusChanged => "merge_status_changed",
            Self::GateCompleted => "gate_completed",
            Self::MergeApproved => "merge_approved",
            Self::MergeRejected => "merge_rejected",
            Self::MergeCompleted => "merge_completed",
            Self::MergeFailed => "merge_failed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    /// A queen decided where a task runs (`worker` is `None` for direct execution)
    TaskRouted {
        task_id: String,
        domain: String,
        worker: Option<String>,
        score: usize,
    },
    WorkerStarted {
        task_id: String,
        worker_id: String,
        specialization: String,
    },
    WorkerCompleted {
        task_id: String,
        worker_id: String,
        artifact_count: usize,
        failed_validation: usize,
    },
    WorkerFailed {
        task_id: String,
        worker_id: String,
        error: String,
    },
    MergeStarted {
        request_id: String,
        task_id: String,
        file_count: usize,
    },
    MergeStatusChanged {
        request_id: String,
        from: String,
        to: String,
    },
    GateCompleted {
        request_id: String,
        gate: String,
        gate_number: usize,
        passed: bool,
        score: Option<f64>,
        details: String,
        error: Option<String>,
    },
    MergeApproved {
        request_id: String,
        gates_passed: usize,
    },
    MergeRejected {
        request_id: String,
        failed_checks: Vec<String>,
    },
    MergeCompleted {
        request_id: String,
        merged_files: Vec<String>,
    },
    MergeFailed {
        request_id: String,
        error: String,
    },
}

impl BuildEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TaskRouted { .. } => EventKind::TaskRouted,
            Self::WorkerStarted { .. } => EventKind::WorkerStarted,
            Self::WorkerCompleted { .. } => EventKind::WorkerCompleted,
            Self::WorkerFailed { .. } => EventKind::WorkerFailed,
            Self::MergeStarted { .. } => EventKind::MergeStarted,
            Self::MergeStatusChanged { .. } => EventKind::MergeStatusChanged,
            Self::GateCompleted { .. } => EventKind::GateCompleted,
            Self::MergeApproved { .. } => EventKind::MergeApproved,
            Self::MergeRejected { .. } => EventKind::MergeRejected,
            Self::MergeCompleted { .. } => EventKind::MergeCompleted,
            Self::MergeFailed { .. } => EventKind::MergeFailed,
        }
    }

    /// Task id or merge request id the event belongs to
    pub fn subject_id(&self) -> &str {
        match self {
            Self::TaskRouted { task_id, .. }
            | Self::WorkerStarted { task_id, .. }
            | Self::WorkerCompleted { task_id, .. }
            | Self::WorkerFailed { task_id, .. } => task_id,
            Self::MergeStarted { request_id, .. }
            | Self::MergeStatusChanged { request_id, .. }
            | Self::GateCompleted { request_id, .. }
            | Self::MergeApproved { request_id, .. }
            | Self::MergeRejected { request_id, .. }
            | Self::MergeCompleted { request_id, .. }
            | Self::MergeFailed { request_id, .. } => request_id,
        }
    }

    /// JSON payload handed to external observers
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event callback
pub type EventHandler = Arc<dyn Fn(&BuildEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    /// `None` receives every kind
    kind: Option<EventKind>,
    handler: EventHandler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Typed observer list shared by every publisher of a run
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&BuildEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Subscribe to every event kind
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&BuildEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    /// Stream every event through an unbounded channel
    ///
    /// Unsubscribe with the returned id once the receiver is dropped.
    pub fn channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<BuildEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe_all(move |event| {
            // Receiver gone; the subscription is inert until unsubscribed.
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        let before = registry.subscribers.len();
        registry.subscribers.retain(|s| s.id != id);
        registry.subscribers.len() != before
    }

    /// Deliver an event to every matching subscriber
    pub fn publish(&self, event: BuildEvent) {
        let kind = event.kind();

        // Snapshot handlers so a handler may (un)subscribe without deadlocking.
        let handlers: Vec<EventHandler> = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            registry
                .subscribers
                .iter()
                .filter(|s| s.kind.map_or(true, |k| k == kind))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        debug!(
            "Publishing {} for {} to {} subscriber(s)",
            kind,
            event.subject_id(),
            handlers.len()
        );

        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        registry.subscribers.len()
    }

    fn register(&self, kind: Option<EventKind>, handler: EventHandler) -> SubscriptionId {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.subscribers.push(Subscriber { id, kind, handler });
        id
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn approved(id: &str) -> BuildEvent {
        BuildEvent::MergeApproved {
            request_id: id.to_string(),
            gates_passed: 7,
        }
    }

    fn failed(id: &str) -> BuildEvent {
        BuildEvent::MergeFailed {
            request_id: id.to_string(),
            error: "boom".to_string(),
        }
    }

    #[test]
    fn test_subscribe_filters_by_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(EventKind::MergeApproved, move |e| {
            sink.lock().unwrap().push(e.subject_id().to_string());
        });

        bus.publish(approved("m-1"));
        bus.publish(failed("m-2"));
        bus.publish(approved("m-3"));

        assert_eq!(*seen.lock().unwrap(), vec!["m-1", "m-3"]);
    }

    #[test]
    fn test_delivery_order_and_exactly_once() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let sink = Arc::clone(&seen);
            bus.subscribe_all(move |e| {
                sink.lock()
                    .unwrap()
                    .push(format!("{}:{}", label, e.subject_id()));
            });
        }

        bus.publish(approved("m-1"));

        assert_eq!(*seen.lock().unwrap(), vec!["first:m-1", "second:m-1"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));

        let sink = Arc::clone(&count);
        let id = bus.subscribe_all(move |_| *sink.lock().unwrap() += 1);

        bus.publish(approved("m-1"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(approved("m-2"));

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_receives_in_order() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.channel();

        bus.publish(approved("m-1"));
        bus.publish(failed("m-1"));

        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::MergeApproved);
        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::MergeFailed);
    }

    #[test]
    fn test_to_json_is_tagged() {
        let json = approved("m-1").to_json();
        assert_eq!(json["event"], "merge_approved");
        assert_eq!(json["request_id"], "m-1");
        assert_eq!(json["gates_passed"], 7);
    }
}
