//! Session event bus
//!
//! Observers subscribe to a typed stream of lifecycle, log, warning and error
//! events. Each subscriber gets its own unbounded queue so a slow observer
//! never blocks the diagnostic reader. Dropping a [`Subscription`]
//! unsubscribes it; [`EventBus::close`] ends every stream.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{ErrorKind, SrtcastError};
use crate::plan::PlanWarning;
use crate::session::SessionState;
use crate::types::SessionId;

/// Something observers may want to know about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// Engine process spawned
    Started {
        session: SessionId,
        pid: Option<u32>,
        /// Destination with secrets masked
        destination: String,
    },
    /// Lifecycle transition
    StateChanged {
        session: SessionId,
        from: SessionState,
        to: SessionState,
    },
    /// Engine reported a connection to the endpoint
    Connected { session: SessionId },
    /// One raw diagnostic line
    Log { session: SessionId, line: String },
    /// Non-fatal condition, such as a protocol downgrade
    Warning {
        session: Option<SessionId>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        plan: Option<PlanWarning>,
    },
    /// A failure, with its taxonomy bucket
    Error {
        session: Option<SessionId>,
        kind: ErrorKind,
        detail: String,
    },
    /// Engine process gone and session terminal
    Ended {
        session: SessionId,
        exit_code: Option<i32>,
        state: SessionState,
    },
}

impl SessionEvent {
    /// Error event for a failed operation
    pub fn error(session: Option<SessionId>, err: &SrtcastError) -> Self {
        Self::Error {
            session,
            kind: err.kind(),
            detail: err.to_string(),
        }
    }

    /// Warning event for a plan note
    pub fn plan_warning(session: Option<SessionId>, warning: &PlanWarning) -> Self {
        Self::Warning {
            session,
            message: warning.to_string(),
            plan: Some(warning.clone()),
        }
    }

    /// Short event name, matching the serialized tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::StateChanged { .. } => "state-changed",
            Self::Connected { .. } => "connected",
            Self::Log { .. } => "log",
            Self::Warning { .. } => "warning",
            Self::Error { .. } => "error",
            Self::Ended { .. } => "ended",
        }
    }
}

struct BusInner {
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<SessionEvent>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Fan-out point for session events
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Start receiving events published from now on
    ///
    /// After [`close`](Self::close) the subscription ends immediately.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        // Checked under the lock so a racing close() cannot miss this one
        let mut subscribers = self.inner.subscribers.lock();
        if !self.inner.closed.load(Ordering::Acquire) {
            subscribers.insert(id, tx);
        }
        drop(subscribers);

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Stop delivering to a subscriber
    pub fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.lock().remove(&id);
    }

    /// Deliver an event to every live subscriber
    pub fn publish(&self, event: SessionEvent) {
        trace!("Event: {}", event.name());
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// End every subscription and refuse new ones
    pub fn close(&self) {
        let mut subscribers = self.inner.subscribers.lock();
        self.inner.closed.store(true, Ordering::Release);
        subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// Receiving end of an [`EventBus`] subscription
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, `None` once the bus is closed or dropped
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.subscribers.lock().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(line: &str) -> SessionEvent {
        SessionEvent::Log {
            session: SessionId::next(),
            line: line.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(log("hello"));

        assert!(matches!(a.recv().await, Some(SessionEvent::Log { line, .. }) if line == "hello"));
        assert!(matches!(b.recv().await, Some(SessionEvent::Log { line, .. }) if line == "hello"));
    }

    #[test]
    fn test_recv_wakes_on_publish() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        let mut recv = tokio_test::task::spawn(sub.recv());
        tokio_test::assert_pending!(recv.poll());

        bus.publish(log("late"));
        assert!(recv.is_woken());
        let event = tokio_test::assert_ready!(recv.poll());
        assert!(matches!(event, Some(SessionEvent::Log { line, .. }) if line == "late"));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.unsubscribe(sub.id());
        bus.publish(log("missed"));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.close();
        assert!(sub.recv().await.is_none());

        let mut late = bus.subscribe();
        assert!(late.recv().await.is_none());
        assert!(bus.is_closed());
    }

    #[test]
    fn test_close_racing_subscribe_leaves_no_subscriber() {
        for _ in 0..50 {
            let bus = EventBus::new();
            let subscriber = {
                let bus = bus.clone();
                std::thread::spawn(move || (0..100).map(|_| bus.subscribe()).collect::<Vec<_>>())
            };
            bus.close();
            let subs = subscriber.join().unwrap();

            assert_eq!(bus.subscriber_count(), 0);
            assert_eq!(subs.len(), 100);
        }
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = SessionEvent::Error {
            session: None,
            kind: ErrorKind::SessionBusy,
            detail: "busy".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"error\""));
        assert!(json.contains("\"kind\":\"session-busy\""));
    }
}
