//! The sync event bus.
//!
//! Producers enqueue [`SyncEvent`]s on a [`SyncEventQueue`]. A single
//! [`EventLoop`] owns the receiving end and offers each event, in priority
//! order, to every handler of the [`SyncEventManager`]. A handler returning
//! `Ok(true)` consumes the event; `Ok(false)` passes it on.
//!
//! ## Failure escalation
//!
//! A handler error is classified with [`SyncError::classify`]:
//!
//! | Class | Reaction |
//! |---|---|
//! | `Transient` | warn, full sync at the next scheduled round |
//! | `ObjectScoped` | warn, event dropped |
//! | `Inconsistent` | warn, full sync at the next scheduled round |
//! | `Aborted` | info, event dropped |
//! | `Unexpected` | error, immediate full sync unless one is already running |

pub mod debug;
pub mod forward;

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use docsync_core::{StartNextSyncEvent, SyncEvent};

use crate::error::{ErrorClass, Result, SyncError};

pub use debug::DebugLoggingHandler;
pub use forward::EventForwarder;

/// Handler priorities. Higher values see events first.
pub mod priority {
    /// Observers that must see every event.
    pub const DEBUG: i32 = 100_000;

    /// Producers and accumulators.
    pub const HIGHER: i32 = 3_000;

    /// Filters that drop events before they are transformed.
    pub const FILTER: i32 = 2_000;

    /// Transformers and fetchers.
    pub const NORMAL: i32 = 1_000;

    /// The situation solver, last in line.
    pub const SYNC_MECHANISM: i32 = 1;
}

/// A participant on the bus.
///
/// Handlers must ignore event kinds they do not recognize by returning
/// `Ok(false)`.
#[async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn priority(&self) -> i32;

    /// React to an event. Handlers may enrich the event in place for the
    /// handlers after them.
    async fn handle(&self, event: &mut SyncEvent) -> Result<bool>;
}

/// The failure of one handler on one event.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: &'static str,
    pub error: SyncError,
}

/// Priority-ordered handler list, fixed at construction.
pub struct SyncEventManager {
    handlers: Vec<Arc<dyn SyncEventHandler>>,
}

impl SyncEventManager {
    /// Sort `handlers` by descending priority. Ties keep registration order.
    pub fn new(mut handlers: Vec<Arc<dyn SyncEventHandler>>) -> Self {
        handlers.sort_by_key(|h| Reverse(h.priority()));
        Self { handlers }
    }

    /// Handler names in dispatch order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Offer `event` to each handler until one consumes it.
    ///
    /// Returns the name of the consuming handler, if any.
    pub async fn dispatch(&self, mut event: SyncEvent) -> std::result::Result<Option<&'static str>, HandlerFailure> {
        for handler in &self.handlers {
            match handler.handle(&mut event).await {
                Ok(true) => return Ok(Some(handler.name())),
                Ok(false) => {}
                Err(error) => {
                    return Err(HandlerFailure {
                        handler: handler.name(),
                        error,
                    })
                }
            }
        }
        Ok(None)
    }
}

enum QueueItem {
    Event(SyncEvent),
    Stop,
}

struct QueueShared {
    pending: watch::Sender<usize>,
    full_sync_requested: AtomicBool,
}

/// Sending side of the bus. Cheap to clone; producers each hold one.
#[derive(Clone)]
pub struct SyncEventQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    shared: Arc<QueueShared>,
}

/// Receiving side of the bus, consumed by [`EventLoop::new`].
pub struct SyncEventReceiver {
    rx: mpsc::UnboundedReceiver<QueueItem>,
}

impl SyncEventReceiver {
    /// Take the next queued event without waiting, for tests that drain the
    /// queue by hand.
    #[cfg(test)]
    pub(crate) fn try_recv_event(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(QueueItem::Event(event)) => return Some(event),
                Ok(QueueItem::Stop) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Wait for the next queued event.
    #[cfg(test)]
    pub(crate) async fn recv_event(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.recv().await? {
                QueueItem::Event(event) => return Some(event),
                QueueItem::Stop => continue,
            }
        }
    }
}

impl SyncEventQueue {
    pub fn new() -> (Self, SyncEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let queue = Self {
            tx,
            shared: Arc::new(QueueShared {
                pending,
                full_sync_requested: AtomicBool::new(false),
            }),
        };
        (queue, SyncEventReceiver { rx })
    }

    /// Enqueue an event. Events from one producer keep their order.
    pub fn add_event(&self, event: SyncEvent) {
        self.shared.pending.send_modify(|n| *n += 1);
        if self.tx.send(QueueItem::Event(event)).is_err() {
            self.shared.pending.send_modify(|n| *n = n.saturating_sub(1));
            tracing::debug!("event queue closed, dropping event");
        }
    }

    /// Ask the scheduler to make its next round a full sync.
    pub fn request_full_sync_later(&self) {
        self.shared.full_sync_requested.store(true, Ordering::Release);
    }

    /// Consume a pending full-sync request.
    pub fn take_full_sync_request(&self) -> bool {
        self.shared.full_sync_requested.swap(false, Ordering::AcqRel)
    }

    /// Events enqueued and not yet fully dispatched.
    pub fn pending(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Wait until every enqueued event, including the ones enqueued while
    /// waiting, has been dispatched.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.shared.pending.subscribe();
        // The sender lives in `shared`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop the event loop after the events already queued.
    pub fn stop(&self) {
        let _ = self.tx.send(QueueItem::Stop);
    }

    fn event_done(&self) {
        self.shared.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// The single consumer of the bus.
pub struct EventLoop {
    receiver: SyncEventReceiver,
    manager: SyncEventManager,
    queue: SyncEventQueue,
    full_sync_in_flight: bool,
}

impl EventLoop {
    pub fn new(receiver: SyncEventReceiver, manager: SyncEventManager, queue: SyncEventQueue) -> Self {
        Self {
            receiver,
            manager,
            queue,
            full_sync_in_flight: false,
        }
    }

    /// Dispatch events until [`SyncEventQueue::stop`] is called or every
    /// queue handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!(handlers = ?self.manager.handler_names(), "event loop started");
        while let Some(item) = self.receiver.rx.recv().await {
            match item {
                QueueItem::Event(event) => {
                    self.dispatch(event).await;
                    self.queue.event_done();
                }
                QueueItem::Stop => break,
            }
        }
        tracing::debug!("event loop stopped");
    }

    async fn dispatch(&mut self, event: SyncEvent) {
        let starts_full_sync = matches!(&event, SyncEvent::StartNextSync(e) if e.full_sync_requested);
        if starts_full_sync {
            self.full_sync_in_flight = true;
        } else if matches!(event, SyncEvent::FullSyncCompleted(_)) {
            self.full_sync_in_flight = false;
        }

        let description = event.to_string();
        if let Err(failure) = self.manager.dispatch(event).await {
            self.escalate(&description, failure);
            // No completion event follows a failed crawl; escalation has
            // already deferred the retry to the next round.
            if starts_full_sync {
                self.full_sync_in_flight = false;
            }
        }
    }

    fn escalate(&mut self, event: &str, failure: HandlerFailure) {
        let HandlerFailure { handler, error } = failure;
        match error.classify() {
            ErrorClass::Transient => {
                tracing::warn!(handler, event, error = %error, "transient failure, retrying at next sync");
                self.queue.request_full_sync_later();
            }
            ErrorClass::ObjectScoped => {
                tracing::warn!(handler, event, error = %error, "skipping object");
            }
            ErrorClass::Inconsistent => {
                tracing::warn!(handler, event, error = %error, "inconsistent state, crawl requested");
                self.queue.request_full_sync_later();
            }
            ErrorClass::Aborted => {
                tracing::info!(handler, event, "aborted");
            }
            ErrorClass::Unexpected => {
                tracing::error!(handler, event, error = %error, "unexpected failure, forcing full sync");
                if self.full_sync_in_flight {
                    self.queue.request_full_sync_later();
                } else {
                    self.full_sync_in_flight = true;
                    self.queue
                        .add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::{FullSyncCompletedEvent, RemoteId};
    use docsync_remote::RemoteError;
    use std::sync::Mutex;

    /// Records what it sees and answers with a fixed verdict.
    struct Recorder {
        name: &'static str,
        priority: i32,
        consume: bool,
        fail_with: Option<fn() -> SyncError>,
        fails_on: &'static str,
        seen: Arc<Mutex<Vec<(&'static str, String)>>>,
    }

    #[async_trait]
    impl SyncEventHandler for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
            self.seen.lock().unwrap().push((self.name, event.kind_name().to_string()));
            if let Some(make) = self.fail_with {
                if event.kind_name() == self.fails_on {
                    return Err(make());
                }
            }
            Ok(self.consume)
        }
    }

    fn recorder(
        name: &'static str,
        priority: i32,
        consume: bool,
        seen: &Arc<Mutex<Vec<(&'static str, String)>>>,
    ) -> Arc<dyn SyncEventHandler> {
        Arc::new(Recorder {
            name,
            priority,
            consume,
            fail_with: None,
            fails_on: "",
            seen: seen.clone(),
        })
    }

    fn ignored_event() -> SyncEvent {
        SyncEvent::RequestIgnored(docsync_core::RequestIgnoredEvent {
            reason: "test".into(),
            path: None,
            remote_id: Some(RemoteId::from("x")),
        })
    }

    #[tokio::test]
    async fn test_dispatch_order_and_consumption() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let manager = SyncEventManager::new(vec![
            recorder("solver", priority::SYNC_MECHANISM, true, &seen),
            recorder("filter", priority::FILTER, false, &seen),
            recorder("debug", priority::DEBUG, false, &seen),
            recorder("transformer", priority::NORMAL, true, &seen),
        ]);

        assert_eq!(
            manager.handler_names(),
            vec!["debug", "filter", "transformer", "solver"]
        );

        let consumed = manager
            .dispatch(SyncEvent::StartNextSync(StartNextSyncEvent::incremental()))
            .await
            .unwrap();
        assert_eq!(consumed, Some("transformer"));

        let names: Vec<&str> = seen.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["debug", "filter", "transformer"]);
    }

    #[tokio::test]
    async fn test_ties_keep_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let manager = SyncEventManager::new(vec![
            recorder("first", priority::NORMAL, false, &seen),
            recorder("second", priority::NORMAL, false, &seen),
        ]);
        assert_eq!(manager.handler_names(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unexpected_failure_forces_full_sync() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let failing: Arc<dyn SyncEventHandler> = Arc::new(Recorder {
            name: "failing",
            priority: priority::NORMAL,
            consume: false,
            fail_with: Some(|| SyncError::Remote(RemoteError::NotSupported("x"))),
            fails_on: "RequestIgnored",
            seen: seen.clone(),
        });
        let (queue, receiver) = SyncEventQueue::new();
        let event_loop = EventLoop::new(receiver, SyncEventManager::new(vec![failing]), queue.clone());
        let task = tokio::spawn(event_loop.run());

        queue.add_event(ignored_event());
        queue.wait_until_idle().await;

        let kinds: Vec<String> = seen.lock().unwrap().iter().map(|(_, k)| k.clone()).collect();
        assert_eq!(kinds, vec!["RequestIgnored", "StartNextSync"]);
        assert!(!queue.take_full_sync_request());

        queue.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_failure_defers_full_sync() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let failing: Arc<dyn SyncEventHandler> = Arc::new(Recorder {
            name: "failing",
            priority: priority::NORMAL,
            consume: false,
            fail_with: Some(|| SyncError::Remote(RemoteError::Timeout)),
            fails_on: "RequestIgnored",
            seen: seen.clone(),
        });
        let (queue, receiver) = SyncEventQueue::new();
        let task = tokio::spawn(
            EventLoop::new(receiver, SyncEventManager::new(vec![failing]), queue.clone()).run(),
        );

        queue.add_event(ignored_event());
        queue.wait_until_idle().await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(queue.take_full_sync_request());
        assert!(!queue.take_full_sync_request());

        queue.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_during_full_sync_is_deferred() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let failing: Arc<dyn SyncEventHandler> = Arc::new(Recorder {
            name: "failing",
            priority: priority::NORMAL,
            consume: false,
            fail_with: Some(|| SyncError::Remote(RemoteError::NotSupported("x"))),
            fails_on: "RequestIgnored",
            seen: seen.clone(),
        });
        let (queue, receiver) = SyncEventQueue::new();
        let task = tokio::spawn(
            EventLoop::new(receiver, SyncEventManager::new(vec![failing]), queue.clone()).run(),
        );

        queue.add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
        queue.add_event(ignored_event());
        queue.add_event(SyncEvent::FullSyncCompleted(FullSyncCompletedEvent { start_token: None }));
        queue.wait_until_idle().await;

        assert_eq!(seen.lock().unwrap().len(), 3);
        assert!(queue.take_full_sync_request());

        queue.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_crawl_clears_full_sync_in_flight() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let crawler: Arc<dyn SyncEventHandler> = Arc::new(Recorder {
            name: "crawler",
            priority: priority::HIGHER,
            consume: false,
            fail_with: Some(|| SyncError::Remote(RemoteError::Timeout)),
            fails_on: "StartNextSync",
            seen: seen.clone(),
        });
        let solver: Arc<dyn SyncEventHandler> = Arc::new(Recorder {
            name: "solver",
            priority: priority::SYNC_MECHANISM,
            consume: false,
            fail_with: Some(|| SyncError::Remote(RemoteError::NotSupported("x"))),
            fails_on: "RequestIgnored",
            seen: seen.clone(),
        });
        let (queue, receiver) = SyncEventQueue::new();
        let task = tokio::spawn(
            EventLoop::new(receiver, SyncEventManager::new(vec![crawler, solver]), queue.clone()).run(),
        );

        queue.add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
        queue.wait_until_idle().await;
        assert!(queue.take_full_sync_request());

        // The crawl never completed, so an unexpected failure starts a new one.
        queue.add_event(ignored_event());
        queue.wait_until_idle().await;

        let seen: Vec<(&str, String)> = seen.lock().unwrap().clone();
        let expected = [
            ("crawler", "StartNextSync"),
            ("crawler", "RequestIgnored"),
            ("solver", "RequestIgnored"),
            ("crawler", "StartNextSync"),
        ];
        assert_eq!(seen.len(), expected.len(), "seen: {:?}", seen);
        for ((name, kind), (want_name, want_kind)) in seen.iter().zip(expected) {
            assert_eq!((*name, kind.as_str()), (want_name, want_kind));
        }
        assert!(queue.take_full_sync_request());

        queue.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_crawl_failure_does_not_loop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let crawler: Arc<dyn SyncEventHandler> = Arc::new(Recorder {
            name: "crawler",
            priority: priority::HIGHER,
            consume: false,
            fail_with: Some(|| SyncError::Remote(RemoteError::NotSupported("x"))),
            fails_on: "StartNextSync",
            seen: seen.clone(),
        });
        let (queue, receiver) = SyncEventQueue::new();
        let task = tokio::spawn(
            EventLoop::new(receiver, SyncEventManager::new(vec![crawler]), queue.clone()).run(),
        );

        queue.add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
        queue.wait_until_idle().await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(queue.take_full_sync_request());

        queue.stop();
        task.await.unwrap();
    }
}
