//! Active transfers and their progress events.
//!
//! Every upload and download runs under a [`Transmission`] registered with
//! the [`TransmissionManager`]. Subscribers (a UI layer, tests) receive a
//! [`TransmissionEvent`] stream over a tokio broadcast channel; slow
//! subscribers lose old progress events rather than stalling transfers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// Direction and flavor of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmissionKind {
    UploadNew,
    UploadModified,
    DownloadNew,
    DownloadModified,
}

/// Lifecycle of a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmissionStatus {
    Running,
    Aborting,
    Aborted,
    Finished,
    Failed,
}

/// Published on every state change of a transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmissionEvent {
    Started {
        id: Uuid,
        kind: TransmissionKind,
        path: PathBuf,
        length: u64,
    },
    Progress {
        id: Uuid,
        position: u64,
        length: u64,
    },
    Completed {
        id: Uuid,
    },
    Aborted {
        id: Uuid,
        position: u64,
    },
    Failed {
        id: Uuid,
        reason: String,
    },
}

impl TransmissionEvent {
    pub fn id(&self) -> Uuid {
        match self {
            TransmissionEvent::Started { id, .. }
            | TransmissionEvent::Progress { id, .. }
            | TransmissionEvent::Completed { id }
            | TransmissionEvent::Aborted { id, .. }
            | TransmissionEvent::Failed { id, .. } => *id,
        }
    }
}

struct Registry {
    active: Mutex<HashMap<Uuid, Arc<Transmission>>>,
    events: broadcast::Sender<TransmissionEvent>,
}

impl Registry {
    fn publish(&self, event: TransmissionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn release(&self, id: &Uuid) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(id);
    }
}

/// One running transfer.
pub struct Transmission {
    id: Uuid,
    kind: TransmissionKind,
    path: PathBuf,
    length: AtomicU64,
    position: AtomicU64,
    abort_requested: AtomicBool,
    status: Mutex<TransmissionStatus>,
    registry: Weak<Registry>,
}

impl Transmission {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TransmissionKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn status(&self) -> TransmissionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the transfer loop to stop before the next chunk.
    pub fn abort(&self) {
        self.abort_requested.store(true, Ordering::Release);
        self.set_status(TransmissionStatus::Aborting);
    }

    /// Checked by transfer loops between chunks.
    pub fn is_abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::Acquire)
    }

    pub fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Release);
    }

    /// Record that bytes up to `position` are done.
    pub fn progress(&self, position: u64) {
        self.position.store(position, Ordering::Release);
        self.publish(TransmissionEvent::Progress {
            id: self.id,
            position,
            length: self.length(),
        });
    }

    pub fn complete(&self) {
        self.finish(TransmissionStatus::Finished, TransmissionEvent::Completed { id: self.id });
    }

    pub fn aborted(&self) {
        let position = self.position();
        self.finish(
            TransmissionStatus::Aborted,
            TransmissionEvent::Aborted { id: self.id, position },
        );
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.finish(
            TransmissionStatus::Failed,
            TransmissionEvent::Failed {
                id: self.id,
                reason: reason.into(),
            },
        );
    }

    fn finish(&self, status: TransmissionStatus, event: TransmissionEvent) {
        self.set_status(status);
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.id);
            registry.publish(event);
        }
    }

    fn set_status(&self, status: TransmissionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn publish(&self, event: TransmissionEvent) {
        if let Some(registry) = self.registry.upgrade() {
            registry.publish(event);
        }
    }
}

impl std::fmt::Debug for Transmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmission")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("position", &self.position())
            .field("length", &self.length())
            .finish()
    }
}

/// Registry of running transmissions.
#[derive(Clone)]
pub struct TransmissionManager {
    registry: Arc<Registry>,
}

impl TransmissionManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: Arc::new(Registry {
                active: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Register a new transmission and publish its `Started` event.
    pub fn start(&self, kind: TransmissionKind, path: impl Into<PathBuf>, length: u64) -> Arc<Transmission> {
        let transmission = Arc::new(Transmission {
            id: Uuid::new_v4(),
            kind,
            path: path.into(),
            length: AtomicU64::new(length),
            position: AtomicU64::new(0),
            abort_requested: AtomicBool::new(false),
            status: Mutex::new(TransmissionStatus::Running),
            registry: Arc::downgrade(&self.registry),
        });

        {
            let mut active = self
                .registry
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            active.insert(transmission.id, transmission.clone());
        }

        tracing::debug!(id = %transmission.id, ?kind, path = %transmission.path.display(), length, "transmission started");
        self.registry.publish(TransmissionEvent::Started {
            id: transmission.id,
            kind,
            path: transmission.path.clone(),
            length,
        });
        transmission
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransmissionEvent> {
        self.registry.events.subscribe()
    }

    /// Request the abort of a running transmission. Returns whether it was found.
    pub fn abort(&self, id: &Uuid) -> bool {
        let active = self
            .registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match active.get(id) {
            Some(transmission) => {
                transmission.abort();
                true
            }
            None => false,
        }
    }

    /// Request the abort of every running transmission.
    pub fn abort_all(&self) {
        let active = self
            .registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for transmission in active.values() {
            transmission.abort();
        }
    }

    pub fn active(&self) -> Vec<Arc<Transmission>> {
        let active = self
            .registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        active.values().cloned().collect()
    }
}

impl Default for TransmissionManager {
    fn default() -> Self {
        Self::new()
    }
}
