//! Publishes the externally interesting bus events to subscribers.

use async_trait::async_trait;
use tokio::sync::broadcast;

use docsync_core::SyncEvent;

use super::{priority, SyncEventHandler};
use crate::error::Result;

const CHANNEL_CAPACITY: usize = 256;

/// Forwards `StartNextSync`, `FullSyncCompleted` and `RequestIgnored`
/// events to a broadcast channel. Never consumes an event.
#[derive(Debug, Clone)]
pub struct EventForwarder {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventForwarder {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncEventHandler for EventForwarder {
    fn name(&self) -> &'static str {
        "event-forwarder"
    }

    fn priority(&self) -> i32 {
        priority::DEBUG
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        if matches!(
            event,
            SyncEvent::StartNextSync(_) | SyncEvent::FullSyncCompleted(_) | SyncEvent::RequestIgnored(_)
        ) {
            // No subscribers is fine.
            let _ = self.tx.send(event.clone());
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::{CrawlRequestEvent, RemoteId, StartNextSyncEvent};

    #[tokio::test]
    async fn test_forwards_selected_events() {
        let forwarder = EventForwarder::new();
        let mut rx = forwarder.subscribe();

        let mut crawl = SyncEvent::CrawlRequest(CrawlRequestEvent {
            local_folder: "/r".into(),
            remote_folder: RemoteId::from("root"),
        });
        let mut start = SyncEvent::StartNextSync(StartNextSyncEvent::incremental());
        assert!(!forwarder.handle(&mut crawl).await.unwrap());
        assert!(!forwarder.handle(&mut start).await.unwrap());

        assert_eq!(rx.recv().await.unwrap(), start);
        assert!(rx.try_recv().is_err());
    }
}
