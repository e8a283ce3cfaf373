//! Token-based polling of the server change log.

use std::collections::HashMap;

use async_trait::async_trait;

use docsync_core::{
    ChangeLogEntry, ContentChangeEvent, RemoteChangeType, RemoteId, StartNextSyncEvent, SyncEvent,
};

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::Result;

/// Polls the change log on incremental sync requests and commits the
/// crawler's baseline token after a full sync.
pub struct ContentChanges {
    ctx: SyncContext,
}

impl ContentChanges {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    fn request_full_sync(&self) {
        self.ctx
            .queue
            .add_event(SyncEvent::StartNextSync(StartNextSyncEvent::full()));
    }

    async fn poll(&self) -> Result<()> {
        let info = self.ctx.session.repository_info().await?;
        if !info.supports_change_log {
            tracing::debug!("repository has no change log, crawling instead");
            self.request_full_sync();
            return Ok(());
        }

        let Some(stored) = self.ctx.storage.change_log_token().await? else {
            tracing::info!("no change-log token stored, full sync requested");
            self.request_full_sync();
            return Ok(());
        };
        let latest = self.ctx.session.latest_change_log_token().await?;
        if latest.as_ref() == Some(&stored) {
            tracing::trace!(token = %stored, "change log unchanged");
            return Ok(());
        }

        let page_size = self.ctx.config.change_log.page_size.max(1);
        let mut changes = Deduplicated::default();
        let mut since = stored.clone();
        loop {
            let page = self.ctx.session.get_content_changes(&since, page_size).await?;
            let fetched = page.entries.len();
            for entry in page.entries {
                changes.push(entry);
            }
            if let Some(next) = page.next_token {
                since = next;
            }
            if !page.has_more_items || fetched == 0 {
                break;
            }
        }

        let events = changes.into_events();
        tracing::debug!(from = %stored, to = %since, objects = events.len(), "change log polled");
        for event in events {
            self.ctx.queue.add_event(SyncEvent::ContentChange(event));
        }

        let baseline = if since == stored { latest.unwrap_or(since) } else { since };
        self.ctx.storage.set_change_log_token(Some(&baseline)).await?;
        Ok(())
    }
}

/// Change-log entries reduced to one per object, in first-seen order.
#[derive(Default)]
struct Deduplicated {
    order: Vec<RemoteId>,
    kinds: HashMap<RemoteId, RemoteChangeType>,
}

impl Deduplicated {
    /// Keep the most specific change seen for an object.
    fn push(&mut self, entry: ChangeLogEntry) {
        match self.kinds.get_mut(&entry.object_id) {
            Some(kind) => {
                if entry.change_type.specificity() > kind.specificity() {
                    *kind = entry.change_type;
                }
            }
            None => {
                self.order.push(entry.object_id.clone());
                self.kinds.insert(entry.object_id, entry.change_type);
            }
        }
    }

    fn into_events(mut self) -> Vec<ContentChangeEvent> {
        self.order
            .into_iter()
            .filter_map(|id| {
                let kind = self.kinds.remove(&id)?;
                Some(ContentChangeEvent::new(id, kind))
            })
            .collect()
    }
}

#[async_trait]
impl SyncEventHandler for ContentChanges {
    fn name(&self) -> &'static str {
        "content-changes"
    }

    fn priority(&self) -> i32 {
        priority::HIGHER
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::StartNextSync(e) if !e.full_sync_requested => {
                self.poll().await?;
                Ok(true)
            }
            SyncEvent::FullSyncCompleted(e) => {
                if let Some(token) = &e.start_token {
                    tracing::debug!(token = %token, "change-log baseline committed");
                    self.ctx.storage.set_change_log_token(Some(token)).await?;
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}
