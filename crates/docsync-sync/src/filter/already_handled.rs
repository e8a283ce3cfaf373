//! Drops local notifications whose outcome the records already reflect.
//!
//! Most of these are echoes of the engine's own writes: a download renames
//! its cache file over the target and saves the record before the watcher's
//! debounce window closes.

use async_trait::async_trait;

use docsync_core::{FsEvent, FsMovedEvent, SyncEvent, WatcherChangeType};

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::Result;
use crate::local::stat;

pub struct AlreadyHandledFilter {
    ctx: SyncContext,
}

impl AlreadyHandledFilter {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    async fn is_handled(&self, e: &FsEvent) -> Result<bool> {
        let record = self.ctx.record_at(&e.path).await?;
        let current = stat(&e.path).await?;

        Ok(match e.kind {
            WatcherChangeType::Created => match (&record, current) {
                (Some(record), Some(st)) => {
                    st.is_dir || record.last_local_write_time == st.write_time
                }
                // Gone again before we got to it.
                (_, None) => true,
                (None, Some(_)) => false,
            },
            WatcherChangeType::Changed => match (&record, current) {
                (_, None) => true,
                (_, Some(st)) if st.is_dir => true,
                (Some(record), Some(st)) => record.last_local_write_time == st.write_time,
                (None, Some(_)) => false,
            },
            WatcherChangeType::Deleted => record.is_none() || current.is_some(),
        })
    }

    async fn is_move_handled(&self, e: &FsMovedEvent) -> Result<bool> {
        let at_new = self.ctx.record_at(&e.new_path).await?;
        let at_old = self.ctx.record_at(&e.old_path).await?;
        Ok(at_new.is_some() && at_old.is_none())
    }
}

#[async_trait]
impl SyncEventHandler for AlreadyHandledFilter {
    fn name(&self) -> &'static str {
        "already-handled-filter"
    }

    fn priority(&self) -> i32 {
        priority::FILTER
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        let handled = match event {
            SyncEvent::Fs(e) => self.is_handled(e).await?,
            SyncEvent::FsMoved(e) => self.is_move_handled(e).await?,
            _ => false,
        };
        if handled {
            tracing::debug!(%event, "already handled");
        }
        Ok(handled)
    }
}
