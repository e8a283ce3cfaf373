//! Drops change-log entries the engine caused itself.

use async_trait::async_trait;

use docsync_core::{RemoteChangeType, SyncEvent};

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::Result;

/// An entry whose fetched change token and parent match the record was
/// already applied, usually by our own upload or rename. A deletion of an
/// unmapped object has nothing to undo.
pub struct ChangeLogLoopFilter {
    ctx: SyncContext,
}

impl ChangeLogLoopFilter {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SyncEventHandler for ChangeLogLoopFilter {
    fn name(&self) -> &'static str {
        "change-log-loop-filter"
    }

    fn priority(&self) -> i32 {
        priority::FILTER
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        let SyncEvent::ContentChange(e) = event else {
            return Ok(false);
        };
        let record = self.ctx.storage.get_by_remote_id(&e.object_id).await?;

        let echo = match (&record, &e.object) {
            (None, _) if e.change_type == RemoteChangeType::Deleted => true,
            (Some(record), Some(object)) => {
                record.last_change_token.as_ref() == object.change_token()
                    && record.parent_id.as_ref() == object.parent_id()
            }
            _ => false,
        };
        if echo {
            tracing::debug!(remote_id = %e.object_id, "change already applied");
        }
        Ok(echo)
    }
}
