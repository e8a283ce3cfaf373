//! Lazily fetches the snapshot of each changed object.

use async_trait::async_trait;

use docsync_core::{RemoteChangeType, SyncEvent};
use docsync_remote::RemoteError;

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::Result;

/// Attaches a fresh snapshot to every non-deletion [`docsync_core::ContentChangeEvent`].
///
/// Objects that can no longer be read are dropped: a later entry reports the
/// deletion, or the object is not ours to sync.
pub struct ContentChangeAccumulator {
    ctx: SyncContext,
}

impl ContentChangeAccumulator {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SyncEventHandler for ContentChangeAccumulator {
    fn name(&self) -> &'static str {
        "content-change-accumulator"
    }

    fn priority(&self) -> i32 {
        priority::HIGHER
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        let SyncEvent::ContentChange(e) = event else {
            return Ok(false);
        };
        if e.change_type == RemoteChangeType::Deleted || e.object.is_some() {
            return Ok(false);
        }

        match self.ctx.session.get_object(&e.object_id).await {
            Ok(object) => {
                e.object = Some(object);
                Ok(false)
            }
            Err(RemoteError::NotFound(_)) | Err(RemoteError::PermissionDenied(_)) => {
                tracing::debug!(remote_id = %e.object_id, "changed object not readable, dropped");
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }
}
