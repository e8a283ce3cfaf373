//! Logs every event offered on the bus.

use async_trait::async_trait;

use docsync_core::SyncEvent;

use super::{priority, SyncEventHandler};
use crate::error::Result;

/// Observer at the highest priority. Never consumes an event.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugLoggingHandler;

#[async_trait]
impl SyncEventHandler for DebugLoggingHandler {
    fn name(&self) -> &'static str {
        "debug-logging"
    }

    fn priority(&self) -> i32 {
        priority::DEBUG
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        tracing::debug!(kind = event.kind_name(), %event, "incoming event");
        Ok(false)
    }
}
