//! Accumulated change-log entries into canonical file and folder events.

use async_trait::async_trait;

use docsync_core::{
    ChangeType, ContentChangeEvent, ContentChangeType, FileEvent, FolderEvent, MappedObject,
    RemoteChangeType, RemoteDocument, RemoteHandle, RemoteObject, SyncEvent,
};

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::Result;

/// Sets the remote change type from the record: `Created` when unmapped,
/// `Moved` when the parent or name differs, `Changed` otherwise.
pub struct ContentChangeEventTransformer {
    ctx: SyncContext,
}

/// Whether the content of `doc` differs from what the record saw.
pub fn remote_content_change(record: &MappedObject, doc: &RemoteDocument) -> ContentChangeType {
    if doc.content_length != record.last_content_size {
        return ContentChangeType::Changed;
    }
    match (&doc.content_checksum, record.checksum()) {
        (Some(remote), Some(known)) if remote.algorithm == known.algorithm => {
            if *remote == known {
                ContentChangeType::None
            } else {
                ContentChangeType::Changed
            }
        }
        // Without comparable digests the change token decides.
        _ if doc.change_token == record.last_change_token => ContentChangeType::None,
        _ => ContentChangeType::Changed,
    }
}

/// Remote change of `object` relative to `record`.
pub fn remote_change(record: &MappedObject, object: &RemoteObject) -> ChangeType {
    if record.parent_id.as_ref() != object.parent_id() || record.name != object.name() {
        ChangeType::Moved
    } else if record.last_change_token.as_ref() != object.change_token() {
        ChangeType::Changed
    } else {
        ChangeType::None
    }
}

impl ContentChangeEventTransformer {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    async fn transform(&self, e: &ContentChangeEvent) -> Result<Option<SyncEvent>> {
        let record = self.ctx.storage.get_by_remote_id(&e.object_id).await?;

        if e.change_type == RemoteChangeType::Deleted {
            let Some(record) = record else {
                return Ok(None);
            };
            let event = if record.is_folder() {
                SyncEvent::Folder(
                    FolderEvent::remote(RemoteHandle::Gone(e.object_id.clone()))
                        .with_remote(ChangeType::Deleted),
                )
            } else {
                SyncEvent::File(
                    FileEvent::remote(RemoteHandle::Gone(e.object_id.clone()))
                        .with_remote(ChangeType::Deleted)
                        .with_remote_content(ContentChangeType::Deleted),
                )
            };
            return Ok(Some(event));
        }

        let Some(object) = &e.object else {
            return Ok(None);
        };
        let change = match &record {
            None => ChangeType::Created,
            Some(record) => remote_change(record, object),
        };

        Ok(Some(match object {
            RemoteObject::Document(doc) => {
                let content = match &record {
                    None => ContentChangeType::Created,
                    Some(record) => remote_content_change(record, doc),
                };
                SyncEvent::File(
                    FileEvent::remote(RemoteHandle::Present(doc.clone()))
                        .with_remote(change)
                        .with_remote_content(content),
                )
            }
            RemoteObject::Folder(folder) => SyncEvent::Folder(
                FolderEvent::remote(RemoteHandle::Present(folder.clone())).with_remote(change),
            ),
        }))
    }
}

#[async_trait]
impl SyncEventHandler for ContentChangeEventTransformer {
    fn name(&self) -> &'static str {
        "content-change-transformer"
    }

    fn priority(&self) -> i32 {
        priority::NORMAL
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        let SyncEvent::ContentChange(e) = event else {
            return Ok(false);
        };
        match self.transform(e).await? {
            Some(transformed) => {
                *event = transformed;
                Ok(false)
            }
            None => {
                tracing::debug!(remote_id = %e.object_id, "nothing to reconcile for change");
                Ok(true)
            }
        }
    }
}
