//! Local notifications into canonical file and folder events.

use async_trait::async_trait;

use docsync_core::{
    ChangeType, ContentChangeType, FileEvent, FolderEvent, FsEvent, FsMovedEvent, MappedObject,
    SyncEvent, WatcherChangeType,
};

use crate::bus::{priority, SyncEventHandler};
use crate::context::SyncContext;
use crate::error::Result;
use crate::local::file_checksum;

/// Replaces `FsEvent`/`FsMovedEvent` in place with the matching
/// [`FileEvent`] or [`FolderEvent`], with the local change type set.
pub struct FsEventTransformer {
    ctx: SyncContext,
}

impl FsEventTransformer {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Whether the content at `path` differs from what the record saw.
    async fn content_change(&self, path: &std::path::Path, record: &MappedObject) -> Result<ContentChangeType> {
        let Some(known) = record.checksum() else {
            return Ok(ContentChangeType::Changed);
        };
        let current = file_checksum(path, known.algorithm).await?;
        Ok(if current == known {
            ContentChangeType::None
        } else {
            ContentChangeType::Changed
        })
    }

    async fn transform(&self, e: &FsEvent) -> Result<SyncEvent> {
        let path = e.path.clone();
        Ok(match e.kind {
            WatcherChangeType::Created if e.is_directory => {
                SyncEvent::Folder(FolderEvent::local(path).with_local(ChangeType::Created))
            }
            WatcherChangeType::Created => SyncEvent::File(
                FileEvent::local(path)
                    .with_local(ChangeType::Created)
                    .with_local_content(ContentChangeType::Created),
            ),
            WatcherChangeType::Changed => match self.ctx.record_at(&path).await? {
                Some(record) => {
                    let content = self.content_change(&path, &record).await?;
                    SyncEvent::File(
                        FileEvent::local(path)
                            .with_local(ChangeType::Changed)
                            .with_local_content(content),
                    )
                }
                None => SyncEvent::File(
                    FileEvent::local(path)
                        .with_local(ChangeType::Created)
                        .with_local_content(ContentChangeType::Created),
                ),
            },
            WatcherChangeType::Deleted if e.is_directory => {
                SyncEvent::Folder(FolderEvent::local(path).with_local(ChangeType::Deleted))
            }
            WatcherChangeType::Deleted => SyncEvent::File(
                FileEvent::local(path)
                    .with_local(ChangeType::Deleted)
                    .with_local_content(ContentChangeType::Deleted),
            ),
        })
    }

    async fn transform_move(&self, e: &FsMovedEvent) -> Result<SyncEvent> {
        if e.is_directory {
            return Ok(SyncEvent::Folder(FolderEvent::moved(
                e.old_path.clone(),
                e.new_path.clone(),
                None,
            )));
        }

        let mut moved = FileEvent::moved(e.old_path.clone(), e.new_path.clone(), None);
        if let Some(record) = self.ctx.record_at(&e.old_path).await? {
            moved.local_content = self.content_change(&e.new_path, &record).await?;
        }
        Ok(SyncEvent::File(moved))
    }
}

#[async_trait]
impl SyncEventHandler for FsEventTransformer {
    fn name(&self) -> &'static str {
        "fs-event-transformer"
    }

    fn priority(&self) -> i32 {
        priority::NORMAL
    }

    async fn handle(&self, event: &mut SyncEvent) -> Result<bool> {
        let transformed = match event {
            SyncEvent::Fs(e) => self.transform(e).await?,
            SyncEvent::FsMoved(e) => self.transform_move(e).await?,
            _ => return Ok(false),
        };
        *event = transformed;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::context;
    use docsync_testkit::TestFixture;
    use std::path::PathBuf;

    fn fs(kind: WatcherChangeType, path: PathBuf, is_directory: bool) -> SyncEvent {
        SyncEvent::Fs(FsEvent {
            kind,
            path,
            is_directory,
            local_id: None,
        })
    }

    #[tokio::test]
    async fn test_created_file_and_folder() {
        let fx = TestFixture::new().await;
        let (ctx, _rx) = context(&fx);
        let transformer = FsEventTransformer::new(ctx);

        let mut file = fs(WatcherChangeType::Created, fx.write_local("a.txt", b"x"), false);
        assert!(!transformer.handle(&mut file).await.unwrap());
        match file {
            SyncEvent::File(e) => {
                assert_eq!(e.local, ChangeType::Created);
                assert_eq!(e.remote, ChangeType::None);
                assert_eq!(e.local_content, ContentChangeType::Created);
            }
            other => panic!("expected a file event, got {:?}", other),
        }

        let mut folder = fs(WatcherChangeType::Created, fx.mkdir_local("d"), true);
        transformer.handle(&mut folder).await.unwrap();
        assert!(matches!(folder, SyncEvent::Folder(FolderEvent { local: ChangeType::Created, .. })));
    }

    #[tokio::test]
    async fn test_touch_without_content_change() {
        let fx = TestFixture::new().await;
        fx.synced_document(&fx.root_id(), "a.txt", b"same").await;
        let (ctx, _rx) = context(&fx);
        let transformer = FsEventTransformer::new(ctx);

        let mut event = fs(WatcherChangeType::Changed, fx.local("a.txt"), false);
        transformer.handle(&mut event).await.unwrap();
        match event {
            SyncEvent::File(e) => {
                assert_eq!(e.local, ChangeType::Changed);
                assert_eq!(e.local_content, ContentChangeType::None);
            }
            other => panic!("expected a file event, got {:?}", other),
        }

        fx.write_local("a.txt", b"different");
        let mut event = fs(WatcherChangeType::Changed, fx.local("a.txt"), false);
        transformer.handle(&mut event).await.unwrap();
        assert!(matches!(
            event,
            SyncEvent::File(FileEvent { local_content: ContentChangeType::Changed, .. })
        ));
    }

    #[tokio::test]
    async fn test_move_keeps_source() {
        let fx = TestFixture::new().await;
        fx.synced_document(&fx.root_id(), "a.txt", b"x").await;
        std::fs::rename(fx.local("a.txt"), fx.local("b.txt")).unwrap();
        let (ctx, _rx) = context(&fx);
        let transformer = FsEventTransformer::new(ctx);

        let mut event = SyncEvent::FsMoved(FsMovedEvent {
            old_path: fx.local("a.txt"),
            new_path: fx.local("b.txt"),
            is_directory: false,
            local_id: None,
        });
        transformer.handle(&mut event).await.unwrap();
        match event {
            SyncEvent::File(e) => {
                assert_eq!(e.local, ChangeType::Moved);
                assert_eq!(e.local_path, Some(fx.local("b.txt")));
                assert_eq!(e.local_content, ContentChangeType::None);
                assert_eq!(e.moved_from.unwrap().old_local_path, Some(fx.local("a.txt")));
            }
            other => panic!("expected a file event, got {:?}", other),
        }
    }
}
