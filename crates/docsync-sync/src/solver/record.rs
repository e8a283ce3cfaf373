//! Building and saving the records the solver leaves behind.

use std::path::Path;

use docsync_core::{Checksum, MappedObject, ObjectKind, RemoteObject};

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::local::stat;

/// Record carrying the remote half of `object`.
///
/// Local fields and the checksum are taken over from `previous` when it
/// maps the same object; callers refresh them with [`capture_local`] and
/// [`MappedObject::set_checksum`] once the local side is in place.
pub fn remote_record(object: &RemoteObject, previous: Option<&MappedObject>) -> Result<MappedObject> {
    let parent = object
        .parent_id()
        .cloned()
        .ok_or_else(|| SyncError::Inconsistent(format!("{} has no parent", object.id())))?;

    let mut record = match previous {
        Some(previous) if previous.remote_id == *object.id() => previous.clone(),
        _ => match object.kind() {
            ObjectKind::Folder => MappedObject::folder(object.name(), object.id().clone(), parent.clone()),
            _ => MappedObject::file(object.name(), object.id().clone(), parent.clone()),
        },
    };
    record.name = object.name().to_string();
    record.parent_id = Some(parent);
    record.last_change_token = object.change_token().cloned();
    record.last_remote_write_time = Some(object.last_modified());
    record.ignored = record.ignored || object.ignored();
    if let Some(doc) = object.as_document() {
        record.last_content_size = doc.content_length;
    }
    Ok(record)
}

/// Store the write time and identity of the entry at `path` on `record`.
pub async fn capture_local(ctx: &SyncContext, record: &mut MappedObject, path: &Path) -> Result<()> {
    let Some(current) = stat(path).await? else {
        return Err(SyncError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} vanished", path.display()),
        )));
    };
    record.last_local_write_time = current.write_time;
    match ctx.identity.read(path) {
        Ok(Some(guid)) => record.guid = Some(guid),
        Ok(None) => {}
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "no local identity"),
    }
    Ok(())
}

/// Build, complete and save the record of an object present on both sides.
pub async fn save_synced(
    ctx: &SyncContext,
    object: &RemoteObject,
    path: &Path,
    previous: Option<&MappedObject>,
    checksum: Option<&Checksum>,
) -> Result<MappedObject> {
    let mut record = remote_record(object, previous)?;
    capture_local(ctx, &mut record, path).await?;
    if let Some(checksum) = checksum {
        record.set_checksum(checksum);
    }
    ctx.storage.save(&record).await?;
    tracing::debug!(remote_id = %record.remote_id, path = %path.display(), "record saved");
    Ok(record)
}

/// Drop the record of `record`'s subtree and any pending transfer state.
pub async fn forget(ctx: &SyncContext, record: &MappedObject) -> Result<()> {
    ctx.storage.remove(record).await?;
    ctx.transfers.remove_transfer(&record.remote_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::context;
    use docsync_core::{ChangeToken, RemoteDocument, RemoteId};
    use docsync_testkit::TestFixture;

    fn document(id: &str, parent: &str, token: &str) -> RemoteObject {
        RemoteObject::Document(RemoteDocument {
            id: RemoteId::from(id),
            name: "a.txt".to_string(),
            parent_id: Some(RemoteId::from(parent)),
            change_token: Some(ChangeToken::from(token)),
            last_modified: 42,
            content_length: Some(3),
            content_checksum: None,
            checked_out_pwc: None,
            ignored: false,
        })
    }

    #[test]
    fn test_remote_record_keeps_local_fields_of_same_object() {
        let mut previous = MappedObject::file("old.txt", RemoteId::from("d"), RemoteId::from("root"));
        previous.last_local_write_time = Some(7);
        previous.last_checksum = Some(vec![1, 2]);

        let record = remote_record(&document("d", "root", "9"), Some(&previous)).unwrap();
        assert_eq!(record.name, "a.txt");
        assert_eq!(record.last_change_token, Some(ChangeToken::from("9")));
        assert_eq!(record.last_local_write_time, Some(7));
        assert_eq!(record.last_checksum, Some(vec![1, 2]));
        assert_eq!(record.last_content_size, Some(3));

        let other = remote_record(&document("e", "root", "9"), Some(&previous)).unwrap();
        assert_eq!(other.last_local_write_time, None);
    }

    #[tokio::test]
    async fn test_save_synced_captures_write_time() {
        let fx = TestFixture::new().await;
        let path = fx.write_local("a.txt", b"abc");
        let (ctx, _rx) = context(&fx);

        let record = save_synced(&ctx, &document("d", "root", "1"), &path, None, None)
            .await
            .unwrap();
        assert_eq!(record.last_local_write_time, docsync_testkit::fixtures::write_time(&path));
        assert!(ctx.storage.get_by_remote_id(&RemoteId::from("d")).await.unwrap().is_some());
    }
}
