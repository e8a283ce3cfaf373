//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use docsync_core::{ChangeToken, MappedObject, ObjectKind, RemoteId, TransferState};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{MetaDataStorage, TransferStorage};

const CHANGE_LOG_TOKEN_KEY: &str = "change_log_token";

const OBJECT_COLUMNS: &str = "remote_id, parent_id, name, kind, change_token, \
    local_write_time, remote_write_time, checksum, checksum_algorithm, \
    content_size, guid, ignored";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations run on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

fn row_to_object(row: &rusqlite::Row<'_>) -> rusqlite::Result<MappedObject> {
    let guid: Option<String> = row.get("guid")?;
    let guid = guid
        .map(|g| {
            Uuid::parse_str(&g).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
            })
        })
        .transpose()?;
    let content_size: Option<i64> = row.get("content_size")?;

    Ok(MappedObject {
        remote_id: RemoteId::new(row.get::<_, String>("remote_id")?),
        parent_id: row.get::<_, Option<String>>("parent_id")?.map(RemoteId::new),
        name: row.get("name")?,
        kind: ObjectKind::from_name(&row.get::<_, String>("kind")?),
        last_change_token: row.get::<_, Option<String>>("change_token")?.map(ChangeToken::new),
        last_local_write_time: row.get("local_write_time")?,
        last_remote_write_time: row.get("remote_write_time")?,
        last_checksum: row.get("checksum")?,
        checksum_algorithm: row.get("checksum_algorithm")?,
        last_content_size: content_size.map(|s| s as u64),
        guid,
        ignored: row.get::<_, i64>("ignored")? != 0,
    })
}

fn query_objects(conn: &Connection, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<MappedObject>> {
    let sql = format!("SELECT {} FROM mapped_objects {}", OBJECT_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args, row_to_object)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[async_trait]
impl MetaDataStorage for SqliteStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_by_remote_id(&self, id: &RemoteId) -> Result<Option<MappedObject>> {
        let id = id.as_str().to_string();
        self.call(move |conn| {
            let sql = format!("SELECT {} FROM mapped_objects WHERE remote_id = ?1", OBJECT_COLUMNS);
            Ok(conn.query_row(&sql, params![id], row_to_object).optional()?)
        })
        .await
    }

    async fn get_by_guid(&self, guid: &Uuid) -> Result<Option<MappedObject>> {
        let guid = guid.to_string();
        self.call(move |conn| {
            let mut found = query_objects(conn, "WHERE guid = ?1 LIMIT 1", &[&guid])?;
            Ok(found.pop())
        })
        .await
    }

    async fn get_children(&self, parent: &MappedObject) -> Result<Vec<MappedObject>> {
        let parent_id = parent.remote_id.as_str().to_string();
        self.call(move |conn| query_objects(conn, "WHERE parent_id = ?1 ORDER BY name", &[&parent_id]))
            .await
    }

    async fn get_root(&self) -> Result<Option<MappedObject>> {
        self.call(|conn| {
            let mut found = query_objects(conn, "WHERE parent_id IS NULL LIMIT 1", &[])?;
            Ok(found.pop())
        })
        .await
    }

    async fn all_objects(&self) -> Result<Vec<MappedObject>> {
        self.call(|conn| query_objects(conn, "", &[])).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    async fn save(&self, obj: &MappedObject) -> Result<()> {
        let obj = obj.clone();
        self.call(move |conn| {
            let sql = format!(
                "INSERT OR REPLACE INTO mapped_objects ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                OBJECT_COLUMNS
            );
            conn.execute(
                &sql,
                params![
                    obj.remote_id.as_str(),
                    obj.parent_id.as_ref().map(|p| p.as_str()),
                    obj.name,
                    obj.kind.as_str(),
                    obj.last_change_token.as_ref().map(|t| t.as_str()),
                    obj.last_local_write_time,
                    obj.last_remote_write_time,
                    obj.last_checksum,
                    obj.checksum_algorithm,
                    obj.last_content_size.map(|s| s as i64),
                    obj.guid.map(|g| g.to_string()),
                    obj.ignored as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, obj: &MappedObject) -> Result<()> {
        let id = obj.remote_id.as_str().to_string();
        self.call(move |conn| {
            // UNION (not UNION ALL) so a corrupted parent cycle still terminates.
            let removed = conn.execute(
                "WITH RECURSIVE subtree(id) AS (
                    SELECT ?1
                    UNION
                    SELECT m.remote_id FROM mapped_objects m JOIN subtree s ON m.parent_id = s.id
                 )
                 DELETE FROM mapped_objects WHERE remote_id IN (SELECT id FROM subtree)",
                params![id],
            )?;
            tracing::trace!(remote_id = %id, removed, "removed mapped subtree");
            Ok(())
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Change log
    // ─────────────────────────────────────────────────────────────────────────

    async fn change_log_token(&self) -> Result<Option<ChangeToken>> {
        self.call(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![CHANGE_LOG_TOKEN_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.map(ChangeToken::new))
        })
        .await
    }

    async fn set_change_log_token(&self, token: Option<&ChangeToken>) -> Result<()> {
        let token = token.map(|t| t.as_str().to_string());
        self.call(move |conn| {
            match token {
                Some(value) => conn.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![CHANGE_LOG_TOKEN_KEY, value],
                )?,
                None => conn.execute(
                    "DELETE FROM settings WHERE key = ?1",
                    params![CHANGE_LOG_TOKEN_KEY],
                )?,
            };
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl TransferStorage for SqliteStore {
    async fn get_transfer(&self, remote_id: &RemoteId) -> Result<Option<TransferState>> {
        let id = remote_id.as_str().to_string();
        self.call(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT state FROM transfers WHERE remote_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    async fn save_transfer(&self, state: &TransferState) -> Result<()> {
        let id = state.remote_id.as_str().to_string();
        let json = serde_json::to_string(state)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO transfers (remote_id, state, updated_at) VALUES (?1, ?2, ?3)",
                params![id, json, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_transfer(&self, remote_id: &RemoteId) -> Result<()> {
        let id = remote_id.as_str().to_string();
        self.call(move |conn| {
            conn.execute("DELETE FROM transfers WHERE remote_id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::{Checksum, HashAlgorithm};
    use std::path::PathBuf;

    fn id(s: &str) -> RemoteId {
        RemoteId::from(s)
    }

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::open_memory().unwrap();
        store.save(&MappedObject::root(id("root"))).await.unwrap();
        store
            .save(&MappedObject::folder("docs", id("f1"), id("root")))
            .await
            .unwrap();
        store
            .save(&MappedObject::folder("nested", id("f2"), id("f1")))
            .await
            .unwrap();
        store
            .save(&MappedObject::file("a.txt", id("d1"), id("f2")))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = SqliteStore::open_memory().unwrap();
        let mut obj = MappedObject::file("a.txt", id("d1"), id("root"));
        obj.guid = Some(Uuid::from_u128(42));
        obj.last_content_size = Some(1024);
        obj.set_checksum(&Checksum::of(HashAlgorithm::Sha1, b"content"));
        store.save(&obj).await.unwrap();

        let loaded = store.get_by_remote_id(&id("d1")).await.unwrap().unwrap();
        assert_eq!(loaded, obj);

        let by_guid = store.get_by_guid(&Uuid::from_u128(42)).await.unwrap().unwrap();
        assert_eq!(by_guid.remote_id, id("d1"));
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let store = SqliteStore::open_memory().unwrap();
        let mut obj = MappedObject::file("a.txt", id("d1"), id("root"));
        store.save(&obj).await.unwrap();

        obj.name = "b.txt".into();
        store.save(&obj).await.unwrap();

        let all = store.all_objects().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "b.txt");
    }

    #[tokio::test]
    async fn test_path_resolution() {
        let store = seeded().await;

        let file = store
            .get_by_local_path(Path::new("docs/nested/a.txt"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.remote_id, id("d1"));

        let path = store.get_relative_path(&file).await.unwrap().unwrap();
        assert_eq!(path, PathBuf::from("docs/nested/a.txt"));

        let root = store.get_by_local_path(Path::new("")).await.unwrap().unwrap();
        assert!(root.is_root());

        assert!(store
            .get_by_local_path(Path::new("docs/missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_remove_subtree() {
        let store = seeded().await;
        let docs = store.get_by_remote_id(&id("f1")).await.unwrap().unwrap();

        store.remove(&docs).await.unwrap();

        assert!(store.get_by_remote_id(&id("f2")).await.unwrap().is_none());
        assert!(store.get_by_remote_id(&id("d1")).await.unwrap().is_none());
        assert_eq!(store.all_objects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_change_log_token() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.change_log_token().await.unwrap().is_none());

        let token = ChangeToken::from("42");
        store.set_change_log_token(Some(&token)).await.unwrap();
        assert_eq!(store.change_log_token().await.unwrap(), Some(token));

        store.set_change_log_token(None).await.unwrap();
        assert!(store.change_log_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transfer_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let mut state = TransferState::new(id("d1"), PathBuf::from("a.bin"), HashAlgorithm::Sha1);
        state.offset = 6 * 1024 * 1024;
        state.partial_checksum = Some(vec![1; 20]);
        store.save_transfer(&state).await.unwrap();

        assert_eq!(store.get_transfer(&id("d1")).await.unwrap(), Some(state));

        store.remove_transfer(&id("d1")).await.unwrap();
        assert!(store.get_transfer(&id("d1")).await.unwrap().is_none());
        store.remove_transfer(&id("d1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save(&MappedObject::root(id("root"))).await.unwrap();
            store
                .set_change_log_token(Some(&ChangeToken::from("7")))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_root().await.unwrap().is_some());
        assert_eq!(
            store.change_log_token().await.unwrap(),
            Some(ChangeToken::from("7"))
        );
    }
}
