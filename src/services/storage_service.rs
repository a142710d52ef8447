//! src/services/storage_service.rs
//!
//! StorageService — the durable `ObjectStore` backend. Metadata lives in
//! SQLite, payloads on local disk sharded beneath
//! `base_path/{shard}/{shard}/{blob_id}`. Every write lands in a fresh blob
//! file and the row names the blob it describes, so a row never points at
//! bytes another writer produced. Deletes are hard deletes: the row and the
//! file both go, nothing is left behind to mark the key.

use super::object_store::{BodyStream, ByteStream, ObjectStore, StorageError, StorageResult};
use crate::models::object::ObjectMeta;
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use sqlx::{FromRow, SqlitePool};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
/// A reader can lose the race against an overwrite between reading the row
/// and opening its blob; it then re-reads the row.
const READ_ATTEMPTS: usize = 3;
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

/// An `objects` row together with the blob file holding its payload.
#[derive(FromRow)]
struct StoredObject {
    #[sqlx(flatten)]
    meta: ObjectMeta,
    blob_id: String,
}

impl StorageService {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Reject keys that are empty, oversized or path-like in unsafe ways.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.split('/').any(|seg| seg == "..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Two-level shard directories from MD5(key), as lowercase hex bytes.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn shard_dir(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path
    }

    fn blob_path(&self, key: &str, blob_id: &str) -> PathBuf {
        self.shard_dir(key).join(blob_id)
    }

    async fn fetch_meta(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        let meta = sqlx::query_as::<_, ObjectMeta>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(meta)
    }

    async fn fetch_stored(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let row = sqlx::query_as::<_, StoredObject>(
            "SELECT key, content_type, size_bytes, etag, last_modified, blob_id
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Replace the row for `key` in one transaction, returning the new
    /// metadata and the blob the previous row pointed at.
    ///
    /// The `DELETE` is the first statement so the transaction holds the
    /// write lock before it learns the previous blob.
    async fn swap_row(
        &self,
        key: &str,
        content_type: Option<&str>,
        size_bytes: i64,
        etag: &str,
        blob_id: &str,
    ) -> Result<(ObjectMeta, Option<String>), sqlx::Error> {
        let mut tx = self.db.begin().await?;

        let replaced = sqlx::query_scalar::<_, String>(
            "DELETE FROM objects WHERE key = ? RETURNING blob_id",
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let meta = sqlx::query_as::<_, ObjectMeta>(
            r#"
            INSERT INTO objects (key, content_type, size_bytes, etag, last_modified, blob_id)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(etag)
        .bind(Utc::now())
        .bind(blob_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((meta, replaced))
    }

    /// Drain `body` into `file`, returning the size and MD5 hex digest.
    async fn write_body(file: &mut File, mut body: BodyStream<'_>) -> io::Result<(i64, String)> {
        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok((size_bytes, format!("{:x}", digest.compute())))
    }

    /// Create `path` in `dir`, recreating `dir` if a concurrent delete pruned it.
    async fn create_in(dir: &Path, path: &Path) -> io::Result<File> {
        fs::create_dir_all(dir).await?;
        match File::create(path).await {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(dir).await?;
                File::create(path).await
            }
            other => other,
        }
    }

    /// Remove empty directories from `start` up to, but not including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    /// Stream the body to a temp file, rename it to a fresh blob, then swap
    /// the row over to that blob and drop the one it replaced. Nothing is left
    /// on disk if any step before the swap fails.
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: BodyStream<'_>,
    ) -> StorageResult<ObjectMeta> {
        self.ensure_key_safe(key)?;

        let shard_dir = self.shard_dir(key);
        let blob_id = Uuid::new_v4().to_string();
        let tmp_path = shard_dir.join(format!(".tmp-{}", blob_id));
        let mut file = Self::create_in(&shard_dir, &tmp_path).await?;

        let (size_bytes, etag) = match Self::write_body(&mut file, body).await {
            Ok(written) => written,
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };
        drop(file);

        let blob_path = shard_dir.join(&blob_id);
        if let Err(err) = fs::rename(&tmp_path, &blob_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        match self
            .swap_row(key, content_type, size_bytes, &etag, &blob_id)
            .await
        {
            Ok((meta, replaced)) => {
                debug!("stored {} ({} bytes) at {}", key, size_bytes, blob_path.display());
                if let Some(old) = replaced {
                    let old_path = self.blob_path(key, &old);
                    if let Err(err) = fs::remove_file(&old_path).await {
                        if err.kind() != ErrorKind::NotFound {
                            warn!("failed to remove replaced blob {}: {}", old_path.display(), err);
                        }
                    }
                }
                Ok(meta)
            }
            Err(err) => {
                let _ = fs::remove_file(&blob_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// A row whose payload file has gone missing reads as absent.
    async fn get(&self, key: &str) -> StorageResult<Option<(ObjectMeta, ByteStream)>> {
        self.ensure_key_safe(key)?;

        for _ in 0..READ_ATTEMPTS {
            let Some(stored) = self.fetch_stored(key).await? else {
                return Ok(None);
            };
            match File::open(self.blob_path(key, &stored.blob_id)).await {
                Ok(file) => return Ok(Some((stored.meta, ReaderStream::new(file).boxed()))),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("blob {} for {} is gone, re-reading row", stored.blob_id, key);
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        debug!("metadata for {} has no payload on disk", key);
        Ok(None)
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        self.ensure_key_safe(key)?;
        self.fetch_meta(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.ensure_key_safe(key)?;

        let removed = sqlx::query_scalar::<_, String>(
            "DELETE FROM objects WHERE key = ? RETURNING blob_id",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        let Some(blob_id) = removed else {
            return Ok(false);
        };

        let blob_path = self.blob_path(key, &blob_id);
        match fs::remove_file(&blob_path).await {
            Ok(_) => debug!("removed physical file {}", blob_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", blob_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        self.prune_empty_dirs(&self.shard_dir(key), &self.base_path)
            .await;

        Ok(true)
    }

    /// `SELECT 1` against SQLite plus a write/read/delete under `base_path`.
    async fn ping(&self) -> StorageResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StorageError::Io(io::Error::other(format!(
                "unexpected SELECT 1 result: {}",
                one
            ))));
        }

        fs::create_dir_all(&self.base_path).await?;
        let probe = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let read_back = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Io(io::Error::other("probe file content mismatch")));
        }
        Ok(())
    }
}
