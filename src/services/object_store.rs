//! The storage capability the gateway is written against.

use crate::models::object::ObjectMeta;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;

/// A stream of payload chunks flowing into a store. It may borrow from the
/// request it is read from.
pub type BodyStream<'a> = BoxStream<'a, io::Result<Bytes>>;

/// An owned stream of payload chunks, as handed out by `get`.
pub type ByteStream = BodyStream<'static>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// `put`/`get`/`head`/`delete` over path-like keys.
///
/// Each call is atomic on its own; there are no cross-key transactions and
/// concurrent writers to one key resolve last-writer-wins. Whatever `head`
/// reports for a key always describes the bytes `get` streams for it. A `put`
/// whose body stream fails leaves no object behind.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: BodyStream<'_>,
    ) -> StorageResult<ObjectMeta>;

    async fn get(&self, key: &str) -> StorageResult<Option<(ObjectMeta, ByteStream)>>;

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Readiness probe for the backend.
    async fn ping(&self) -> StorageResult<()>;
}
