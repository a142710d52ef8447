//! In-memory `ObjectStore`. Contents live only as long as the process.

use super::object_store::{BodyStream, ByteStream, ObjectStore, StorageError, StorageResult};
use crate::models::object::ObjectMeta;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{StreamExt, stream};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, (ObjectMeta, Bytes)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        mut body: BodyStream<'_>,
    ) -> StorageResult<ObjectMeta> {
        if key.is_empty() {
            return Err(StorageError::InvalidObjectKey);
        }

        // Buffer fully before touching the map so a failed stream stores nothing.
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let bytes = buf.freeze();

        let meta = ObjectMeta {
            key: key.to_string(),
            content_type: content_type.map(str::to_string),
            size_bytes: bytes.len() as i64,
            etag: format!("{:x}", md5::compute(&bytes)),
            last_modified: Utc::now(),
        };
        self.objects
            .write()
            .await
            .insert(key.to_string(), (meta.clone(), bytes));
        Ok(meta)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<(ObjectMeta, ByteStream)>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|(meta, bytes)| {
            let body = stream::once(futures::future::ready(Ok(bytes.clone()))).boxed();
            (meta.clone(), body)
        }))
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        Ok(self.objects.read().await.get(key).map(|(meta, _)| meta.clone()))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.write().await.remove(key).is_some())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
