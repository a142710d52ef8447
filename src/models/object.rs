//! Metadata for a stored object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Everything the gateway knows about a stored object apart from its bytes.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object key (`folder/name.ext`).
    pub key: String,

    /// Content type (MIME type) declared at upload.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded. Changes iff the content changes.
    pub etag: String,

    /// When the payload was last written.
    pub last_modified: DateTime<Utc>,
}

impl ObjectMeta {
    /// The etag as sent in `ETag` headers.
    pub fn quoted_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }

    /// Last path segment of the key, used as a download filename.
    pub fn filename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}
