//! ObjectGateway — upload, serve, sign and delete flows over an `ObjectStore`.
//!
//! Every upload ends the same way: derive a key, `put`, then answer with the
//! public URL and a freshly minted one-hour capability URL.

use super::{
    authorizer::{AllowAll, Authorizer, Decision, Operation},
    capability_service::{CapabilityUrl, CapabilityUrlService, Verification},
    key_deriver::{derive_key, has_extension},
    object_store::{BodyStream, ByteStream, ObjectStore},
    remote_fetch::RemoteFetcher,
};
use crate::{
    errors::GatewayError,
    models::{
        object::ObjectMeta,
        payloads::{
            Base64UploadReq, DeleteResponse, RemoteUploadReq, SignedUrlResponse, UploadResponse,
        },
    },
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use futures::{StreamExt, future, stream};
use std::sync::Arc;
use tracing::{info, warn};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Lifetime of the capability URL returned with every upload.
pub const UPLOAD_TEMP_TTL_SECS: u64 = 3600;
pub const DEFAULT_SIGNED_TTL_SECS: u64 = 3600;
pub const DEFAULT_BASE64_CONTENT_TYPE: &str = "image/png";

/// The `file` part of a multipart upload. `body` may still be borrowing the
/// request it is being read from.
pub struct UploadedFile<'a> {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub body: BodyStream<'a>,
}

impl UploadedFile<'static> {
    /// A file part that was read into memory before the upload started.
    pub fn buffered(filename: Option<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            filename,
            content_type,
            body: single_chunk(bytes),
        }
    }
}

/// Fields of `POST /upload`.
#[derive(Default)]
pub struct MultipartUpload<'a> {
    pub folder: Option<String>,
    pub name: Option<String>,
    pub file: Option<UploadedFile<'a>>,
}

pub enum ServeOutcome {
    NotModified(ObjectMeta),
    Content(ObjectMeta, ByteStream),
}

#[derive(Clone)]
pub struct ObjectGateway {
    store: Arc<dyn ObjectStore>,
    capabilities: CapabilityUrlService,
    fetcher: RemoteFetcher,
    authorizer: Arc<dyn Authorizer>,
    max_signed_ttl: Option<u64>,
}

impl ObjectGateway {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        capabilities: CapabilityUrlService,
        fetcher: RemoteFetcher,
    ) -> Self {
        Self {
            store,
            capabilities,
            fetcher,
            authorizer: Arc::new(AllowAll),
            max_signed_ttl: None,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Cap the lifetime of capability URLs. `None` leaves it unbounded.
    pub fn with_max_signed_ttl(mut self, max: Option<u64>) -> Self {
        self.max_signed_ttl = max;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// `POST /upload`
    pub async fn upload_stream(
        &self,
        upload: MultipartUpload<'_>,
        base_url: &str,
    ) -> GatewayResult<UploadResponse> {
        let UploadedFile {
            filename,
            content_type,
            body,
        } = upload
            .file
            .ok_or_else(|| GatewayError::BadRequest("No file provided".into()))?;

        let key = derive_key(
            upload.folder.as_deref(),
            upload.name.as_deref(),
            filename.as_deref(),
            content_type.as_deref(),
        );
        let (_, response) = self
            .store_upload(&key, content_type.as_deref(), body, base_url)
            .await?;
        Ok(response)
    }

    /// `POST /upload-base64`
    ///
    /// A `data:<mime>;base64,` prefix sets the content type; without one the
    /// `content_type` field (default `image/png`) is used.
    pub async fn upload_base64(
        &self,
        req: Base64UploadReq,
        base_url: &str,
    ) -> GatewayResult<UploadResponse> {
        let data = req
            .data
            .filter(|d| !d.is_empty())
            .ok_or_else(|| GatewayError::BadRequest("No data provided".into()))?;

        let (content_type, encoded) = match split_data_url(&data) {
            Some((mime, payload)) => (mime.to_string(), payload),
            None => (
                req.content_type
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or_else(|| DEFAULT_BASE64_CONTENT_TYPE.into()),
                data.as_str(),
            ),
        };
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| GatewayError::Internal(format!("Invalid base64 data: {}", e)))?;

        let key = derive_key(
            req.folder.as_deref(),
            req.filename.as_deref(),
            req.filename.as_deref(),
            Some(&content_type),
        );
        let (meta, mut response) = self
            .store_upload(&key, Some(&content_type), single_chunk(bytes.into()), base_url)
            .await?;
        response.size = Some(meta.size_bytes);
        Ok(response)
    }

    /// `POST /upload-url`
    ///
    /// The remote body is streamed into the store. A non-2xx answer, or a
    /// body over the configured cap, fails the whole request.
    pub async fn upload_from_remote(
        &self,
        req: RemoteUploadReq,
        base_url: &str,
    ) -> GatewayResult<UploadResponse> {
        let source = req
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GatewayError::BadRequest("No URL provided".into()))?;

        let remote = self.fetcher.fetch(&source).await.inspect_err(|e| {
            warn!("remote fetch of {} failed: {}", source, e);
        })?;

        // A requested filename with its own extension outranks the URL's.
        let extension_hint = req
            .filename
            .as_deref()
            .filter(|f| has_extension(f))
            .or(remote.filename.as_deref());
        let key = derive_key(
            req.folder.as_deref(),
            req.filename.as_deref(),
            extension_hint,
            Some(&remote.content_type),
        );
        let (meta, mut response) = self
            .store_upload(&key, Some(&remote.content_type), remote.body, base_url)
            .await?;
        response.size = Some(meta.size_bytes);
        response.source = Some(source);
        Ok(response)
    }

    async fn store_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: BodyStream<'_>,
        base_url: &str,
    ) -> GatewayResult<(ObjectMeta, UploadResponse)> {
        self.authorize(Operation::Upload, key)?;

        let meta = self.store.put(key, content_type, body).await?;
        let ttl = self.bounded_ttl(UPLOAD_TEMP_TTL_SECS);
        let temp = self.mint(key, ttl, base_url)?;
        info!("stored {} ({} bytes)", key, meta.size_bytes);

        let response = UploadResponse {
            success: true,
            key: key.to_string(),
            url: public_url(base_url, key),
            temp_url: temp.url,
            size: None,
            source: None,
        };
        Ok((meta, response))
    }

    /// `GET /{*key}`
    ///
    /// With `if_none_match` matching the stored etag the body is never opened.
    pub async fn serve(&self, key: &str, if_none_match: Option<&str>) -> GatewayResult<ServeOutcome> {
        if let Some(condition) = if_none_match {
            let meta = self.store.head(key).await?.ok_or_else(not_found)?;
            if etag_matches(condition, &meta) {
                return Ok(ServeOutcome::NotModified(meta));
            }
        }

        let (meta, body) = self.store.get(key).await?.ok_or_else(not_found)?;
        Ok(ServeOutcome::Content(meta, body))
    }

    /// `GET /temp/{*key}` — verify the capability, then serve as usual.
    pub async fn access_temp(
        &self,
        key: &str,
        expires: Option<&str>,
        token: Option<&str>,
        if_none_match: Option<&str>,
    ) -> GatewayResult<ServeOutcome> {
        match self.capabilities.verify(key, expires, token) {
            Verification::Valid => self.serve(key, if_none_match).await,
            Verification::Malformed => Err(GatewayError::BadRequest(
                "Missing expires or token".into(),
            )),
            Verification::Expired => {
                warn!("expired capability for {}", key);
                Err(GatewayError::Forbidden("Link expired".into()))
            }
            Verification::Invalid => {
                warn!("invalid capability token for {}", key);
                Err(GatewayError::Forbidden("Invalid token".into()))
            }
        }
    }

    /// `GET /signed/{*key}` — mint a capability URL for an existing object.
    pub async fn signed_url(
        &self,
        key: &str,
        expires_in: Option<&str>,
        base_url: &str,
    ) -> GatewayResult<SignedUrlResponse> {
        let ttl = match expires_in.filter(|v| !v.is_empty()) {
            None => DEFAULT_SIGNED_TTL_SECS,
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| GatewayError::BadRequest(format!("Invalid expires_in `{}`", raw)))?,
        };
        if let Some(max) = self.max_signed_ttl {
            if ttl > max {
                return Err(GatewayError::BadRequest(format!(
                    "expires_in exceeds maximum of {} seconds",
                    max
                )));
            }
        }
        self.authorize(Operation::Sign, key)?;

        let meta = self.store.head(key).await?.ok_or_else(not_found)?;
        let temp = self.mint(key, ttl, base_url)?;

        Ok(SignedUrlResponse {
            key: key.to_string(),
            url: public_url(base_url, key),
            temp_url: temp.url,
            expires_in: ttl,
            size: meta.size_bytes,
            content_type: meta
                .content_type
                .unwrap_or_else(|| "application/octet-stream".into()),
        })
    }

    /// `DELETE /{*key}` — the key must exist; nothing remains afterwards.
    pub async fn delete(&self, key: &str) -> GatewayResult<DeleteResponse> {
        self.authorize(Operation::Delete, key)?;

        self.store.head(key).await?.ok_or_else(not_found)?;
        if !self.store.delete(key).await? {
            return Err(not_found());
        }
        info!("deleted {}", key);

        Ok(DeleteResponse {
            success: true,
            deleted: key.to_string(),
        })
    }

    fn authorize(&self, operation: Operation, key: &str) -> GatewayResult<()> {
        match self.authorizer.authorize(operation, key) {
            Decision::Allow => Ok(()),
            Decision::Deny => {
                warn!("{} denied for {}", operation, key);
                Err(GatewayError::Forbidden("Operation not permitted".into()))
            }
        }
    }

    fn bounded_ttl(&self, ttl: u64) -> u64 {
        self.max_signed_ttl.map_or(ttl, |max| ttl.min(max))
    }

    fn mint(&self, key: &str, ttl: u64, base_url: &str) -> GatewayResult<CapabilityUrl> {
        self.capabilities
            .mint(key, ttl, base_url)
            .map_err(|e| GatewayError::Internal(format!("cannot build URL from `{}`: {}", base_url, e)))
    }
}

fn single_chunk(bytes: Bytes) -> ByteStream {
    stream::once(future::ready(Ok(bytes))).boxed()
}

fn not_found() -> GatewayError {
    GatewayError::NotFound("Not found".into())
}

fn public_url(base_url: &str, key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), key)
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload.
fn split_data_url(data: &str) -> Option<(&str, &str)> {
    let rest = data.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    Some((mime, payload))
}

/// `If-None-Match` semantics: `*`, or any listed tag equal to ours (weak or strong).
fn etag_matches(header: &str, meta: &ObjectMeta) -> bool {
    let quoted = meta.quoted_etag();
    header.split(',').map(str::trim).any(|candidate| {
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        candidate == "*" || candidate == quoted || candidate == meta.etag
    })
}
