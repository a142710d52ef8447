//! Outbound fetch for `POST /upload-url`.
//!
//! The response body is handed over as a stream so it can flow straight into
//! the store. Limits are opt-in: with no timeout a hanging origin holds the
//! request open, with no byte cap the whole body is accepted.

use super::object_store::ByteStream;
use futures::StreamExt;
use std::{io, time::Duration};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_REMOTE_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to fetch URL: {0}")]
    Status(reqwest::StatusCode),
    #[error("Remote object exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("Failed to fetch URL: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    /// Recover a fetch error that travelled through a body stream as `io::Error`.
    pub fn from_io(err: &io::Error) -> Option<&FetchError> {
        err.get_ref()?.downcast_ref::<FetchError>()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchLimits {
    pub timeout: Option<Duration>,
    pub max_bytes: Option<u64>,
}

/// A remote resource whose body has not been read yet.
pub struct RemoteObject {
    pub content_type: String,
    /// Last path segment of the URL, if any.
    pub filename: Option<String>,
    pub body: ByteStream,
}

#[derive(Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    max_bytes: Option<u64>,
}

impl RemoteFetcher {
    pub fn new(limits: FetchLimits) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = limits.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            max_bytes: limits.max_bytes,
        })
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<RemoteObject, FetchError> {
        let url = Url::parse(raw_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme `{}`",
                url.scheme()
            )));
        }

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        if let (Some(limit), Some(declared)) = (self.max_bytes, response.content_length()) {
            if declared > limit {
                return Err(FetchError::TooLarge { limit });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_REMOTE_CONTENT_TYPE)
            .to_string();

        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        debug!("fetching {} ({})", url, content_type);

        let limit = self.max_bytes;
        let mut received: u64 = 0;
        let body = response
            .bytes_stream()
            .map(move |chunk| {
                let chunk = chunk.map_err(|e| io::Error::other(FetchError::Transport(e)))?;
                received += chunk.len() as u64;
                match limit {
                    Some(limit) if received > limit => {
                        Err(io::Error::other(FetchError::TooLarge { limit }))
                    }
                    _ => Ok(chunk),
                }
            })
            .boxed();

        Ok(RemoteObject {
            content_type,
            filename,
            body,
        })
    }
}
