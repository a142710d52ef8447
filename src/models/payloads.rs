//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

/// `POST /upload-base64`
#[derive(Debug, Default, Deserialize)]
pub struct Base64UploadReq {
    pub data: Option<String>,
    pub filename: Option<String>,
    pub folder: Option<String>,
    pub content_type: Option<String>,
}

/// `POST /upload-url`
#[derive(Debug, Default, Deserialize)]
pub struct RemoteUploadReq {
    pub url: Option<String>,
    pub folder: Option<String>,
    pub filename: Option<String>,
}

/// Query for `GET /signed/{*key}`. Parsed by the handler so a bad value is a 400.
#[derive(Debug, Default, Deserialize)]
pub struct SignedUrlQuery {
    pub expires_in: Option<String>,
}

/// Query for `GET /temp/{*key}`.
#[derive(Debug, Default, Deserialize)]
pub struct TempAccessQuery {
    pub expires: Option<String>,
    pub token: Option<String>,
    pub download: Option<String>,
}

/// Query for `GET /{*key}`.
#[derive(Debug, Default, Deserialize)]
pub struct ServeQuery {
    pub download: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub success: bool,
    pub key: String,
    pub url: String,
    pub temp_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedUrlResponse {
    pub key: String,
    pub url: String,
    pub temp_url: String,
    pub expires_in: u64,
    pub size: i64,
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted: String,
}
