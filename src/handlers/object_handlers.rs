//! HTTP handlers for reading, signing and deleting stored objects.
//! Object bodies are streamed from the store, never buffered here.

use super::base_url::BaseUrl;
use crate::{
    errors::AppError,
    models::{
        object::ObjectMeta,
        payloads::{DeleteResponse, ServeQuery, SignedUrlQuery, SignedUrlResponse, TempAccessQuery},
    },
    services::gateway::{ObjectGateway, ServeOutcome},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};

pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// `GET /{*key}` — stream an object, or `304` when `If-None-Match` matches.
pub async fn get_object(
    State(gateway): State<ObjectGateway>,
    Path(key): Path<String>,
    Query(q): Query<ServeQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let outcome = gateway.serve(&key, if_none_match(&headers)).await?;
    Ok(object_response(outcome, wants_download(q.download.as_deref())))
}

/// `GET /temp/{*key}?expires=&token=` — capability-gated read.
pub async fn get_temp_object(
    State(gateway): State<ObjectGateway>,
    Path(key): Path<String>,
    Query(q): Query<TempAccessQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let outcome = gateway
        .access_temp(
            &key,
            q.expires.as_deref(),
            q.token.as_deref(),
            if_none_match(&headers),
        )
        .await?;
    Ok(object_response(outcome, wants_download(q.download.as_deref())))
}

/// `GET /signed/{*key}?expires_in=` — mint a capability URL for an existing object.
pub async fn get_signed_url(
    State(gateway): State<ObjectGateway>,
    BaseUrl(base): BaseUrl,
    Path(key): Path<String>,
    Query(q): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrlResponse>, AppError> {
    let signed = gateway
        .signed_url(&key, q.expires_in.as_deref(), &base)
        .await?;
    Ok(Json(signed))
}

/// `DELETE /{*key}`
pub async fn delete_object(
    State(gateway): State<ObjectGateway>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    Ok(Json(gateway.delete(&key).await?))
}

fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
}

fn wants_download(flag: Option<&str>) -> bool {
    flag == Some("true")
}

fn object_response(outcome: ServeOutcome, download: bool) -> Response {
    match outcome {
        ServeOutcome::NotModified(meta) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            set_validator_headers(response.headers_mut(), &meta);
            response
        }
        ServeOutcome::Content(meta, body) => {
            let mut response = Response::new(Body::from_stream(body));
            *response.status_mut() = StatusCode::OK;
            set_object_headers(response.headers_mut(), &meta, download);
            response
        }
    }
}

fn set_validator_headers(headers: &mut HeaderMap, meta: &ObjectMeta) {
    if let Ok(value) = HeaderValue::from_str(&meta.quoted_etag()) {
        headers.insert(header::ETAG, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL),
    );
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMeta, download: bool) {
    let content_type = meta
        .content_type
        .as_deref()
        .filter(|ct| !ct.is_empty())
        .unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    set_validator_headers(headers, meta);

    let last_modified = meta.last_modified.format("%a, %d %b %Y %H:%M:%S GMT");
    if let Ok(value) = HeaderValue::from_str(&last_modified.to_string()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    if download {
        let filename = meta.filename().replace('\\', "\\\\").replace('"', "\\\"");
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
}
