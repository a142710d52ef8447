//! Per-request public base URL (`scheme://host`), honouring reverse-proxy headers.

use crate::errors::AppError;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(pub String);

impl<S> FromRequestParts<S> for BaseUrl
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let scheme = first_value(headers, "x-forwarded-proto")
            .or_else(|| parts.uri.scheme_str())
            .unwrap_or("http");
        let host = first_value(headers, "x-forwarded-host")
            .or_else(|| first_value(headers, header::HOST.as_str()))
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .ok_or_else(|| AppError::bad_request("Missing Host header"))?;

        Ok(BaseUrl(format!("{}://{}", scheme, host)))
    }
}

/// First comma-separated entry of a header, trimmed.
fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
