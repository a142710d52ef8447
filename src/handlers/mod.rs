//! axum handlers. Each one extracts its inputs, calls a single
//! `ObjectGateway` operation and renders the result.

pub mod base_url;
pub mod health_handlers;
pub mod object_handlers;
pub mod upload_handlers;
