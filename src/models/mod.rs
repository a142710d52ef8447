//! Data models for the object gateway.
//!
//! `ObjectMeta` maps to the `objects` table via `sqlx::FromRow`; the payload
//! types describe the JSON bodies accepted and returned over HTTP.

pub mod object;
pub mod payloads;
