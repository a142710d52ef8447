//! Core services: key derivation, capability tokens, the gateway flows and
//! the storage backends they run against.

pub mod authorizer;
pub mod capability_service;
pub mod clock;
pub mod gateway;
pub mod key_deriver;
pub mod memory_store;
pub mod object_store;
pub mod remote_fetch;
pub mod storage_service;
pub mod token_codec;
