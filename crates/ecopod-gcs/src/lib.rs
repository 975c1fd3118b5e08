//! Ecopod GCS - Google Cloud Storage adapter
//!
//! Implements the remote store port against the GCS JSON API:
//! service-account authentication (RS256 JWT-bearer exchange, cached
//! access token) and simple media uploads. The device is unattended, so
//! every operation here is non-interactive; credentials come from the key
//! file carried on the pod's storage.

pub mod auth;
pub mod client;

pub use auth::{ServiceAccountKey, TokenManager};
pub use client::GcsClient;
