//! Provider traits for data-domain implementations.
//!
//! A chain is parameterized over one request type and one payload type, so
//! every data domain (conditions, vessel tracking, imagery) reuses the same
//! fallback machinery with its own providers.
//!
//! # Fallback Semantics
//!
//! Any error from [`DataProvider::fetch`] (after retries) makes the chain
//! advance to the next provider. The chain ends at a [`SyntheticProvider`],
//! which is infallible by construction: `generate` returns a payload, not a
//! `Result`, and performs no I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

/// Provider id reported by synthetic results.
pub const SYNTHETIC_PROVIDER_ID: &str = "mock";

/// A live data source.
///
/// Implementations perform one logical fetch; retries and circuit breaking
/// are applied around them by the chain.
#[async_trait]
pub trait DataProvider<Req, T>: Send + Sync {
    /// Provider id used for provenance, breakers and logs.
    fn id(&self) -> &str;

    async fn fetch(&self, request: &Req) -> Result<T>;
}

/// Deterministic terminal provider.
pub trait SyntheticProvider<Req, T>: Send + Sync {
    fn id(&self) -> &str {
        SYNTHETIC_PROVIDER_ID
    }

    /// Produce a structurally complete payload for `request` at `now`.
    fn generate(&self, request: &Req, now: DateTime<Utc>) -> T;
}
