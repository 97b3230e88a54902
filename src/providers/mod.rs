//! Providers and the fallback chain that ties them together.
//!
//! - [`DataProvider`] / [`SyntheticProvider`]: the uniform provider interface
//! - [`ProviderChain`]: priority-ordered fallback with per-provider breakers
//! - [`HttpProvider`]: a provider built from the shared executor plus a
//!   per-provider [`RequestAdapter`]

pub mod chain;
pub mod http;
pub mod result;
pub mod traits;

pub use chain::{ChainBuilder, DEFAULT_STALE_TTL, ProviderChain, ProviderEntry};
pub use http::{HttpProvider, RequestAdapter};
pub use result::{ProviderResult, ResultStatus, SourceOutcome, SourceStatus};
pub use traits::{DataProvider, SYNTHETIC_PROVIDER_ID, SyntheticProvider};
