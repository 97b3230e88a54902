//! Caching subsystem.
//!
//! - [`Fingerprint`]: deterministic SHA-256 key derived from a resource id
//!   and its normalized request options.
//! - [`ResponseCache`]: bounded LRU + TTL store with lazy expiry on read,
//!   sweep-on-write and a periodic background sweep.
//!
//! A cache hit short-circuits everything below it: breakers, retries and
//! the network are never consulted.

pub mod fingerprint;
pub mod response;

pub use fingerprint::{CacheKey, Fingerprint};
pub use response::{CacheConfig, ResponseCache, SharedCache};
