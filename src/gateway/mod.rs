//! Gateway composition root

mod builder;
mod embedded;

pub use builder::{Tidewire, TidewireBuilder};
pub use embedded::EmbeddedGateway;

/// Short name for the gateway type.
pub type Gateway = EmbeddedGateway;
