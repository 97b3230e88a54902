//! Marine conditions: the normalized payload, an HTTP adapter for providers
//! that serve it, and the synthetic terminal generator.

pub mod adapter;
pub mod payload;
pub mod synthetic;

pub use adapter::ConditionsAdapter;
pub use payload::{
    ConditionsRequest, MarineConditions, MoonInfo, PressureTrend, SunTimes, TideEvent, TideKind,
};
pub use synthetic::SyntheticConditions;
