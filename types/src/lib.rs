//! Shared value and configuration types for the world core.

pub mod config;
pub mod value;

pub use config::WorldConfig;
pub use value::TagValue;
