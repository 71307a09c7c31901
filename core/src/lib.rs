//! Simulation core: entities with dynamic tags, plugins and timers, a
//! deterministic scheduler over a simulated clock, and a line-oriented
//! save format that survives restarts.

pub mod entity;
pub mod error;
pub mod keys;
pub mod persist;
pub mod plugin;
pub mod queue;
pub mod scheduler;
pub mod world;

#[cfg(test)]
mod persist_tests;
#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use entity::{Entity, EntityId};
pub use error::{CoreError, LoadError};
pub use keys::{KeyRegistry, PluginKey, TagKey, TimerKey, TriggerKey};
pub use persist::{LoadReport, PropWriter, load_world, save_world};
pub use plugin::{DefRegistry, Plugin, PluginDef, Trigger, TriggerArgs, TriggerCtx, TriggerFlow};
pub use queue::GrowQueue;
pub use scheduler::{SimTime, Timer, TimerAction, TimerState};
pub use weald_types::{TagValue, WorldConfig};
pub use world::{FnRegistry, TimerFn, World};
