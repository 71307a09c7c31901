//! World core configuration.
//!
//! Loaded from TOML by the embedding server process. Every field has a
//! default so a partial (or empty) config file is valid.

use serde::{Deserialize, Serialize};

/// Configuration for a world core instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Path of the world save file, relative to the server's data directory.
    #[serde(default = "default_save_path")]
    pub save_path: String,

    /// Initial capacity of the scheduler's pending-submission queue.
    /// The queue grows on demand; this only sizes the first allocation.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Simulated seconds advanced per scheduler tick when the embedding
    /// server drives the clock in fixed steps.
    #[serde(default = "default_tick_step_secs")]
    pub tick_step_secs: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            save_path: default_save_path(),
            queue_capacity: default_queue_capacity(),
            tick_step_secs: default_tick_step_secs(),
        }
    }
}

fn default_save_path() -> String {
    "world.props".to_string()
}

fn default_queue_capacity() -> usize {
    32
}

fn default_tick_step_secs() -> f64 {
    0.1
}
