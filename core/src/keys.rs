//! Interned key namespaces.
//!
//! Tag, timer, plugin and trigger names are interned once per registry;
//! acquiring the same name twice yields an identical `Copy` key, so all
//! downstream lookups compare symbols instead of strings. The registry is
//! an explicit object owned by the `World` (not an ambient global) so
//! tests stay isolated. Acquisition never fails and keys are never
//! removed.

use lasso::{Rodeo, Spur};

macro_rules! key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Spur);
    };
}

key_type!(
    /// Addresses a tag on an entity.
    TagKey
);
key_type!(
    /// Addresses a timer on an entity.
    TimerKey
);
key_type!(
    /// Addresses a plugin on an entity.
    PluginKey
);
key_type!(
    /// Names a content-defined trigger.
    TriggerKey
);

/// Four disjoint interning namespaces. The same name acquired in two
/// different namespaces yields unrelated keys.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    tags: Rodeo,
    timers: Rodeo,
    plugins: Rodeo,
    triggers: Rodeo,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&mut self, name: &str) -> TagKey {
        TagKey(self.tags.get_or_intern(name))
    }

    pub fn timer(&mut self, name: &str) -> TimerKey {
        TimerKey(self.timers.get_or_intern(name))
    }

    pub fn plugin(&mut self, name: &str) -> PluginKey {
        PluginKey(self.plugins.get_or_intern(name))
    }

    pub fn trigger(&mut self, name: &str) -> TriggerKey {
        TriggerKey(self.triggers.get_or_intern(name))
    }

    pub fn resolve_tag(&self, key: TagKey) -> &str {
        self.tags.resolve(&key.0)
    }

    pub fn resolve_timer(&self, key: TimerKey) -> &str {
        self.timers.resolve(&key.0)
    }

    pub fn resolve_plugin(&self, key: PluginKey) -> &str {
        self.plugins.resolve(&key.0)
    }

    pub fn resolve_trigger(&self, key: TriggerKey) -> &str {
        self.triggers.resolve(&key.0)
    }
}
