//! The extensible entity: tag, timer and plugin holder.
//!
//! An entity owns three independent stores. Tags are plain typed values;
//! timers and plugins each hold at most one live occupant per key, with
//! replace semantics enforced by the `World` operations. The plugin
//! store is a vec so trigger dispatch walks attachments in order.
//!
//! Everything that touches the scheduler (adding timers, attaching
//! plugins with expiry, destruction) lives on `World`; this type is the
//! storage plus the operations that need no scheduler.

use std::fmt;

use hashbrown::HashMap;
use weald_types::TagValue;

use crate::keys::{KeyRegistry, PluginKey, TagKey, TimerKey};
use crate::plugin::Plugin;
use crate::scheduler::{SimTime, Timer};

/// Stable handle to an entity for the life of a `World`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A plugin's self-expiry timer: absolute due time plus the schedule
/// stamp that keeps the scheduler's entry honest. Dropping the record
/// cancels the timer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExpiryTimer {
    pub due: SimTime,
    pub seq: u64,
}

pub struct Entity {
    id: EntityId,
    pub(crate) tags: HashMap<TagKey, TagValue>,
    pub(crate) timers: HashMap<TimerKey, Timer>,
    pub(crate) plugins: Vec<(PluginKey, Box<dyn Plugin>)>,
    pub(crate) plugin_timers: HashMap<PluginKey, ExpiryTimer>,
}

impl Entity {
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            id,
            tags: HashMap::new(),
            timers: HashMap::new(),
            plugins: Vec::new(),
            plugin_timers: HashMap::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    // ─── Tags ───────────────────────────────────────────────────────────

    pub fn set_tag(&mut self, key: TagKey, value: TagValue) {
        self.tags.insert(key, value);
    }

    pub fn tag(&self, key: TagKey) -> Option<&TagValue> {
        self.tags.get(&key)
    }

    pub fn remove_tag(&mut self, key: TagKey) -> Option<TagValue> {
        self.tags.remove(&key)
    }

    pub fn tags(&self) -> impl Iterator<Item = (TagKey, &TagValue)> {
        self.tags.iter().map(|(k, v)| (*k, v))
    }

    /// Human-readable tag listing for operator commands.
    pub fn describe_tags(&self, keys: &KeyRegistry) -> String {
        if self.tags.is_empty() {
            return format!("entity {} has no tags", self.id);
        }
        let mut lines: Vec<String> = self
            .tags
            .iter()
            .map(|(k, v)| format!("{} = {}", keys.resolve_tag(*k), v))
            .collect();
        lines.sort();
        format!("tags of entity {}:\n{}", self.id, lines.join("\n"))
    }

    // ─── Timers ─────────────────────────────────────────────────────────

    pub fn timer(&self, key: TimerKey) -> Option<&Timer> {
        self.timers.get(&key)
    }

    pub fn has_timer(&self, key: TimerKey) -> bool {
        self.timers.contains_key(&key)
    }

    pub fn timers(&self) -> impl Iterator<Item = (TimerKey, &Timer)> {
        self.timers.iter().map(|(k, t)| (*k, t))
    }

    // ─── Plugins ────────────────────────────────────────────────────────

    pub fn plugin(&self, key: PluginKey) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, p)| p.as_ref())
    }

    pub fn plugin_mut(&mut self, key: PluginKey) -> Option<&mut (dyn Plugin + 'static)> {
        self.plugins
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, p)| p.as_mut())
    }

    pub fn has_plugin(&self, key: PluginKey) -> bool {
        self.plugins.iter().any(|(k, _)| *k == key)
    }

    /// Attached plugins in attachment order.
    pub fn plugins(&self) -> impl Iterator<Item = (PluginKey, &dyn Plugin)> {
        self.plugins.iter().map(|(k, p)| (*k, p.as_ref()))
    }

    pub(crate) fn plugin_position(&self, key: PluginKey) -> Option<usize> {
        self.plugins.iter().position(|(k, _)| *k == key)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("tags", &self.tags.len())
            .field("timers", &self.timers.len())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}
