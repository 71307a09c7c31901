//! Dynamically attachable behavior modules.
//!
//! A `Plugin` is a behavior object attached to one entity under a
//! `PluginKey`. Plugins are created through a shared [`PluginDef`]
//! factory, deep-copied when their entity is cloned, and persisted by
//! name of their def so load can reconstruct the right dynamic type.
//!
//! Trigger dispatch is statically matched: the engine-known triggers are
//! a closed enum, plus `Custom` for content-defined names. A plugin
//! overrides only the handlers it cares about; the defaults mean "not
//! interested" and dispatch continues to the next plugin. A handler
//! returning [`TriggerFlow::Cancel`] cancels the default effect the
//! trigger represents and short-circuits the remaining plugins.
//!
//! Handlers never receive the `World`. Mutations beyond the plugin's own
//! state (detaching itself, re-arming its expiry timer) are filed through
//! the [`TriggerCtx`] and applied after the handler returns, which keeps
//! dispatch safe to run from inside timer callbacks.

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use weald_types::TagValue;

use crate::error::LoadError;
use crate::keys::{KeyRegistry, TriggerKey};
use crate::persist::PropWriter;

/// A named notification delivered to an entity's attached plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The plugin's expiry timer elapsed. The plugin is detached after
    /// the handler returns unless it re-arms the expiry.
    Timeout,
    /// The entity is taking damage.
    Damage,
    /// The entity attempts to move.
    Movement,
    /// The entity died.
    Death,
    /// A dispel effect hit the entity.
    Dispel,
    /// Content-defined trigger, addressed by interned name.
    Custom(TriggerKey),
}

impl Trigger {
    /// Persisted name of this trigger.
    pub fn name<'a>(&self, keys: &'a KeyRegistry) -> &'a str {
        match self {
            Self::Timeout => "timeout",
            Self::Damage => "damage",
            Self::Movement => "movement",
            Self::Death => "death",
            Self::Dispel => "dispel",
            Self::Custom(key) => keys.resolve_trigger(*key),
        }
    }

    /// Inverse of [`Trigger::name`]; unknown names intern as `Custom`.
    pub fn from_name(keys: &mut KeyRegistry, name: &str) -> Self {
        match name {
            "timeout" => Self::Timeout,
            "damage" => Self::Damage,
            "movement" => Self::Movement,
            "death" => Self::Death,
            "dispel" => Self::Dispel,
            other => Self::Custom(keys.trigger(other)),
        }
    }
}

/// Opaque payload handed to trigger handlers.
#[derive(Debug, Clone, Default)]
pub struct TriggerArgs {
    pub values: Vec<TagValue>,
}

impl TriggerArgs {
    pub fn new(values: Vec<TagValue>) -> Self {
        Self { values }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// Whether a handler cancels the default effect its trigger represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerFlow {
    Continue,
    Cancel,
}

/// Requests a handler files against its own attachment, applied by the
/// world after the handler returns.
#[derive(Debug, Default)]
pub struct TriggerCtx {
    pub(crate) detach: bool,
    pub(crate) expire_in: Option<Duration>,
}

impl TriggerCtx {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Detach (and dispose) this plugin once the handler returns.
    pub fn detach_self(&mut self) {
        self.detach = true;
    }

    /// Arm or re-arm this plugin's self-expiry timer.
    pub fn expire_in(&mut self, due_in: Duration) {
        self.expire_in = Some(due_in);
    }
}

/// A behavior module attached to an entity.
pub trait Plugin {
    /// Name of the def that created this instance; the unit of save/load
    /// type resolution.
    fn def_name(&self) -> &str;

    /// Deep copy with fresh identity and identical instance state.
    fn clone_plugin(&self) -> Box<dyn Plugin>;

    /// Typed access to instance state for content code that knows the
    /// concrete type behind a key. Implement as `self`.
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The plugin was attached to an entity.
    fn on_assign(&mut self, _ctx: &mut TriggerCtx) {}

    /// The plugin is being detached; its expiry timer is already doomed.
    fn on_unassign(&mut self) {}

    fn on_timeout(&mut self, _args: &TriggerArgs, _ctx: &mut TriggerCtx) -> TriggerFlow {
        TriggerFlow::Continue
    }

    fn on_damage(&mut self, _args: &TriggerArgs, _ctx: &mut TriggerCtx) -> TriggerFlow {
        TriggerFlow::Continue
    }

    fn on_movement(&mut self, _args: &TriggerArgs, _ctx: &mut TriggerCtx) -> TriggerFlow {
        TriggerFlow::Continue
    }

    fn on_death(&mut self, _args: &TriggerArgs, _ctx: &mut TriggerCtx) -> TriggerFlow {
        TriggerFlow::Continue
    }

    fn on_dispel(&mut self, _args: &TriggerArgs, _ctx: &mut TriggerCtx) -> TriggerFlow {
        TriggerFlow::Continue
    }

    fn on_custom(&mut self, _name: TriggerKey, _args: &TriggerArgs, _ctx: &mut TriggerCtx) -> TriggerFlow {
        TriggerFlow::Continue
    }

    /// Write instance fields as `name = value` lines. The base fields
    /// (`def`, `expireIn`) are written by the world saver.
    fn save(&self, _w: &mut PropWriter<'_>) -> io::Result<()> {
        Ok(())
    }

    /// Interpret one persisted field. Return `Ok(false)` for fields this
    /// type does not recognize; the loader's fallback chain handles (or
    /// warns about) them.
    fn load_line(&mut self, _field: &str, _value: &str) -> Result<bool, LoadError> {
        Ok(false)
    }
}

/// Route one trigger to the matching handler.
pub(crate) fn deliver(
    plugin: &mut dyn Plugin,
    trigger: Trigger,
    args: &TriggerArgs,
    ctx: &mut TriggerCtx,
) -> TriggerFlow {
    match trigger {
        Trigger::Timeout => plugin.on_timeout(args, ctx),
        Trigger::Damage => plugin.on_damage(args, ctx),
        Trigger::Movement => plugin.on_movement(args, ctx),
        Trigger::Death => plugin.on_death(args, ctx),
        Trigger::Dispel => plugin.on_dispel(args, ctx),
        Trigger::Custom(name) => plugin.on_custom(name, args, ctx),
    }
}

/// Shared factory/descriptor for one kind of plugin. Referenced by many
/// instances; also the unit of save/load type resolution.
pub trait PluginDef: Send + Sync {
    /// Registered (and persisted) name of this def.
    fn name(&self) -> &str;

    /// Allocate a new, un-attached instance bound to this def.
    fn create(&self) -> Box<dyn Plugin>;
}

/// Process-wide def lookup, keyed by registered name.
#[derive(Default)]
pub struct DefRegistry {
    defs: HashMap<String, Arc<dyn PluginDef>>,
}

impl DefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a def. Re-registering a name replaces the previous def
    /// (content reload); existing instances keep their old behavior.
    pub fn register_def(&mut self, def: Arc<dyn PluginDef>) {
        self.defs.insert(def.name().to_string(), def);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PluginDef>> {
        self.defs.get(name).cloned()
    }
}

impl std::fmt::Debug for DefRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefRegistry")
            .field("defs", &self.defs.keys().collect::<Vec<_>>())
            .finish()
    }
}
