//! World composition root.
//!
//! Owns the entities, the simulated clock, the scheduler and the three
//! registries, and hosts every operation that crosses component lines
//! (scheduling, plugin attachment, trigger dispatch, deep copy). All of
//! it takes `&mut self`: one logical simulation thread drives the world,
//! and timer callbacks run to completion before the next pop.

use std::time::Duration;

use hashbrown::HashMap;
use tracing::warn;
use weald_types::{TagValue, WorldConfig};

use crate::entity::{Entity, EntityId, ExpiryTimer};
use crate::error::CoreError;
use crate::keys::{KeyRegistry, PluginKey, TimerKey};
use crate::plugin::{
    DefRegistry, Plugin, Trigger, TriggerArgs, TriggerCtx, TriggerFlow, deliver,
};
use crate::scheduler::{SchedEntry, Scheduler, SimTime, Timer, TimerAction, TimerSlot, TimerState};

/// A function a timer can invoke by registered name. Plain `fn` so the
/// registry entry can be copied out before the call borrows the world.
pub type TimerFn = fn(&mut World, EntityId, &[TagValue], Option<&str>);

/// Process-wide named-function registry for function timers.
/// Append-only; registered names are also the persisted form.
#[derive(Debug, Default)]
pub struct FnRegistry {
    fns: HashMap<String, TimerFn>,
}

impl FnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: TimerFn) {
        self.fns.insert(name.into(), f);
    }

    pub fn get(&self, name: &str) -> Option<TimerFn> {
        self.fns.get(name).copied()
    }
}

pub struct World {
    pub keys: KeyRegistry,
    pub fns: FnRegistry,
    pub defs: DefRegistry,
    entities: HashMap<EntityId, Entity>,
    scheduler: Scheduler,
    now: SimTime,
    next_entity: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_config(&WorldConfig::default())
    }

    pub fn with_config(config: &WorldConfig) -> Self {
        Self {
            keys: KeyRegistry::new(),
            fns: FnRegistry::new(),
            defs: DefRegistry::new(),
            entities: HashMap::new(),
            scheduler: Scheduler::with_capacity(config.queue_capacity),
            now: SimTime::ZERO,
            next_entity: 1,
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    // ─── Entities ───────────────────────────────────────────────────────

    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        self.entities.insert(id, Entity::new(id));
        id
    }

    /// Recreate an entity under a known id (world load).
    pub(crate) fn spawn_with_id(&mut self, id: EntityId) {
        self.next_entity = self.next_entity.max(id.0 + 1);
        self.entities.insert(id, Entity::new(id));
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Destroy an entity. All of its timers die with it (their scheduler
    /// entries go stale) and every plugin gets its teardown notification.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(mut ent) = self.entities.remove(&id) else {
            return false;
        };
        for (_, plugin) in &mut ent.plugins {
            plugin.on_unassign();
        }
        true
    }

    /// Deep-copy an entity: tags, plugins (independent instances, same
    /// def) and all timers, each rebound to the clone with a fresh
    /// schedule stamp and the same due time.
    pub fn clone_entity(&mut self, src: EntityId) -> Option<EntityId> {
        let (tags, plugins, timers, plugin_timers) = {
            let ent = self.entities.get(&src)?;
            let plugins: Vec<(PluginKey, Box<dyn Plugin>)> = ent
                .plugins
                .iter()
                .map(|(k, p)| (*k, p.clone_plugin()))
                .collect();
            let timers: Vec<(TimerKey, Timer)> =
                ent.timers.iter().map(|(k, t)| (*k, t.clone())).collect();
            let plugin_timers: Vec<(PluginKey, ExpiryTimer)> =
                ent.plugin_timers.iter().map(|(k, t)| (*k, *t)).collect();
            (ent.tags.clone(), plugins, timers, plugin_timers)
        };

        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        let mut clone = Entity::new(id);
        clone.tags = tags;
        clone.plugins = plugins;
        self.entities.insert(id, clone);

        for (key, mut timer) in timers {
            let seq = self.scheduler.allot_seq();
            timer.seq = seq;
            timer.owner = Some(id);
            timer.key = Some(key);
            let due = timer.due;
            if let Some(ent) = self.entities.get_mut(&id) {
                ent.timers.insert(key, timer);
            }
            self.scheduler.submit(SchedEntry {
                due,
                seq,
                owner: id,
                slot: TimerSlot::Entity(key),
            });
        }
        for (key, old) in plugin_timers {
            let seq = self.scheduler.allot_seq();
            if let Some(ent) = self.entities.get_mut(&id) {
                ent.plugin_timers.insert(key, ExpiryTimer { due: old.due, seq });
            }
            self.scheduler.submit(SchedEntry {
                due: old.due,
                seq,
                owner: id,
                slot: TimerSlot::Plugin(key),
            });
        }
        Some(id)
    }

    // ─── Timers ─────────────────────────────────────────────────────────

    /// Bind `timer` to `owner` under `key`, due `due_in` from now, and
    /// submit it to the scheduler. An existing timer under the key is
    /// cancelled and replaced. A function timer whose function is not
    /// registered fails with `MissingFunction`.
    pub fn add_timer(
        &mut self,
        owner: EntityId,
        key: TimerKey,
        due_in: Duration,
        mut timer: Timer,
    ) -> Result<(), CoreError> {
        if let TimerAction::Function { name } = &timer.action {
            if name.is_empty() || self.fns.get(name).is_none() {
                return Err(CoreError::MissingFunction);
            }
        }
        let due = self.now + due_in;
        let seq = self.scheduler.allot_seq();
        let Some(ent) = self.entities.get_mut(&owner) else {
            return Err(CoreError::NoSuchEntity(owner.0));
        };
        timer.owner = Some(owner);
        timer.key = Some(key);
        timer.due = due;
        timer.seq = seq;
        timer.state = TimerState::Scheduled;
        if let Some(mut previous) = ent.timers.insert(key, timer) {
            // Its heap entry carries a retired stamp and will be skipped.
            previous.state = TimerState::Cancelled;
        }
        self.scheduler.submit(SchedEntry {
            due,
            seq,
            owner,
            slot: TimerSlot::Entity(key),
        });
        Ok(())
    }

    /// Cancel and detach the timer under `key`. No-op (returning false)
    /// if nothing is scheduled there; safe to call from inside another
    /// timer's callback.
    pub fn cancel_timer(&mut self, owner: EntityId, key: TimerKey) -> bool {
        if let Some(ent) = self.entities.get_mut(&owner) {
            if let Some(mut timer) = ent.timers.remove(&key) {
                timer.state = TimerState::Cancelled;
                return true;
            }
        }
        false
    }

    // ─── Plugins ────────────────────────────────────────────────────────

    /// Attach a plugin under `key`. An occupant under the same key is
    /// detached (with its teardown notification) first. The new plugin
    /// receives its assign notification and may immediately request an
    /// expiry timer or its own detachment.
    pub fn attach_plugin(
        &mut self,
        owner: EntityId,
        key: PluginKey,
        plugin: Box<dyn Plugin>,
    ) -> Result<(), CoreError> {
        if !self.entities.contains_key(&owner) {
            return Err(CoreError::NoSuchEntity(owner.0));
        }
        self.detach_plugin(owner, key);
        let mut ctx = TriggerCtx::new();
        if let Some(ent) = self.entities.get_mut(&owner) {
            ent.plugins.push((key, plugin));
            if let Some((_, attached)) = ent.plugins.last_mut() {
                attached.on_assign(&mut ctx);
            }
        }
        self.apply_ctx(owner, key, ctx);
        Ok(())
    }

    /// Attach without the assign notification (load and clone paths).
    pub(crate) fn attach_plugin_silent(
        &mut self,
        owner: EntityId,
        key: PluginKey,
        plugin: Box<dyn Plugin>,
    ) {
        self.detach_plugin(owner, key);
        if let Some(ent) = self.entities.get_mut(&owner) {
            ent.plugins.push((key, plugin));
        }
    }

    /// Detach and return the plugin under `key`, cancelling any expiry
    /// timer it owns and delivering its teardown notification. The
    /// returned box is the caller's to drop.
    pub fn detach_plugin(&mut self, owner: EntityId, key: PluginKey) -> Option<Box<dyn Plugin>> {
        let ent = self.entities.get_mut(&owner)?;
        let idx = ent.plugin_position(key)?;
        let (_, mut plugin) = ent.plugins.remove(idx);
        ent.plugin_timers.remove(&key);
        plugin.on_unassign();
        Some(plugin)
    }

    /// Arm (or re-arm) a plugin's self-expiry timer. When it elapses the
    /// plugin receives `Timeout` and is detached, unless the handler
    /// re-arms the expiry. Returns false when no plugin is attached
    /// under `key`.
    pub fn set_plugin_expiry(&mut self, owner: EntityId, key: PluginKey, due_in: Duration) -> bool {
        let due = self.now + due_in;
        let seq = self.scheduler.allot_seq();
        let Some(ent) = self.entities.get_mut(&owner) else {
            return false;
        };
        if !ent.has_plugin(key) {
            return false;
        }
        ent.plugin_timers.insert(key, ExpiryTimer { due, seq });
        self.scheduler.submit(SchedEntry {
            due,
            seq,
            owner,
            slot: TimerSlot::Plugin(key),
        });
        true
    }

    // ─── Trigger dispatch ───────────────────────────────────────────────

    /// Deliver a trigger to every plugin attached to `id`, in attachment
    /// order. Returns true if some handler cancelled the default effect,
    /// in which case the remaining plugins are not consulted.
    pub fn dispatch_trigger(&mut self, id: EntityId, trigger: Trigger, args: &TriggerArgs) -> bool {
        let mut requests: Vec<(PluginKey, TriggerCtx)> = Vec::new();
        let mut cancelled = false;
        if let Some(ent) = self.entities.get_mut(&id) {
            let mut i = 0;
            while i < ent.plugins.len() {
                let (key, plugin) = &mut ent.plugins[i];
                let key = *key;
                let mut ctx = TriggerCtx::new();
                let flow = deliver(plugin.as_mut(), trigger, args, &mut ctx);
                if ctx.detach || ctx.expire_in.is_some() {
                    requests.push((key, ctx));
                }
                if flow == TriggerFlow::Cancel {
                    cancelled = true;
                    break;
                }
                i += 1;
            }
        }
        for (key, ctx) in requests {
            self.apply_ctx(id, key, ctx);
        }
        cancelled
    }

    fn apply_ctx(&mut self, owner: EntityId, key: PluginKey, ctx: TriggerCtx) {
        if ctx.detach {
            self.detach_plugin(owner, key);
            return;
        }
        if let Some(due_in) = ctx.expire_in {
            self.set_plugin_expiry(owner, key, due_in);
        }
    }

    // ─── Clock ──────────────────────────────────────────────────────────

    pub fn advance(&mut self, dt: Duration) {
        self.advance_to(self.now + dt);
    }

    /// Advance simulated time to `target`, firing every due timer in
    /// ascending `(due, schedule-order)` order. Callbacks may add or
    /// cancel timers freely; anything they schedule inside the window
    /// also fires during this call.
    pub fn advance_to(&mut self, target: SimTime) {
        while let Some(entry) = self.scheduler.pop_due(target) {
            if entry.due > self.now {
                self.now = entry.due;
            }
            self.fire(entry);
        }
        if target > self.now {
            self.now = target;
        }
    }

    fn fire(&mut self, entry: SchedEntry) {
        match entry.slot {
            TimerSlot::Entity(key) => {
                let Some(ent) = self.entities.get_mut(&entry.owner) else {
                    return; // entity destroyed; stale entry
                };
                let live = ent.timers.get(&key).is_some_and(|t| t.seq == entry.seq);
                if !live {
                    return; // cancelled or replaced
                }
                let Some(mut timer) = ent.timers.remove(&key) else {
                    return;
                };
                timer.state = TimerState::Fired;
                match timer.action {
                    TimerAction::Trigger(trigger) => {
                        let args = TriggerArgs::new(timer.args);
                        self.dispatch_trigger(entry.owner, trigger, &args);
                    }
                    TimerAction::Function { ref name } => match self.fns.get(name) {
                        Some(f) => f(self, entry.owner, &timer.args, timer.format_string.as_deref()),
                        None => warn!(
                            function = %name,
                            owner = %entry.owner,
                            "scheduled function vanished from the registry; timer dropped"
                        ),
                    },
                }
            }
            TimerSlot::Plugin(key) => {
                let Some(ent) = self.entities.get_mut(&entry.owner) else {
                    return;
                };
                let live = ent
                    .plugin_timers
                    .get(&key)
                    .is_some_and(|t| t.seq == entry.seq);
                if !live {
                    return;
                }
                ent.plugin_timers.remove(&key);
                let mut ctx = TriggerCtx::new();
                if let Some(plugin) = ent.plugin_mut(key) {
                    deliver(plugin, Trigger::Timeout, &TriggerArgs::none(), &mut ctx);
                    // An expired plugin leaves unless its handler re-armed
                    // the expiry; detach_self is honored either way.
                    let rearmed = ctx.expire_in.is_some();
                    self.apply_ctx(entry.owner, key, ctx);
                    if !rearmed {
                        self.detach_plugin(entry.owner, key);
                    }
                }
            }
        }
    }

    // ─── Persistence plumbing ───────────────────────────────────────────

    /// Timers currently reachable from the scheduler, in schedule order.
    /// Save order preserves the equal-due-time tie break across restarts.
    pub(crate) fn live_timers(&self) -> Vec<(EntityId, TimerKey, &Timer)> {
        let mut timers: Vec<_> = self
            .entities
            .values()
            .flat_map(|ent| {
                ent.timers
                    .iter()
                    .map(move |(key, timer)| (ent.id(), *key, timer))
            })
            .collect();
        timers.sort_by_key(|(_, _, t)| t.seq);
        timers
    }

    pub(crate) fn schedule_loaded_timer(
        &mut self,
        owner: EntityId,
        key: TimerKey,
        due_in: Duration,
        timer: Timer,
    ) -> Result<(), CoreError> {
        // Same path as add_timer, minus the function check: the loader
        // already resolved the function or failed the object.
        let due = self.now + due_in;
        let seq = self.scheduler.allot_seq();
        let Some(ent) = self.entities.get_mut(&owner) else {
            return Err(CoreError::NoSuchEntity(owner.0));
        };
        let mut timer = timer;
        timer.owner = Some(owner);
        timer.key = Some(key);
        timer.due = due;
        timer.seq = seq;
        timer.state = TimerState::Scheduled;
        ent.timers.insert(key, timer);
        self.scheduler.submit(SchedEntry {
            due,
            seq,
            owner,
            slot: TimerSlot::Entity(key),
        });
        Ok(())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("now", &self.now)
            .field("entities", &self.entities.len())
            .field("scheduled_entries", &self.scheduler.entry_count())
            .finish()
    }
}
