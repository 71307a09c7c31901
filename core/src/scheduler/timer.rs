//! Deferred work bound to one entity.

use std::time::Duration;

use weald_types::TagValue;

use crate::entity::EntityId;
use crate::keys::TimerKey;
use crate::plugin::Trigger;

/// Simulated time, measured from world start. Never wall clock.
pub type SimTime = Duration;

/// Timer lifecycle. `Fired` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Unscheduled,
    Scheduled,
    Fired,
    Cancelled,
}

/// What a timer does when it fires.
#[derive(Debug, Clone)]
pub enum TimerAction {
    /// Dispatch a trigger to the owning entity's plugins.
    Trigger(Trigger),
    /// Look up a registered function by name and invoke it with the
    /// owning entity and the timer's payload.
    Function { name: String },
}

/// A unit of deferred work. Owned by its entity's timer map; the
/// scheduler holds only a dated reference, so dropping the map entry is
/// a cancellation.
#[derive(Debug, Clone)]
pub struct Timer {
    pub(crate) owner: Option<EntityId>,
    pub(crate) key: Option<TimerKey>,
    pub(crate) due: SimTime,
    /// Schedule stamp; a scheduler entry fires this timer only while the
    /// stamps still agree.
    pub(crate) seq: u64,
    pub(crate) state: TimerState,
    pub action: TimerAction,
    pub args: Vec<TagValue>,
    pub format_string: Option<String>,
}

impl Timer {
    /// A timer that dispatches `trigger` to its owner when due.
    pub fn trigger(trigger: Trigger) -> Self {
        Self::with_action(TimerAction::Trigger(trigger))
    }

    /// A function timer invoking the function registered under `name`.
    pub fn function(name: impl Into<String>) -> Self {
        Self::with_action(TimerAction::Function { name: name.into() })
    }

    fn with_action(action: TimerAction) -> Self {
        Self {
            owner: None,
            key: None,
            due: SimTime::ZERO,
            seq: 0,
            state: TimerState::Unscheduled,
            action,
            args: Vec::new(),
            format_string: None,
        }
    }

    pub fn with_args(mut self, args: Vec<TagValue>) -> Self {
        self.args = args;
        self
    }

    pub fn with_format(mut self, format_string: impl Into<String>) -> Self {
        self.format_string = Some(format_string.into());
        self
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Remaining time from `now`, saturating at zero for overdue timers.
    pub fn due_in(&self, now: SimTime) -> Duration {
        self.due.saturating_sub(now)
    }

    /// The entity this timer is bound to, once scheduled.
    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn key(&self) -> Option<TimerKey> {
        self.key
    }
}
