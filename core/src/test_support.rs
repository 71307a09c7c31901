//! Helpers shared by the scheduler and persistence test suites.

use std::time::Duration;

use weald_types::TagValue;

use crate::entity::EntityId;
use crate::world::World;

pub(crate) fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

/// Increment an integer `fired` tag on the owner.
pub(crate) fn count_fire(
    world: &mut World,
    owner: EntityId,
    _args: &[TagValue],
    _format: Option<&str>,
) {
    let key = world.keys.tag("fired");
    let n = world
        .entity(owner)
        .and_then(|e| e.tag(key))
        .and_then(TagValue::as_int)
        .unwrap_or(0);
    if let Some(ent) = world.entity_mut(owner) {
        ent.set_tag(key, TagValue::Int(n + 1));
    }
}

/// Append `args[0]` (a string label) to the owner's `order` tag.
pub(crate) fn append_label(
    world: &mut World,
    owner: EntityId,
    args: &[TagValue],
    _format: Option<&str>,
) {
    let label = args
        .first()
        .and_then(TagValue::as_str)
        .unwrap_or("?")
        .to_string();
    let key = world.keys.tag("order");
    let mut order = world
        .entity(owner)
        .and_then(|e| e.tag(key))
        .and_then(TagValue::as_str)
        .unwrap_or("")
        .to_string();
    order.push_str(&label);
    if let Some(ent) = world.entity_mut(owner) {
        ent.set_tag(key, TagValue::Str(order));
    }
}
