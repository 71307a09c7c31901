//! Round-trip and fault-isolation tests for the save format.

use std::any::Any;
use std::io::{self, BufReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use weald_types::TagValue;

use crate::entity::EntityId;
use crate::persist::{PropWriter, load_world, save_world};
use crate::plugin::{Plugin, PluginDef, Trigger, TriggerArgs, TriggerCtx, TriggerFlow};
use crate::scheduler::Timer;
use crate::test_support::{append_label, count_fire, secs};
use crate::world::World;

/// Damage-counting effect with one persisted field.
struct TestVenom {
    power: i64,
    hits: Arc<AtomicU32>,
}

impl Plugin for TestVenom {
    fn def_name(&self) -> &str {
        "venom"
    }

    fn clone_plugin(&self) -> Box<dyn Plugin> {
        Box::new(Self {
            power: self.power,
            hits: Arc::clone(&self.hits),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_damage(&mut self, _args: &TriggerArgs, _ctx: &mut TriggerCtx) -> TriggerFlow {
        self.hits.fetch_add(1, Ordering::Relaxed);
        TriggerFlow::Continue
    }

    fn save(&self, w: &mut PropWriter<'_>) -> io::Result<()> {
        w.value("power", &TagValue::Int(self.power))
    }

    fn load_line(&mut self, field: &str, value: &str) -> Result<bool, crate::error::LoadError> {
        if field != "power" {
            return Ok(false);
        }
        match TagValue::parse(value).as_ref().and_then(TagValue::as_int) {
            Some(power) => {
                self.power = power;
                Ok(true)
            }
            None => Err(crate::error::LoadError::BadValue {
                line: 0,
                field: field.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

struct VenomDef {
    hits: Arc<AtomicU32>,
}

impl PluginDef for VenomDef {
    fn name(&self) -> &str {
        "venom"
    }

    fn create(&self) -> Box<dyn Plugin> {
        Box::new(TestVenom {
            power: 0,
            hits: Arc::clone(&self.hits),
        })
    }
}

fn registered_world(hits: &Arc<AtomicU32>) -> World {
    let mut world = World::new();
    world.fns.register("count_fire", count_fire);
    world.fns.register("append_label", append_label);
    world.defs.register_def(Arc::new(VenomDef {
        hits: Arc::clone(hits),
    }));
    world
}

fn save_to_string(world: &World) -> String {
    let mut buf = Vec::new();
    save_world(world, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

fn load_from_str(text: &str, world: &mut World) -> crate::persist::LoadReport {
    load_world(BufReader::new(text.as_bytes()), world).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Round trips
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn full_world_survives_a_save_and_load() {
    let hits = Arc::new(AtomicU32::new(0));
    let mut world = registered_world(&hits);
    let id = world.spawn();
    let friend = world.spawn();

    let hp = world.keys.tag("hp");
    let speed = world.keys.tag("speed");
    let title = world.keys.tag("title");
    let ally = world.keys.tag("ally");
    let cursed = world.keys.tag("cursed");
    {
        let ent = world.entity_mut(id).unwrap();
        ent.set_tag(hp, TagValue::Int(100));
        ent.set_tag(speed, TagValue::Float(2.5));
        ent.set_tag(title, TagValue::Str("the \"Swift\"\nand bold".into()));
        ent.set_tag(ally, TagValue::Entity(friend.0));
        ent.set_tag(cursed, TagValue::Bool(true));
    }

    let poison = world.keys.plugin("poison");
    world
        .attach_plugin(
            id,
            poison,
            Box::new(TestVenom {
                power: 12,
                hits: Arc::clone(&hits),
            }),
        )
        .unwrap();
    world.set_plugin_expiry(id, poison, secs(8.0));

    let regen = world.keys.timer("regen");
    let timer = Timer::function("count_fire")
        .with_args(vec![TagValue::Int(3), TagValue::Str("slow".into())])
        .with_format("regenerating {0}");
    world.add_timer(id, regen, secs(7.5), timer).unwrap();

    // Remaining durations are measured from the save-time clock.
    world.advance_to(secs(3.0));
    let text = save_to_string(&world);

    let mut loaded = registered_world(&hits);
    let report = load_from_str(&text, &mut loaded);
    assert_eq!(report.entities, 2);
    assert_eq!(report.plugins, 1);
    assert_eq!(report.timers, 1);
    assert_eq!(report.failed, 0);

    // keys were re-interned by the loader; resolve through the new registry
    let mut check = |name: &str, expect: TagValue| {
        let key = loaded.keys.tag(name);
        assert_eq!(
            loaded.entity(id).unwrap().tag(key),
            Some(&expect),
            "tag {name}"
        );
    };
    check("hp", TagValue::Int(100));
    check("speed", TagValue::Float(2.5));
    check("title", TagValue::Str("the \"Swift\"\nand bold".into()));
    check("ally", TagValue::Entity(friend.0));
    check("cursed", TagValue::Bool(true));

    let poison = loaded.keys.plugin("poison");
    let plugin = loaded.entity(id).unwrap().plugin(poison).unwrap();
    assert_eq!(plugin.as_any().downcast_ref::<TestVenom>().unwrap().power, 12);

    let regen = loaded.keys.timer("regen");
    let restored = loaded.entity(id).unwrap().timer(regen).unwrap();
    assert_eq!(
        restored.args,
        vec![TagValue::Int(3), TagValue::Str("slow".into())]
    );
    assert_eq!(restored.format_string.as_deref(), Some("regenerating {0}"));

    // The timer had 4.5s left; the loaded clock starts at zero.
    let fired_key = loaded.keys.tag("fired");
    loaded.advance_to(secs(4.4));
    assert_eq!(loaded.entity(id).unwrap().tag(fired_key), None);
    loaded.advance_to(secs(4.5));
    assert_eq!(
        loaded.entity(id).unwrap().tag(fired_key),
        Some(&TagValue::Int(1))
    );

    // The expiry had 5s left; crossing it detaches the plugin.
    loaded.advance_to(secs(5.0));
    assert!(!loaded.entity(id).unwrap().has_plugin(poison));
}

#[test]
fn equal_due_times_keep_their_order_across_a_restart() {
    let hits = Arc::new(AtomicU32::new(0));
    let mut world = registered_world(&hits);
    let id = world.spawn();

    for label in ["a", "b", "c"] {
        let key = world.keys.timer(label);
        let timer =
            Timer::function("append_label").with_args(vec![TagValue::Str(label.into())]);
        world.add_timer(id, key, secs(5.0), timer).unwrap();
    }

    let text = save_to_string(&world);
    let mut loaded = registered_world(&hits);
    load_from_str(&text, &mut loaded);

    loaded.advance_to(secs(5.0));
    let order = loaded.keys.tag("order");
    assert_eq!(
        loaded.entity(id).unwrap().tag(order),
        Some(&TagValue::Str("abc".into()))
    );
}

#[test]
fn trigger_timers_round_trip_and_dispatch() {
    let hits = Arc::new(AtomicU32::new(0));
    let mut world = registered_world(&hits);
    let id = world.spawn();

    let poison = world.keys.plugin("poison");
    world
        .attach_plugin(
            id,
            poison,
            Box::new(TestVenom {
                power: 1,
                hits: Arc::clone(&hits),
            }),
        )
        .unwrap();
    let pulse = world.keys.timer("pulse");
    let timer = Timer::trigger(Trigger::Damage).with_args(vec![TagValue::Int(4)]);
    world.add_timer(id, pulse, secs(2.0), timer).unwrap();

    let text = save_to_string(&world);
    let mut loaded = registered_world(&hits);
    load_from_str(&text, &mut loaded);

    loaded.advance_to(secs(2.0));
    assert_eq!(hits.load(Ordering::Relaxed), 1, "trigger reached the plugin");
}

// ─────────────────────────────────────────────────────────────────────────────
// Fault isolation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unknown_function_fails_only_its_own_timer() {
    let hits = Arc::new(AtomicU32::new(0));
    let mut world = registered_world(&hits);
    let id = world.spawn();

    let good = world.keys.timer("good");
    world
        .add_timer(id, good, secs(1.0), Timer::function("count_fire"))
        .unwrap();
    let mut text = save_to_string(&world);
    text.push_str("\n[timer 1 broken]\ndueIn = 1.0\nfunction = gone_fn\n");

    let mut loaded = registered_world(&hits);
    let report = load_from_str(&text, &mut loaded);
    assert_eq!(report.timers, 1);
    assert_eq!(report.failed, 1, "the broken timer is skipped, not fatal");

    let fired_key = loaded.keys.tag("fired");
    loaded.advance_to(secs(1.0));
    assert_eq!(
        loaded.entity(id).unwrap().tag(fired_key),
        Some(&TagValue::Int(1)),
        "sibling timer still loads and fires"
    );
}

#[test]
fn unknown_def_fails_only_the_plugin() {
    let hits = Arc::new(AtomicU32::new(0));
    let text = "\
[entity 1]
tag.hp = 50

[plugin 1 blessing]
def = blessing
expireIn = 4.0
";
    let mut loaded = registered_world(&hits);
    let report = load_from_str(text, &mut loaded);
    assert_eq!(report.entities, 1);
    assert_eq!(report.plugins, 0);
    assert_eq!(report.failed, 1);

    let hp = loaded.keys.tag("hp");
    assert_eq!(
        loaded.entity(EntityId(1)).unwrap().tag(hp),
        Some(&TagValue::Int(50))
    );
}

#[test]
fn plugins_and_timers_without_their_entity_are_rejected() {
    let hits = Arc::new(AtomicU32::new(0));
    let text = "\
[plugin 9 poison]
def = venom

[timer 9 tick]
dueIn = 1.0
function = count_fire
";
    let mut loaded = registered_world(&hits);
    let report = load_from_str(text, &mut loaded);
    assert_eq!(report.failed, 2);
    assert_eq!(loaded.entity_count(), 0);
}

#[test]
fn unrecognized_fields_and_sections_do_not_reject_the_object() {
    let hits = Arc::new(AtomicU32::new(0));
    let text = "\
// save from a newer build
[entity 1]
tag.hp = 10
auraColor = violet

[plugin 1 poison]
def = venom
power = 7
stacks = 3

[hologram 1]
shape = cube
";
    let mut loaded = registered_world(&hits);
    let report = load_from_str(text, &mut loaded);
    assert_eq!(report.entities, 1);
    assert_eq!(report.plugins, 1, "unknown plugin field is a warning only");
    assert_eq!(report.failed, 1, "only the unknown section kind is counted");

    let poison = loaded.keys.plugin("poison");
    let plugin = loaded.entity(EntityId(1)).unwrap().plugin(poison).unwrap();
    assert_eq!(plugin.as_any().downcast_ref::<TestVenom>().unwrap().power, 7);
}

#[test]
fn bad_tag_values_lose_the_tag_but_keep_the_entity() {
    let hits = Arc::new(AtomicU32::new(0));
    let text = "\
[entity 1]
tag.first = 1
tag.broken = @@@
tag.after = 2
";
    let mut loaded = registered_world(&hits);
    let report = load_from_str(text, &mut loaded);
    assert_eq!(report.entities, 1);
    assert_eq!(report.failed, 0);

    let first = loaded.keys.tag("first");
    let broken = loaded.keys.tag("broken");
    let after = loaded.keys.tag("after");
    let ent = loaded.entity(EntityId(1)).unwrap();
    assert_eq!(ent.tag(first), Some(&TagValue::Int(1)));
    assert_eq!(ent.tag(broken), None);
    assert_eq!(
        ent.tag(after),
        Some(&TagValue::Int(2)),
        "lines after the bad one still load"
    );
}

#[test]
fn malformed_values_reject_the_object_with_a_named_line() {
    let hits = Arc::new(AtomicU32::new(0));
    let text = "\
[entity 1]

[timer 1 tick]
dueIn = not_a_number
function = count_fire
";
    let mut loaded = registered_world(&hits);
    let report = load_from_str(text, &mut loaded);
    assert_eq!(report.entities, 1);
    assert_eq!(report.timers, 0);
    assert_eq!(report.failed, 1);
}

#[test]
fn loaded_ids_do_not_collide_with_fresh_spawns() {
    let hits = Arc::new(AtomicU32::new(0));
    let text = "[entity 7]\n";
    let mut loaded = registered_world(&hits);
    load_from_str(text, &mut loaded);

    let fresh = loaded.spawn();
    assert!(fresh.0 > 7, "spawn counter advances past loaded ids");
}
