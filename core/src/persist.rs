//! Line-oriented world persistence.
//!
//! The save format is an ordered sequence of `name = value` lines
//! grouped into `[kind ...]` sections, one section per object:
//!
//! ```text
//! [entity 7]
//! tag.hp = 100
//!
//! [plugin 7 poison]
//! def = poison
//! expireIn = 8.0
//! power = 12
//!
//! [timer 7 regen]
//! dueIn = 4.5
//! function = regen_tick
//! arg = 3
//! ```
//!
//! Timers persist their *remaining* duration, never an absolute due
//! time, so a reload against a fresh clock keeps due-time fidelity.
//! Timer sections are written in schedule order, which preserves the
//! equal-due-time tie break across a restart.
//!
//! Loading is per-object fault-isolated: a timer whose function is no
//! longer registered, or a plugin whose def is unknown, fails that one
//! object with a logged diagnostic naming it, and the rest of the world
//! loads. Unrecognized field names fall through each type's decode chain
//! and end in a warning rather than a rejection, so saves from newer
//! builds still load. Entity tag lines are isolated per line: a value
//! that fails to parse loses that one tag, not the entity.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use tracing::{debug, warn};
use weald_types::TagValue;

use crate::entity::EntityId;
use crate::error::LoadError;
use crate::scheduler::{Timer, TimerAction};
use crate::world::World;

/// Writes `name = value` lines for one object's section.
pub struct PropWriter<'a> {
    out: &'a mut dyn Write,
}

impl<'a> PropWriter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self { out }
    }

    pub fn field(&mut self, name: &str, value: impl fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{name} = {value}")
    }

    /// Write a tag value in its textual encoding.
    pub fn value(&mut self, name: &str, value: &TagValue) -> io::Result<()> {
        self.field(name, value.encode())
    }

    fn section(&mut self, header: fmt::Arguments<'_>) -> io::Result<()> {
        writeln!(self.out, "\n[{header}]")
    }
}

/// Counts reported back to the operator after a load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub entities: usize,
    pub plugins: usize,
    pub timers: usize,
    /// Objects that failed to load and were skipped.
    pub failed: usize,
}

/// Serialize the whole world. Call only while the simulation is
/// quiesced (no tick in flight).
pub fn save_world(world: &World, out: &mut impl Write) -> io::Result<()> {
    let mut w = PropWriter::new(out);
    writeln!(w.out, "// weald world save")?;

    let mut entities: Vec<_> = world.entities().collect();
    entities.sort_by_key(|e| e.id());

    for ent in &entities {
        w.section(format_args!("entity {}", ent.id().0))?;
        let mut tags: Vec<_> = ent
            .tags()
            .map(|(k, v)| (world.keys.resolve_tag(k).to_string(), v))
            .collect();
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, value) in tags {
            w.value(&format!("tag.{name}"), value)?;
        }
    }

    for ent in &entities {
        for (key, plugin) in ent.plugins() {
            let key_name = world.keys.resolve_plugin(key);
            w.section(format_args!("plugin {} {key_name}", ent.id().0))?;
            w.field("def", plugin.def_name())?;
            if let Some(expiry) = ent.plugin_timers.get(&key) {
                let due_in = expiry.due.saturating_sub(world.now());
                w.field("expireIn", due_in.as_secs_f64())?;
            }
            plugin.save(&mut w)?;
        }
    }

    for (owner, key, timer) in world.live_timers() {
        let key_name = world.keys.resolve_timer(key);
        w.section(format_args!("timer {} {key_name}", owner.0))?;
        w.field("dueIn", timer.due_in(world.now()).as_secs_f64())?;
        match &timer.action {
            TimerAction::Function { name } => w.field("function", name)?,
            TimerAction::Trigger(trigger) => w.field("trigger", trigger.name(&world.keys))?,
        }
        if let Some(fs) = &timer.format_string {
            w.value("formatString", &TagValue::Str(fs.clone()))?;
        }
        for arg in &timer.args {
            w.value("arg", arg)?;
        }
    }
    Ok(())
}

/// One parsed `[kind ...]` section and its lines.
struct Section {
    kind: String,
    name: String,
    line: usize,
    fields: Vec<(usize, String, String)>,
}

/// Load a world save into `world`. Entities, plugins and timers are
/// restored in that order regardless of section order in the file; due
/// times are re-derived from the current clock. Per-object failures are
/// logged and counted, never propagated.
pub fn load_world(reader: impl BufRead, world: &mut World) -> io::Result<LoadReport> {
    let sections = parse_sections(reader)?;
    let mut report = LoadReport::default();

    for section in sections.iter().filter(|s| s.kind == "entity") {
        match load_entity(world, section) {
            Ok(()) => report.entities += 1,
            Err(e) => fail(&mut report, section, &e),
        }
    }
    for section in sections.iter().filter(|s| s.kind == "plugin") {
        match load_plugin(world, section) {
            Ok(()) => report.plugins += 1,
            Err(e) => fail(&mut report, section, &e),
        }
    }
    for section in sections.iter().filter(|s| s.kind == "timer") {
        match load_timer(world, section) {
            Ok(()) => report.timers += 1,
            Err(e) => fail(&mut report, section, &e),
        }
    }
    for section in &sections {
        if !matches!(section.kind.as_str(), "entity" | "plugin" | "timer") {
            warn!(
                kind = %section.kind,
                line = section.line,
                "unknown section kind; skipping"
            );
            report.failed += 1;
        }
    }

    debug!(
        entities = report.entities,
        plugins = report.plugins,
        timers = report.timers,
        failed = report.failed,
        "world load finished"
    );
    Ok(report)
}

fn fail(report: &mut LoadReport, section: &Section, error: &LoadError) {
    report.failed += 1;
    warn!(
        kind = %section.kind,
        object = %section.name,
        line = section.line,
        error = %error,
        "failed to load object; skipping"
    );
}

fn parse_sections(reader: impl BufRead) -> io::Result<Vec<Section>> {
    let mut sections: Vec<Section> = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('[') {
            // trailing comments are legal after the closing bracket
            let Some(end) = rest.find(']') else {
                warn!(line = line_no, text = %trimmed, "unterminated section header; skipping");
                continue;
            };
            let header = rest[..end].trim();
            let (kind, name) = match header.split_once(char::is_whitespace) {
                Some((kind, name)) => (kind, name.trim()),
                None => (header, ""),
            };
            sections.push(Section {
                kind: kind.to_string(),
                name: name.to_string(),
                line: line_no,
                fields: Vec::new(),
            });
            continue;
        }
        if let Some((name, value)) = trimmed.split_once('=') {
            match sections.last_mut() {
                Some(section) => section.fields.push((
                    line_no,
                    name.trim().to_string(),
                    value.trim().to_string(),
                )),
                None => warn!(line = line_no, "value line before any section; skipping"),
            }
            continue;
        }
        warn!(line = line_no, text = %trimmed, "unrecognizable data; skipping");
    }
    Ok(sections)
}

fn parse_owner_and_key<'a>(section: &'a Section) -> Result<(EntityId, &'a str), LoadError> {
    let (id_text, key) = match section.name.split_once(char::is_whitespace) {
        Some((id, key)) => (id, key.trim()),
        None => (section.name.as_str(), ""),
    };
    let id = id_text.parse::<u64>().map_err(|_| LoadError::BadValue {
        line: section.line,
        field: "section".into(),
        value: section.name.clone(),
    })?;
    Ok((EntityId(id), key))
}

fn parse_duration(line: usize, field: &str, value: &str) -> Result<Duration, LoadError> {
    let bad = || LoadError::BadValue {
        line,
        field: field.to_string(),
        value: value.to_string(),
    };
    let secs: f64 = value.parse().map_err(|_| bad())?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(bad());
    }
    Ok(Duration::from_secs_f64(secs))
}

fn load_entity(world: &mut World, section: &Section) -> Result<(), LoadError> {
    let (id, _) = parse_owner_and_key(section)?;
    world.spawn_with_id(id);
    for (line, field, value) in &section.fields {
        if let Some(tag_name) = field.strip_prefix("tag.") {
            // Tag lines are independent: a bad value loses that one tag,
            // never the entity.
            let Some(parsed) = TagValue::parse(value) else {
                warn!(line = *line, field = %field, value = %value, entity = %id, "bad tag value; skipping");
                continue;
            };
            let key = world.keys.tag(tag_name);
            if let Some(ent) = world.entity_mut(id) {
                ent.set_tag(key, parsed);
            }
        } else {
            warn!(line = *line, field = %field, entity = %id, "unknown entity field; skipping");
        }
    }
    Ok(())
}

fn load_plugin(world: &mut World, section: &Section) -> Result<(), LoadError> {
    let (owner, key_name) = parse_owner_and_key(section)?;
    if world.entity(owner).is_none() {
        return Err(LoadError::UnknownEntity(owner.0));
    }

    // `def` must be resolved before any instance field can be fed, but
    // field order within the section is otherwise not significant.
    let def_name = section
        .fields
        .iter()
        .find(|(_, field, _)| field == "def")
        .map(|(_, _, value)| value.as_str())
        .ok_or(LoadError::MissingField("def"))?;
    let def = world
        .defs
        .get(def_name)
        .ok_or_else(|| LoadError::UnknownDef(def_name.to_string()))?;
    let mut plugin = def.create();

    let mut expire_in = None;
    for (line, field, value) in &section.fields {
        match field.as_str() {
            "def" => {}
            "expireIn" => expire_in = Some(parse_duration(*line, field, value)?),
            other => {
                // fallback chain: the concrete type first, then here
                if !plugin.load_line(other, value)? {
                    warn!(line = *line, field = %other, plugin = %key_name, "unknown plugin field; skipping");
                }
            }
        }
    }

    let key = world.keys.plugin(key_name);
    world.attach_plugin_silent(owner, key, plugin);
    if let Some(due_in) = expire_in {
        world.set_plugin_expiry(owner, key, due_in);
    }
    Ok(())
}

fn load_timer(world: &mut World, section: &Section) -> Result<(), LoadError> {
    let (owner, key_name) = parse_owner_and_key(section)?;
    if world.entity(owner).is_none() {
        return Err(LoadError::UnknownEntity(owner.0));
    }

    let mut due_in = None;
    let mut action = None;
    let mut format_string = None;
    let mut args = Vec::new();

    for (line, field, value) in &section.fields {
        let bad = || LoadError::BadValue {
            line: *line,
            field: field.clone(),
            value: value.clone(),
        };
        match field.as_str() {
            "dueIn" => due_in = Some(parse_duration(*line, field, value)?),
            "function" => {
                // A broken scheduled action must never silently no-op.
                if world.fns.get(value).is_none() {
                    return Err(LoadError::UnknownFunction(value.clone()));
                }
                action = Some(TimerAction::Function {
                    name: value.clone(),
                });
            }
            "trigger" => {
                let trigger = crate::plugin::Trigger::from_name(&mut world.keys, value);
                action = Some(TimerAction::Trigger(trigger));
            }
            "formatString" => match TagValue::parse(value) {
                Some(TagValue::Str(s)) => format_string = Some(s),
                _ => return Err(bad()),
            },
            "arg" => args.push(TagValue::parse(value).ok_or_else(bad)?),
            other => {
                warn!(line = *line, field = %other, timer = %key_name, "unknown timer field; skipping");
            }
        }
    }

    let due_in = due_in.ok_or(LoadError::MissingField("dueIn"))?;
    let action = action.ok_or(LoadError::MissingField("function"))?;

    let mut timer = match action {
        TimerAction::Function { name } => Timer::function(name),
        TimerAction::Trigger(t) => Timer::trigger(t),
    };
    timer.args = args;
    timer.format_string = format_string;

    let key = world.keys.timer(key_name);
    world
        .schedule_loaded_timer(owner, key, due_in, timer)
        .map_err(|_| LoadError::UnknownEntity(owner.0))?;
    Ok(())
}
