//! Descriptors from markup data attributes.
//!
//! Recognised on the container: `data-rive-url` (required), `data-rive-state-machine`
//! or `data-state-machine`, `data-rive-trigger` or `data-trigger`, `data-fit`,
//! `data-alignment`, `data-autoplay`, `data-scroll-start` / `data-scroll-end`.
//! Recognised on each canvas: `data-artboard`, plus the state-machine and trigger names
//! as per-canvas overrides. Keys may be given as attributes (`data-rive-url`) or as
//! `dataset` properties (`riveUrl`).

use indexmap::IndexMap;

use crate::ids::ElementId;
use crate::instance::{Alignment, Fit};
use crate::registry::{AnimationSetDescriptor, TargetDescriptor, TriggerSpec};
use crate::trigger::BoundaryExpr;
use crate::{LifecycleError, Result};

/// Data attributes of one element, keyed by kebab-case name without the `data-` prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    values: IndexMap<String, String>,
}

fn normalize_key(key: &str) -> String {
    let key = key.strip_prefix("data-").unwrap_or(key);
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&normalize_key(key))
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.get(k)).map(str::to_string)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Dataset {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dataset = Dataset::new();
        for (k, v) in iter {
            dataset.insert(k.as_ref(), v);
        }
        dataset
    }
}

const STATE_MACHINE: &[&str] = &["rive-state-machine", "state-machine"];
const TRIGGER: &[&str] = &["rive-trigger", "trigger"];

fn parse_fit(value: &str) -> Result<Fit> {
    match value {
        "cover" => Ok(Fit::Cover),
        "contain" => Ok(Fit::Contain),
        "fill" => Ok(Fit::Fill),
        "none" => Ok(Fit::None),
        other => Err(LifecycleError::configuration(format!("unknown fit '{other}'"))),
    }
}

fn parse_alignment(value: &str) -> Result<Alignment> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| LifecycleError::configuration(format!("unknown alignment '{value}'")))
}

/// Build a descriptor for the container `id` and its canvases.
pub fn descriptor_from_dataset(
    id: &str,
    container: &Dataset,
    canvases: &[(ElementId, Dataset)],
) -> Result<AnimationSetDescriptor> {
    let source = container.get("rive-url").ok_or_else(|| {
        LifecycleError::configuration(format!("'{id}' has no data-rive-url; skipping"))
    })?;
    let mut set = AnimationSetDescriptor::new(id, source);
    set.default_state_machine = container.first(STATE_MACHINE);
    set.default_trigger = container.first(TRIGGER);
    if let Some(fit) = container.get("fit") {
        set.fit = parse_fit(fit)?;
    }
    if let Some(alignment) = container.get("alignment") {
        set.alignment = parse_alignment(alignment)?;
    }
    set.autoplay = matches!(container.get("autoplay"), Some("true"));

    let start = container.get("scroll-start").map(BoundaryExpr::parse).transpose()?;
    let end = container.get("scroll-end").map(BoundaryExpr::parse).transpose()?;
    if start.is_some() || end.is_some() {
        set.default_viewport = Some(TriggerSpec {
            start,
            end,
            ..TriggerSpec::default()
        });
    }

    for (element, data) in canvases {
        let mut target = TargetDescriptor::new(element.clone());
        target.artboard_name = data.get("artboard").map(str::to_string);
        target.state_machine = data.first(STATE_MACHINE);
        target.trigger = data.first(TRIGGER);
        set.targets.push(target);
    }
    set.validate()?;
    Ok(set)
}
