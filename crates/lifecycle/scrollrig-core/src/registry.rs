//! Animation-set descriptors and the registry that instantiates and owns their instances.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::ids::{ElementId, IdAllocator, InstanceId, ScopeId};
use crate::instance::{Alignment, AnimationInstance, EngineFactory, EngineParams, Fit};
use crate::layout::{Host, LayoutWrite, Viewport};
use crate::trigger::{
    BoundaryExpr, TriggerActions, TriggerSignal, ViewportTriggerBinding, ViewportTriggers,
};
use crate::{LifecycleError, Result};

/// Scroll playback for an instance. Omitted fields fall back to the stage defaults
/// (`top bottom` → `bottom top`, play while inside, pause outside). Scrubbed triggers
/// default to no playback actions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerSpec {
    pub start: Option<BoundaryExpr>,
    pub end: Option<BoundaryExpr>,
    pub end_element: Option<ElementId>,
    pub pinned: bool,
    pub scrub: bool,
    pub actions: Option<TriggerActions>,
}

impl TriggerSpec {
    pub fn binding(
        &self,
        element: &ElementId,
        target: InstanceId,
        config: &Config,
    ) -> Result<ViewportTriggerBinding> {
        let start = match &self.start {
            Some(expr) => expr.clone(),
            None => BoundaryExpr::parse(&config.default_start)?,
        };
        let end = match &self.end {
            Some(expr) => expr.clone(),
            None => BoundaryExpr::parse(&config.default_end)?,
        };
        Ok(ViewportTriggerBinding {
            element: element.clone(),
            end_element: self.end_element.clone(),
            start,
            end,
            actions: match &self.actions {
                Some(actions) => actions.clone(),
                // Scrubbed triggers drive progress, not playback.
                None if self.scrub => TriggerActions::default(),
                None => TriggerActions::play_pause(),
            },
            target: Some(target),
            pinned: self.pinned,
            scrub: self.scrub,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    /// Canvas element the engine draws into.
    pub element_id: ElementId,
    #[serde(default)]
    pub artboard_name: Option<String>,
    #[serde(default)]
    pub state_machine: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    /// Overrides the set's `defaultViewport`.
    #[serde(default)]
    pub viewport: Option<TriggerSpec>,
}

impl TargetDescriptor {
    pub fn new(element_id: impl Into<ElementId>) -> Self {
        Self {
            element_id: element_id.into(),
            artboard_name: None,
            state_machine: None,
            trigger: None,
            viewport: None,
        }
    }

    pub fn with_artboard(mut self, artboard: impl Into<String>) -> Self {
        self.artboard_name = Some(artboard.into());
        self
    }
}

/// Declarative animation set. Immutable once registered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSetDescriptor {
    pub id: String,
    /// Opaque asset URL handed to the engine.
    pub source: String,
    #[serde(default)]
    pub default_state_machine: Option<String>,
    #[serde(default)]
    pub default_trigger: Option<String>,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default)]
    pub fit: Fit,
    #[serde(default)]
    pub alignment: Alignment,
    /// Scroll playback for every target without its own `viewport`.
    #[serde(default)]
    pub default_viewport: Option<TriggerSpec>,
    pub targets: Vec<TargetDescriptor>,
}

impl AnimationSetDescriptor {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            default_state_machine: None,
            default_trigger: None,
            autoplay: false,
            fit: Fit::default(),
            alignment: Alignment::default(),
            default_viewport: None,
            targets: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: TargetDescriptor) -> Self {
        self.targets.push(target);
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let descriptor: Self = serde_json::from_str(text)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(LifecycleError::configuration("animation set without an id"));
        }
        if self.source.trim().is_empty() {
            return Err(LifecycleError::configuration(format!(
                "animation set '{}' has no source",
                self.id
            )));
        }
        Ok(())
    }
}

/// Stage state an instantiation touches, borrowed for the duration of the call.
pub struct Resources<'a> {
    pub host: &'a mut dyn Host,
    pub engines: &'a mut dyn EngineFactory,
    pub ids: &'a mut IdAllocator,
    pub triggers: &'a mut ViewportTriggers,
    pub viewport: Viewport,
    pub config: &'a Config,
    pub diagnostics: &'a mut Diagnostics,
    /// Signals from triggers created already inside their interval.
    pub signals: &'a mut Vec<TriggerSignal>,
    pub now: f64,
}

/// Apply the pin/unpin part of `signals` to the DOM.
pub(crate) fn apply_pins<W: LayoutWrite + ?Sized>(signals: &[TriggerSignal], dom: &mut W) {
    for signal in signals {
        match signal {
            TriggerSignal::Pin { element, top, .. } => dom.set_pin(element, Some(*top)),
            TriggerSignal::Unpin { element, .. } => dom.set_pin(element, None),
            TriggerSignal::Edge { .. } | TriggerSignal::Progress { .. } => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    sets: IndexMap<String, AnimationSetDescriptor>,
    instances: IndexMap<InstanceId, AnimationInstance>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a descriptor. Fails on an invalid descriptor or an id already present.
    pub fn register(&mut self, descriptor: AnimationSetDescriptor) -> Result<()> {
        descriptor.validate()?;
        if self.sets.contains_key(&descriptor.id) {
            return Err(LifecycleError::DuplicateId { id: descriptor.id });
        }
        self.sets.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    /// Store a descriptor, replacing (with a warning) any previous one under the same id.
    /// Instances already created from the old descriptor are left alone.
    pub fn upsert(
        &mut self,
        descriptor: AnimationSetDescriptor,
    ) -> Result<Option<AnimationSetDescriptor>> {
        descriptor.validate()?;
        let previous = self.sets.insert(descriptor.id.clone(), descriptor);
        if let Some(old) = &previous {
            log::warn!("animation set '{}' re-registered; overwriting", old.id);
        }
        Ok(previous)
    }

    pub fn descriptor(&self, id: &str) -> Option<&AnimationSetDescriptor> {
        self.sets.get(id)
    }

    pub fn set_ids(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// Create one instance per target whose canvas exists. Missing canvases and engine
    /// failures are recorded and skipped; the remaining targets still instantiate.
    pub fn instantiate(
        &mut self,
        set_id: &str,
        scope: Option<ScopeId>,
        res: &mut Resources<'_>,
    ) -> Result<Vec<InstanceId>> {
        let set = self
            .sets
            .get(set_id)
            .cloned()
            .ok_or_else(|| LifecycleError::UnknownAnimationSet {
                id: set_id.to_string(),
            })?;

        let mut created = Vec::with_capacity(set.targets.len());
        for target in &set.targets {
            if res.host.bounding_rect(&target.element_id).is_none() {
                let err = LifecycleError::configuration(format!(
                    "canvas '{}' for animation set '{}' not found; skipping",
                    target.element_id, set.id
                ));
                res.diagnostics.record(&err, res.now);
                continue;
            }

            let id = res.ids.alloc_instance();
            let state_machine = target
                .state_machine
                .clone()
                .or_else(|| set.default_state_machine.clone());
            let params = EngineParams {
                instance: id,
                src: set.source.clone(),
                canvas: target.element_id.clone(),
                artboard: target.artboard_name.clone(),
                state_machines: state_machine.iter().cloned().collect(),
                autoplay: set.autoplay,
                fit: set.fit,
                alignment: set.alignment,
            };
            let engine = match res.engines.create(&params) {
                Ok(engine) => engine,
                Err(reason) => {
                    let err = LifecycleError::ResourceCreation {
                        target: format!("{}-{}", set.id, target.element_id),
                        reason,
                    };
                    res.diagnostics.record(&err, res.now);
                    continue;
                }
            };
            let mut instance = AnimationInstance::new(
                id,
                &set.id,
                target.element_id.clone(),
                target.artboard_name.clone(),
                state_machine,
                target.trigger.clone().or_else(|| set.default_trigger.clone()),
                scope,
                engine,
            );

            if let Some(spec) = target.viewport.as_ref().or(set.default_viewport.as_ref()) {
                let bound = spec
                    .binding(&target.element_id, id, res.config)
                    .and_then(|binding| {
                        let tid = res.ids.alloc_trigger();
                        let signals =
                            res.triggers
                                .create(tid, binding, &*res.host, &res.viewport)?;
                        Ok((tid, signals))
                    });
                match bound {
                    Ok((tid, signals)) => {
                        instance.viewport_trigger = Some(tid);
                        res.signals.extend(signals);
                    }
                    Err(err) => res.diagnostics.record(&err, res.now),
                }
            }

            log::debug!("instantiated '{}' as {:?}", instance.key, id);
            self.instances.insert(id, instance);
            created.push(id);
        }
        Ok(created)
    }

    /// `instantiate` for every registered set, in registration order.
    pub fn instantiate_all(
        &mut self,
        scope: Option<ScopeId>,
        res: &mut Resources<'_>,
    ) -> Vec<InstanceId> {
        let ids: Vec<String> = self.sets.keys().cloned().collect();
        let mut created = Vec::new();
        for set_id in ids {
            match self.instantiate(&set_id, scope, res) {
                Ok(handles) => created.extend(handles),
                Err(err) => res.diagnostics.record(&err, res.now),
            }
        }
        created
    }

    pub fn get(&self, id: InstanceId) -> Option<&AnimationInstance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut AnimationInstance> {
        self.instances.get_mut(&id)
    }

    /// Look up an instance by `"<setId>-<elementId>"`.
    pub fn find(&self, key: &str) -> Option<&AnimationInstance> {
        self.instances.values().find(|inst| inst.key == key)
    }

    pub fn instances(&self) -> impl Iterator<Item = &AnimationInstance> {
        self.instances.values()
    }

    pub fn instances_mut(&mut self) -> impl Iterator<Item = &mut AnimationInstance> {
        self.instances.values_mut()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Release the engine and its viewport trigger. Idempotent: returns false when the
    /// handle is unknown or already destroyed.
    pub fn destroy<W: LayoutWrite + ?Sized>(
        &mut self,
        id: InstanceId,
        triggers: &mut ViewportTriggers,
        dom: &mut W,
    ) -> bool {
        let Some(mut instance) = self.instances.shift_remove(&id) else {
            return false;
        };
        if let Some(tid) = instance.viewport_trigger.take() {
            apply_pins(&triggers.release(tid), dom);
        }
        let released = instance.destroy();
        log::debug!("destroyed '{}'", instance.key);
        released
    }

    /// Destroy every instance this registry created. Returns how many were live.
    pub fn destroy_all<W: LayoutWrite + ?Sized>(
        &mut self,
        triggers: &mut ViewportTriggers,
        dom: &mut W,
    ) -> usize {
        let ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.destroy(*id, triggers, dom))
            .count()
    }

    /// The engine failed to load: drop the instance and its trigger without a second
    /// engine release. Returns the instance key.
    pub fn fail<W: LayoutWrite + ?Sized>(
        &mut self,
        id: InstanceId,
        triggers: &mut ViewportTriggers,
        dom: &mut W,
    ) -> Option<String> {
        let mut instance = self.instances.shift_remove(&id)?;
        if let Some(tid) = instance.viewport_trigger.take() {
            apply_pins(&triggers.release(tid), dom);
        }
        instance.fail();
        Some(instance.key)
    }

    /// Resize the drawing surface of every loaded instance, then fire the load-time
    /// trigger of instances that became ready since the last pass. Returns how many
    /// resized.
    pub fn resize_all(&mut self, diagnostics: &mut Diagnostics, now: f64) -> usize {
        let mut resized = 0;
        for instance in self.instances.values_mut() {
            match instance.resize_to_canvas() {
                Ok(true) => resized += 1,
                Ok(false) => {}
                Err(err) => diagnostics.record(&err, now),
            }
            if let Err(err) = instance.fire_pending_trigger() {
                diagnostics.record(&err, now);
            }
        }
        resized
    }
}
