//! The page-level stage: one scheduler, one layout cache, one trigger table and one
//! registry per page, driven by host events.
//!
//! Host contract:
//! - `resize`, `set_pixel_ratio` and `scroll` are event handlers. They never run setup
//!   code for deferred activations; that waits for the next `frame`.
//! - `frame(now)` is called on every animation frame (or idle slot). Due debounce timers
//!   and deferred activations run there.
//! - Engine load results are reported with `engine_loaded` / `engine_load_failed`.
//! - Everything the host should react to is queued as a [`StageEvent`].

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::Serialize;

use crate::breakpoint::{
    Activation, BreakpointContext, BreakpointRule, Change, Disposer, RuleState, Setup,
};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::ids::{ContextId, ElementId, GateId, IdAllocator, InstanceId, LayoutId, ScopeId, TriggerId};
use crate::instance::{AnimationInstance, EngineFactory};
use crate::layout::{Host, LayoutCache, RadialLayout, Viewport};
use crate::media::MediaCondition;
use crate::proximity::{Margin, ProximityGate};
use crate::registry::{AnimationSetDescriptor, Registry, Resources};
use crate::scheduler::Debouncer;
use crate::trigger::{TriggerEdge, TriggerSignal, ViewportTriggerBinding, ViewportTriggers};
use crate::{LifecycleError, Result};

/// Notifications for the host, drained with [`Stage::take_events`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StageEvent {
    #[serde(rename_all = "camelCase")]
    RuleActivated {
        context: String,
        rule: String,
        matches: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    RuleDeactivated { context: String, rule: String },
    #[serde(rename_all = "camelCase")]
    Trigger {
        trigger: TriggerId,
        instance: Option<InstanceId>,
        edge: TriggerEdge,
    },
    /// Scrub progress (0..1) for the host's timeline.
    #[serde(rename_all = "camelCase")]
    Progress {
        trigger: TriggerId,
        instance: Option<InstanceId>,
        progress: f64,
    },
    Pinned { element: ElementId, top: f64 },
    Unpinned { element: ElementId },
    #[serde(rename_all = "camelCase")]
    InstanceReady { instance: InstanceId, key: String },
    #[serde(rename_all = "camelCase")]
    InstanceFailed { instance: InstanceId, key: String },
    LayoutApplied { layout: LayoutId, epoch: u64 },
    CanvasResized { count: usize },
}

/// Logical concern a debounce timer coalesces.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Shared by every instance of the stage.
    CanvasResize,
    Relayout(LayoutId),
    TriggerRefresh,
    Custom(ScopeId, String),
}

fn load_mark(id: InstanceId) -> String {
    format!("load:{}", id.0)
}

type ScopedFn = Box<dyn FnOnce(&mut Scope<'_>)>;

enum Task {
    Builtin,
    Custom(ScopedFn),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Resource {
    Instance(InstanceId),
    Trigger(TriggerId),
    Gate(GateId),
    Layout(LayoutId),
    Timer(String),
}

#[derive(Debug, Default)]
struct ScopeEntry {
    matches: Vec<String>,
    resources: Vec<Resource>,
}

/// Everything except the breakpoint contexts, so a setup running for one rule can
/// mutate the stage while its rule is borrowed.
pub(crate) struct World {
    config: Config,
    host: Box<dyn Host>,
    engines: Box<dyn EngineFactory>,
    ids: IdAllocator,
    viewport: Viewport,
    now: f64,
    scheduler: Debouncer<TimerKey, Task>,
    layouts: LayoutCache,
    gates: ProximityGate<(ScopeId, ScopedFn)>,
    /// Activations whose gate fired; they run on the next frame.
    deferred: Vec<(ScopeId, ScopedFn)>,
    triggers: ViewportTriggers,
    registry: Registry,
    scopes: HashMap<ScopeId, ScopeEntry>,
    page_scope: ScopeId,
    events: Vec<StageEvent>,
    diagnostics: Diagnostics,
}

impl World {
    fn open_scope(&mut self, matches: Vec<String>) -> ScopeId {
        let id = self.ids.alloc_scope();
        self.scopes.insert(
            id,
            ScopeEntry {
                matches,
                resources: Vec::new(),
            },
        );
        id
    }

    fn own(&mut self, scope: ScopeId, resource: Resource) {
        if let Some(entry) = self.scopes.get_mut(&scope) {
            if !entry.resources.contains(&resource) {
                entry.resources.push(resource);
            }
        }
    }

    fn disown(&mut self, scope: ScopeId, resource: &Resource) {
        if let Some(entry) = self.scopes.get_mut(&scope) {
            entry.resources.retain(|r| r != resource);
        }
    }

    /// Release everything `scope` owns, newest first, and forget the scope.
    fn release_scope(&mut self, scope: ScopeId) {
        let Some(entry) = self.scopes.remove(&scope) else {
            return;
        };
        for resource in entry.resources.into_iter().rev() {
            match resource {
                Resource::Instance(id) => {
                    self.registry
                        .destroy(id, &mut self.triggers, self.host.as_mut());
                }
                Resource::Trigger(id) => {
                    let signals = self.triggers.release(id);
                    self.apply_signals(signals);
                }
                Resource::Gate(id) => {
                    self.gates.disarm(id);
                }
                Resource::Layout(id) => {
                    self.layouts.remove(id);
                    self.scheduler.cancel(&TimerKey::Relayout(id));
                }
                Resource::Timer(name) => {
                    self.scheduler.cancel(&TimerKey::Custom(scope, name));
                }
            }
        }
        self.deferred.retain(|(owner, _)| *owner != scope);
        log::trace!("released scope {scope:?}");
    }

    /// Apply trigger output in order: pins to the DOM, edge actions to instances.
    fn apply_signals(&mut self, signals: Vec<TriggerSignal>) {
        for signal in signals {
            match signal {
                TriggerSignal::Edge { trigger, edge, .. } => {
                    let Some(binding) = self.triggers.binding(trigger) else {
                        continue;
                    };
                    let target = binding.target;
                    let action = binding.actions.for_edge(edge).clone();
                    self.diagnostics.counters.trigger_edges += 1;
                    if let Some(instance) = target.and_then(|id| self.registry.get_mut(id)) {
                        if let Err(err) = instance.apply(&action) {
                            self.diagnostics.record(&err, self.now);
                        }
                    }
                    self.events.push(StageEvent::Trigger {
                        trigger,
                        instance: target,
                        edge,
                    });
                }
                TriggerSignal::Progress { trigger, progress } => {
                    let instance = self.triggers.binding(trigger).and_then(|b| b.target);
                    self.events.push(StageEvent::Progress {
                        trigger,
                        instance,
                        progress,
                    });
                }
                TriggerSignal::Pin { element, top, .. } => {
                    self.host.set_pin(&element, Some(top));
                    self.events.push(StageEvent::Pinned { element, top });
                }
                TriggerSignal::Unpin { element, .. } => {
                    self.host.set_pin(&element, None);
                    self.events.push(StageEvent::Unpinned { element });
                }
            }
        }
    }

    fn check_gates(&mut self) {
        let fired = self
            .gates
            .check(self.viewport.width, self.viewport.height, self.host.as_ref());
        self.deferred.extend(fired.into_iter().map(|(_, payload)| payload));
    }

    fn run_scoped(&mut self, scope: ScopeId, f: ScopedFn) {
        if !self.scopes.contains_key(&scope) {
            return;
        }
        let mut s = Scope { world: self, id: scope };
        f(&mut s);
    }

    fn run_task(&mut self, key: TimerKey, task: Task) {
        self.diagnostics.counters.timers_fired += 1;
        match (key, task) {
            (TimerKey::CanvasResize, _) => {
                let count = self.registry.resize_all(&mut self.diagnostics, self.now);
                self.diagnostics.counters.canvas_resizes += 1;
                self.events.push(StageEvent::CanvasResized { count });
            }
            (TimerKey::Relayout(id), _) => self.relayout(id),
            (TimerKey::TriggerRefresh, _) => {
                let signals = self.triggers.refresh(self.host.as_ref(), &self.viewport);
                self.diagnostics.counters.trigger_refreshes += 1;
                self.apply_signals(signals);
            }
            (TimerKey::Custom(scope, name), Task::Custom(f)) => {
                self.disown(scope, &Resource::Timer(name));
                self.run_scoped(scope, f);
            }
            (TimerKey::Custom(scope, name), Task::Builtin) => {
                log::debug!("custom timer '{name}' of {scope:?} has no task");
            }
        }
    }

    fn relayout(&mut self, id: LayoutId) {
        match self.layouts.relayout(id, self.host.as_mut()) {
            Ok(epoch) => {
                self.diagnostics.counters.layout_recomputes += 1;
                self.events.push(StageEvent::LayoutApplied { layout: id, epoch });
            }
            Err(err) => self.diagnostics.record(&err, self.now),
        }
    }

    fn activate(&mut self, context: &str, rule: &mut BreakpointRule, truth: Vec<bool>, matches: Vec<String>) {
        let scope = self.open_scope(matches.clone());
        let result = {
            let mut s = Scope { world: self, id: scope };
            (rule.setup)(&mut s)
        };
        self.diagnostics.counters.setups += 1;
        match result {
            Ok(disposer) => rule.begin(truth, Some(Activation { scope, disposer })),
            Err(err) => {
                log::warn!("setup of rule '{}' in '{context}' failed", rule.name);
                self.diagnostics.record(&err, self.now);
                self.release_scope(scope);
                rule.begin(truth, None);
            }
        }
        log::debug!("rule '{}' in '{context}' active ({matches:?})", rule.name);
        self.events.push(StageEvent::RuleActivated {
            context: context.to_string(),
            rule: rule.name.clone(),
            matches,
        });
    }

    fn deactivate(&mut self, context: &str, rule: &mut BreakpointRule, next: RuleState) {
        let was_active = rule.state() == RuleState::Active;
        if let Some(Activation { scope, disposer }) = rule.end(next) {
            if let Some(mut disposer) = disposer {
                let mut s = Scope { world: self, id: scope };
                disposer.dispose(&mut s);
            }
            self.release_scope(scope);
        }
        if was_active {
            self.diagnostics.counters.teardowns += 1;
            log::debug!("rule '{}' in '{context}' torn down", rule.name);
            self.events.push(StageEvent::RuleDeactivated {
                context: context.to_string(),
                rule: rule.name.clone(),
            });
        }
    }
}

/// Resource-creation API handed to setups, disposers, timers and deferred activations.
/// Everything created here belongs to the scope and is released with it.
pub struct Scope<'a> {
    world: &'a mut World,
    id: ScopeId,
}

impl Scope<'_> {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Whether the named condition of the rule being set up currently holds.
    pub fn matches(&self, condition: &str) -> bool {
        self.matching().iter().any(|m| m == condition)
    }

    pub fn matching(&self) -> &[String] {
        self.world
            .scopes
            .get(&self.id)
            .map(|e| e.matches.as_slice())
            .unwrap_or(&[])
    }

    pub fn viewport(&self) -> Viewport {
        self.world.viewport
    }

    pub fn now(&self) -> f64 {
        self.world.now
    }

    pub fn config(&self) -> &Config {
        &self.world.config
    }

    /// Strict registration; a duplicate id is recorded as a warning and returned.
    pub fn register(&mut self, descriptor: AnimationSetDescriptor) -> Result<()> {
        self.world.registry.register(descriptor).inspect_err(|err| {
            self.world.diagnostics.record(err, self.world.now);
        })
    }

    /// Registration that overwrites an existing id, recording a duplicate warning.
    pub fn upsert(&mut self, descriptor: AnimationSetDescriptor) -> Result<()> {
        let id = descriptor.id.clone();
        if self.world.registry.upsert(descriptor)?.is_some() {
            self.world
                .diagnostics
                .record(&LifecycleError::DuplicateId { id }, self.world.now);
        }
        Ok(())
    }

    pub fn instantiate(&mut self, set_id: &str) -> Result<Vec<InstanceId>> {
        let mut signals = Vec::new();
        let world = &mut *self.world;
        let mut res = Resources {
            host: world.host.as_mut(),
            engines: world.engines.as_mut(),
            ids: &mut world.ids,
            triggers: &mut world.triggers,
            viewport: world.viewport,
            config: &world.config,
            diagnostics: &mut world.diagnostics,
            signals: &mut signals,
            now: world.now,
        };
        let created = world.registry.instantiate(set_id, Some(self.id), &mut res)?;
        for id in &created {
            world.own(self.id, Resource::Instance(*id));
            world.diagnostics.mark(&load_mark(*id), world.now);
        }
        world.apply_signals(signals);
        Ok(created)
    }

    /// `instantiate` for every registered set.
    pub fn instantiate_all(&mut self) -> Vec<InstanceId> {
        let ids: Vec<String> = self.world.registry.set_ids().map(str::to_string).collect();
        let mut created = Vec::new();
        for set_id in ids {
            match self.instantiate(&set_id) {
                Ok(handles) => created.extend(handles),
                Err(err) => self.world.diagnostics.record(&err, self.world.now),
            }
        }
        created
    }

    pub fn instance(&self, id: InstanceId) -> Option<&AnimationInstance> {
        self.world.registry.get(id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut AnimationInstance> {
        self.world.registry.get_mut(id)
    }

    pub fn destroy_instance(&mut self, id: InstanceId) -> bool {
        let world = &mut *self.world;
        world
            .registry
            .destroy(id, &mut world.triggers, world.host.as_mut())
    }

    /// Start a viewport trigger. Signals for a trigger created inside its interval are
    /// applied immediately.
    pub fn create_trigger(&mut self, binding: ViewportTriggerBinding) -> Result<TriggerId> {
        let world = &mut *self.world;
        let id = world.ids.alloc_trigger();
        let signals = world
            .triggers
            .create(id, binding, world.host.as_ref(), &world.viewport)
            .inspect_err(|err| world.diagnostics.record(err, world.now))?;
        world.own(self.id, Resource::Trigger(id));
        world.apply_signals(signals);
        Ok(id)
    }

    /// Idempotent; a held pin is released at once.
    pub fn release_trigger(&mut self, id: TriggerId) {
        let signals = self.world.triggers.release(id);
        self.world.apply_signals(signals);
    }

    /// Add a radial layout group and lay it out once, synchronously. Later recomputes
    /// follow resizes through the layout debounce.
    pub fn radial_layout(&mut self, layout: RadialLayout) -> Result<LayoutId> {
        let world = &mut *self.world;
        let id = world.ids.alloc_layout();
        world.layouts.insert(id, layout);
        if let Err(err) = world.layouts.relayout(id, world.host.as_mut()) {
            world.layouts.remove(id);
            world.diagnostics.record(&err, world.now);
            return Err(err);
        }
        world.diagnostics.counters.layout_recomputes += 1;
        world.own(self.id, Resource::Layout(id));
        Ok(id)
    }

    /// Run `f` on the first frame after `element` comes within `margin` of the viewport
    /// (the configured proximity margin when `None`). Never runs if the scope ends first.
    pub fn defer_until_near(
        &mut self,
        element: impl Into<ElementId>,
        margin: Option<Margin>,
        f: impl FnOnce(&mut Scope<'_>) + 'static,
    ) -> GateId {
        let world = &mut *self.world;
        let id = world.ids.alloc_gate();
        let margin = margin.unwrap_or(world.config.proximity_margin);
        world
            .gates
            .arm(id, element.into(), margin, (self.id, Box::new(f)));
        world.own(self.id, Resource::Gate(id));
        id
    }

    /// Trailing debounce private to this scope.
    pub fn debounce(
        &mut self,
        name: &str,
        delay_ms: f64,
        f: impl FnOnce(&mut Scope<'_>) + 'static,
    ) {
        let world = &mut *self.world;
        world.scheduler.schedule(
            TimerKey::Custom(self.id, name.to_string()),
            Task::Custom(Box::new(f)),
            delay_ms,
            world.now,
        );
        world.own(self.id, Resource::Timer(name.to_string()));
    }

    pub fn cancel(&mut self, name: &str) -> bool {
        let world = &mut *self.world;
        world.disown(self.id, &Resource::Timer(name.to_string()));
        world
            .scheduler
            .cancel(&TimerKey::Custom(self.id, name.to_string()))
            .is_some()
    }

    /// Pair a cleanup with this scope for returning from a setup.
    pub fn disposer(&self, f: impl FnOnce(&mut Scope<'_>) + 'static) -> Disposer {
        Disposer::new(f)
    }
}

/// One page.
pub struct Stage {
    world: World,
    contexts: IndexMap<ContextId, BreakpointContext>,
    started: bool,
    torn_down: bool,
}

impl Stage {
    pub fn new(
        config: Config,
        host: Box<dyn Host>,
        engines: Box<dyn EngineFactory>,
        viewport: Viewport,
    ) -> Self {
        let diagnostics = Diagnostics::new(config.diagnostics.clone(), config.long_task_ms);
        let mut ids = IdAllocator::new();
        let page_scope = ids.alloc_scope();
        let mut scopes = HashMap::new();
        scopes.insert(page_scope, ScopeEntry::default());
        Self {
            world: World {
                config,
                host,
                engines,
                ids,
                viewport,
                now: 0.0,
                scheduler: Debouncer::new(),
                layouts: LayoutCache::new(),
                gates: ProximityGate::new(),
                deferred: Vec::new(),
                triggers: ViewportTriggers::new(),
                registry: Registry::new(),
                scopes,
                page_scope,
                events: Vec::new(),
                diagnostics,
            },
            contexts: IndexMap::new(),
            started: false,
            torn_down: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.world.config
    }

    pub fn viewport(&self) -> Viewport {
        self.world.viewport
    }

    pub fn registry(&self) -> &Registry {
        &self.world.registry
    }

    pub fn triggers(&self) -> &ViewportTriggers {
        &self.world.triggers
    }

    pub fn layouts(&self) -> &LayoutCache {
        &self.world.layouts
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.world.diagnostics
    }

    pub fn pending_timers(&self) -> usize {
        self.world.scheduler.len()
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.world.scheduler.next_deadline()
    }

    pub fn armed_gates(&self) -> usize {
        self.world.gates.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn take_events(&mut self) -> Vec<StageEvent> {
        std::mem::take(&mut self.world.events)
    }

    /// Create a named breakpoint context.
    pub fn context(&mut self, name: &str) -> ContextId {
        let id = self.world.ids.alloc_context();
        self.contexts.insert(id, BreakpointContext::new(id, name));
        id
    }

    pub fn breakpoint_context(&self, id: ContextId) -> Option<&BreakpointContext> {
        self.contexts.get(&id)
    }

    pub fn rule_state(&self, context: ContextId, rule: &str) -> Option<RuleState> {
        self.contexts.get(&context)?.rule(rule).map(|r| r.state())
    }

    /// Rule active while `query` matches.
    pub fn add_rule(
        &mut self,
        context: ContextId,
        name: &str,
        query: &str,
        setup: impl FnMut(&mut Scope<'_>) -> Result<Option<Disposer>> + 'static,
    ) -> Result<()> {
        self.add_rule_set(context, name, &[(name, query)], setup)
    }

    /// Rule active while any of the named conditions matches; setup can ask which.
    pub fn add_rule_set(
        &mut self,
        context: ContextId,
        name: &str,
        conditions: &[(&str, &str)],
        setup: impl FnMut(&mut Scope<'_>) -> Result<Option<Disposer>> + 'static,
    ) -> Result<()> {
        let conditions = conditions
            .iter()
            .map(|(key, query)| -> Result<(String, MediaCondition)> {
                Ok((key.to_string(), MediaCondition::parse(query)?))
            })
            .collect::<Result<IndexMap<_, _>>>()?;
        self.push_rule(context, BreakpointRule::new(name, conditions, Box::new(setup)))
    }

    /// Rule gated by one of the configured breakpoints (`"desktop"`, `"mobile"`, ...).
    pub fn add_breakpoint_rule(
        &mut self,
        context: ContextId,
        breakpoint: &str,
        setup: impl FnMut(&mut Scope<'_>) -> Result<Option<Disposer>> + 'static,
    ) -> Result<()> {
        let condition = self.world.config.breakpoint(breakpoint).ok_or_else(|| {
            LifecycleError::configuration(format!("unknown breakpoint '{breakpoint}'"))
        })?;
        let mut conditions = IndexMap::new();
        conditions.insert(breakpoint.to_string(), condition);
        let setup: Setup = Box::new(setup);
        self.push_rule(context, BreakpointRule::new(breakpoint, conditions, setup))
    }

    fn push_rule(&mut self, context: ContextId, rule: BreakpointRule) -> Result<()> {
        let ctx = self
            .contexts
            .get_mut(&context)
            .filter(|c| !c.is_destroyed())
            .ok_or_else(|| {
                LifecycleError::configuration(format!("unknown or destroyed context {context:?}"))
            })?;
        ctx.add(rule);
        if self.started && !self.torn_down {
            self.evaluate(context);
        }
        Ok(())
    }

    /// Page-level resources (released only by `teardown`).
    pub fn with_page_scope<R>(&mut self, f: impl FnOnce(&mut Scope<'_>) -> R) -> R {
        let id = self.world.page_scope;
        let mut scope = Scope {
            world: &mut self.world,
            id,
        };
        f(&mut scope)
    }

    pub fn register_set(&mut self, descriptor: AnimationSetDescriptor) -> Result<()> {
        self.with_page_scope(|s| s.register(descriptor))
    }

    /// Initial evaluation of every context and first proximity check.
    pub fn start(&mut self, now: f64) {
        if self.torn_down {
            return;
        }
        self.world.now = now;
        self.started = true;
        let ids: Vec<ContextId> = self.contexts.keys().copied().collect();
        for id in ids {
            self.evaluate(id);
        }
        self.world.check_gates();
    }

    fn evaluate(&mut self, id: ContextId) {
        let env = self.world.viewport.media_env();
        let Some(context) = self.contexts.get_mut(&id) else {
            return;
        };
        for (index, change) in context.plan(&env) {
            let name = context.name.clone();
            let rule = &mut context.rules[index];
            match change {
                Change::Deactivate => self.world.deactivate(&name, rule, RuleState::Inactive),
                Change::Activate { truth, matches } => {
                    self.world.activate(&name, rule, truth, matches)
                }
                Change::Restart { truth, matches } => {
                    self.world.deactivate(&name, rule, RuleState::Inactive);
                    self.world.activate(&name, rule, truth, matches);
                }
            }
        }
    }

    fn evaluate_all(&mut self) {
        if !self.started {
            return;
        }
        let ids: Vec<ContextId> = self.contexts.keys().copied().collect();
        for id in ids {
            self.evaluate(id);
        }
    }

    /// Tear down every rule of the context and stop evaluating it. Idempotent.
    pub fn destroy_context(&mut self, id: ContextId) {
        let Some(context) = self.contexts.get_mut(&id) else {
            return;
        };
        if context.is_destroyed() {
            return;
        }
        let name = context.name.clone();
        for rule in context.rules.iter_mut() {
            self.world.deactivate(&name, rule, RuleState::Destroyed);
        }
        context.mark_destroyed();
    }

    /// Viewport size changed. Media conditions are re-evaluated at once; geometry work
    /// is debounced.
    pub fn resize(&mut self, width: f64, height: f64, document_height: f64, now: f64) {
        if self.torn_down {
            return;
        }
        let world = &mut self.world;
        world.now = now;
        world.viewport.width = width;
        world.viewport.height = height;
        world.viewport.document_height = document_height;
        self.evaluate_all();

        let world = &mut self.world;
        let resize = world.config.resize_debounce_ms;
        let layout = world.config.layout_debounce_ms;
        world
            .scheduler
            .schedule(TimerKey::CanvasResize, Task::Builtin, resize, now);
        world
            .scheduler
            .schedule(TimerKey::TriggerRefresh, Task::Builtin, resize, now);
        for id in world.layouts.ids() {
            world
                .scheduler
                .schedule(TimerKey::Relayout(id), Task::Builtin, layout, now);
        }
        world.check_gates();
    }

    /// Device pixel ratio changed; coalesces with resize on the canvas key.
    pub fn set_pixel_ratio(&mut self, pixel_ratio: f64, now: f64) {
        if self.torn_down {
            return;
        }
        self.world.now = now;
        self.world.viewport.pixel_ratio = pixel_ratio;
        self.evaluate_all();
        let delay = self.world.config.resize_debounce_ms;
        self.world
            .scheduler
            .schedule(TimerKey::CanvasResize, Task::Builtin, delay, now);
    }

    pub fn scroll(&mut self, scroll_y: f64, now: f64) {
        if self.torn_down {
            return;
        }
        let world = &mut self.world;
        world.now = now;
        world.viewport.scroll_y = scroll_y;
        let signals = world.triggers.update(scroll_y);
        world.apply_signals(signals);
        world.check_gates();
    }

    /// Run due timers, then activations whose proximity gate fired. Timers armed by
    /// this frame's work run on a later frame.
    pub fn frame(&mut self, now: f64) {
        if self.torn_down {
            return;
        }
        let world = &mut self.world;
        world.now = now;
        let watermark = world.scheduler.watermark();
        while let Some((key, task)) = world.scheduler.pop_due(now, watermark) {
            world.run_task(key, task);
        }
        world.check_gates();
        for (scope, f) in std::mem::take(&mut world.deferred) {
            world.run_scoped(scope, f);
        }
    }

    /// The engine of `id` finished loading: schedule the shared canvas resize. The
    /// configured trigger fires right after that resize.
    pub fn engine_loaded(&mut self, id: InstanceId, now: f64) {
        if self.torn_down {
            return;
        }
        let world = &mut self.world;
        world.now = now;
        let Some(instance) = world.registry.get_mut(id) else {
            log::debug!("load of {id:?} reported after it was destroyed");
            return;
        };
        if !instance.mark_ready() {
            return;
        }
        let key = instance.key.clone();
        world
            .diagnostics
            .measure(&format!("load {key}"), &load_mark(id), now);
        let delay = world.config.resize_debounce_ms;
        world
            .scheduler
            .schedule(TimerKey::CanvasResize, Task::Builtin, delay, now);
        world.events.push(StageEvent::InstanceReady { instance: id, key });
    }

    /// The engine of `id` failed to load: no instance stays registered.
    pub fn engine_load_failed(&mut self, id: InstanceId, reason: &str, now: f64) {
        if self.torn_down {
            return;
        }
        let world = &mut self.world;
        world.now = now;
        let Some(key) = world
            .registry
            .fail(id, &mut world.triggers, world.host.as_mut())
        else {
            return;
        };
        let err = LifecycleError::ResourceCreation {
            target: key.clone(),
            reason: reason.to_string(),
        };
        world.diagnostics.record(&err, now);
        world.events.push(StageEvent::InstanceFailed { instance: id, key });
    }

    /// Page teardown: every context, every scope, every instance, timer, gate and
    /// trigger. Further host events are ignored.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        let ids: Vec<ContextId> = self.contexts.keys().copied().collect();
        for id in ids {
            self.destroy_context(id);
        }
        let world = &mut self.world;
        world.release_scope(world.page_scope);
        world.registry.destroy_all(&mut world.triggers, world.host.as_mut());
        let signals = world.triggers.release_all();
        world.apply_signals(signals);
        world.scheduler.clear();
        world.gates.clear();
        world.deferred.clear();
        self.torn_down = true;
        log::debug!("stage torn down");
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{EngineInstance, EngineParams};
    use crate::layout::{LayoutRead, LayoutWrite, Rect};

    struct BlankPage;

    impl LayoutRead for BlankPage {
        fn bounding_rect(&self, _element: &ElementId) -> Option<Rect> {
            None
        }
    }

    impl LayoutWrite for BlankPage {
        fn set_translate(&mut self, _element: &ElementId, _x: f64, _y: f64) {}

        fn set_pin(&mut self, _element: &ElementId, _top: Option<f64>) {}
    }

    struct NoEngines;

    impl EngineFactory for NoEngines {
        fn create(
            &mut self,
            _params: &EngineParams,
        ) -> core::result::Result<Box<dyn EngineInstance>, String> {
            Err("no engines".into())
        }
    }

    fn stage() -> Stage {
        Stage::new(
            Config::default(),
            Box::new(BlankPage),
            Box::new(NoEngines),
            Viewport::new(1200.0, 800.0),
        )
    }

    fn page_resources(stage: &Stage) -> Vec<Resource> {
        stage.world.scopes[&stage.world.page_scope].resources.clone()
    }

    #[test]
    fn cancelled_timer_leaves_the_scope() {
        let mut stage = stage();
        stage.with_page_scope(|s| {
            s.debounce("a", 100.0, |_| {});
            s.debounce("b", 100.0, |_| {});
            s.debounce("a", 100.0, |_| {});
        });
        assert_eq!(
            page_resources(&stage),
            [Resource::Timer("a".into()), Resource::Timer("b".into())]
        );

        assert!(stage.with_page_scope(|s| s.cancel("a")));
        assert_eq!(page_resources(&stage), [Resource::Timer("b".into())]);
        assert!(!stage.with_page_scope(|s| s.cancel("a")));
        assert_eq!(stage.pending_timers(), 1);
    }

    #[test]
    fn fired_timer_leaves_the_scope_unless_it_rearms() {
        let mut stage = stage();
        stage.with_page_scope(|s| {
            s.debounce("once", 10.0, |_| {});
            s.debounce("again", 10.0, |s| s.debounce("again", 10.0, |_| {}));
        });
        stage.frame(10.0);
        assert_eq!(page_resources(&stage), [Resource::Timer("again".into())]);
        stage.frame(20.0);
        assert!(page_resources(&stage).is_empty());
        assert_eq!(stage.pending_timers(), 0);
    }
}
