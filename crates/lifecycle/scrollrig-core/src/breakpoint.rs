//! Breakpoint contexts: named media conditions gating setup/teardown pairs.
//!
//! Each rule is `Inactive`, `Active` or `Destroyed`. Deciding what changes is a pure
//! fold over the current truth values ([`BreakpointContext::plan`]); running setups and
//! disposers is the stage's job, because both need a [`Scope`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{ContextId, ScopeId};
use crate::media::{MediaCondition, MediaEnv};
use crate::stage::Scope;
use crate::Result;

/// Idempotent cleanup paired with a setup. Running it a second time does nothing.
pub struct Disposer {
    f: Option<Box<dyn FnOnce(&mut Scope<'_>)>>,
}

impl Disposer {
    pub fn new(f: impl FnOnce(&mut Scope<'_>) + 'static) -> Self {
        Self {
            f: Some(Box::new(f)),
        }
    }

    pub fn dispose(&mut self, scope: &mut Scope<'_>) {
        if let Some(f) = self.f.take() {
            f(scope);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.f.is_none()
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Runs when a rule becomes active. Resources created through the scope belong to this
/// activation; the optional disposer runs first on teardown.
pub type Setup = Box<dyn FnMut(&mut Scope<'_>) -> Result<Option<Disposer>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleState {
    Inactive,
    Active,
    Destroyed,
}

#[derive(Debug)]
pub(crate) struct Activation {
    pub scope: ScopeId,
    pub disposer: Option<Disposer>,
}

pub struct BreakpointRule {
    pub name: String,
    conditions: IndexMap<String, MediaCondition>,
    pub(crate) setup: Setup,
    state: RuleState,
    /// Truth values the current activation was set up with.
    truth: Vec<bool>,
    pub(crate) activation: Option<Activation>,
}

impl std::fmt::Debug for BreakpointRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakpointRule")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("truth", &self.truth)
            .finish_non_exhaustive()
    }
}

impl BreakpointRule {
    pub fn new(
        name: impl Into<String>,
        conditions: IndexMap<String, MediaCondition>,
        setup: Setup,
    ) -> Self {
        let truth = vec![false; conditions.len()];
        Self {
            name: name.into(),
            conditions,
            setup,
            state: RuleState::Inactive,
            truth,
            activation: None,
        }
    }

    pub fn state(&self) -> RuleState {
        self.state
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &MediaCondition)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn evaluate(&self, env: &MediaEnv) -> Vec<bool> {
        self.conditions.values().map(|c| c.matches(env)).collect()
    }

    /// Names of the conditions that hold under `truth`.
    fn matching(&self, truth: &[bool]) -> Vec<String> {
        self.conditions
            .keys()
            .zip(truth)
            .filter(|(_, hit)| **hit)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub(crate) fn begin(&mut self, truth: Vec<bool>, activation: Option<Activation>) {
        self.truth = truth;
        self.activation = activation;
        self.state = RuleState::Active;
    }

    /// Leave `Active`. The caller disposes the returned activation.
    pub(crate) fn end(&mut self, next: RuleState) -> Option<Activation> {
        if self.state == RuleState::Destroyed {
            return None;
        }
        self.state = next;
        self.truth.iter_mut().for_each(|t| *t = false);
        self.activation.take()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// Became true: run setup with these matching condition names.
    Activate { truth: Vec<bool>, matches: Vec<String> },
    /// Still true but a different subset matches: tear down, then set up again.
    Restart { truth: Vec<bool>, matches: Vec<String> },
    Deactivate,
}

/// A group of rules evaluated together (one `matchMedia` context).
#[derive(Debug)]
pub struct BreakpointContext {
    pub id: ContextId,
    pub name: String,
    pub(crate) rules: Vec<BreakpointRule>,
    destroyed: bool,
}

impl BreakpointContext {
    pub fn new(id: ContextId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rules: Vec::new(),
            destroyed: false,
        }
    }

    pub fn add(&mut self, rule: BreakpointRule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub fn rule(&self, name: &str) -> Option<&BreakpointRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn rules(&self) -> &[BreakpointRule] {
        &self.rules
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    /// What has to happen to each rule under `env`, in rule order. Teardowns are listed
    /// before setups so resources of a rule going away are released first.
    pub fn plan(&self, env: &MediaEnv) -> Vec<(usize, Change)> {
        if self.destroyed {
            return Vec::new();
        }
        let mut teardowns = Vec::new();
        let mut setups = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            let truth = rule.evaluate(env);
            let any = truth.iter().any(|t| *t);
            match (rule.state, any) {
                (RuleState::Inactive, true) => {
                    let matches = rule.matching(&truth);
                    setups.push((index, Change::Activate { truth, matches }));
                }
                (RuleState::Active, false) => teardowns.push((index, Change::Deactivate)),
                (RuleState::Active, true) if truth != rule.truth => {
                    let matches = rule.matching(&truth);
                    setups.push((index, Change::Restart { truth, matches }));
                }
                _ => {}
            }
        }
        teardowns.extend(setups);
        teardowns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, conditions: &[(&str, &str)]) -> BreakpointRule {
        let conditions = conditions
            .iter()
            .map(|(k, q)| (k.to_string(), MediaCondition::parse(q).unwrap()))
            .collect();
        BreakpointRule::new(name, conditions, Box::new(|_| Ok(None)))
    }

    fn apply(ctx: &mut BreakpointContext, env: &MediaEnv) -> Vec<(usize, Change)> {
        let plan = ctx.plan(env);
        for (index, change) in &plan {
            let rule = &mut ctx.rules[*index];
            match change {
                Change::Activate { truth, .. } | Change::Restart { truth, .. } => {
                    rule.end(RuleState::Inactive);
                    rule.begin(truth.clone(), None);
                }
                Change::Deactivate => {
                    rule.end(RuleState::Inactive);
                }
            }
        }
        plan
    }

    #[test]
    fn exclusive_breakpoints_swap_with_teardown_first() {
        let mut ctx = BreakpointContext::new(ContextId(0), "page");
        ctx.add(rule("desktop", &[("d", "(min-width: 992px)")]));
        ctx.add(rule("mobile", &[("m", "(max-width: 991px)")]));

        let plan = apply(&mut ctx, &MediaEnv::new(1200.0, 800.0));
        assert_eq!(plan.len(), 1);
        assert_eq!(ctx.rule("desktop").unwrap().state(), RuleState::Active);

        // Unchanged truth: nothing to do.
        assert!(apply(&mut ctx, &MediaEnv::new(1100.0, 800.0)).is_empty());

        let plan = apply(&mut ctx, &MediaEnv::new(600.0, 800.0));
        assert_eq!(plan[0], (0, Change::Deactivate));
        assert!(matches!(plan[1], (1, Change::Activate { .. })));
    }

    #[test]
    fn condition_set_restarts_on_subset_change() {
        let mut ctx = BreakpointContext::new(ContextId(0), "page");
        ctx.add(rule(
            "cards",
            &[
                ("isDesktop", "(min-width: 992px)"),
                ("isMobile", "(max-width: 991px)"),
            ],
        ));
        let plan = apply(&mut ctx, &MediaEnv::new(1200.0, 800.0));
        assert_eq!(
            plan,
            vec![(
                0,
                Change::Activate {
                    truth: vec![true, false],
                    matches: vec!["isDesktop".into()]
                }
            )]
        );
        let plan = apply(&mut ctx, &MediaEnv::new(500.0, 800.0));
        assert_eq!(
            plan,
            vec![(
                0,
                Change::Restart {
                    truth: vec![false, true],
                    matches: vec!["isMobile".into()]
                }
            )]
        );
    }

    #[test]
    fn destroyed_context_plans_nothing() {
        let mut ctx = BreakpointContext::new(ContextId(0), "page");
        ctx.add(rule("all", &[("all", "all")]));
        ctx.mark_destroyed();
        assert!(ctx.plan(&MediaEnv::new(100.0, 100.0)).is_empty());
    }

    #[test]
    fn destroyed_rule_never_reactivates() {
        let mut r = rule("all", &[("all", "all")]);
        r.begin(vec![true], None);
        assert!(r.end(RuleState::Destroyed).is_none());
        assert_eq!(r.state(), RuleState::Destroyed);
        r.end(RuleState::Inactive);
        assert_eq!(r.state(), RuleState::Destroyed);
    }
}
