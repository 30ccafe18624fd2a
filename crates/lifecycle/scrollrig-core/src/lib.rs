//! Scrollrig core (host-agnostic)
//!
//! Lifecycle manager for responsive, scroll-driven canvas animations: breakpoint-gated
//! setup/teardown, deferred creation near the viewport, debounced and batched layout
//! work, scroll triggers, and a registry of animation sets bound to an external engine.
//!
//! The host (browser bindings, tests) implements the [`Host`] and [`EngineFactory`]
//! seams and drives a [`Stage`] with resize/scroll/frame events and a monotonic clock.

pub mod breakpoint;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod instance;
pub mod layout;
pub mod media;
pub mod proximity;
pub mod registry;
pub mod scheduler;
pub mod stage;
pub mod trigger;

pub type Result<T> = core::result::Result<T, LifecycleError>;

// Re-exports for hosts
pub use breakpoint::{BreakpointContext, Disposer, RuleState};
pub use config::{Breakpoint, Config};
pub use dataset::{descriptor_from_dataset, Dataset};
pub use diagnostics::{Counters, Diagnostic, Diagnostics, DiagnosticsCfg};
pub use error::LifecycleError;
pub use ids::{ContextId, ElementId, GateId, InstanceId, LayoutId, ScopeId, TriggerId};
pub use instance::{
    Alignment, AnimationInstance, EngineFactory, EngineInstance, EngineParams, Fit, InstanceState,
};
pub use layout::{Host, LayoutRead, LayoutSnapshot, LayoutWrite, RadialLayout, Rect, Viewport};
pub use media::{MediaCondition, MediaEnv};
pub use proximity::Margin;
pub use registry::{AnimationSetDescriptor, Registry, TargetDescriptor, TriggerSpec};
pub use scheduler::Debouncer;
pub use stage::{Scope, Stage, StageEvent};
pub use trigger::{
    BoundaryExpr, Phase, PlaybackAction, TriggerActions, TriggerEdge, TriggerSignal,
    ViewportTriggerBinding, ViewportTriggers,
};

/// ABI version for host bindings.
pub const ABI_VERSION: u32 = 1;
