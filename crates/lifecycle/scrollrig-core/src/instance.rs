//! Animation instances and the engine seam.
//!
//! The engine itself (tweening, rendering, asset loading) is external. The host implements
//! [`EngineFactory`]/[`EngineInstance`] and reports load results back to the stage.

use serde::{Deserialize, Serialize};

use crate::ids::{ElementId, InstanceId, ScopeId, TriggerId};
use crate::trigger::PlaybackAction;
use crate::{LifecycleError, Result};

/// How the artboard is fitted into its canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Fit {
    #[default]
    Cover,
    Contain,
    Fill,
    None,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    #[default]
    Center,
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Everything the host needs to construct one engine instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineParams {
    /// Echo this back through `Stage::engine_loaded` / `Stage::engine_load_failed`.
    pub instance: InstanceId,
    pub src: String,
    pub canvas: ElementId,
    pub artboard: Option<String>,
    pub state_machines: Vec<String>,
    pub autoplay: bool,
    pub fit: Fit,
    pub alignment: Alignment,
}

/// One native engine instance bound to one canvas.
pub trait EngineInstance {
    fn resize_drawing_surface_to_canvas(&mut self) -> core::result::Result<(), String>;

    /// Names of the inputs of `state_machine`; `Err` when the state machine is absent.
    fn state_machine_inputs(&self, state_machine: &str) -> core::result::Result<Vec<String>, String>;

    fn fire_input(&mut self, state_machine: &str, input: &str) -> core::result::Result<(), String>;

    fn play(&mut self);

    fn pause(&mut self);

    fn stop(&mut self);

    fn destroy(&mut self);
}

/// Constructs engine instances. Construction may fail synchronously; loading completes
/// later and is reported by the host.
pub trait EngineFactory {
    fn create(
        &mut self,
        params: &EngineParams,
    ) -> core::result::Result<Box<dyn EngineInstance>, String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Loading,
    Ready,
    Failed,
    Destroyed,
}

/// Handle to one running engine instance. Owns the engine exclusively.
pub struct AnimationInstance {
    pub id: InstanceId,
    /// `"<setId>-<elementId>"`.
    pub key: String,
    pub set_id: String,
    pub canvas: ElementId,
    pub artboard: Option<String>,
    pub state_machine: Option<String>,
    /// Input fired once the engine has loaded.
    pub trigger: Option<String>,
    pub viewport_trigger: Option<TriggerId>,
    /// Breakpoint activation that created it; `None` for page-level instances.
    pub scope: Option<ScopeId>,
    state: InstanceState,
    /// Loaded but the configured trigger waits for the first resize.
    trigger_pending: bool,
    engine: Box<dyn EngineInstance>,
}

impl std::fmt::Debug for AnimationInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationInstance")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state)
            .field("viewport_trigger", &self.viewport_trigger)
            .finish_non_exhaustive()
    }
}

impl AnimationInstance {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: InstanceId,
        set_id: &str,
        canvas: ElementId,
        artboard: Option<String>,
        state_machine: Option<String>,
        trigger: Option<String>,
        scope: Option<ScopeId>,
        engine: Box<dyn EngineInstance>,
    ) -> Self {
        Self {
            id,
            key: format!("{set_id}-{canvas}"),
            set_id: set_id.to_string(),
            canvas,
            artboard,
            state_machine,
            trigger,
            viewport_trigger: None,
            scope,
            state: InstanceState::Loading,
            trigger_pending: false,
            engine,
        }
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, InstanceState::Loading | InstanceState::Ready)
    }

    /// Loading -> Ready. The configured trigger fires after the next resize pass.
    pub(crate) fn mark_ready(&mut self) -> bool {
        if self.state == InstanceState::Loading {
            self.state = InstanceState::Ready;
            self.trigger_pending = self.trigger.is_some();
            return true;
        }
        false
    }

    pub fn play(&mut self) {
        if self.is_live() {
            self.engine.play();
        }
    }

    pub fn pause(&mut self) {
        if self.is_live() {
            self.engine.pause();
        }
    }

    pub fn stop(&mut self) {
        if self.is_live() {
            self.engine.stop();
        }
    }

    /// Only loaded engines have a drawing surface. Returns whether a resize happened.
    pub fn resize_to_canvas(&mut self) -> Result<bool> {
        if self.state != InstanceState::Ready {
            return Ok(false);
        }
        self.engine
            .resize_drawing_surface_to_canvas()
            .map_err(|reason| LifecycleError::ResourceCreation {
                target: self.key.clone(),
                reason,
            })?;
        Ok(true)
    }

    /// Fire `input` on the configured state machine. A missing state machine or input is
    /// `TriggerNotFound`; the instance keeps running either way.
    pub fn fire(&mut self, input: &str) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }
        let not_found = |sm: &str| LifecycleError::TriggerNotFound {
            state_machine: sm.to_string(),
            trigger: input.to_string(),
        };
        let Some(sm) = self.state_machine.clone() else {
            return Err(not_found("<none>"));
        };
        let inputs = self
            .engine
            .state_machine_inputs(&sm)
            .map_err(|_| not_found(&sm))?;
        if !inputs.iter().any(|name| name == input) {
            return Err(not_found(&sm));
        }
        self.engine.fire_input(&sm, input).map_err(|_| not_found(&sm))
    }

    /// Fire the load-time trigger once, if it is still waiting for the first resize.
    pub(crate) fn fire_pending_trigger(&mut self) -> Result<()> {
        if !std::mem::take(&mut self.trigger_pending) {
            return Ok(());
        }
        match self.trigger.clone() {
            Some(trigger) => self.fire(&trigger),
            None => Ok(()),
        }
    }

    pub fn apply(&mut self, action: &PlaybackAction) -> Result<()> {
        match action {
            PlaybackAction::None => {}
            PlaybackAction::Play => self.play(),
            PlaybackAction::Pause => self.pause(),
            PlaybackAction::Stop => self.stop(),
            PlaybackAction::Fire(input) => self.fire(input)?,
        }
        Ok(())
    }

    /// Release the engine. Returns false when it was already released.
    pub fn destroy(&mut self) -> bool {
        match self.state {
            InstanceState::Destroyed => false,
            InstanceState::Failed => {
                self.state = InstanceState::Destroyed;
                false
            }
            InstanceState::Loading | InstanceState::Ready => {
                self.engine.destroy();
                self.state = InstanceState::Destroyed;
                true
            }
        }
    }

    /// The engine reported a load error: release it and stop driving it.
    pub(crate) fn fail(&mut self) {
        if self.is_live() {
            self.engine.destroy();
            self.state = InstanceState::Failed;
        }
    }
}
