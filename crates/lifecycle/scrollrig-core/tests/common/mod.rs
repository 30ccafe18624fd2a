#![allow(dead_code)]
//! Fake DOM and recording fake engine shared by the integration tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use scrollrig_core::{
    AnimationSetDescriptor, Config, ElementId, EngineFactory, EngineInstance, EngineParams,
    InstanceId, LayoutRead, LayoutWrite, Rect, Stage, StageEvent, TriggerEdge, Viewport,
};

pub const WIDTH: f64 = 1200.0;
pub const HEIGHT: f64 = 800.0;
pub const DOCUMENT_HEIGHT: f64 = 6000.0;

#[derive(Default)]
pub struct DomState {
    /// Untranslated rects in document coordinates.
    pub rects: HashMap<ElementId, Rect>,
    pub scroll: f64,
    pub translations: HashMap<ElementId, (f64, f64)>,
    pub pins: HashMap<ElementId, f64>,
    pub pin_log: Vec<(ElementId, Option<f64>)>,
    pub reads: usize,
    pub writes: usize,
}

/// Cheap handle; clones share state so a test can inspect what the stage wrote.
#[derive(Clone, Default)]
pub struct FakeDom(pub Rc<RefCell<DomState>>);

impl FakeDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str, rect: Rect) {
        self.0.borrow_mut().rects.insert(id.into(), rect);
    }

    pub fn remove(&self, id: &str) {
        self.0.borrow_mut().rects.remove(&ElementId::from(id));
    }

    pub fn set_scroll(&self, y: f64) {
        self.0.borrow_mut().scroll = y;
    }

    pub fn translation(&self, id: &str) -> Option<(f64, f64)> {
        self.0.borrow().translations.get(&ElementId::from(id)).copied()
    }

    pub fn pin(&self, id: &str) -> Option<f64> {
        self.0.borrow().pins.get(&ElementId::from(id)).copied()
    }

    pub fn writes(&self) -> usize {
        self.0.borrow().writes
    }
}

impl LayoutRead for FakeDom {
    fn bounding_rect(&self, element: &ElementId) -> Option<Rect> {
        let mut state = self.0.borrow_mut();
        state.reads += 1;
        let rect = *state.rects.get(element)?;
        let (tx, ty) = state.translations.get(element).copied().unwrap_or((0.0, 0.0));
        Some(rect.translated(tx, ty - state.scroll))
    }
}

impl LayoutWrite for FakeDom {
    fn set_translate(&mut self, element: &ElementId, x: f64, y: f64) {
        let mut state = self.0.borrow_mut();
        state.writes += 1;
        state.translations.insert(element.clone(), (x, y));
    }

    fn set_pin(&mut self, element: &ElementId, top: Option<f64>) {
        let mut state = self.0.borrow_mut();
        state.writes += 1;
        state.pin_log.push((element.clone(), top));
        match top {
            Some(top) => {
                state.pins.insert(element.clone(), top);
            }
            None => {
                state.pins.remove(element);
            }
        }
    }
}

#[derive(Default)]
pub struct EngineLog {
    pub created: Vec<EngineParams>,
    /// `(instance, call)`, e.g. `"play"` or `"fire:State Machine 1:start"`.
    pub calls: Vec<(InstanceId, String)>,
    pub fail_canvases: HashSet<String>,
    pub inputs: HashMap<String, Vec<String>>,
}

#[derive(Clone)]
pub struct FakeEngines(pub Rc<RefCell<EngineLog>>);

impl Default for FakeEngines {
    fn default() -> Self {
        let mut log = EngineLog::default();
        log.inputs.insert(
            "State Machine 1".into(),
            vec!["intro".into(), "start".into()],
        );
        log.inputs.insert("Launch".into(), vec!["launch".into()]);
        Self(Rc::new(RefCell::new(log)))
    }
}

impl FakeEngines {
    pub fn fail_on(&self, canvas: &str) {
        self.0.borrow_mut().fail_canvases.insert(canvas.into());
    }

    pub fn calls(&self, id: InstanceId) -> Vec<String> {
        self.0
            .borrow()
            .calls
            .iter()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.0.borrow().calls.len()
    }

    pub fn created(&self) -> usize {
        self.0.borrow().created.len()
    }
}

struct FakeEngine {
    id: InstanceId,
    log: Rc<RefCell<EngineLog>>,
}

impl FakeEngine {
    fn record(&self, call: String) {
        self.log.borrow_mut().calls.push((self.id, call));
    }
}

impl EngineInstance for FakeEngine {
    fn resize_drawing_surface_to_canvas(&mut self) -> Result<(), String> {
        self.record("resize".into());
        Ok(())
    }

    fn state_machine_inputs(&self, state_machine: &str) -> Result<Vec<String>, String> {
        self.log
            .borrow()
            .inputs
            .get(state_machine)
            .cloned()
            .ok_or_else(|| format!("no state machine '{state_machine}'"))
    }

    fn fire_input(&mut self, state_machine: &str, input: &str) -> Result<(), String> {
        self.record(format!("fire:{state_machine}:{input}"));
        Ok(())
    }

    fn play(&mut self) {
        self.record("play".into());
    }

    fn pause(&mut self) {
        self.record("pause".into());
    }

    fn stop(&mut self) {
        self.record("stop".into());
    }

    fn destroy(&mut self) {
        self.record("destroy".into());
    }
}

impl EngineFactory for FakeEngines {
    fn create(&mut self, params: &EngineParams) -> Result<Box<dyn EngineInstance>, String> {
        if self
            .0
            .borrow()
            .fail_canvases
            .contains(params.canvas.as_str())
        {
            return Err(format!("cannot bind canvas '{}'", params.canvas));
        }
        self.0.borrow_mut().created.push(params.clone());
        Ok(Box::new(FakeEngine {
            id: params.instance,
            log: self.0.clone(),
        }))
    }
}

/// A stage wired to a fake DOM and engine, plus the page elements the tests use.
pub struct Page {
    pub stage: Stage,
    pub dom: FakeDom,
    pub engines: FakeEngines,
}

impl Page {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let dom = FakeDom::new();
        dom.insert("hero-canvas", Rect::new(0.0, 1500.0, 1200.0, 600.0));
        dom.insert("card_01", Rect::new(0.0, 2400.0, 380.0, 300.0));
        dom.insert("card_02", Rect::new(400.0, 2400.0, 380.0, 300.0));
        dom.insert("card_03", Rect::new(800.0, 2400.0, 380.0, 300.0));
        dom.insert("rocket-canvas", Rect::new(0.0, 2000.0, 600.0, 400.0));
        dom.insert("lazy", Rect::new(0.0, 3000.0, 100.0, 100.0));
        dom.insert("block", Rect::new(0.0, 0.0, 1200.0, 200.0));
        let engines = FakeEngines::default();
        let viewport = Viewport::new(WIDTH, HEIGHT).with_document_height(DOCUMENT_HEIGHT);
        let stage = Stage::new(
            config,
            Box::new(dom.clone()),
            Box::new(engines.clone()),
            viewport,
        );
        Self {
            stage,
            dom,
            engines,
        }
    }

    pub fn scroll(&mut self, y: f64, now: f64) {
        self.dom.set_scroll(y);
        self.stage.scroll(y, now);
    }

    pub fn resize(&mut self, width: f64, now: f64) {
        self.stage.resize(width, HEIGHT, DOCUMENT_HEIGHT, now);
    }

    pub fn register(&mut self, descriptor: AnimationSetDescriptor) {
        self.stage
            .register_set(descriptor)
            .expect("descriptor registers");
    }

    pub fn instantiate(&mut self, set_id: &str) -> Vec<InstanceId> {
        self.stage
            .with_page_scope(|s| s.instantiate(set_id))
            .expect("set is registered")
    }

    pub fn edges(&mut self) -> Vec<TriggerEdge> {
        self.stage
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                StageEvent::Trigger { edge, .. } => Some(edge),
                _ => None,
            })
            .collect()
    }
}

pub fn fixture_set(name: &str) -> AnimationSetDescriptor {
    let json = scrollrig_test_fixtures::animation_sets::json(name).expect("fixture exists");
    AnimationSetDescriptor::from_json(&json).expect("fixture parses")
}
