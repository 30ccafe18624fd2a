use std::collections::HashMap;

use js_sys::{Array, Function, Reflect, JSON};
use serde::Serialize;
use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use scrollrig_core::{
    AnimationSetDescriptor, Config, ContextId, Counters, Diagnostic, ElementId, EngineFactory,
    EngineInstance, EngineParams, InstanceId, LayoutRead, LayoutWrite, Rect, Stage, Viewport,
    ABI_VERSION,
};

fn jsvalue_is_undefined_or_null(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

fn describe(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            err.dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{err:?}"))
}

/// Call `target[name](...args)` with `this` bound to `target`.
fn call_method(target: &JsValue, name: &str, args: &Array) -> Result<JsValue, String> {
    let f = Reflect::get(target, &JsValue::from_str(name)).map_err(|e| describe(&e))?;
    let f: Function = f
        .dyn_into()
        .map_err(|_| format!("host object has no method '{name}'"))?;
    f.apply(target, args).map_err(|e| describe(&e))
}

/// DOM seam backed by a JS object:
/// `{ boundingRect(id) -> {x, y, width, height} | null, setTranslate(id, x, y), setPin(id, top | null) }`.
struct JsDom {
    target: JsValue,
}

impl LayoutRead for JsDom {
    fn bounding_rect(&self, element: &ElementId) -> Option<Rect> {
        let args = Array::of1(&JsValue::from_str(element.as_str()));
        match call_method(&self.target, "boundingRect", &args) {
            Ok(val) if jsvalue_is_undefined_or_null(&val) => None,
            Ok(val) => swb::from_value(val).ok(),
            Err(err) => {
                log::warn!("boundingRect('{element}') failed: {err}");
                None
            }
        }
    }
}

impl LayoutWrite for JsDom {
    fn set_translate(&mut self, element: &ElementId, x: f64, y: f64) {
        let args = Array::of3(&JsValue::from_str(element.as_str()), &x.into(), &y.into());
        if let Err(err) = call_method(&self.target, "setTranslate", &args) {
            log::warn!("setTranslate('{element}') failed: {err}");
        }
    }

    fn set_pin(&mut self, element: &ElementId, top: Option<f64>) {
        let top = top.map(JsValue::from_f64).unwrap_or(JsValue::NULL);
        let args = Array::of2(&JsValue::from_str(element.as_str()), &top);
        if let Err(err) = call_method(&self.target, "setPin", &args) {
            log::warn!("setPin('{element}') failed: {err}");
        }
    }
}

/// Engine factory backed by a JS object whose `create(params)` returns an engine object
/// (or throws). Engine objects expose `resizeDrawingSurfaceToCanvas()`,
/// `stateMachineInputs(name) -> string[]`, `fireInput(name, input)`, `play()`, `pause()`,
/// `stop()` and `destroy()`.
struct JsEngines {
    target: JsValue,
}

struct JsEngine {
    target: JsValue,
}

impl JsEngine {
    fn call0(&self, name: &str) {
        if let Err(err) = call_method(&self.target, name, &Array::new()) {
            log::warn!("engine {name}() failed: {err}");
        }
    }
}

impl EngineInstance for JsEngine {
    fn resize_drawing_surface_to_canvas(&mut self) -> Result<(), String> {
        call_method(&self.target, "resizeDrawingSurfaceToCanvas", &Array::new()).map(|_| ())
    }

    fn state_machine_inputs(&self, state_machine: &str) -> Result<Vec<String>, String> {
        let args = Array::of1(&JsValue::from_str(state_machine));
        let val = call_method(&self.target, "stateMachineInputs", &args)?;
        if jsvalue_is_undefined_or_null(&val) {
            return Err(format!("no state machine '{state_machine}'"));
        }
        swb::from_value(val).map_err(|e| e.to_string())
    }

    fn fire_input(&mut self, state_machine: &str, input: &str) -> Result<(), String> {
        let args = Array::of2(&JsValue::from_str(state_machine), &JsValue::from_str(input));
        call_method(&self.target, "fireInput", &args).map(|_| ())
    }

    fn play(&mut self) {
        self.call0("play");
    }

    fn pause(&mut self) {
        self.call0("pause");
    }

    fn stop(&mut self) {
        self.call0("stop");
    }

    fn destroy(&mut self) {
        self.call0("destroy");
    }
}

impl EngineFactory for JsEngines {
    fn create(&mut self, params: &EngineParams) -> Result<Box<dyn EngineInstance>, String> {
        let params = swb::to_value(params).map_err(|e| e.to_string())?;
        let engine = call_method(&self.target, "create", &Array::of1(&params))?;
        if jsvalue_is_undefined_or_null(&engine) {
            return Err("create returned no engine".to_string());
        }
        Ok(Box::new(JsEngine { target: engine }))
    }
}

#[derive(Serialize)]
struct DiagnosticsOut<'a> {
    entries: &'a [Diagnostic],
    counters: Counters,
}

fn to_js_error(err: scrollrig_core::LifecycleError) -> JsError {
    JsError::new(&err.to_string())
}

#[wasm_bindgen]
pub struct ScrollrigStage {
    core: Stage,
    /// Breakpoint contexts created from JS, by name.
    contexts: HashMap<String, ContextId>,
}

#[wasm_bindgen]
impl ScrollrigStage {
    /// Create a stage for one page. Pass a JSON config object or undefined/null for defaults.
    /// `dom` and `engines` are the host objects described on `JsDom` and `JsEngines`.
    /// Example:
    ///   new ScrollrigStage({ resize_debounce_ms: 100 }, dom, engines, innerWidth, innerHeight, docHeight)
    #[wasm_bindgen(constructor)]
    pub fn new(
        config: JsValue,
        dom: JsValue,
        engines: JsValue,
        width: f64,
        height: f64,
        document_height: f64,
    ) -> Result<ScrollrigStage, JsError> {
        console_error_panic_hook::set_once();

        let cfg: Config = if jsvalue_is_undefined_or_null(&config) {
            Config::default()
        } else {
            swb::from_value(config).map_err(|e| JsError::new(&format!("config error: {e}")))?
        };
        if !dom.is_object() || !engines.is_object() {
            return Err(JsError::new("dom and engines must be objects"));
        }
        let viewport = Viewport::new(width, height).with_document_height(document_height);
        Ok(ScrollrigStage {
            core: Stage::new(
                cfg,
                Box::new(JsDom { target: dom }),
                Box::new(JsEngines { target: engines }),
                viewport,
            ),
            contexts: HashMap::new(),
        })
    }

    /// Register an animation set descriptor (JS object). Duplicate ids are rejected.
    #[wasm_bindgen(js_name = registerSet)]
    pub fn register_set(&mut self, descriptor: JsValue) -> Result<(), JsError> {
        if jsvalue_is_undefined_or_null(&descriptor) {
            return Err(JsError::new("registerSet: descriptor is null/undefined"));
        }
        let s = JSON::stringify(&descriptor)
            .map_err(|e| JsError::new(&format!("registerSet stringify error: {}", describe(&e))))?
            .as_string()
            .ok_or_else(|| JsError::new("registerSet: stringify produced non-string"))?;
        let descriptor = AnimationSetDescriptor::from_json(&s).map_err(to_js_error)?;
        self.core.register_set(descriptor).map_err(to_js_error)
    }

    /// Add a rule to the named context (created on first use). While `query` matches,
    /// every set in `setIds` is instantiated; the instances are destroyed when it stops
    /// matching.
    #[wasm_bindgen(js_name = addBreakpoint)]
    pub fn add_breakpoint(
        &mut self,
        context: String,
        name: String,
        query: String,
        set_ids: Vec<String>,
    ) -> Result<(), JsError> {
        let id = match self.contexts.get(&context) {
            Some(id) => *id,
            None => {
                let id = self.core.context(&context);
                self.contexts.insert(context, id);
                id
            }
        };
        self.core
            .add_rule(id, &name, &query, move |s| {
                for set_id in &set_ids {
                    s.instantiate(set_id)?;
                }
                Ok(None)
            })
            .map_err(to_js_error)
    }

    pub fn start(&mut self, now: f64) {
        self.core.start(now);
    }

    pub fn resize(&mut self, width: f64, height: f64, document_height: f64, now: f64) {
        self.core.resize(width, height, document_height, now);
    }

    #[wasm_bindgen(js_name = setPixelRatio)]
    pub fn set_pixel_ratio(&mut self, pixel_ratio: f64, now: f64) {
        self.core.set_pixel_ratio(pixel_ratio, now);
    }

    pub fn scroll(&mut self, scroll_y: f64, now: f64) {
        self.core.scroll(scroll_y, now);
    }

    pub fn frame(&mut self, now: f64) {
        self.core.frame(now);
    }

    /// Clock time at which the next pending timer is due, or undefined when none is.
    #[wasm_bindgen(js_name = nextDeadline)]
    pub fn next_deadline(&self) -> Option<f64> {
        self.core.next_deadline()
    }

    #[wasm_bindgen(js_name = engineLoaded)]
    pub fn engine_loaded(&mut self, instance: u32, now: f64) {
        self.core.engine_loaded(InstanceId(instance), now);
    }

    #[wasm_bindgen(js_name = engineLoadFailed)]
    pub fn engine_load_failed(&mut self, instance: u32, reason: String, now: f64) {
        self.core
            .engine_load_failed(InstanceId(instance), &reason, now);
    }

    /// Drain queued stage events as an array of `{ type, ... }` objects.
    #[wasm_bindgen(js_name = takeEvents)]
    pub fn take_events(&mut self) -> Result<JsValue, JsError> {
        let events = self.core.take_events();
        swb::to_value(&events).map_err(|e| JsError::new(&format!("events error: {e}")))
    }

    /// Recorded diagnostics and counters.
    pub fn diagnostics(&self) -> Result<JsValue, JsError> {
        let diag = self.core.diagnostics();
        let out = DiagnosticsOut {
            entries: diag.entries(),
            counters: diag.counters,
        };
        swb::to_value(&out).map_err(|e| JsError::new(&format!("diagnostics error: {e}")))
    }

    pub fn teardown(&mut self) {
        self.core.teardown();
    }
}

/// Numeric ABI version for compatibility checks at init.
#[wasm_bindgen]
pub fn abi_version() -> u32 {
    ABI_VERSION
}
