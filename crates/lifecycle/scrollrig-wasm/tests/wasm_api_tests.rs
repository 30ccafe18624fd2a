#![cfg(target_arch = "wasm32")]
use js_sys::{Array, Function, Reflect};
use scrollrig_wasm::{abi_version, ScrollrigStage};
use serde::Serialize;
use serde_json::json;
use serde_wasm_bindgen as swb;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

/// Fake DOM with a single hero canvas 1500px down the page.
fn dom() -> JsValue {
    Function::new_no_args(
        r#"
        const rects = { "hero-canvas": { x: 0, y: 1500, width: 1200, height: 600 } };
        return {
          scroll: 0,
          writes: [],
          boundingRect(id) {
            const r = rects[id];
            return r ? { x: r.x, y: r.y - this.scroll, width: r.width, height: r.height } : null;
          },
          setTranslate(id, x, y) { this.writes.push(["translate", id, x, y]); },
          setPin(id, top) { this.writes.push(["pin", id, top]); },
        };
        "#,
    )
    .call0(&JsValue::UNDEFINED)
    .unwrap()
}

/// Engine factory that records every call in `calls`.
fn engines() -> JsValue {
    Function::new_no_args(
        r#"
        const calls = [];
        return {
          calls,
          create(params) {
            calls.push("create:" + params.canvas);
            return {
              resizeDrawingSurfaceToCanvas() { calls.push("resize"); },
              stateMachineInputs(name) { return name === "State Machine 1" ? ["intro"] : null; },
              fireInput(sm, input) { calls.push("fire:" + input); },
              play() { calls.push("play"); },
              pause() { calls.push("pause"); },
              stop() { calls.push("stop"); },
              destroy() { calls.push("destroy"); },
            };
          },
        };
        "#,
    )
    .call0(&JsValue::UNDEFINED)
    .unwrap()
}

fn calls(engines: &JsValue) -> Vec<String> {
    let calls = Reflect::get(engines, &JsValue::from_str("calls")).unwrap();
    Array::from(&calls)
        .iter()
        .filter_map(|v| v.as_string())
        .collect()
}

fn hero_set() -> JsValue {
    let set = json!({
        "id": "home-hero",
        "source": "/rive/home_hero.riv",
        "defaultStateMachine": "State Machine 1",
        "defaultTrigger": "intro",
        "defaultViewport": {},
        "targets": [{ "elementId": "hero-canvas" }]
    });
    set.serialize(&swb::Serializer::json_compatible()).unwrap()
}

#[wasm_bindgen_test]
fn abi_is_1() {
    assert_eq!(abi_version(), 1);
}

#[wasm_bindgen_test]
fn construct_with_defaults() {
    let stage = ScrollrigStage::new(JsValue::UNDEFINED, dom(), engines(), 1200.0, 800.0, 6000.0);
    assert!(stage.is_ok());
}

#[wasm_bindgen_test]
fn rejects_missing_host_objects() {
    let stage = ScrollrigStage::new(JsValue::NULL, JsValue::NULL, engines(), 1200.0, 800.0, 6000.0);
    assert!(stage.is_err());
}

#[wasm_bindgen_test]
fn breakpoint_creates_and_destroys_instances() {
    let engines = engines();
    let mut stage = ScrollrigStage::new(JsValue::NULL, dom(), engines.clone(), 1200.0, 800.0, 6000.0)
        .unwrap();
    stage.register_set(hero_set()).unwrap();
    stage
        .add_breakpoint(
            "home".into(),
            "desktop".into(),
            "(min-width: 992px)".into(),
            vec!["home-hero".into()],
        )
        .unwrap();
    stage.start(0.0);
    assert_eq!(calls(&engines), ["create:hero-canvas"]);

    stage.engine_loaded(0, 20.0);
    assert_eq!(calls(&engines), ["create:hero-canvas"]);
    stage.frame(300.0);
    assert_eq!(calls(&engines), ["create:hero-canvas", "resize", "fire:intro"]);

    stage.resize(600.0, 800.0, 6000.0, 320.0);
    assert_eq!(calls(&engines).last().map(String::as_str), Some("destroy"));

    let events = Array::from(&stage.take_events().unwrap());
    let kinds: Vec<String> = events
        .iter()
        .map(|e| Reflect::get(&e, &JsValue::from_str("type")).unwrap().as_string().unwrap())
        .collect();
    assert_eq!(kinds, [
            "ruleActivated",
            "instanceReady",
            "canvasResized",
            "ruleDeactivated"
        ]);
}

#[wasm_bindgen_test]
fn duplicate_set_is_rejected() {
    let mut stage = ScrollrigStage::new(JsValue::NULL, dom(), engines(), 1200.0, 800.0, 6000.0)
        .unwrap();
    stage.register_set(hero_set()).unwrap();
    assert!(stage.register_set(hero_set()).is_err());
}

#[wasm_bindgen_test]
fn teardown_ignores_later_events() {
    let engines = engines();
    let mut stage = ScrollrigStage::new(JsValue::NULL, dom(), engines.clone(), 1200.0, 800.0, 6000.0)
        .unwrap();
    stage.register_set(hero_set()).unwrap();
    stage
        .add_breakpoint("home".into(), "all".into(), "all".into(), vec!["home-hero".into()])
        .unwrap();
    stage.start(0.0);
    stage.teardown();
    let before = calls(&engines).len();
    stage.scroll(2000.0, 10.0);
    stage.frame(1000.0);
    assert_eq!(calls(&engines).len(), before);
}
