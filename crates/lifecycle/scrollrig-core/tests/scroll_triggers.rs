mod common;

use common::{fixture_set, Page};
use scrollrig_core::{
    AnimationSetDescriptor, Phase, StageEvent, TargetDescriptor, TriggerEdge, TriggerSpec,
    ViewportTriggerBinding,
};

fn hero_page() -> (Page, scrollrig_core::InstanceId) {
    let mut page = Page::new();
    page.register(fixture_set("home-hero"));
    let handles = page.instantiate("home-hero");
    assert_eq!(handles.len(), 1);
    (page, handles[0])
}

#[test]
fn forward_then_backward_traversal_fires_four_edges_in_order() {
    let (mut page, hero) = hero_page();
    let mut t = 0.0;
    for step in 0..=30 {
        t += 16.0;
        page.scroll(f64::from(step) * 100.0, t);
    }
    for step in (0..=30).rev() {
        t += 16.0;
        page.scroll(f64::from(step) * 100.0, t);
    }
    assert_eq!(
        page.edges(),
        vec![
            TriggerEdge::Enter,
            TriggerEdge::Leave,
            TriggerEdge::EnterBack,
            TriggerEdge::LeaveBack
        ]
    );
    assert_eq!(page.engines.calls(hero), ["play", "pause", "play", "pause"]);
}

#[test]
fn fast_fling_past_the_interval_still_orders_edges() {
    let (mut page, hero) = hero_page();
    page.scroll(5000.0, 16.0);
    page.scroll(0.0, 32.0);
    assert_eq!(
        page.edges(),
        vec![
            TriggerEdge::Enter,
            TriggerEdge::Leave,
            TriggerEdge::EnterBack,
            TriggerEdge::LeaveBack
        ]
    );
    assert_eq!(page.engines.calls(hero), ["play", "pause", "play", "pause"]);
}

#[test]
fn scrub_progress_is_half_way_at_500px() {
    let mut page = Page::new();
    let trigger = page
        .stage
        .with_page_scope(|s| {
            s.create_trigger(ViewportTriggerBinding::new("block", "0px", "1000px")?.scrub(true))
        })
        .unwrap();
    page.scroll(500.0, 16.0);
    assert_eq!(page.stage.triggers().progress(trigger), Some(0.5));
    let progress: Vec<f64> = page
        .stage
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            StageEvent::Progress { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, [0.5]);
}

#[test]
fn released_trigger_goes_silent_immediately() {
    let (mut page, hero) = hero_page();
    page.scroll(1000.0, 16.0);
    assert_eq!(page.edges(), [TriggerEdge::Enter]);
    let trigger = page.stage.registry().get(hero).unwrap().viewport_trigger.unwrap();
    page.stage.with_page_scope(|s| {
        s.release_trigger(trigger);
        s.release_trigger(trigger);
    });
    page.scroll(3000.0, 32.0);
    page.scroll(0.0, 48.0);
    assert!(page.edges().is_empty());
    assert_eq!(page.engines.calls(hero), ["play"]);
}

#[test]
fn trigger_created_inside_its_interval_enters_right_away() {
    let mut page = Page::new();
    page.scroll(1000.0, 0.0);
    page.register(fixture_set("home-hero"));
    let hero = page.instantiate("home-hero")[0];
    assert_eq!(page.edges(), [TriggerEdge::Enter]);
    assert_eq!(page.engines.calls(hero), ["play"]);
    let trigger = page.stage.registry().get(hero).unwrap().viewport_trigger.unwrap();
    assert_eq!(page.stage.triggers().phase(trigger), Some(Phase::Inside));
}

#[test]
fn pinned_scrubbed_rocket_pins_fires_and_unpins_on_teardown() {
    let mut page = Page::new();
    page.register(fixture_set("rocket"));
    let rocket = page.instantiate("rocket")[0];

    page.scroll(2500.0, 16.0);
    assert_eq!(page.dom.pin("rocket-canvas"), Some(0.0));
    assert_eq!(page.engines.calls(rocket), ["fire:Launch:launch"]);
    let events = page.stage.take_events();
    assert!(events.contains(&StageEvent::Pinned {
        element: "rocket-canvas".into(),
        top: 0.0
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        StageEvent::Progress { progress, .. } if (*progress - 0.5).abs() < 1e-9
    )));

    page.stage.teardown();
    assert_eq!(page.dom.pin("rocket-canvas"), None);
    assert_eq!(
        page.engines.calls(rocket),
        ["fire:Launch:launch", "destroy"]
    );
}

#[test]
fn leave_back_action_and_missing_input_warning() {
    let mut page = Page::new();
    page.register(fixture_set("rocket"));
    let rocket = page.instantiate("rocket")[0];
    page.scroll(2500.0, 16.0);
    page.scroll(100.0, 32.0);
    assert_eq!(page.engines.calls(rocket), ["fire:Launch:launch", "stop"]);
    assert_eq!(page.dom.pin("rocket-canvas"), None);

    // An edge firing an input the state machine does not have is a warning only.
    let mut set = AnimationSetDescriptor::new("odd", "/rive/odd.riv")
        .with_target(TargetDescriptor::new("hero-canvas"));
    set.default_state_machine = Some("Launch".into());
    set.default_viewport = Some(TriggerSpec {
        actions: Some(scrollrig_core::TriggerActions {
            on_enter: scrollrig_core::PlaybackAction::Fire("nope".into()),
            ..Default::default()
        }),
        ..TriggerSpec::default()
    });
    page.register(set);
    let odd = page.instantiate("odd")[0];
    page.scroll(1000.0, 48.0);
    assert_eq!(page.stage.diagnostics().count("trigger"), 1);
    assert!(page.stage.registry().get(odd).unwrap().is_live());
}
