mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{fixture_set, Page};
use scrollrig_core::{ElementId, InstanceId, Margin, RadialLayout, Rect, RuleState};

/// Desktop rule that creates one of everything.
fn desktop_page() -> (Page, scrollrig_core::ContextId, Rc<Cell<Option<InstanceId>>>, Rc<Cell<u32>>) {
    let mut page = Page::new();
    page.dom.insert("logos", Rect::new(0.0, 3500.0, 800.0, 600.0));
    page.dom.insert("logo-a", Rect::new(0.0, 3500.0, 100.0, 100.0));
    page.register(fixture_set("home-hero"));

    let hero = Rc::new(Cell::new(None));
    let timer_runs = Rc::new(Cell::new(0));
    let ctx = page.stage.context("home");
    let hero_slot = hero.clone();
    let runs = timer_runs.clone();
    page.stage
        .add_breakpoint_rule(ctx, "desktop", move |s| {
            let handles = s.instantiate("home-hero")?;
            hero_slot.set(handles.first().copied());
            s.radial_layout(RadialLayout::new("logos", vec![ElementId::from("logo-a")]))?;
            s.defer_until_near("lazy", None, |s| {
                let _ = s.instantiate("home-hero");
            });
            let runs = runs.clone();
            s.debounce("settle", 500.0, move |_| runs.set(runs.get() + 1));
            Ok(None)
        })
        .unwrap();
    page.stage.start(0.0);
    (page, ctx, hero, timer_runs)
}

#[test]
fn nothing_created_by_a_rule_survives_its_teardown() {
    let (mut page, ctx, hero, timer_runs) = desktop_page();
    let hero = hero.get().unwrap();
    assert_eq!(page.stage.registry().len(), 1);
    assert_eq!(page.stage.triggers().len(), 1);
    assert_eq!(page.stage.armed_gates(), 1);
    assert_eq!(page.stage.layouts().ids().len(), 1);

    page.resize(700.0, 100.0);
    assert_eq!(page.stage.rule_state(ctx, "desktop"), Some(RuleState::Inactive));
    assert!(page.stage.registry().is_empty());
    assert!(page.stage.triggers().is_empty());
    assert_eq!(page.stage.armed_gates(), 0);
    assert!(page.stage.layouts().ids().is_empty());
    assert_eq!(page.engines.calls(hero), ["destroy"]);

    let writes = page.dom.writes();
    let calls = page.engines.total_calls();
    let created = page.engines.created();
    for (i, y) in [0.0, 1200.0, 2600.0, 3400.0, 200.0].into_iter().enumerate() {
        let t = 200.0 + i as f64 * 50.0;
        page.scroll(y, t);
        page.resize(650.0 + i as f64, t + 1.0);
        page.stage.frame(t + 2.0);
    }
    page.stage.engine_loaded(hero, 600.0);
    page.stage.frame(5000.0);

    assert_eq!(page.engines.total_calls(), calls);
    assert_eq!(page.engines.created(), created);
    assert_eq!(page.dom.writes(), writes);
    assert_eq!(timer_runs.get(), 0);
}

#[test]
fn page_teardown_releases_everything_and_ignores_later_events() {
    let (mut page, ctx, hero, _) = desktop_page();
    let hero = hero.get().unwrap();
    page.stage.with_page_scope(|s| {
        s.defer_until_near("lazy", Some(Margin::none()), |_| {});
    });
    page.stage.teardown();

    assert!(page.stage.is_torn_down());
    assert_eq!(page.stage.rule_state(ctx, "desktop"), Some(RuleState::Destroyed));
    assert!(page.stage.registry().is_empty());
    assert_eq!(page.stage.armed_gates(), 0);
    assert_eq!(page.stage.pending_timers(), 0);
    assert_eq!(page.engines.calls(hero), ["destroy"]);

    let calls = page.engines.total_calls();
    page.resize(1300.0, 10.0);
    page.scroll(2000.0, 20.0);
    page.stage.frame(10_000.0);
    page.stage.start(10_001.0);
    assert_eq!(page.engines.total_calls(), calls);
    assert_eq!(page.stage.armed_gates(), 0);
}

#[test]
fn scope_timers_fire_once_while_the_rule_lives() {
    let (mut page, _, _, timer_runs) = desktop_page();
    page.stage.frame(499.0);
    assert_eq!(timer_runs.get(), 0);
    page.stage.frame(500.0);
    page.stage.frame(2000.0);
    assert_eq!(timer_runs.get(), 1);
}

#[test]
fn proximity_activation_waits_for_the_next_frame_and_runs_once() {
    let mut page = Page::new();
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    page.stage.with_page_scope(|s| {
        s.defer_until_near("lazy", None, move |_| counter.set(counter.get() + 1));
    });
    page.stage.start(0.0);
    page.stage.frame(16.0);
    assert_eq!(runs.get(), 0);

    // "lazy" starts at 3000; the viewport bottom plus the 200px margin reaches it at 2000.
    page.scroll(1900.0, 32.0);
    page.stage.frame(48.0);
    assert_eq!(runs.get(), 0);

    page.scroll(2050.0, 64.0);
    assert_eq!(runs.get(), 0, "never inside the scroll handler");
    page.stage.frame(80.0);
    assert_eq!(runs.get(), 1);

    page.scroll(3000.0, 96.0);
    page.scroll(2100.0, 112.0);
    page.stage.frame(128.0);
    assert_eq!(runs.get(), 1);
    assert_eq!(page.stage.armed_gates(), 0);
}

#[test]
fn deferred_activation_dies_with_its_scope() {
    let mut page = Page::new();
    let runs = Rc::new(Cell::new(0));
    let ctx = page.stage.context("home");
    let counter = runs.clone();
    page.stage
        .add_breakpoint_rule(ctx, "desktop", move |s| {
            let counter = counter.clone();
            s.defer_until_near("lazy", None, move |_| counter.set(counter.get() + 1));
            Ok(None)
        })
        .unwrap();
    page.stage.start(0.0);

    // Gate fires during the scroll, then the rule goes away before the next frame.
    page.scroll(2500.0, 16.0);
    page.resize(600.0, 20.0);
    page.stage.frame(32.0);
    assert_eq!(runs.get(), 0);

    // Element removed before it ever came close: the gate is dropped silently.
    page.scroll(0.0, 36.0);
    page.resize(1200.0, 40.0);
    assert_eq!(page.stage.armed_gates(), 1);
    page.dom.remove("lazy");
    page.stage.frame(60.0);
    assert_eq!(page.stage.armed_gates(), 0);
    page.dom.insert("lazy", Rect::new(0.0, 3000.0, 100.0, 100.0));
    page.scroll(2500.0, 70.0);
    page.stage.frame(80.0);
    assert_eq!(runs.get(), 0);
}
