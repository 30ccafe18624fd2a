//! Viewport triggers: scroll intervals bound to an element, with enter/leave edges,
//! optional scrub progress and optional pinning.
//!
//! Edge table (direction aware):
//!
//! | from   | to     | edges                    |
//! |--------|--------|--------------------------|
//! | before | inside | `Enter`                  |
//! | inside | after  | `Leave`                  |
//! | after  | inside | `EnterBack`              |
//! | inside | before | `LeaveBack`              |
//! | before | after  | `Enter`, `Leave`         |
//! | after  | before | `EnterBack`, `LeaveBack` |
//!
//! Pin precedence: an element is held by at most one trigger. Among the pinned triggers
//! currently inside their interval, the one whose interval starts first in the document
//! holds it (ties go to the older trigger). Within one update every unpin is emitted
//! before any pin.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use hashbrown::HashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{ElementId, InstanceId, TriggerId};
use crate::layout::{LayoutRead, Rect, Viewport};
use crate::{LifecycleError, Result};

/// Position inside an element or the viewport.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Anchor {
    Top,
    Center,
    Bottom,
    Percent(f64),
    Pixels(f64),
}

impl Anchor {
    fn resolve(&self, extent: f64) -> f64 {
        match *self {
            Anchor::Top => 0.0,
            Anchor::Center => extent / 2.0,
            Anchor::Bottom => extent,
            Anchor::Percent(p) => extent * p / 100.0,
            Anchor::Pixels(px) => px,
        }
    }
}

/// Signed nudge after an anchor (`bottom-=20%`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Offset {
    Pixels(f64),
    Percent(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub anchor: Anchor,
    pub offset: Option<Offset>,
}

impl Edge {
    fn top() -> Self {
        Self {
            anchor: Anchor::Top,
            offset: None,
        }
    }

    fn resolve(&self, extent: f64) -> f64 {
        let nudge = match self.offset {
            Some(Offset::Pixels(px)) => px,
            Some(Offset::Percent(p)) => extent * p / 100.0,
            None => 0.0,
        };
        self.anchor.resolve(extent) + nudge
    }
}

#[derive(Clone, Debug, PartialEq)]
enum BoundaryKind {
    /// `"<element edge> <viewport edge>"`, optionally clamped to the scrollable range.
    Pair {
        element: Edge,
        viewport: Edge,
        clamp: bool,
    },
    /// `"+=N"`: N pixels after the start boundary (or after the element top for a start).
    Relative(f64),
}

/// A scroll boundary expression such as `"top bottom"`, `"center center"`,
/// `"top bottom-=20%"`, `"clamp(top top)"`, `"0px"` or `"+=500"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoundaryExpr {
    source: String,
    kind: BoundaryKind,
}

impl BoundaryExpr {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if let Some(rest) = trimmed.strip_prefix("+=") {
            let px = parse_px(rest, input)?;
            return Ok(Self {
                source: trimmed.to_string(),
                kind: BoundaryKind::Relative(px),
            });
        }
        if let Some(rest) = trimmed.strip_prefix("-=") {
            let px = parse_px(rest, input)?;
            return Ok(Self {
                source: trimmed.to_string(),
                kind: BoundaryKind::Relative(-px),
            });
        }
        let (body, clamp) = match trimmed
            .strip_prefix("clamp(")
            .and_then(|r| r.strip_suffix(')'))
        {
            Some(inner) => (inner.trim(), true),
            None => (trimmed, false),
        };
        let tokens: Vec<&str> = body.split_whitespace().collect();
        let (element, viewport) = match tokens.as_slice() {
            [element] => (parse_edge(element, input)?, Edge::top()),
            [element, viewport] => (parse_edge(element, input)?, parse_edge(viewport, input)?),
            _ => {
                return Err(LifecycleError::parse(
                    "boundary",
                    input,
                    "expected '<element> <viewport>'",
                ))
            }
        };
        Ok(Self {
            source: trimmed.to_string(),
            kind: BoundaryKind::Pair {
                element,
                viewport,
                clamp,
            },
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Absolute scroll position for this boundary. `element` is in document coordinates;
    /// `start` is the already-resolved start boundary when resolving an end.
    pub fn resolve(&self, element: &Rect, viewport: &Viewport, start: Option<f64>) -> f64 {
        match &self.kind {
            BoundaryKind::Pair {
                element: el,
                viewport: vp,
                clamp,
            } => {
                let position =
                    element.top() + el.resolve(element.height) - vp.resolve(viewport.height);
                if *clamp {
                    position.clamp(0.0, viewport.max_scroll())
                } else {
                    position
                }
            }
            BoundaryKind::Relative(px) => start.unwrap_or(element.top()) + px,
        }
    }
}

fn parse_number(text: &str, input: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|_| LifecycleError::parse("boundary", input, format!("bad number '{text}'")))
}

fn parse_px(text: &str, input: &str) -> Result<f64> {
    parse_number(text.strip_suffix("px").unwrap_or(text), input)
}

fn parse_edge(token: &str, input: &str) -> Result<Edge> {
    let split = token.find("+=").or_else(|| token.find("-="));
    let (base, offset) = match split {
        Some(idx) => {
            let sign = if token[idx..].starts_with('-') { -1.0 } else { 1.0 };
            let amount = &token[idx + 2..];
            let offset = match amount.strip_suffix('%') {
                Some(p) => Offset::Percent(sign * parse_number(p, input)?),
                None => Offset::Pixels(sign * parse_px(amount, input)?),
            };
            (&token[..idx], Some(offset))
        }
        None => (token, None),
    };
    let anchor = match base {
        "top" => Anchor::Top,
        "center" => Anchor::Center,
        "bottom" => Anchor::Bottom,
        "" => {
            return Err(LifecycleError::parse(
                "boundary",
                input,
                "offset without an anchor",
            ))
        }
        other => match other.strip_suffix('%') {
            Some(p) => Anchor::Percent(parse_number(p, input)?),
            None => Anchor::Pixels(parse_px(other, input)?),
        },
    };
    Ok(Edge { anchor, offset })
}

impl FromStr for BoundaryExpr {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BoundaryExpr {
    type Error = LifecycleError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<BoundaryExpr> for String {
    fn from(value: BoundaryExpr) -> Self {
        value.source
    }
}

impl fmt::Display for BoundaryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// What a trigger edge does to its bound instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackAction {
    #[default]
    None,
    Play,
    Pause,
    Stop,
    /// Fire the named state-machine input on the instance's state machine.
    Fire(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerActions {
    pub on_enter: PlaybackAction,
    pub on_leave: PlaybackAction,
    pub on_enter_back: PlaybackAction,
    pub on_leave_back: PlaybackAction,
}

impl TriggerActions {
    /// Play while inside the interval, pause outside it.
    pub fn play_pause() -> Self {
        Self {
            on_enter: PlaybackAction::Play,
            on_leave: PlaybackAction::Pause,
            on_enter_back: PlaybackAction::Play,
            on_leave_back: PlaybackAction::Pause,
        }
    }

    pub fn for_edge(&self, edge: TriggerEdge) -> &PlaybackAction {
        match edge {
            TriggerEdge::Enter => &self.on_enter,
            TriggerEdge::Leave => &self.on_leave,
            TriggerEdge::EnterBack => &self.on_enter_back,
            TriggerEdge::LeaveBack => &self.on_leave_back,
        }
    }
}

/// Declarative trigger: interval, per-edge actions, optional target instance, modes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportTriggerBinding {
    pub element: ElementId,
    /// Resolve the end boundary against this element instead (`endTrigger`).
    #[serde(default)]
    pub end_element: Option<ElementId>,
    pub start: BoundaryExpr,
    pub end: BoundaryExpr,
    #[serde(default)]
    pub actions: TriggerActions,
    #[serde(default)]
    pub target: Option<InstanceId>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub scrub: bool,
}

impl ViewportTriggerBinding {
    pub fn new(element: impl Into<ElementId>, start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            element: element.into(),
            end_element: None,
            start: BoundaryExpr::parse(start)?,
            end: BoundaryExpr::parse(end)?,
            actions: TriggerActions::default(),
            target: None,
            pinned: false,
            scrub: false,
        })
    }

    pub fn with_actions(mut self, actions: TriggerActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_target(mut self, target: InstanceId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_end_element(mut self, element: impl Into<ElementId>) -> Self {
        self.end_element = Some(element.into());
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn scrub(mut self, scrub: bool) -> Self {
        self.scrub = scrub;
        self
    }
}

/// Where the scroll position sits relative to a trigger's interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Before,
    Inside,
    After,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerEdge {
    Enter,
    Leave,
    EnterBack,
    LeaveBack,
}

impl TriggerEdge {
    fn is_forward(self) -> bool {
        matches!(self, TriggerEdge::Enter | TriggerEdge::Leave)
    }
}

/// Output of a trigger update, in the order it must be applied.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TriggerSignal {
    Edge {
        trigger: TriggerId,
        edge: TriggerEdge,
        at: f64,
    },
    Progress {
        trigger: TriggerId,
        progress: f64,
    },
    Pin {
        trigger: TriggerId,
        element: ElementId,
        top: f64,
    },
    Unpin {
        trigger: TriggerId,
        element: ElementId,
    },
}

#[derive(Debug)]
struct Live {
    binding: ViewportTriggerBinding,
    start: f64,
    end: f64,
    /// Viewport top the element is held at while pinned.
    pin_top: f64,
    phase: Phase,
    progress: f64,
    pinning: bool,
    order: u64,
}

fn phase_of(scroll: f64, start: f64, end: f64) -> Phase {
    if scroll < start {
        Phase::Before
    } else if scroll > end {
        Phase::After
    } else {
        Phase::Inside
    }
}

fn progress_of(scroll: f64, start: f64, end: f64) -> f64 {
    let span = end - start;
    if span <= 0.0 {
        return if scroll >= start { 1.0 } else { 0.0 };
    }
    ((scroll - start) / span).clamp(0.0, 1.0)
}

/// All live triggers of a stage.
#[derive(Debug, Default)]
pub struct ViewportTriggers {
    live: IndexMap<TriggerId, Live>,
    pins: HashMap<ElementId, TriggerId>,
    scroll: f64,
    created: u64,
}

impl ViewportTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trigger and evaluate it once at the current scroll position, so a
    /// trigger created inside its interval reports `Enter` straight away.
    pub fn create<R: LayoutRead + ?Sized>(
        &mut self,
        id: TriggerId,
        binding: ViewportTriggerBinding,
        dom: &R,
        viewport: &Viewport,
    ) -> Result<Vec<TriggerSignal>> {
        let (start, end, pin_top) = resolve_bounds(&binding, dom, viewport)?;
        self.created += 1;
        self.scroll = viewport.scroll_y;
        self.live.insert(
            id,
            Live {
                binding,
                start,
                end,
                pin_top,
                phase: Phase::Before,
                progress: 0.0,
                pinning: false,
                order: self.created,
            },
        );
        Ok(self.step(viewport.scroll_y, Some(id)))
    }

    /// Advance every trigger to `scroll`.
    pub fn update(&mut self, scroll: f64) -> Vec<TriggerSignal> {
        self.step(scroll, None)
    }

    /// Re-resolve boundaries after layout changed, then re-evaluate at the current scroll.
    /// Pinned-and-holding triggers keep their bounds; their element is out of flow.
    pub fn refresh<R: LayoutRead + ?Sized>(
        &mut self,
        dom: &R,
        viewport: &Viewport,
    ) -> Vec<TriggerSignal> {
        for (id, live) in self.live.iter_mut() {
            if live.pinning {
                continue;
            }
            match resolve_bounds(&live.binding, dom, viewport) {
                Ok((start, end, pin_top)) => {
                    live.start = start;
                    live.end = end;
                    live.pin_top = pin_top;
                }
                Err(err) => log::debug!("keeping old bounds for trigger {id:?}: {err}"),
            }
        }
        self.step(viewport.scroll_y, None)
    }

    /// Stop the trigger. Idempotent; a held pin is released immediately and may pass to
    /// the next trigger in line for the same element.
    pub fn release(&mut self, id: TriggerId) -> Vec<TriggerSignal> {
        let Some(live) = self.live.shift_remove(&id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if live.pinning {
            self.pins.remove(&live.binding.element);
            out.push(TriggerSignal::Unpin {
                trigger: id,
                element: live.binding.element,
            });
            out.extend(self.settle_pins());
        }
        out
    }

    pub fn release_all(&mut self) -> Vec<TriggerSignal> {
        let ids: Vec<TriggerId> = self.live.keys().copied().collect();
        ids.into_iter().flat_map(|id| self.release(id)).collect()
    }

    pub fn is_live(&self, id: TriggerId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn ids(&self) -> Vec<TriggerId> {
        self.live.keys().copied().collect()
    }

    pub fn binding(&self, id: TriggerId) -> Option<&ViewportTriggerBinding> {
        self.live.get(&id).map(|l| &l.binding)
    }

    pub fn phase(&self, id: TriggerId) -> Option<Phase> {
        self.live.get(&id).map(|l| l.phase)
    }

    /// Scroll progress through the interval, 0..1 clamped.
    pub fn progress(&self, id: TriggerId) -> Option<f64> {
        self.live.get(&id).map(|l| l.progress)
    }

    pub fn bounds(&self, id: TriggerId) -> Option<(f64, f64)> {
        self.live.get(&id).map(|l| (l.start, l.end))
    }

    pub fn pinned_by(&self, element: &ElementId) -> Option<TriggerId> {
        self.pins.get(element).copied()
    }

    fn step(&mut self, scroll: f64, only: Option<TriggerId>) -> Vec<TriggerSignal> {
        let forward = scroll >= self.scroll;
        if only.is_none() {
            self.scroll = scroll;
        }

        // (rank, key, order, seq) sorts edges into scroll order.
        let mut edges: Vec<(u8, f64, u64, u8, TriggerSignal)> = Vec::new();
        let mut progress = Vec::new();
        for (id, live) in self.live.iter_mut() {
            if only.is_some_and(|o| o != *id) {
                continue;
            }
            let next = phase_of(scroll, live.start, live.end);
            let crossings: &[(TriggerEdge, bool)] = match (live.phase, next) {
                (Phase::Before, Phase::Inside) => &[(TriggerEdge::Enter, true)],
                (Phase::Before, Phase::After) => {
                    &[(TriggerEdge::Enter, true), (TriggerEdge::Leave, false)]
                }
                (Phase::Inside, Phase::After) => &[(TriggerEdge::Leave, false)],
                (Phase::After, Phase::Inside) => &[(TriggerEdge::EnterBack, false)],
                (Phase::After, Phase::Before) => {
                    &[(TriggerEdge::EnterBack, false), (TriggerEdge::LeaveBack, true)]
                }
                (Phase::Inside, Phase::Before) => &[(TriggerEdge::LeaveBack, true)],
                _ => &[],
            };
            for (seq, (edge, at_start)) in crossings.iter().enumerate() {
                let at = if *at_start { live.start } else { live.end };
                let rank = if edge.is_forward() == forward { 0 } else { 1 };
                let key = if edge.is_forward() { at } else { -at };
                edges.push((
                    rank,
                    key,
                    live.order,
                    seq as u8,
                    TriggerSignal::Edge {
                        trigger: *id,
                        edge: *edge,
                        at,
                    },
                ));
            }
            live.phase = next;

            let p = progress_of(scroll, live.start, live.end);
            if live.binding.scrub && (p - live.progress).abs() > f64::EPSILON {
                progress.push(TriggerSignal::Progress {
                    trigger: *id,
                    progress: p,
                });
            }
            live.progress = p;
        }

        edges.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });

        let mut out = Vec::with_capacity(edges.len() + progress.len());
        let pin_changes = self.settle_pins();
        let (unpins, pins): (Vec<_>, Vec<_>) = pin_changes
            .into_iter()
            .partition(|s| matches!(s, TriggerSignal::Unpin { .. }));
        out.extend(unpins);
        out.extend(edges.into_iter().map(|e| e.4));
        out.extend(pins);
        out.extend(progress);
        out
    }

    /// Bring pin ownership in line with the current phases. Unpins come first.
    fn settle_pins(&mut self) -> Vec<TriggerSignal> {
        let mut winners: HashMap<ElementId, (f64, u64, TriggerId)> = HashMap::new();
        for (id, live) in &self.live {
            if !live.binding.pinned || live.phase != Phase::Inside {
                continue;
            }
            let candidate = (live.start, live.order, *id);
            winners
                .entry(live.binding.element.clone())
                .and_modify(|best| {
                    if (candidate.0, candidate.1) < (best.0, best.1) {
                        *best = candidate;
                    }
                })
                .or_insert(candidate);
        }

        let mut out = Vec::new();
        for (id, live) in self.live.iter_mut() {
            let keeps = winners
                .get(&live.binding.element)
                .is_some_and(|w| w.2 == *id);
            if live.pinning && !keeps {
                live.pinning = false;
                if self.pins.get(&live.binding.element) == Some(id) {
                    self.pins.remove(&live.binding.element);
                }
                out.push(TriggerSignal::Unpin {
                    trigger: *id,
                    element: live.binding.element.clone(),
                });
            }
        }

        let mut incoming: Vec<(f64, u64, TriggerId)> = winners.into_values().collect();
        incoming.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        for (_, _, id) in incoming {
            let Some(live) = self.live.get_mut(&id) else {
                continue;
            };
            if live.pinning {
                continue;
            }
            live.pinning = true;
            self.pins.insert(live.binding.element.clone(), id);
            out.push(TriggerSignal::Pin {
                trigger: id,
                element: live.binding.element.clone(),
                top: live.pin_top,
            });
        }
        out
    }
}

fn document_rect<R: LayoutRead + ?Sized>(
    dom: &R,
    element: &ElementId,
    viewport: &Viewport,
) -> Result<Rect> {
    dom.bounding_rect(element)
        .map(|r| r.translated(0.0, viewport.scroll_y))
        .ok_or_else(|| {
            LifecycleError::configuration(format!("trigger element '{element}' not found"))
        })
}

fn resolve_bounds<R: LayoutRead + ?Sized>(
    binding: &ViewportTriggerBinding,
    dom: &R,
    viewport: &Viewport,
) -> Result<(f64, f64, f64)> {
    let element = document_rect(dom, &binding.element, viewport)?;
    let start = binding.start.resolve(&element, viewport, None);
    let end_rect = match &binding.end_element {
        Some(other) => document_rect(dom, other, viewport)?,
        None => element,
    };
    let mut end = binding.end.resolve(&end_rect, viewport, Some(start));
    if end < start {
        log::debug!(
            "trigger on '{}' ends before it starts ({end} < {start}); collapsing",
            binding.element
        );
        end = start;
    }
    Ok((start, end, element.top() - start))
}
