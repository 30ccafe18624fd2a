//! One-shot viewport proximity gates (deferred initialisation).
//!
//! A gate fires the first time its element touches the viewport grown by the gate's
//! margin, then forgets the element. Gates whose element disappears before that are
//! dropped without firing.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{ElementId, GateId};
use crate::layout::{LayoutRead, Rect};
use crate::{LifecycleError, Result};

/// Viewport expansion, CSS `rootMargin` style.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub vertical: f64,
    pub horizontal: f64,
}

impl Default for Margin {
    /// `"200px 0px"`: start loading 200px before the element scrolls in.
    fn default() -> Self {
        Self {
            vertical: 200.0,
            horizontal: 0.0,
        }
    }
}

impl Margin {
    pub fn new(vertical: f64, horizontal: f64) -> Self {
        Self {
            vertical,
            horizontal,
        }
    }

    pub fn none() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl FromStr for Margin {
    type Err = LifecycleError;

    /// Accepts one (`"200px"`) or two (`"200px 0px"`) lengths.
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split_whitespace()
            .map(|part| {
                part.strip_suffix("px")
                    .unwrap_or(part)
                    .parse::<f64>()
                    .map_err(|_| LifecycleError::parse("margin", s, format!("bad length '{part}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        match values.as_slice() {
            [all] => Ok(Self::new(*all, *all)),
            [vertical, horizontal] => Ok(Self::new(*vertical, *horizontal)),
            _ => Err(LifecycleError::parse(
                "margin",
                s,
                "expected one or two lengths",
            )),
        }
    }
}

impl fmt::Display for Margin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px {}px", self.vertical, self.horizontal)
    }
}

struct Armed<T> {
    element: ElementId,
    margin: Margin,
    payload: T,
}

/// Armed gates in arming order. `T` is whatever the owner wants handed back on activation.
pub struct ProximityGate<T> {
    armed: IndexMap<GateId, Armed<T>>,
}

impl<T> Default for ProximityGate<T> {
    fn default() -> Self {
        Self {
            armed: IndexMap::new(),
        }
    }
}

impl<T> ProximityGate<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, id: GateId, element: ElementId, margin: Margin, payload: T) {
        self.armed.insert(
            id,
            Armed {
                element,
                margin,
                payload,
            },
        );
    }

    /// Stop observing without firing. Idempotent.
    pub fn disarm(&mut self, id: GateId) -> Option<T> {
        self.armed.shift_remove(&id).map(|a| a.payload)
    }

    pub fn is_armed(&self, id: GateId) -> bool {
        self.armed.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn clear(&mut self) {
        self.armed.clear();
    }

    /// Fire every gate whose element is near the viewport, in arming order.
    /// Fired and orphaned gates are removed, so each payload is returned at most once.
    pub fn check<R: LayoutRead + ?Sized>(
        &mut self,
        viewport_width: f64,
        viewport_height: f64,
        dom: &R,
    ) -> Vec<(GateId, T)> {
        let viewport = Rect::new(0.0, 0.0, viewport_width, viewport_height);
        let mut fired = Vec::new();
        let mut orphaned = Vec::new();
        for (id, armed) in &self.armed {
            match dom.bounding_rect(&armed.element) {
                Some(rect) => {
                    let zone = viewport.expanded(armed.margin.horizontal, armed.margin.vertical);
                    if zone.intersects(&rect) {
                        fired.push(*id);
                    }
                }
                None => orphaned.push(*id),
            }
        }
        for id in orphaned {
            if let Some(armed) = self.armed.shift_remove(&id) {
                log::debug!(
                    "proximity gate {:?} dropped: element '{}' is gone",
                    id,
                    armed.element
                );
            }
        }
        fired
            .into_iter()
            .filter_map(|id| self.armed.shift_remove(&id).map(|a| (id, a.payload)))
            .collect()
    }
}
