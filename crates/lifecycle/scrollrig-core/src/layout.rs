//! Geometry seams and the layout snapshot cache.
//!
//! Reads and writes are separate traits: [`LayoutCache::recompute`] only sees a
//! [`LayoutRead`], [`LayoutCache::apply`] only sees a [`LayoutWrite`] plus the snapshot.
//! A recompute cycle therefore cannot interleave reads and writes.

use std::f64::consts::TAU;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::ids::{ElementId, LayoutId};
use crate::media::MediaEnv;
use crate::{LifecycleError, Result};

/// Axis-aligned rectangle in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn left(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn top(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    #[inline]
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grow by `horizontal` on the left and right and `vertical` on the top and bottom.
    pub fn expanded(&self, horizontal: f64, vertical: f64) -> Self {
        Self::new(
            self.x - horizontal,
            self.y - vertical,
            self.width + 2.0 * horizontal,
            self.height + 2.0 * vertical,
        )
    }

    /// Edge contact counts as intersecting (an observer with threshold 0 behaves the same).
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() <= other.right()
            && other.left() <= self.right()
            && self.top() <= other.bottom()
            && other.top() <= self.bottom()
    }
}

/// Viewport facts pushed in by the host.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_y: f64,
    pub pixel_ratio: f64,
    /// Total scrollable document height.
    pub document_height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_y: 0.0,
            pixel_ratio: 1.0,
            document_height: height,
        }
    }

    pub fn with_document_height(mut self, document_height: f64) -> Self {
        self.document_height = document_height;
        self
    }

    pub fn max_scroll(&self) -> f64 {
        (self.document_height - self.height).max(0.0)
    }

    pub fn media_env(&self) -> MediaEnv {
        MediaEnv::new(self.width, self.height).with_pixel_ratio(self.pixel_ratio)
    }
}

/// Read side of the host DOM (`getBoundingClientRect`).
pub trait LayoutRead {
    /// Viewport-relative bounds including any applied translation; `None` when absent.
    fn bounding_rect(&self, element: &ElementId) -> Option<Rect>;
}

/// Write side of the host DOM.
pub trait LayoutWrite {
    fn set_translate(&mut self, element: &ElementId, x: f64, y: f64);

    /// Hold `element` fixed at `top` (viewport px) or, with `None`, restore normal flow.
    fn set_pin(&mut self, element: &ElementId, top: Option<f64>);
}

/// The host DOM: both sides of the seam.
pub trait Host: LayoutRead + LayoutWrite {}

impl<T: LayoutRead + LayoutWrite + ?Sized> Host for T {}

fn default_padding() -> f64 {
    50.0
}

/// Elements distributed evenly on a circle inside `container`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadialLayout {
    pub container: ElementId,
    pub elements: Vec<ElementId>,
    #[serde(default = "default_padding")]
    pub padding: f64,
}

impl RadialLayout {
    pub fn new(container: impl Into<ElementId>, elements: Vec<ElementId>) -> Self {
        Self {
            container: container.into(),
            elements,
            padding: default_padding(),
        }
    }
}

/// Translation to write for one element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementOffset {
    pub element: ElementId,
    pub x: f64,
    pub y: f64,
}

/// Result of one batched read pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub epoch: u64,
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    pub offsets: Vec<ElementOffset>,
}

#[derive(Debug)]
struct Group {
    layout: RadialLayout,
    /// Translation currently written for each element, from the last applied snapshot.
    applied: HashMap<ElementId, (f64, f64)>,
    /// Epoch of the newest snapshot; older snapshots are stale and never applied.
    latest: u64,
}

/// Owns layout groups and the translations last written for them.
#[derive(Debug, Default)]
pub struct LayoutCache {
    groups: HashMap<LayoutId, Group>,
    epoch: u64,
    recomputes: u64,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: LayoutId, layout: RadialLayout) {
        self.groups.insert(
            id,
            Group {
                layout,
                applied: HashMap::new(),
                latest: 0,
            },
        );
    }

    pub fn remove(&mut self, id: LayoutId) -> Option<RadialLayout> {
        self.groups.remove(&id).map(|g| g.layout)
    }

    pub fn contains(&self, id: LayoutId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<LayoutId> {
        self.groups.keys().copied().collect()
    }

    /// Number of read passes performed so far.
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    /// Read pass: every geometry read for the group happens here, none in `apply`.
    /// Elements that are absent are left out of the distribution.
    pub fn recompute<R: LayoutRead + ?Sized>(
        &mut self,
        id: LayoutId,
        dom: &R,
    ) -> Result<LayoutSnapshot> {
        let group = self
            .groups
            .get_mut(&id)
            .ok_or_else(|| LifecycleError::configuration(format!("unknown layout {id:?}")))?;
        let container = dom.bounding_rect(&group.layout.container).ok_or_else(|| {
            LifecycleError::configuration(format!(
                "layout container '{}' not found",
                group.layout.container
            ))
        })?;
        let present: Vec<(&ElementId, Rect)> = group
            .layout
            .elements
            .iter()
            .filter_map(|el| dom.bounding_rect(el).map(|r| (el, r)))
            .collect();

        self.epoch += 1;
        self.recomputes += 1;
        group.latest = self.epoch;

        let center_x = container.center_x();
        let center_y = container.center_y();
        let radius = (container.width.min(container.height) / 2.0 - group.layout.padding).max(0.0);
        let count = present.len().max(1) as f64;
        let offsets = present
            .into_iter()
            .enumerate()
            .map(|(index, (element, rect))| {
                let (ax, ay) = group.applied.get(element).copied().unwrap_or((0.0, 0.0));
                let angle = index as f64 / count * TAU;
                let target_left = center_x + radius * angle.cos() - rect.width / 2.0;
                let target_top = center_y + radius * angle.sin() - rect.height / 2.0;
                ElementOffset {
                    element: element.clone(),
                    x: target_left - (rect.left() - ax),
                    y: target_top - (rect.top() - ay),
                }
            })
            .collect();

        Ok(LayoutSnapshot {
            epoch: self.epoch,
            center_x,
            center_y,
            radius,
            offsets,
        })
    }

    /// Write pass: consumes the snapshot and performs no reads.
    /// Returns the number of writes; a stale or foreign snapshot writes nothing.
    pub fn apply<W: LayoutWrite + ?Sized>(
        &mut self,
        id: LayoutId,
        snapshot: LayoutSnapshot,
        dom: &mut W,
    ) -> usize {
        let Some(group) = self.groups.get_mut(&id) else {
            return 0;
        };
        if snapshot.epoch != group.latest {
            log::debug!(
                "dropping stale layout snapshot {} for {:?} (latest {})",
                snapshot.epoch,
                id,
                group.latest
            );
            return 0;
        }
        let mut writes = 0;
        for offset in snapshot.offsets {
            dom.set_translate(&offset.element, offset.x, offset.y);
            group.applied.insert(offset.element, (offset.x, offset.y));
            writes += 1;
        }
        writes
    }

    /// One atomic cycle: read pass then write pass, nothing in between.
    pub fn relayout<H: LayoutRead + LayoutWrite + ?Sized>(
        &mut self,
        id: LayoutId,
        host: &mut H,
    ) -> Result<u64> {
        let snapshot = self.recompute(id, &*host)?;
        let epoch = snapshot.epoch;
        self.apply(id, snapshot, host);
        Ok(epoch)
    }
}
