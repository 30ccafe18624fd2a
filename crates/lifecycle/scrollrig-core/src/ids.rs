//! Identifiers and simple allocators for lifecycle entities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to one live animation instance (one engine instance bound to one canvas).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

/// Handle to a registered viewport trigger.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TriggerId(pub u32);

/// Handle to an armed proximity gate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct GateId(pub u32);

/// Handle to a layout group held by the layout cache.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LayoutId(pub u32);

/// Handle to a breakpoint context.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContextId(pub u32);

/// Ownership scope. Every resource belongs to exactly one scope.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

/// Opaque host element identifier (a DOM id on the web).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic allocator for every id kind owned by a stage.
/// Ids are never reused within one stage, so a stale handle can never alias a new resource.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_instance: u32,
    next_trigger: u32,
    next_gate: u32,
    next_layout: u32,
    next_context: u32,
    next_scope: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_instance(&mut self) -> InstanceId {
        let id = InstanceId(self.next_instance);
        self.next_instance = self.next_instance.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_trigger(&mut self) -> TriggerId {
        let id = TriggerId(self.next_trigger);
        self.next_trigger = self.next_trigger.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_gate(&mut self) -> GateId {
        let id = GateId(self.next_gate);
        self.next_gate = self.next_gate.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_layout(&mut self) -> LayoutId {
        let id = LayoutId(self.next_layout);
        self.next_layout = self.next_layout.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_context(&mut self) -> ContextId {
        let id = ContextId(self.next_context);
        self.next_context = self.next_context.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope = self.next_scope.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_instance(), InstanceId(0));
        assert_eq!(alloc.alloc_instance(), InstanceId(1));
        assert_eq!(alloc.alloc_trigger(), TriggerId(0));
        assert_eq!(alloc.alloc_gate(), GateId(0));
        assert_eq!(alloc.alloc_scope(), ScopeId(0));
        assert_eq!(alloc.alloc_scope(), ScopeId(1));
    }

    #[test]
    fn element_id_serializes_as_plain_string() {
        let id = ElementId::from("card_01");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"card_01\"");
        assert_eq!(id.to_string(), "card_01");
    }
}
