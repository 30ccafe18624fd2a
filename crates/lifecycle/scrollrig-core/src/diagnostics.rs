//! Diagnostics: recorded warnings and failures, work counters and timing marks.
//!
//! Everything here is data the host (or a test) can inspect; log output is a side channel.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::LifecycleError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsCfg {
    pub enabled: bool,
}

impl Default for DiagnosticsCfg {
    fn default() -> Self {
        DiagnosticsCfg { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// One of [`LifecycleError::category`], or `"long-task"`.
    pub category: String,
    pub message: String,
    pub at_ms: f64,
}

/// How much work the stage did. Tests use these to check coalescing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub layout_recomputes: u64,
    pub canvas_resizes: u64,
    pub trigger_refreshes: u64,
    pub timers_fired: u64,
    pub trigger_edges: u64,
    pub setups: u64,
    pub teardowns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub duration_ms: f64,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    cfg: DiagnosticsCfg,
    long_task_ms: f64,
    entries: Vec<Diagnostic>,
    marks: HashMap<String, f64>,
    measures: Vec<Measure>,
    pub counters: Counters,
}

impl Diagnostics {
    pub fn new(cfg: DiagnosticsCfg, long_task_ms: f64) -> Self {
        Self {
            cfg,
            long_task_ms,
            ..Self::default()
        }
    }

    /// Log `err` at its severity and keep a copy.
    pub fn record(&mut self, err: &LifecycleError, at_ms: f64) {
        if err.is_warning() {
            log::warn!("{err}");
        } else {
            log::error!("{err}");
        }
        self.push(err.category(), err.to_string(), at_ms);
    }

    fn push(&mut self, category: &str, message: String, at_ms: f64) {
        if !self.cfg.enabled {
            return;
        }
        self.entries.push(Diagnostic {
            category: category.to_string(),
            message,
            at_ms,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count(&self, category: &str) -> usize {
        self.entries.iter().filter(|d| d.category == category).count()
    }

    pub fn mark(&mut self, name: &str, at_ms: f64) {
        if self.cfg.enabled {
            self.marks.insert(name.to_string(), at_ms);
        }
    }

    /// Close the span opened by `mark(start)`. Spans over the long-task threshold warn.
    pub fn measure(&mut self, name: &str, start: &str, at_ms: f64) -> Option<f64> {
        let begun = self.marks.remove(start)?;
        let duration_ms = at_ms - begun;
        if duration_ms > self.long_task_ms {
            log::warn!("long task '{name}': {duration_ms:.1}ms");
            self.push("long-task", format!("{name} took {duration_ms:.1}ms"), at_ms);
        }
        self.measures.push(Measure {
            name: name.to_string(),
            duration_ms,
        });
        Some(duration_ms)
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.marks.clear();
        self.measures.clear();
    }
}
