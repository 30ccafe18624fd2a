//! Stage configuration: debounce delays, proximity margin, default scroll interval,
//! breakpoint thresholds and diagnostics switches.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticsCfg;
use crate::media::MediaCondition;
use crate::proximity::Margin;
use crate::Result;

/// Configuration for one stage (one page).
/// Every field has a default, so partial JSON is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trailing delay for canvas resize and trigger refresh after a resize burst.
    pub resize_debounce_ms: f64,
    /// Trailing delay for layout-group recomputes after a resize burst.
    pub layout_debounce_ms: f64,
    /// Viewport expansion used by proximity gates when the caller gives none.
    pub proximity_margin: Margin,
    /// Scroll interval used for instance triggers that do not specify one.
    pub default_start: String,
    pub default_end: String,
    /// Named width thresholds, in declaration order.
    pub breakpoints: IndexMap<String, Breakpoint>,
    /// Measures longer than this are reported as long tasks.
    pub long_task_ms: f64,
    pub diagnostics: DiagnosticsCfg,
}

impl Default for Config {
    fn default() -> Self {
        let mut breakpoints = IndexMap::new();
        breakpoints.insert(
            "base".to_string(),
            Breakpoint {
                min_width: Some(320.0),
                max_width: None,
            },
        );
        breakpoints.insert(
            "mobile".to_string(),
            Breakpoint {
                min_width: None,
                max_width: Some(991.0),
            },
        );
        breakpoints.insert(
            "desktop".to_string(),
            Breakpoint {
                min_width: Some(992.0),
                max_width: None,
            },
        );
        Self {
            resize_debounce_ms: 250.0,
            layout_debounce_ms: 200.0,
            proximity_margin: Margin::default(),
            default_start: "top bottom".to_string(),
            default_end: "bottom top".to_string(),
            breakpoints,
            long_task_ms: 50.0,
            diagnostics: DiagnosticsCfg::default(),
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Media condition for a named breakpoint, if configured.
    pub fn breakpoint(&self, name: &str) -> Option<MediaCondition> {
        self.breakpoints.get(name).map(Breakpoint::condition)
    }
}

/// Inclusive viewport width range in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    #[serde(default)]
    pub min_width: Option<f64>,
    #[serde(default)]
    pub max_width: Option<f64>,
}

impl Breakpoint {
    pub fn condition(&self) -> MediaCondition {
        MediaCondition::width_range(self.min_width, self.max_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaEnv;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = Config::from_json(r#"{ "resize_debounce_ms": 100 }"#).unwrap();
        assert_eq!(cfg.resize_debounce_ms, 100.0);
        assert_eq!(cfg.layout_debounce_ms, 200.0);
        assert_eq!(cfg.default_start, "top bottom");
        assert_eq!(cfg.proximity_margin.vertical, 200.0);
    }

    #[test]
    fn named_breakpoints_become_conditions() {
        let cfg = Config::default();
        let desktop = cfg.breakpoint("desktop").unwrap();
        let mobile = cfg.breakpoint("mobile").unwrap();
        let wide = MediaEnv::new(1280.0, 800.0);
        let narrow = MediaEnv::new(480.0, 800.0);
        assert!(desktop.matches(&wide));
        assert!(!desktop.matches(&narrow));
        assert!(mobile.matches(&narrow));
        assert!(cfg.breakpoint("tablet").is_none());
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = Config::from_json("{ nope").unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
