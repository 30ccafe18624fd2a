//! Media-condition parsing and evaluation (the `matchMedia` subset the pages rely on).
//!
//! Supported: `(min-width)`, `(max-width)`, `(min-height)`, `(max-height)`,
//! `(orientation)`, `(resolution)`, `(min-resolution)`, `(max-resolution)`, the media
//! types `all`/`screen`/`print`, `only`, `not`, `and` conjunctions and comma
//! disjunctions. Evaluation is a pure function of [`MediaEnv`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{LifecycleError, Result};

const RESOLUTION_EPSILON: f64 = 1e-3;

/// The viewport facts media conditions are evaluated against.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaEnv {
    pub width: f64,
    pub height: f64,
    pub pixel_ratio: f64,
}

impl MediaEnv {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Clone, Debug, PartialEq)]
enum Feature {
    MinWidth(f64),
    MaxWidth(f64),
    MinHeight(f64),
    MaxHeight(f64),
    Orientation(Orientation),
    Resolution(f64),
    MinResolution(f64),
    MaxResolution(f64),
}

impl Feature {
    fn matches(&self, env: &MediaEnv) -> bool {
        match *self {
            Feature::MinWidth(v) => env.width >= v,
            Feature::MaxWidth(v) => env.width <= v,
            Feature::MinHeight(v) => env.height >= v,
            Feature::MaxHeight(v) => env.height <= v,
            Feature::Orientation(Orientation::Portrait) => env.height >= env.width,
            Feature::Orientation(Orientation::Landscape) => env.width > env.height,
            Feature::Resolution(v) => (env.pixel_ratio - v).abs() < RESOLUTION_EPSILON,
            Feature::MinResolution(v) => env.pixel_ratio + RESOLUTION_EPSILON >= v,
            Feature::MaxResolution(v) => env.pixel_ratio - RESOLUTION_EPSILON <= v,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Query {
    negated: bool,
    /// Media type that never applies to a screen (`print`, `speech`).
    never: bool,
    features: Vec<Feature>,
}

impl Query {
    fn matches(&self, env: &MediaEnv) -> bool {
        let hit = !self.never && self.features.iter().all(|f| f.matches(env));
        hit != self.negated
    }
}

/// A parsed media query list. Matches when any of its queries matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MediaCondition {
    source: String,
    queries: Vec<Query>,
}

impl MediaCondition {
    /// The condition that always matches (`all`).
    pub fn all() -> Self {
        Self {
            source: "all".to_string(),
            queries: vec![Query {
                negated: false,
                never: false,
                features: Vec::new(),
            }],
        }
    }

    /// `(min-width: a) and (max-width: b)`; a missing bound is open.
    pub fn width_range(min_width: Option<f64>, max_width: Option<f64>) -> Self {
        let mut features = Vec::new();
        let mut parts = Vec::new();
        if let Some(min) = min_width {
            features.push(Feature::MinWidth(min));
            parts.push(format!("(min-width: {min}px)"));
        }
        if let Some(max) = max_width {
            features.push(Feature::MaxWidth(max));
            parts.push(format!("(max-width: {max}px)"));
        }
        if parts.is_empty() {
            return Self::all();
        }
        Self {
            source: parts.join(" and "),
            queries: vec![Query {
                negated: false,
                never: false,
                features,
            }],
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        if normalized.is_empty() {
            return Ok(Self::all());
        }
        let queries = normalized
            .split(',')
            .map(|q| parse_query(q.trim(), input))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            source: input.trim().to_string(),
            queries,
        })
    }

    pub fn matches(&self, env: &MediaEnv) -> bool {
        self.queries.iter().any(|q| q.matches(env))
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn parse_query(query: &str, input: &str) -> Result<Query> {
    let mut rest = query;
    let negated = match rest.strip_prefix("not ") {
        Some(r) => {
            rest = r.trim_start();
            true
        }
        None => false,
    };
    if let Some(r) = rest.strip_prefix("only ") {
        rest = r.trim_start();
    }
    if rest.is_empty() {
        return Err(LifecycleError::parse("media query", input, "empty query"));
    }

    let mut never = false;
    let mut features = Vec::new();
    for part in rest.split(" and ") {
        let part = part.trim();
        if let Some(inner) = part.strip_prefix('(').and_then(|p| p.strip_suffix(')')) {
            features.push(parse_feature(inner, input)?);
            continue;
        }
        match part {
            "all" | "screen" => {}
            "print" | "speech" => never = true,
            other => {
                return Err(LifecycleError::parse(
                    "media query",
                    input,
                    format!("unknown media type '{other}'"),
                ))
            }
        }
    }
    Ok(Query {
        negated,
        never,
        features,
    })
}

fn parse_feature(inner: &str, input: &str) -> Result<Feature> {
    let (name, value) = inner
        .split_once(':')
        .map(|(n, v)| (n.trim(), v.trim()))
        .ok_or_else(|| {
            LifecycleError::parse("media query", input, format!("'{inner}' needs a value"))
        })?;
    let feature = match name {
        "min-width" => Feature::MinWidth(parse_length(value, input)?),
        "max-width" => Feature::MaxWidth(parse_length(value, input)?),
        "min-height" => Feature::MinHeight(parse_length(value, input)?),
        "max-height" => Feature::MaxHeight(parse_length(value, input)?),
        "orientation" => match value {
            "portrait" => Feature::Orientation(Orientation::Portrait),
            "landscape" => Feature::Orientation(Orientation::Landscape),
            other => {
                return Err(LifecycleError::parse(
                    "media query",
                    input,
                    format!("unknown orientation '{other}'"),
                ))
            }
        },
        "resolution" => Feature::Resolution(parse_resolution(value, input)?),
        "min-resolution" => Feature::MinResolution(parse_resolution(value, input)?),
        "max-resolution" => Feature::MaxResolution(parse_resolution(value, input)?),
        other => {
            return Err(LifecycleError::parse(
                "media query",
                input,
                format!("unsupported feature '{other}'"),
            ))
        }
    };
    Ok(feature)
}

fn parse_number(text: &str, input: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| LifecycleError::parse("media query", input, format!("bad number '{text}'")))
}

fn parse_length(value: &str, input: &str) -> Result<f64> {
    if let Some(px) = value.strip_suffix("px") {
        return parse_number(px, input);
    }
    if let Some(rem) = value.strip_suffix("rem").or_else(|| value.strip_suffix("em")) {
        return Ok(parse_number(rem, input)? * 16.0);
    }
    parse_number(value, input)
}

fn parse_resolution(value: &str, input: &str) -> Result<f64> {
    if let Some(dppx) = value.strip_suffix("dppx") {
        return parse_number(dppx, input);
    }
    if let Some(dpi) = value.strip_suffix("dpi") {
        return Ok(parse_number(dpi, input)? / 96.0);
    }
    if let Some(x) = value.strip_suffix('x') {
        return parse_number(x, input);
    }
    parse_number(value, input)
}

impl FromStr for MediaCondition {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MediaCondition {
    type Error = LifecycleError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<MediaCondition> for String {
    fn from(value: MediaCondition) -> Self {
        value.source
    }
}

impl fmt::Display for MediaCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
