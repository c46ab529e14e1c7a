//! Run options.
//!
//! Everything that shapes a run is threaded through this struct at
//! construction time. There is no process-wide configuration: two runners
//! in the same process share nothing unless the caller passes it in.

use serde::Deserialize;
use std::time::Duration;

use crate::scope::Layer;

/// A name-or-id selector accepting a single string or an ordered list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Selector {
    pub fn is_empty(&self) -> bool {
        match self {
            Selector::None => true,
            Selector::One(s) => s.is_empty(),
            Selector::Many(v) => v.is_empty(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Selector::None => Vec::new(),
            Selector::One(s) => vec![s.as_str()],
            Selector::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }

    /// Whether the selector names the given node, by name or id.
    pub fn matches(&self, name: &str, id: Option<&str>) -> bool {
        self.names()
            .iter()
            .any(|sel| *sel == name || Some(*sel) == id)
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Selector {
        Selector::One(s.to_string())
    }
}

impl From<Vec<String>> for Selector {
    fn from(v: Vec<String>) -> Selector {
        Selector::Many(v)
    }
}

/// Bail modifier names accepted in the list form of `bail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BailModifier {
    Folder,
    Failure,
}

/// Early-termination policy. Deserializes from a bool or from a list of
/// modifiers; the list form implies bail is on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bail {
    pub enabled: bool,
    pub folder: bool,
    pub failure: bool,
}

impl Bail {
    pub fn on() -> Bail {
        Bail {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn with_modifiers(modifiers: &[BailModifier]) -> Bail {
        Bail {
            enabled: true,
            folder: modifiers.contains(&BailModifier::Folder),
            failure: modifiers.contains(&BailModifier::Failure),
        }
    }
}

impl<'de> Deserialize<'de> for Bail {
    fn deserialize<D>(deserializer: D) -> Result<Bail, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Switch(bool),
            Modifiers(Vec<BailModifier>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Switch(enabled) => Bail {
                enabled,
                ..Default::default()
            },
            Raw::Modifiers(modifiers) => Bail::with_modifiers(&modifiers),
        })
    }
}

/// Patterns naming requests whose transport errors should be recorded as
/// non-failing. Accepts a comma-separated string or a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuppressPatterns(pub Vec<String>);

impl SuppressPatterns {
    pub fn parse(raw: &str) -> SuppressPatterns {
        SuppressPatterns(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.0.iter().any(|p| p == candidate)
    }
}

impl<'de> Deserialize<'de> for SuppressPatterns {
    fn deserialize<D>(deserializer: D) -> Result<SuppressPatterns, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Joined(String),
            List(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Joined(s) => SuppressPatterns::parse(&s),
            Raw::List(v) => SuppressPatterns(v),
        })
    }
}

/// Options controlling one run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Number of iterations to perform. Falls back to the iteration-data
    /// row count, then to 1.
    pub iteration_count: Option<usize>,
    /// Parsed iteration-data rows, one per iteration.
    pub iteration_data: Option<Vec<Layer>>,
    /// 1-based inclusive window restricting which data rows are visited.
    pub data_from: Option<usize>,
    pub data_to: Option<usize>,
    /// Restrict the run to the named folders or requests.
    pub folder: Selector,
    /// Remove the named subtrees from the traversal. Exclusion wins over
    /// inclusion when both name the same subtree.
    pub exclude_folder: Selector,
    pub bail: Bail,
    /// Reporting-layer flag passed through on the summary; never changes
    /// control flow.
    pub suppress_exit_code: bool,
    pub suppress_request_errors: SuppressPatterns,
    /// Retain individual execution records on the summary. Stats are
    /// tracked either way.
    pub executions_summary: bool,
    /// Global run deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Per-request deadline, passed through to the execution runtime.
    #[serde(with = "humantime_serde")]
    pub timeout_request: Option<Duration>,
    /// Per-script deadline, passed through to the execution runtime.
    #[serde(with = "humantime_serde")]
    pub timeout_script: Option<Duration>,
    pub globals: Layer,
    pub environment: Layer,
}

impl Default for RunOptions {
    fn default() -> RunOptions {
        RunOptions {
            iteration_count: None,
            iteration_data: None,
            data_from: None,
            data_to: None,
            folder: Selector::None,
            exclude_folder: Selector::None,
            bail: Bail::default(),
            suppress_exit_code: false,
            suppress_request_errors: SuppressPatterns::default(),
            executions_summary: true,
            timeout: None,
            timeout_request: None,
            timeout_script: None,
            globals: Layer::default(),
            environment: Layer::default(),
        }
    }
}
