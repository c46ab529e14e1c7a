//! The execution runtime seam.
//!
//! The engine never talks to the network or runs scripts itself. It hands
//! each planned step to an [`Executor`] and consumes what comes back: a
//! stream of in-flight stage notifications plus a terminal [`ItemReport`].
//! Real runtimes (HTTP transport, sandboxed scripting) and the scripted
//! doubles used in tests both live behind this trait.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{plan::Step, scope::ScopeStore};

/// Sender half of the in-flight stage stream. Executors emit stages as
/// they happen; the coordinator forwards each one enriched with the run
/// cursor.
pub type StageSender = mpsc::UnboundedSender<Stage>;

/// Lifecycle notifications an executor emits while an item is in flight,
/// in the order they occur.
#[derive(Debug, Clone)]
pub enum Stage {
    BeforePrerequest,
    /// Pre-request script finished; `error` is set when it failed.
    Prerequest { error: Option<String> },
    /// About to send the request, after variable substitution.
    BeforeRequest { request: SentRequest },
    /// Response received, or the transport failed.
    Request {
        error: Option<String>,
        response: Option<ResponseInfo>,
    },
    BeforeTest,
    /// Test script finished; `error` is set when it failed.
    Test { error: Option<String> },
    Assertion(AssertionOutcome),
    Console(ConsoleEntry),
}

/// Emit a stage, ignoring a closed stream. The coordinator stops
/// listening only when the run is being torn down, at which point stages
/// have nowhere useful to go anyway.
pub fn emit(stages: &StageSender, stage: Stage) {
    let _ = stages.send(stage);
}

/// The request actually sent, after variable substitution.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SentRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub body_size: u64,
}

impl SentRequest {
    /// Host component of the sent url, used for suppression matching.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
    }
}

/// The response received for one request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseInfo {
    pub status: u16,
    #[serde(default)]
    pub body_size: u64,
}

/// Outcome of a single embedded test assertion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssertionOutcome {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// One captured console line from script execution.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub message: String,
}

/// Phase timings for one execution.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PhaseTimings {
    #[serde(with = "humantime_serde")]
    pub dns: Duration,
    #[serde(with = "humantime_serde")]
    pub tcp: Duration,
    #[serde(with = "humantime_serde")]
    pub tls: Duration,
    #[serde(with = "humantime_serde")]
    pub transfer: Duration,
    #[serde(with = "humantime_serde")]
    pub total: Duration,
}

/// Which attached script was running when a script error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScriptPhase {
    Prerequest,
    Test,
}

/// Execution failure kinds. A script timeout is deliberately distinct
/// from a transport failure so policy and reporters can tell them apart;
/// neither aborts the run by itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("{phase} script failed: {message}")]
    Script { phase: ScriptPhase, message: String },
    #[error("{phase} script execution timed out: {message}")]
    ScriptTimeout { phase: ScriptPhase, message: String },
}

impl ExecError {
    pub fn script_phase(&self) -> Option<ScriptPhase> {
        match self {
            ExecError::Transport(_) => None,
            ExecError::Script { phase, .. } | ExecError::ScriptTimeout { phase, .. } => {
                Some(*phase)
            }
        }
    }
}

/// Everything the runtime reports about one item's execution. Created
/// when the item finishes; immutable afterward.
#[derive(Debug, Clone, Default)]
pub struct ItemReport {
    pub request: Option<SentRequest>,
    pub response: Option<ResponseInfo>,
    pub assertions: Vec<AssertionOutcome>,
    pub console: Vec<ConsoleEntry>,
    pub timings: PhaseTimings,
    pub error: Option<ExecError>,
}

impl ItemReport {
    /// Whether any embedded assertion failed.
    pub fn has_failed_assertion(&self) -> bool {
        self.assertions.iter().any(|a| !a.passed)
    }
}

/// Per-item context handed to the executor. The scope store is borrowed
/// exclusively for the duration of the item: scripts mutate it through
/// this borrow and nothing else observes it until the item completes.
pub struct ExecutionContext<'a> {
    pub step: &'a Step,
    pub scopes: &'a mut ScopeStore,
    pub stages: StageSender,
    pub timeout_request: Option<Duration>,
    pub timeout_script: Option<Duration>,
}

/// The external execution collaborator. Implementations drive one item's
/// full lifecycle (pre-request script, request, test script), emitting
/// stages through `ctx.stages` and returning the terminal report.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext<'_>) -> ItemReport;
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn host_extraction() {
        let request = SentRequest {
            method: "GET".into(),
            url: "https://api.example.test/users?page=2".into(),
            body_size: 0,
        };
        assert_eq!(request.host().as_deref(), Some("api.example.test"));

        let unresolved = SentRequest {
            method: "GET".into(),
            url: "{{base}}/users".into(),
            body_size: 0,
        };
        assert_eq!(unresolved.host(), None);
    }

    #[test]
    fn failed_assertion_detection() {
        let mut report = ItemReport::default();
        assert!(!report.has_failed_assertion());
        report.assertions.push(AssertionOutcome {
            name: "status is 200".into(),
            passed: false,
            error: Some("expected 200, got 500".into()),
        });
        assert!(report.has_failed_assertion());
    }
}
