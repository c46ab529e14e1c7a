//! Summary aggregation.
//!
//! Counters, timing and transfer sums, execution records and failures
//! accumulate incrementally as items complete; on `Done` the aggregate is
//! frozen into an immutable [`RunSummary`] whose serialized shape is
//! consumed verbatim by JSON-style reporters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::{
    collection::Collection,
    error::Error,
    executor::{AssertionOutcome, ConsoleEntry, ItemReport, PhaseTimings, ResponseInfo, SentRequest},
    plan::{Step, StepKind},
    policy::Assessment,
    scope::{Layer, ScopeKind, ScopeStore},
};

/// A total/failed pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub total: u64,
    pub failed: u64,
}

impl Counter {
    fn bump(&mut self, failed: bool) {
        self.total += 1;
        if failed {
            self.failed += 1;
        }
    }
}

/// Run-wide counts, each split into total/failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub iterations: Counter,
    pub items: Counter,
    pub scripts: Counter,
    pub prerequests: Counter,
    pub requests: Counter,
    pub tests: Counter,
    pub assertions: Counter,
}

/// Timing sums across the run, in milliseconds, plus the run's wall-clock
/// bounds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timings {
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub dns_ms: u64,
    pub tcp_ms: u64,
    pub tls_ms: u64,
    pub transfer_ms: u64,
    pub total_ms: u64,
}

/// Transfer byte totals across the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Transfers {
    pub request_total: u64,
    pub response_total: u64,
}

/// The recorded outcome of one item's execution within one iteration.
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub iteration: usize,
    pub position: usize,
    pub kind: String,
    pub name: String,
    pub id: Option<String>,
    pub request: Option<SentRequest>,
    pub response: Option<ResponseInfo>,
    pub assertions: Vec<AssertionOutcome>,
    pub console: Vec<ConsoleEntry>,
    pub timings: PhaseTimings,
    pub error: Option<String>,
    /// The error matched a suppression pattern and does not count as a
    /// failure.
    pub suppressed: bool,
}

/// What went wrong, for the failure list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureCause {
    Assertion,
    Request,
    Script,
    ScriptTimeout,
}

/// One recorded failure: an assertion that failed or a request/script
/// error, tied to a specific item and iteration. Distinct from the
/// top-level run error, which denotes run-level abortion.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub cause: FailureCause,
    pub item: String,
    pub iteration: usize,
    pub message: String,
}

/// Serialized form of the top-level run error.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryError {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for SummaryError {
    fn from(e: &Error) -> SummaryError {
        SummaryError {
            kind: e.kind().into(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub id: Option<String>,
}

/// The run half of the summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunDetails {
    pub stats: Stats,
    pub timings: Timings,
    pub transfers: Transfers,
    pub executions: Vec<Execution>,
    pub failures: Vec<Failure>,
    pub error: Option<SummaryError>,
    pub suppress_exit_code: bool,
}

/// The terminal aggregate delivered to the completion callback and to
/// reporters on the final lifecycle event. Immutable once delivered.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub collection: CollectionInfo,
    pub environment: Layer,
    pub globals: Layer,
    pub run: RunDetails,
}

impl RunSummary {
    /// Whether a wrapping process should exit non-zero: a run-level error
    /// or any recorded failure, unless exit-code suppression was asked
    /// for.
    pub fn failed(&self) -> bool {
        if self.run.suppress_exit_code {
            return false;
        }
        self.run.error.is_some() || !self.run.failures.is_empty()
    }
}

/// Accumulates statistics as execution records arrive and freezes them
/// into the final summary.
#[derive(Debug, Default)]
pub struct Aggregator {
    retain_executions: bool,
    stats: Stats,
    dns: Duration,
    tcp: Duration,
    tls: Duration,
    transfer: Duration,
    total: Duration,
    transfers: Transfers,
    executions: Vec<Execution>,
    failures: Vec<Failure>,
    started: Option<DateTime<Utc>>,
    iteration_failed: bool,
}

impl Aggregator {
    pub fn new(retain_executions: bool) -> Aggregator {
        Aggregator {
            retain_executions,
            started: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn begin_iteration(&mut self) {
        self.stats.iterations.total += 1;
        self.iteration_failed = false;
    }

    pub fn end_iteration(&mut self) {
        if self.iteration_failed {
            self.stats.iterations.failed += 1;
        }
    }

    /// Record one executed step.
    pub fn record(
        &mut self,
        step: &Step,
        iteration: usize,
        position: usize,
        report: &ItemReport,
        assessment: &Assessment,
    ) {
        let failed = !assessment.failures.is_empty();
        self.iteration_failed |= failed;
        self.stats.items.bump(failed);

        if step.kind == StepKind::Request {
            let request_failed = !assessment.suppressed
                && matches!(report.error, Some(crate::executor::ExecError::Transport(_)));
            self.stats.requests.bump(request_failed);
        }

        let phase = report.error.as_ref().and_then(|e| e.script_phase());
        if step.prerequest.is_some() {
            let failed = phase == Some(crate::executor::ScriptPhase::Prerequest);
            self.stats.prerequests.bump(failed);
            self.stats.scripts.bump(failed);
        }
        if step.test.is_some() {
            let failed = phase == Some(crate::executor::ScriptPhase::Test);
            self.stats.tests.bump(failed);
            self.stats.scripts.bump(failed);
        }
        for assertion in &report.assertions {
            self.stats.assertions.bump(!assertion.passed);
        }

        self.dns += report.timings.dns;
        self.tcp += report.timings.tcp;
        self.tls += report.timings.tls;
        self.transfer += report.timings.transfer;
        self.total += report.timings.total;
        if let Some(request) = &report.request {
            self.transfers.request_total += request.body_size;
        }
        if let Some(response) = &report.response {
            self.transfers.response_total += response.body_size;
        }

        for failure in &assessment.failures {
            self.failures.push(Failure {
                cause: failure.cause,
                item: step.name.clone(),
                iteration,
                message: failure.message.clone(),
            });
        }

        if self.retain_executions {
            self.executions.push(Execution {
                iteration,
                position,
                kind: step.kind.to_string(),
                name: step.name.clone(),
                id: step.id.clone(),
                request: report.request.clone(),
                response: report.response.clone(),
                assertions: report.assertions.clone(),
                console: report.console.clone(),
                timings: report.timings,
                error: report.error.as_ref().map(ToString::to_string),
                suppressed: assessment.suppressed,
            });
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Freeze the aggregate into the final immutable summary.
    pub fn finalize(
        self,
        collection: &Collection,
        scopes: &ScopeStore,
        error: Option<&Error>,
        suppress_exit_code: bool,
    ) -> RunSummary {
        RunSummary {
            collection: CollectionInfo {
                name: collection.name.clone(),
                id: collection.id.clone(),
            },
            environment: scopes.snapshot(ScopeKind::Environment),
            globals: scopes.snapshot(ScopeKind::Global),
            run: RunDetails {
                stats: self.stats,
                timings: Timings {
                    started: self.started,
                    completed: Some(Utc::now()),
                    dns_ms: self.dns.as_millis() as u64,
                    tcp_ms: self.tcp.as_millis() as u64,
                    tls_ms: self.tls.as_millis() as u64,
                    transfer_ms: self.transfer.as_millis() as u64,
                    total_ms: self.total.as_millis() as u64,
                },
                transfers: self.transfers,
                executions: self.executions,
                failures: self.failures,
                error: error.map(SummaryError::from),
                suppress_exit_code,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        executor::AssertionOutcome,
        plan::StepKind,
        policy::FailureRecord,
    };
    use pretty_assertions::assert_eq;

    fn step() -> Step {
        Step {
            kind: StepKind::Request,
            name: "login".into(),
            id: None,
            folder_path: Vec::new(),
            request: None,
            prerequest: None,
            test: Some(crate::collection::Script {
                source: "expect(status).toBe(200)".into(),
            }),
        }
    }

    fn failing_outcome() -> (ItemReport, Assessment) {
        let report = ItemReport {
            assertions: vec![AssertionOutcome {
                name: "status is 200".into(),
                passed: false,
                error: Some("expected 200, got 500".into()),
            }],
            ..Default::default()
        };
        let assessment = Assessment {
            failures: vec![FailureRecord {
                cause: FailureCause::Assertion,
                message: "expected 200, got 500".into(),
            }],
            suppressed: false,
            run_error: None,
        };
        (report, assessment)
    }

    fn finalize_one(suppress_exit_code: bool) -> RunSummary {
        let mut aggregator = Aggregator::new(true);
        aggregator.begin_iteration();
        let (report, assessment) = failing_outcome();
        aggregator.record(&step(), 0, 0, &report, &assessment);
        aggregator.end_iteration();
        aggregator.finalize(
            &Collection {
                name: "sample".into(),
                ..Default::default()
            },
            &ScopeStore::default(),
            None,
            suppress_exit_code,
        )
    }

    #[test]
    fn failures_drive_the_exit_decision_unless_suppressed() {
        let summary = finalize_one(false);
        assert_eq!(summary.run.failures.len(), 1);
        assert_eq!(summary.run.stats.iterations.failed, 1);
        assert!(summary.failed());

        let suppressed = finalize_one(true);
        assert_eq!(suppressed.run.failures.len(), 1);
        assert!(!suppressed.failed());
    }

    #[test]
    fn run_error_is_serialized_with_its_kind() {
        let aggregator = Aggregator::new(true);
        let summary = aggregator.finalize(
            &Collection::default(),
            &ScopeStore::default(),
            Some(&Error::Timeout),
            false,
        );

        let error = summary.run.error.as_ref().unwrap();
        assert_eq!(error.kind, "timeout");
        assert_eq!(error.message, "callback timed out");
        assert!(summary.failed());
    }

    #[test]
    fn summary_serializes_the_documented_shape() -> eyre::Result<()> {
        let summary = finalize_one(false);
        let value = serde_json::to_value(&summary)?;

        assert_eq!(value["collection"]["name"], "sample");
        assert!(value["environment"].is_object());
        assert!(value["globals"].is_object());
        assert_eq!(value["run"]["stats"]["items"]["total"], 1);
        assert_eq!(value["run"]["stats"]["assertions"]["failed"], 1);
        assert_eq!(value["run"]["executions"].as_array().unwrap().len(), 1);
        assert_eq!(value["run"]["failures"][0]["cause"], "assertion");
        assert!(value["run"]["error"].is_null());
        Ok(())
    }
}
