//! Control-flow policy.
//!
//! After each item completes, the policy inspects the outcome and decides
//! whether the run keeps going, flushes the rest of the iteration, or
//! aborts with a run-level error. The state machine:
//!
//! ```text
//! Running --item failure + bail----------> SkippingIteration
//! Running --item failure + bail(folder)--> Aborting (run-level error)
//! SkippingIteration --iteration ends-----> Aborting
//! Aborting / natural completion ---------> Done (summary finalized once)
//! ```

use tracing::debug;

use crate::{
    error::Error,
    executor::{ExecError, ItemReport},
    options::{Bail, SuppressPatterns},
    plan::Step,
    summary::FailureCause,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Remaining steps of the current iteration are flushed without
    /// executing; the run terminates at the iteration boundary.
    SkippingIteration,
    Aborting,
    Done,
}

/// One failure extracted from an item outcome.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub cause: FailureCause,
    pub message: String,
}

/// The policy's reading of one item outcome.
#[derive(Debug, Clone, Default)]
pub struct Assessment {
    pub failures: Vec<FailureRecord>,
    /// A transport error matched a suppression pattern; the execution is
    /// recorded as non-failing.
    pub suppressed: bool,
    /// Set when bail escalates the failure into a run-level abort.
    pub run_error: Option<Error>,
}

pub struct Policy {
    bail: Bail,
    suppress: SuppressPatterns,
    state: RunState,
}

impl Policy {
    pub fn new(bail: Bail, suppress: SuppressPatterns) -> Policy {
        Policy {
            bail,
            suppress,
            state: RunState::Running,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Whether an unmatched folder selector is a run-level error rather
    /// than an empty run.
    pub fn strict_folder_lookup(&self) -> bool {
        self.bail.enabled && self.bail.folder
    }

    /// The remaining steps of the current iteration must be flushed
    /// without executing.
    pub fn flushing(&self) -> bool {
        matches!(self.state, RunState::SkippingIteration | RunState::Aborting)
    }

    /// Inspect one finished item and transition accordingly.
    pub fn assess(&mut self, step: &Step, report: &ItemReport) -> Assessment {
        let mut assessment = Assessment::default();

        match &report.error {
            Some(ExecError::Transport(message)) => {
                if self.suppressed(step, report) {
                    assessment.suppressed = true;
                } else {
                    assessment.failures.push(FailureRecord {
                        cause: FailureCause::Request,
                        message: message.clone(),
                    });
                }
            }
            Some(error @ ExecError::Script { .. }) => {
                assessment.failures.push(FailureRecord {
                    cause: FailureCause::Script,
                    message: error.to_string(),
                });
            }
            Some(error @ ExecError::ScriptTimeout { .. }) => {
                assessment.failures.push(FailureRecord {
                    cause: FailureCause::ScriptTimeout,
                    message: error.to_string(),
                });
            }
            None => {}
        }

        for assertion in report.assertions.iter().filter(|a| !a.passed) {
            assessment.failures.push(FailureRecord {
                cause: FailureCause::Assertion,
                message: assertion
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("assertion failed: {}", assertion.name)),
            });
        }

        if !assessment.failures.is_empty() && self.bail.enabled && self.state == RunState::Running
        {
            if self.bail.folder {
                let boundary = step.enclosing_folder().unwrap_or(&step.name).to_string();
                let message = if self.bail.failure {
                    // Both modifiers: name the first failure, not just the
                    // folder boundary.
                    let first = &assessment.failures[0].message;
                    format!("run bailed out in folder \"{boundary}\": {first}")
                } else {
                    format!("run bailed out in folder \"{boundary}\"")
                };
                debug!("bail(folder): aborting at \"{boundary}\"");
                self.state = RunState::Aborting;
                assessment.run_error = Some(Error::Bailed(message));
            } else {
                debug!("bail: skipping the rest of the iteration");
                self.state = RunState::SkippingIteration;
            }
        }

        assessment
    }

    /// The current iteration finished (or was flushed). Returns false
    /// when the run must not start another iteration.
    pub fn end_iteration(&mut self) -> bool {
        match self.state {
            RunState::Running => true,
            RunState::SkippingIteration => {
                self.state = RunState::Aborting;
                false
            }
            RunState::Aborting | RunState::Done => false,
        }
    }

    /// Terminal transition. Idempotent by construction: the runner calls
    /// it exactly once while finalizing.
    pub fn finish(&mut self) {
        self.state = RunState::Done;
    }

    fn suppressed(&self, step: &Step, report: &ItemReport) -> bool {
        if self.suppress.is_empty() {
            return false;
        }
        if self.suppress.contains(&step.name) {
            return true;
        }
        report
            .request
            .as_ref()
            .and_then(|r| r.host())
            .is_some_and(|host| self.suppress.contains(&host))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        executor::{AssertionOutcome, ScriptPhase, SentRequest},
        plan::StepKind,
    };
    use pretty_assertions::assert_eq;

    fn step_in(folder: Option<&str>) -> Step {
        Step {
            kind: StepKind::Request,
            name: "login".into(),
            id: None,
            folder_path: folder.map(|f| vec![f.to_string()]).unwrap_or_default(),
            request: None,
            prerequest: None,
            test: None,
        }
    }

    fn failing_report() -> ItemReport {
        ItemReport {
            assertions: vec![AssertionOutcome {
                name: "status is 200".into(),
                passed: false,
                error: Some("expected 200, got 500".into()),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn no_bail_stays_running() {
        let mut policy = Policy::new(Bail::default(), SuppressPatterns::default());
        let assessment = policy.assess(&step_in(None), &failing_report());

        assert_eq!(assessment.failures.len(), 1);
        assert_eq!(assessment.failures[0].cause, FailureCause::Assertion);
        assert!(assessment.run_error.is_none());
        assert_eq!(policy.state(), RunState::Running);
        assert!(policy.end_iteration());
    }

    #[test]
    fn plain_bail_flushes_then_aborts_without_error() {
        let mut policy = Policy::new(Bail::on(), SuppressPatterns::default());
        let assessment = policy.assess(&step_in(None), &failing_report());

        assert!(assessment.run_error.is_none());
        assert_eq!(policy.state(), RunState::SkippingIteration);
        assert!(policy.flushing());
        assert!(!policy.end_iteration());
        assert_eq!(policy.state(), RunState::Aborting);
    }

    #[test]
    fn folder_bail_aborts_with_error_referencing_the_folder() {
        let mut policy = Policy::new(
            Bail::with_modifiers(&[crate::options::BailModifier::Folder]),
            SuppressPatterns::default(),
        );
        let assessment = policy.assess(&step_in(Some("F")), &failing_report());

        let error = assessment.run_error.expect("run error expected");
        assert!(error.to_string().contains("\"F\""));
        assert_eq!(policy.state(), RunState::Aborting);
    }

    #[test]
    fn folder_and_failure_bail_names_the_first_failure() {
        let mut policy = Policy::new(
            Bail::with_modifiers(&[
                crate::options::BailModifier::Folder,
                crate::options::BailModifier::Failure,
            ]),
            SuppressPatterns::default(),
        );
        let assessment = policy.assess(&step_in(Some("F")), &failing_report());

        let message = assessment.run_error.unwrap().to_string();
        assert!(message.contains("\"F\""));
        assert!(message.contains("expected 200, got 500"));
    }

    #[test]
    fn suppression_matches_item_name_and_host() {
        let mut policy = Policy::new(Bail::on(), SuppressPatterns::parse("api.down.test,probe"));

        let mut report = ItemReport {
            error: Some(ExecError::Transport("connection refused".into())),
            request: Some(SentRequest {
                method: "GET".into(),
                url: "https://api.down.test/health".into(),
                body_size: 0,
            }),
            ..Default::default()
        };

        let assessment = policy.assess(&step_in(None), &report);
        assert!(assessment.suppressed);
        assert!(assessment.failures.is_empty());
        // A suppressed error never trips bail.
        assert_eq!(policy.state(), RunState::Running);

        report.request = None;
        let mut policy = Policy::new(Bail::default(), SuppressPatterns::parse("other"));
        let assessment = policy.assess(&step_in(None), &report);
        assert!(!assessment.suppressed);
        assert_eq!(assessment.failures[0].cause, FailureCause::Request);
    }

    #[test]
    fn script_timeout_is_a_distinct_item_level_failure() {
        let mut policy = Policy::new(Bail::default(), SuppressPatterns::default());
        let report = ItemReport {
            error: Some(ExecError::ScriptTimeout {
                phase: ScriptPhase::Test,
                message: "exceeded 500ms".into(),
            }),
            ..Default::default()
        };

        let assessment = policy.assess(&step_in(None), &report);
        assert_eq!(assessment.failures[0].cause, FailureCause::ScriptTimeout);
        assert!(assessment.run_error.is_none());
        assert_eq!(policy.state(), RunState::Running);
    }
}
