/// courier's run orchestrator.
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::*;

use crate::{
    collection::Collection,
    data::IterationData,
    error::{Error, Result},
    executor::{
        AssertionOutcome, ConsoleEntry, ExecutionContext, Executor, ItemReport, ResponseInfo,
        SentRequest, Stage,
    },
    options::RunOptions,
    plan::{Planner, Step, StepKind},
    policy::Policy,
    reporter::Reporter,
    scope::{ScopeKind, ScopeStore},
    summary::{Aggregator, RunSummary},
};

/// Position of the run within its iterations and item sequence, attached
/// to every published event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cursor {
    /// 0-based iteration index.
    pub iteration: usize,
    /// 0-based index into the flattened step sequence.
    pub position: usize,
    /// Steps per iteration.
    pub length: usize,
    /// Total iterations the run performs.
    pub cycles: usize,
}

/// One lifecycle notification, enriched with the run cursor.
#[derive(Debug, Clone)]
pub struct Event {
    pub cursor: Cursor,
    pub body: EventBody,
}

/// The run lifecycle, in delivery order. Stage-shaped variants mirror
/// what the execution runtime emitted while the item was in flight.
#[derive(Debug, Clone)]
pub enum EventBody {
    Start,
    BeforeIteration,
    BeforeItem {
        name: String,
        kind: StepKind,
    },
    BeforePrerequest,
    Prerequest {
        error: Option<String>,
    },
    BeforeRequest {
        request: SentRequest,
    },
    Request {
        error: Option<String>,
        response: Option<ResponseInfo>,
    },
    BeforeTest,
    Test {
        error: Option<String>,
    },
    Assertion(AssertionOutcome),
    Console(ConsoleEntry),
    Item {
        name: String,
        failed: bool,
        /// Flushed without executing while the run was bailing out.
        skipped: bool,
    },
    Done(Arc<RunSummary>),
}

impl From<Stage> for EventBody {
    fn from(stage: Stage) -> EventBody {
        match stage {
            Stage::BeforePrerequest => EventBody::BeforePrerequest,
            Stage::Prerequest { error } => EventBody::Prerequest { error },
            Stage::BeforeRequest { request } => EventBody::BeforeRequest { request },
            Stage::Request { error, response } => EventBody::Request { error, response },
            Stage::BeforeTest => EventBody::BeforeTest,
            Stage::Test { error } => EventBody::Test { error },
            Stage::Assertion(outcome) => EventBody::Assertion(outcome),
            Stage::Console(entry) => EventBody::Console(entry),
        }
    }
}

/// The terminal `(error | null, summary)` pair. A run-level error and a
/// (possibly partial) summary are delivered together.
#[derive(Debug)]
pub struct RunReport {
    pub error: Option<Error>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Default)]
struct RunnerFlags {
    capture_rust: bool,
}

/// Orchestrates one run: plans the item sequence, executes it strictly
/// sequentially through the [`Executor`], publishes the lifecycle to
/// subscribed reporters and assembles the final summary.
///
/// A runner carries no process-wide state: the event channel is owned by
/// the instance, so independent runs in one process never observe each
/// other. One runner performs one run; construct a new one instead of
/// replaying.
pub struct Runner {
    options: RunOptions,
    executor: Arc<dyn Executor>,
    reporters: Vec<Box<dyn Reporter + Send>>,
    events: Option<broadcast::Sender<Event>>,
    flags: RunnerFlags,
}

impl Runner {
    pub fn new(executor: impl Executor + 'static) -> Runner {
        Runner::with_options(executor, RunOptions::default())
    }

    pub fn with_options(executor: impl Executor + 'static, options: RunOptions) -> Runner {
        Runner {
            options,
            executor: Arc::new(executor),
            reporters: Vec::new(),
            events: Some(broadcast::channel(1024).0),
            flags: RunnerFlags::default(),
        }
    }

    /// Initialize a tracing subscriber for the run. Useful when courier
    /// itself misbehaves and its internal logs are needed.
    pub fn capture_rust(&mut self) {
        self.flags.capture_rust = true;
    }

    pub fn add_reporter(&mut self, reporter: impl Reporter + 'static + Send) {
        self.reporters.push(Box::new(reporter));
    }

    /// Register an already-boxed reporter, e.g. a third-party one handed
    /// over by the CLI layer.
    pub fn add_reporter_boxed(&mut self, reporter: Box<dyn Reporter + Send>) {
        self.reporters.push(reporter);
    }

    /// Subscribe to the run's lifecycle events.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Event>> {
        let tx = self.events.as_ref().ok_or(Error::ChannelClosed)?;
        Ok(tx.subscribe())
    }

    /// Perform the run. Items execute strictly sequentially; reporters
    /// are driven beside the engine and observe the full event stream
    /// before this returns.
    pub async fn run(&mut self, collection: Collection) -> RunReport {
        if self.flags.capture_rust {
            let _ = tracing_subscriber::fmt::try_init();
        }

        let mut reporters = std::mem::take(&mut self.reporters);
        let receivers: Vec<_> = reporters
            .iter()
            .filter_map(|_| self.subscribe().ok())
            .collect();
        let reporters_done = futures::future::join_all(
            reporters
                .iter_mut()
                .zip(receivers)
                .map(|(reporter, rx)| reporter.run(rx).boxed()),
        );

        let engine = self.execute(collection);
        let (report, reporter_results) = tokio::join!(engine, reporters_done);

        for result in reporter_results {
            if let Err(e) = result {
                error!("reporter failed: {e:#}");
            }
        }
        debug!("run finished");

        report
    }

    async fn execute(&mut self, collection: Collection) -> RunReport {
        let mut scopes = ScopeStore::new(
            self.options.globals.clone(),
            self.options.environment.clone(),
        );
        scopes.load(ScopeKind::Collection, collection.variables.clone());

        let data = IterationData::new(self.options.iteration_data.clone().unwrap_or_default())
            .with_window(self.options.data_from, self.options.data_to);
        let cycles = data.resolved_count(self.options.iteration_count);

        let mut policy = Policy::new(
            self.options.bail,
            self.options.suppress_request_errors.clone(),
        );
        let mut aggregator = Aggregator::new(self.options.executions_summary);

        let plan = match Planner::new(
            &collection,
            &self.options.folder,
            &self.options.exclude_folder,
        )
        .plan(policy.strict_folder_lookup())
        {
            Ok(plan) => plan,
            Err(e) => {
                return self.finalize(
                    &collection,
                    &scopes,
                    aggregator,
                    &mut policy,
                    Some(e),
                    Cursor::default(),
                );
            }
        };

        let mut cursor = Cursor {
            iteration: 0,
            position: 0,
            length: plan.len(),
            cycles,
        };
        self.publish(cursor, EventBody::Start);

        let drive = self.drive(
            &plan,
            &data,
            cycles,
            &mut scopes,
            &mut policy,
            &mut aggregator,
            &mut cursor,
        );
        let error = match self.options.timeout {
            // On expiry the drive future is dropped at its await point:
            // the in-flight item is abandoned and finalization still runs
            // exactly once, below.
            Some(limit) => match tokio::time::timeout(limit, drive).await {
                Ok(outcome) => outcome.err(),
                Err(_) => Some(Error::Timeout),
            },
            None => drive.await.err(),
        };

        self.finalize(&collection, &scopes, aggregator, &mut policy, error, cursor)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        plan: &[Step],
        data: &IterationData,
        cycles: usize,
        scopes: &mut ScopeStore,
        policy: &mut Policy,
        aggregator: &mut Aggregator,
        cursor: &mut Cursor,
    ) -> Result<()> {
        for iteration in 0..cycles {
            cursor.iteration = iteration;
            cursor.position = 0;
            aggregator.begin_iteration();
            scopes.bind_data_row(data.row(iteration));
            self.publish(*cursor, EventBody::BeforeIteration);

            for (position, step) in plan.iter().enumerate() {
                cursor.position = position;

                if policy.flushing() {
                    self.publish(
                        *cursor,
                        EventBody::Item {
                            name: step.name.clone(),
                            failed: false,
                            skipped: true,
                        },
                    );
                    continue;
                }

                self.publish(
                    *cursor,
                    EventBody::BeforeItem {
                        name: step.name.clone(),
                        kind: step.kind,
                    },
                );

                let report = self.execute_step(step, scopes, *cursor).await;
                let assessment = policy.assess(step, &report);
                aggregator.record(step, iteration, position, &report, &assessment);

                self.publish(
                    *cursor,
                    EventBody::Item {
                        name: step.name.clone(),
                        failed: !assessment.failures.is_empty(),
                        skipped: false,
                    },
                );

                if let Some(error) = assessment.run_error {
                    return Err(error);
                }
            }

            aggregator.end_iteration();
            if !policy.end_iteration() {
                debug!("run aborting at iteration {iteration} boundary");
                break;
            }
        }

        Ok(())
    }

    /// Hand one step to the executor and forward its in-flight stages,
    /// enriched with the cursor, as they arrive.
    async fn execute_step(
        &self,
        step: &Step,
        scopes: &mut ScopeStore,
        cursor: Cursor,
    ) -> ItemReport {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ExecutionContext {
            step,
            scopes,
            stages: tx,
            timeout_request: self.options.timeout_request,
            timeout_script: self.options.timeout_script,
        };

        let mut in_flight = std::pin::pin!(self.executor.execute(ctx));
        loop {
            tokio::select! {
                Some(stage) = rx.recv() => {
                    self.publish(cursor, stage.into());
                }
                report = &mut in_flight => {
                    // The sender is gone; flush anything still buffered
                    // before handing the report back.
                    while let Ok(stage) = rx.try_recv() {
                        self.publish(cursor, stage.into());
                    }
                    return report;
                }
            }
        }
    }

    fn finalize(
        &mut self,
        collection: &Collection,
        scopes: &ScopeStore,
        aggregator: Aggregator,
        policy: &mut Policy,
        error: Option<Error>,
        cursor: Cursor,
    ) -> RunReport {
        policy.finish();
        let summary = aggregator.finalize(
            collection,
            scopes,
            error.as_ref(),
            self.options.suppress_exit_code,
        );

        self.publish(cursor, EventBody::Done(Arc::new(summary.clone())));
        // Closing the channel lets reporter loops observe Closed and
        // finish.
        self.events.take();

        RunReport { error, summary }
    }

    fn publish(&self, cursor: Cursor, body: EventBody) {
        let Some(tx) = &self.events else {
            return;
        };
        // A run without subscribers is fine; events just go nowhere.
        if tx.send(Event { cursor, body }).is_err() {
            trace!("run event dropped: no subscribers");
        }
    }
}
