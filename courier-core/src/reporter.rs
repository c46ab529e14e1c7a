use console::{style, Term};
use eyre::WrapErr;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    executor::{AssertionOutcome, ConsoleEntry, ResponseInfo, SentRequest},
    plan::StepKind,
    runner::{Cursor, Event, EventBody},
    summary::RunSummary,
};

/// Reporter trait. The trait is based on the "template method" pattern.
/// You can implement on_xxx methods to hook into the run lifecycle. This
/// way is enough for most usecases. If you need more control, you can
/// override the "run" method.
///
/// Reporters are independent subscribers: each gets its own receiver, so
/// one reporter failing or lagging never suppresses delivery to the
/// others.
#[async_trait::async_trait]
pub trait Reporter {
    async fn run(&mut self, mut rx: broadcast::Receiver<Event>) -> eyre::Result<()> {
        loop {
            match rx.recv().await {
                Ok(event) => self.dispatch(event).await?,
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("run event channel has been closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("reporter lagged behind by {n} events");
                    continue;
                }
            }
        }

        Ok(())
    }

    async fn dispatch(&mut self, event: Event) -> eyre::Result<()> {
        let cursor = event.cursor;
        match event.body {
            EventBody::Start => self.on_start(cursor).await,
            EventBody::BeforeIteration => self.on_before_iteration(cursor).await,
            EventBody::BeforeItem { name, kind } => self.on_before_item(cursor, name, kind).await,
            EventBody::BeforePrerequest => self.on_before_prerequest(cursor).await,
            EventBody::Prerequest { error } => self.on_prerequest(cursor, error).await,
            EventBody::BeforeRequest { request } => self.on_before_request(cursor, request).await,
            EventBody::Request { error, response } => {
                self.on_request(cursor, error, response).await
            }
            EventBody::BeforeTest => self.on_before_test(cursor).await,
            EventBody::Test { error } => self.on_test(cursor, error).await,
            EventBody::Assertion(outcome) => self.on_assertion(cursor, outcome).await,
            EventBody::Console(entry) => self.on_console(cursor, entry).await,
            EventBody::Item {
                name,
                failed,
                skipped,
            } => self.on_item(cursor, name, failed, skipped).await,
            EventBody::Done(summary) => self.on_done(cursor, &summary).await,
        }
    }

    /// Called once when the run starts.
    async fn on_start(&mut self, _cursor: Cursor) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_before_iteration(&mut self, _cursor: Cursor) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_before_item(
        &mut self,
        _cursor: Cursor,
        _name: String,
        _kind: StepKind,
    ) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_before_prerequest(&mut self, _cursor: Cursor) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_prerequest(
        &mut self,
        _cursor: Cursor,
        _error: Option<String>,
    ) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_before_request(
        &mut self,
        _cursor: Cursor,
        _request: SentRequest,
    ) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_request(
        &mut self,
        _cursor: Cursor,
        _error: Option<String>,
        _response: Option<ResponseInfo>,
    ) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_before_test(&mut self, _cursor: Cursor) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_test(&mut self, _cursor: Cursor, _error: Option<String>) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_assertion(
        &mut self,
        _cursor: Cursor,
        _outcome: AssertionOutcome,
    ) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_console(&mut self, _cursor: Cursor, _entry: ConsoleEntry) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when an item finishes, or is flushed while bailing out.
    async fn on_item(
        &mut self,
        _cursor: Cursor,
        _name: String,
        _failed: bool,
        _skipped: bool,
    ) -> eyre::Result<()> {
        Ok(())
    }

    /// Called once with the final summary. Always the last event.
    async fn on_done(&mut self, _cursor: Cursor, _summary: &RunSummary) -> eyre::Result<()> {
        Ok(())
    }
}

/// Built-in reporter names accepted by the CLI's `--reporters` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ReporterType {
    Console,
    Null,
}

pub struct NullReporter;

#[async_trait::async_trait]
impl Reporter for NullReporter {}

/// Built-in console reporter: one ✓/✘ line per item with its assertions,
/// and the aggregated stats table once the run completes.
pub struct ConsoleReporter {
    terminal: Term,
}

impl ConsoleReporter {
    pub fn new() -> ConsoleReporter {
        ConsoleReporter {
            terminal: Term::stdout(),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> ConsoleReporter {
        ConsoleReporter::new()
    }
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "")]
    metric: &'static str,
    executed: u64,
    failed: u64,
}

#[async_trait::async_trait]
impl Reporter for ConsoleReporter {
    async fn on_before_iteration(&mut self, cursor: Cursor) -> eyre::Result<()> {
        if cursor.cycles > 1 {
            self.terminal
                .write_line(&format!(
                    "\niteration {}/{}",
                    cursor.iteration + 1,
                    cursor.cycles
                ))
                .wrap_err("failed to write on terminal")?;
        }
        Ok(())
    }

    async fn on_assertion(
        &mut self,
        _cursor: Cursor,
        outcome: AssertionOutcome,
    ) -> eyre::Result<()> {
        let line = if outcome.passed {
            format!("  {} {}", style("✓").green(), style(&outcome.name).dim())
        } else {
            let detail = outcome.error.as_deref().unwrap_or("assertion failed");
            format!("  {} {}: {detail}", style("✘").red(), outcome.name)
        };
        self.terminal
            .write_line(&line)
            .wrap_err("failed to write on terminal")
    }

    async fn on_console(&mut self, _cursor: Cursor, entry: ConsoleEntry) -> eyre::Result<()> {
        write(
            &self.terminal,
            format!("  [{}] {}", entry.level, entry.message),
        )
    }

    async fn on_item(
        &mut self,
        _cursor: Cursor,
        name: String,
        failed: bool,
        skipped: bool,
    ) -> eyre::Result<()> {
        let line = if skipped {
            format!("{} {name}", style("-").dim())
        } else if failed {
            format!("{} {name}", style("✘").red())
        } else {
            format!("{} {name}", style("✓").green())
        };
        self.terminal
            .write_line(&line)
            .wrap_err("failed to write on terminal")
    }

    async fn on_done(&mut self, _cursor: Cursor, summary: &RunSummary) -> eyre::Result<()> {
        let stats = summary.run.stats;
        let rows = vec![
            StatRow {
                metric: "iterations",
                executed: stats.iterations.total,
                failed: stats.iterations.failed,
            },
            StatRow {
                metric: "items",
                executed: stats.items.total,
                failed: stats.items.failed,
            },
            StatRow {
                metric: "requests",
                executed: stats.requests.total,
                failed: stats.requests.failed,
            },
            StatRow {
                metric: "prerequest scripts",
                executed: stats.prerequests.total,
                failed: stats.prerequests.failed,
            },
            StatRow {
                metric: "test scripts",
                executed: stats.tests.total,
                failed: stats.tests.failed,
            },
            StatRow {
                metric: "assertions",
                executed: stats.assertions.total,
                failed: stats.assertions.failed,
            },
        ];
        let table = Table::new(rows).with(Style::sharp()).to_string();
        self.terminal
            .write_line(&format!("\n{table}"))
            .wrap_err("failed to write on terminal")?;

        for (i, failure) in summary.run.failures.iter().enumerate() {
            self.terminal
                .write_line(&format!(
                    "{} {} [{}] {}: {}",
                    style(format!("{:>3}.", i + 1)).red(),
                    style(&failure.cause).red(),
                    failure.iteration,
                    failure.item,
                    failure.message,
                ))
                .wrap_err("failed to write on terminal")?;
        }

        if let Some(error) = &summary.run.error {
            self.terminal
                .write_line(&format!("{} {}", style("error:").red(), error.message))
                .wrap_err("failed to write on terminal")?;
        }

        Ok(())
    }
}

fn write(term: &Term, s: impl AsRef<str>) -> eyre::Result<()> {
    let colored = style(s.as_ref()).dim();
    term.write_line(&format!("{colored}"))
        .wrap_err("failed to write character on terminal")
}
