//! # Courier - Collection Run Orchestrator
//!
//! Courier executes declarative HTTP request collections: items grouped
//! into folders, with pre-request and test scripts, run across data-driven
//! iterations, with a lifecycle event stream feeding pluggable reporters
//! and a structured run summary at the end.
//!
//! The engine drives an execution runtime through the
//! [`Executor`] trait; the embedding binary supplies the
//! implementation (HTTP transport and script execution live there), and
//! courier takes care of sequencing, control flow and aggregation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::{App, Executor, ExecutionContext, ItemReport};
//!
//! struct MyRuntime;
//!
//! #[courier::async_trait]
//! impl Executor for MyRuntime {
//!     async fn execute(&self, ctx: ExecutionContext<'_>) -> ItemReport {
//!         // send ctx.step's request, run its scripts, report back
//!         ItemReport::default()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let app = courier::App::new();
//!     let code = app.run(MyRuntime).await?;
//!     std::process::exit(code);
//! }
//! ```
//!
//! ## Key Features
//!
//! - **Strictly sequential execution**: items run one at a time, awaited
//!   through their full lifecycle
//! - **Folder scoping**: `--folder` / `--exclude-folder` restrict or prune
//!   subtrees of the collection
//! - **Data-driven iterations**: JSON data rows parametrize each pass
//! - **Bail policies**: stop on first failure, optionally escalating to a
//!   run-level error at folder boundaries
//! - **Pluggable reporters**: subscribe to the lifecycle event stream;
//!   ship your own or use the built-ins

mod app;
mod export;

// Re-export main application struct
pub use app::App;
pub use export::{export_layer, resolve_export_path};

// Re-export error handling crates for user convenience
pub use anyhow;
pub use eyre;

// Re-export core functionality
pub use courier_core::{
    collection::{Collection, Folder, Item, Node, Request, Script},
    error::{Error, Result},
    executor::{ExecutionContext, Executor, ItemReport},
    options::{Bail, BailModifier, RunOptions, Selector, SuppressPatterns},
    plan::{Planner, Step, StepKind},
    reporter::{ConsoleReporter, NullReporter, Reporter, ReporterType},
    runner::{Cursor, Event, EventBody, RunReport, Runner},
    scope::{Layer, ScopeKind, ScopeStore},
    summary::RunSummary,
};

// Re-export the async_trait attribute used by the Executor seam
pub use async_trait::async_trait;
