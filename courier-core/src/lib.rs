//! # Courier Core
//!
//! Core functionality for the courier collection runner.
//!
//! This crate provides the fundamental building blocks for courier,
//! including:
//! - The run orchestrator and its lifecycle event bus
//! - Collection traversal planning with folder scoping
//! - Layered variable scopes and iteration data
//! - Control-flow policy (bail, suppression) and summary aggregation
//! - Reporting infrastructure
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | collection + options| ---> | planner (traversal) | ---> | runner (sequencing) |
//! | parsed upstream     |      | folder scoping      |      | + event channel     |
//! +---------------------+      +---------------------+      +---------------------+
//!                                                              |        |
//!                                     +------------------------+        v
//!                                     v                         +---------------------+
//!                          +---------------------+              | reporter (output)   |
//!                          | executor (external) |              | Null/Console/etc.   |
//!                          | scripts + transport |              +---------------------+
//!                          +---------------------+                       ^
//!                                     |                                  |
//!                                     v                                  |
//!                          +---------------------+      +---------------------+
//!                          | policy (bail/skip)  | ---> | summary (aggregate) |
//!                          | state machine       |      | stats + failures    |
//!                          +---------------------+      +---------------------+
//! ```
//!
//! The execution runtime (sandboxed script execution and HTTP transport)
//! is an external collaborator behind the [`executor::Executor`] trait;
//! the engine only drives it and consumes its events. Most users should
//! use the main `courier` crate rather than importing `courier-core`
//! directly.

pub mod collection;
pub mod data;
pub mod error;
pub mod executor;
pub mod options;
pub mod plan;
pub mod policy;
pub mod reporter;
pub mod runner;
pub mod scope;
pub mod summary;

// Re-export error handling crates
pub use eyre;

// Re-export key functionality
pub use collection::{Collection, Folder, Item, Node, Request, Script};
pub use data::IterationData;
pub use error::{Error, Result};
pub use executor::{ExecutionContext, Executor, ItemReport};
pub use options::{Bail, BailModifier, RunOptions, Selector, SuppressPatterns};
pub use plan::{Planner, Step, StepKind};
pub use reporter::{ConsoleReporter, NullReporter, Reporter, ReporterType};
pub use runner::{Cursor, Event, EventBody, RunReport, Runner};
pub use scope::{Layer, ScopeKind, ScopeStore};
pub use summary::{RunSummary, Stats};
