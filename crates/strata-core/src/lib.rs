#![forbid(unsafe_code)]
//! strata-core library.
//!
//! Deterministic ordering of setup items. Items declare what they require,
//! what requires them, which container or groups they belong to and which
//! item they specialize; [`DependencySorter`] turns that into one total
//! order where every item follows its dependencies, every container member
//! lands between the container's Head and the container itself, and ties
//! are broken by full name. The first dependency cycle met is reported
//! instead of an order.
//!
//! # Conventions
//!
//! - **Errors**: Data problems are collected as [`ItemIssue`]s on the
//!   result. Only misuse returns [`SortError`]; option loading returns
//!   `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod cycle;
pub mod error;
pub mod graph;
pub mod issue;
pub mod item;
pub mod item_def;
pub mod result;
pub mod sorter;

pub use config::{ContainerSkipScope, SortOptions, load_sort_options};
pub use cycle::{CycleExplanation, CycleStep, Relation};
pub use error::{ErrorCode, SortError};
pub use issue::{ItemIssue, MissingDependency, StructureError};
pub use item::{ItemDiscoverer, ItemKind, ItemRef, SetupItem};
pub use item_def::ItemDef;
pub use result::{ReportIssue, ReportItem, ReportStep, SortReport, SortResult, SortedItem};
pub use sorter::DependencySorter;
