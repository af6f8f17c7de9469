//! Outcome of a sort.
//!
//! A [`SortResult`] holds either the ordered entries or the first cycle,
//! plus the structural issues met while registering. Sorted entries refer
//! to each other by their index in the order, so relations can be walked
//! without going back to the items.

use std::fmt::Write as _;
use std::sync::Arc;

use petgraph::graph::DiGraph;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cycle::{CycleExplanation, Relation};
use crate::error::ErrorCode;
use crate::issue::ItemIssue;
use crate::item::{ItemKind, SetupItem};

/// One entry of the final order.
#[derive(Clone)]
pub struct SortedItem {
    pub item: Arc<dyn SetupItem>,
    pub full_name: String,
    /// Kind of the item, or of the owner for a Head.
    pub kind: ItemKind,
    pub rank: usize,
    /// Position in the order.
    pub index: usize,
    /// This entry opens a container or group.
    pub is_head: bool,
    /// Index of the Head of a container or group.
    pub head: Option<usize>,
    /// Index of the container or group a Head opens.
    pub owner: Option<usize>,
    pub container: Option<usize>,
    pub generalization: Option<usize>,
    pub groups: Vec<usize>,
    pub children: Vec<usize>,
    pub requires: Vec<usize>,
    /// Entries that declared themselves required by this one.
    pub required_by_declarations: Vec<usize>,
}

impl SortedItem {
    /// The concrete item behind this entry, if it is a `T`.
    #[must_use]
    pub fn downcast<T: SetupItem>(&self) -> Option<&T> {
        self.item.as_any().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for SortedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedItem")
            .field("index", &self.index)
            .field("rank", &self.rank)
            .field("full_name", &self.full_name)
            .field("kind", &self.kind)
            .field("is_head", &self.is_head)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Sorted {
        items: Vec<SortedItem>,
        /// `(dependency, dependent, relation)` by sorted index.
        edges: Vec<(usize, usize, Relation)>,
    },
    Cycle(CycleExplanation),
}

#[derive(Debug, Clone)]
pub struct SortResult {
    outcome: Outcome,
    issues: Vec<ItemIssue>,
    missing_required_is_structure_error: bool,
}

impl SortResult {
    pub(crate) const fn sorted(
        items: Vec<SortedItem>,
        edges: Vec<(usize, usize, Relation)>,
        issues: Vec<ItemIssue>,
        missing_required_is_structure_error: bool,
    ) -> Self {
        Self {
            outcome: Outcome::Sorted { items, edges },
            issues,
            missing_required_is_structure_error,
        }
    }

    pub(crate) const fn cycle(
        cycle: CycleExplanation,
        issues: Vec<ItemIssue>,
        missing_required_is_structure_error: bool,
    ) -> Self {
        Self {
            outcome: Outcome::Cycle(cycle),
            issues,
            missing_required_is_structure_error,
        }
    }

    /// The order, absent when a cycle was found.
    #[must_use]
    pub fn sorted_items(&self) -> Option<&[SortedItem]> {
        match &self.outcome {
            Outcome::Sorted { items, .. } => Some(items),
            Outcome::Cycle(_) => None,
        }
    }

    #[must_use]
    pub const fn cycle_explanation(&self) -> Option<&CycleExplanation> {
        match &self.outcome {
            Outcome::Sorted { .. } => None,
            Outcome::Cycle(cycle) => Some(cycle),
        }
    }

    #[must_use]
    pub fn issues(&self) -> &[ItemIssue] {
        &self.issues
    }

    #[must_use]
    pub fn has_required_missing(&self) -> bool {
        self.issues.iter().any(ItemIssue::has_required_missing)
    }

    /// Any structural flag, or a missing required item when the policy
    /// counts those.
    #[must_use]
    pub fn has_structure_error(&self) -> bool {
        self.issues.iter().any(ItemIssue::has_structure_flags)
            || (self.missing_required_is_structure_error && self.has_required_missing())
    }

    /// Sorted, without cycle and without structure error.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.sorted_items().is_some() && !self.has_structure_error()
    }

    #[must_use]
    pub const fn missing_required_is_structure_error(&self) -> bool {
        self.missing_required_is_structure_error
    }

    pub const fn set_missing_required_is_structure_error(&mut self, value: bool) {
        self.missing_required_is_structure_error = value;
    }

    /// Why the result is not complete, most severe first.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.cycle_explanation().is_some() {
            return Some(ErrorCode::CycleDetected);
        }
        if self.issues.iter().any(ItemIssue::has_structure_flags) {
            return Some(ErrorCode::StructureInvalid);
        }
        if self.missing_required_is_structure_error && self.has_required_missing() {
            return Some(ErrorCode::MissingRequirement);
        }
        None
    }

    /// Sorted entry of a registered item, Heads excluded.
    #[must_use]
    pub fn find(&self, full_name: &str) -> Option<&SortedItem> {
        self.sorted_items()?
            .iter()
            .find(|entry| !entry.is_head && entry.full_name == full_name)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SortedItem> {
        self.sorted_items()?.get(index)
    }

    #[must_use]
    pub fn container_of(&self, entry: &SortedItem) -> Option<&SortedItem> {
        entry.container.and_then(|index| self.get(index))
    }

    #[must_use]
    pub fn generalization_of(&self, entry: &SortedItem) -> Option<&SortedItem> {
        entry.generalization.and_then(|index| self.get(index))
    }

    #[must_use]
    pub fn head_of(&self, entry: &SortedItem) -> Option<&SortedItem> {
        entry.head.and_then(|index| self.get(index))
    }

    /// Multi-line text of every issue and the cycle, empty when there is
    /// nothing to report.
    #[must_use]
    pub fn diagnostic_dump(&self) -> String {
        let mut out = String::new();
        if let Some(code) = self.error_code() {
            let _ = writeln!(out, "{code}: {}", code.message());
        }
        for issue in &self.issues {
            let _ = writeln!(out, "  {issue}");
        }
        if let Some(cycle) = self.cycle_explanation() {
            let _ = writeln!(out, "  cycle: {cycle}");
        }
        out
    }

    /// Emit issues and the cycle as tracing events.
    pub fn log_diagnostics(&self) {
        for issue in &self.issues {
            let fatal = issue.has_structure_flags()
                || (self.missing_required_is_structure_error && issue.has_required_missing());
            if fatal {
                warn!(item = %issue.full_name, flags = %issue.flags, "{issue}");
            } else {
                info!(item = %issue.full_name, "{issue}");
            }
        }
        if let Some(cycle) = self.cycle_explanation() {
            error!(
                code = ErrorCode::CycleDetected.code(),
                length = cycle.len(),
                "{cycle}"
            );
        }
    }

    /// Graph of the order: one node per sorted entry, indexed like the
    /// order, and one edge per relation from dependency to dependent.
    #[must_use]
    pub fn dependency_graph(&self) -> Option<DiGraph<String, Relation>> {
        let Outcome::Sorted { items, edges } = &self.outcome else {
            return None;
        };
        let mut graph = DiGraph::with_capacity(items.len(), edges.len());
        let nodes: Vec<_> = items
            .iter()
            .map(|entry| graph.add_node(entry.full_name.clone()))
            .collect();
        for &(dependency, dependent, relation) in edges {
            graph.add_edge(nodes[dependency], nodes[dependent], relation);
        }
        Some(graph)
    }

    /// BLAKE3 hash of the order, stable across runs for equal input.
    #[must_use]
    pub fn order_fingerprint(&self) -> Option<String> {
        let items = self.sorted_items()?;
        let mut hasher = blake3::Hasher::new();
        for entry in items {
            hasher.update(entry.full_name.as_bytes());
            hasher.update(b"\x00");
            hasher.update(&u64::try_from(entry.rank).unwrap_or(u64::MAX).to_le_bytes());
        }
        Some(format!("blake3:{}", hasher.finalize()))
    }

    /// Serializable summary.
    #[must_use]
    pub fn report(&self) -> SortReport {
        SortReport {
            complete: self.is_complete(),
            error_code: self.error_code().map(ErrorCode::code),
            items: self
                .sorted_items()
                .unwrap_or_default()
                .iter()
                .map(|entry| ReportItem {
                    index: entry.index,
                    rank: entry.rank,
                    full_name: entry.full_name.clone(),
                    kind: entry.kind,
                    is_head: entry.is_head,
                    container: self.container_of(entry).map(|c| c.full_name.clone()),
                })
                .collect(),
            cycle: self.cycle_explanation().map(|cycle| {
                cycle
                    .steps()
                    .iter()
                    .map(|step| ReportStep {
                        relation: step.relation,
                        full_name: step.full_name.clone(),
                    })
                    .collect()
            }),
            issues: self.issues.iter().map(ReportIssue::from).collect(),
        }
    }
}

/// JSON-friendly view of a [`SortResult`].
#[derive(Debug, Clone, Serialize)]
pub struct SortReport {
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    pub items: Vec<ReportItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<ReportStep>>,
    pub issues: Vec<ReportIssue>,
}

impl SortReport {
    /// # Errors
    ///
    /// Fails only if serialization itself fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportItem {
    pub index: usize,
    pub rank: usize,
    pub full_name: String,
    pub kind: ItemKind,
    pub is_head: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportStep {
    pub relation: Relation,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportIssue {
    pub full_name: String,
    pub flags: Vec<&'static str>,
    pub missing_dependencies: Vec<String>,
    pub extraneous_containers: Vec<String>,
    pub missing_children: Vec<String>,
    pub missing_groups: Vec<String>,
    pub homonyms: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_generalization: Option<String>,
}

impl From<&ItemIssue> for ReportIssue {
    fn from(issue: &ItemIssue) -> Self {
        Self {
            full_name: issue.full_name.clone(),
            flags: issue.flags.names(),
            missing_dependencies: issue
                .missing_dependencies
                .iter()
                .map(ToString::to_string)
                .collect(),
            extraneous_containers: issue.extraneous_containers.clone(),
            missing_children: issue.missing_children.clone(),
            missing_groups: issue.missing_groups.clone(),
            homonyms: issue.homonyms.len(),
            missing_container: issue.missing_container.clone(),
            missing_generalization: issue.missing_generalization.clone(),
        }
    }
}
