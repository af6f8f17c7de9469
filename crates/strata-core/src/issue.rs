//! Structural issues collected while building the graph.
//!
//! Issues are per item and additive: the first problem met for an item
//! creates its [`ItemIssue`], later problems OR their [`StructureError`]
//! flag in and append names to the matching list. Nothing here aborts a
//! sort; callers decide afterwards what counts as fatal (see
//! [`crate::SortResult::has_structure_error`]).

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use serde::Serialize;

use crate::item::SetupItem;

bitflags! {
    /// Kinds of structural problems an item may have.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StructureError: u32 {
        const MISSING_NAMED_CONTAINER = 1;
        /// A named container resolved to an item that is not a container.
        const EXISTING_ITEM_IS_NOT_A_CONTAINER = 1 << 1;
        /// An object used as a container reports a non-container kind.
        const EXISTING_CONTAINER_ASKED_TO_NOT_BE_A_CONTAINER = 1 << 2;
        const MULTIPLE_CONTAINER = 1 << 3;
        const MISSING_NAMED_CHILD = 1 << 4;
        const MISSING_NAMED_GROUP = 1 << 5;
        /// A non-optional requirement names an item that was never registered.
        const MISSING_DEPENDENCY = 1 << 6;
        const MISSING_GENERALIZATION = 1 << 7;
        const HOMONYM = 1 << 8;
        /// The item exposes children but reports the `Item` kind.
        const CONTAINER_ASKED_TO_NOT_BE_A_GROUP_BUT_CONTAINS_CHILDREN = 1 << 9;
        const DECLARED_GROUP_REFUSED_TO_BE_A_GROUP = 1 << 10;
    }
}

impl StructureError {
    /// Flag names, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        f.write_str(&self.names().join(" | "))
    }
}

/// A requirement whose target was never registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MissingDependency {
    pub name: String,
    pub optional: bool,
}

impl fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "?{}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Every structural problem recorded for one item.
#[derive(Clone)]
pub struct ItemIssue {
    pub item: Arc<dyn SetupItem>,
    pub full_name: String,
    pub flags: StructureError,
    /// Unresolved requirements. Optional ones are informational only.
    pub missing_dependencies: Vec<MissingDependency>,
    /// Containers that claimed the item after it already had one.
    pub extraneous_containers: Vec<String>,
    pub missing_children: Vec<String>,
    pub missing_groups: Vec<String>,
    /// Distinct items registered under the same name; they were dropped.
    pub homonyms: Vec<Arc<dyn SetupItem>>,
    pub missing_container: Option<String>,
    pub missing_generalization: Option<String>,
}

impl ItemIssue {
    fn new(item: Arc<dyn SetupItem>, full_name: String) -> Self {
        Self {
            item,
            full_name,
            flags: StructureError::empty(),
            missing_dependencies: Vec::new(),
            extraneous_containers: Vec::new(),
            missing_children: Vec::new(),
            missing_groups: Vec::new(),
            homonyms: Vec::new(),
            missing_container: None,
            missing_generalization: None,
        }
    }

    pub fn has_required_missing(&self) -> bool {
        self.missing_dependencies.iter().any(|dep| !dep.optional)
    }

    /// Structural flags other than a missing dependency.
    pub fn has_structure_flags(&self) -> bool {
        !(self.flags - StructureError::MISSING_DEPENDENCY).is_empty()
    }

    /// Names of homonym items, as reported by the dropped objects.
    pub fn homonym_names(&self) -> Vec<String> {
        self.homonyms.iter().map(|item| item.full_name()).collect()
    }
}

impl fmt::Debug for ItemIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemIssue")
            .field("full_name", &self.full_name)
            .field("flags", &self.flags)
            .field("missing_dependencies", &self.missing_dependencies)
            .field("extraneous_containers", &self.extraneous_containers)
            .field("missing_children", &self.missing_children)
            .field("missing_groups", &self.missing_groups)
            .field("homonyms", &self.homonym_names())
            .field("missing_container", &self.missing_container)
            .field("missing_generalization", &self.missing_generalization)
            .finish()
    }
}

impl fmt::Display for ItemIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.full_name, self.flags)?;
        if let Some(name) = &self.missing_container {
            write!(f, "; missing container '{name}'")?;
        }
        if !self.extraneous_containers.is_empty() {
            write!(
                f,
                "; extraneous containers: {}",
                self.extraneous_containers.join(", ")
            )?;
        }
        if let Some(name) = &self.missing_generalization {
            write!(f, "; missing generalization '{name}'")?;
        }
        if !self.missing_dependencies.is_empty() {
            let deps: Vec<String> = self
                .missing_dependencies
                .iter()
                .map(ToString::to_string)
                .collect();
            write!(f, "; missing dependencies: {}", deps.join(", "))?;
        }
        if !self.missing_children.is_empty() {
            write!(f, "; missing children: {}", self.missing_children.join(", "))?;
        }
        if !self.missing_groups.is_empty() {
            write!(f, "; missing groups: {}", self.missing_groups.join(", "))?;
        }
        if !self.homonyms.is_empty() {
            write!(f, "; homonyms: {}", self.homonyms.len())?;
        }
        Ok(())
    }
}

/// Issues keyed by full name, kept in creation order.
#[derive(Debug, Default)]
pub(crate) struct IssueLog {
    issues: Vec<ItemIssue>,
    by_name: HashMap<String, usize>,
}

impl IssueLog {
    /// Get or create the issue record for an item.
    pub fn entry(&mut self, item: &Arc<dyn SetupItem>, full_name: &str) -> &mut ItemIssue {
        let idx = match self.by_name.get(full_name) {
            Some(&idx) => idx,
            None => {
                let idx = self.issues.len();
                self.issues
                    .push(ItemIssue::new(Arc::clone(item), full_name.to_string()));
                self.by_name.insert(full_name.to_string(), idx);
                idx
            }
        };
        &mut self.issues[idx]
    }

    pub fn flag(&mut self, item: &Arc<dyn SetupItem>, full_name: &str, flag: StructureError) -> &mut ItemIssue {
        let issue = self.entry(item, full_name);
        issue.flags |= flag;
        issue
    }

    pub fn into_vec(self) -> Vec<ItemIssue> {
        self.issues
    }
}
