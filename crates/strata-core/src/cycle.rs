//! Human-readable explanation of a dependency cycle.
//!
//! A cycle is reported as the path the ranker walked, each step tagged
//! with the relation that led to it:
//!
//! ```text
//! ↳ Sales ⇀ Orders ∈ Sales
//! ```
//!
//! reads "Sales requires Orders, which is an element of Sales". The first
//! step is always [`Relation::Start`] and the last member always equals the
//! first one; a self-requirement is `↳ A ⇀ A`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::item::SetupItem;

/// Edge kinds between entries, as shown in cycle explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Beginning of the path, or an owner reaching its own Head.
    Start,
    Requires,
    /// The target declared itself required by the source.
    RequiredBy,
    Generalization,
    ElementOfContainer,
    ElementOfGroup,
    Contains,
}

impl Relation {
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Start => '↳',
            Self::Requires => '⇀',
            Self::RequiredBy => '↽',
            Self::Generalization => '↟',
            Self::ElementOfContainer => '∈',
            Self::ElementOfGroup => '∊',
            Self::Contains => '∋',
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

/// One step of a cycle.
#[derive(Clone)]
pub struct CycleStep {
    pub relation: Relation,
    pub full_name: String,
    pub item: Arc<dyn SetupItem>,
    /// The step is the opening of a container or group.
    pub is_head: bool,
}

impl fmt::Debug for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.relation, self.full_name)
    }
}

/// The first cycle found while ranking.
#[derive(Debug, Clone)]
pub struct CycleExplanation {
    steps: Vec<CycleStep>,
}

impl CycleExplanation {
    pub(crate) const fn new(steps: Vec<CycleStep>) -> Self {
        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[CycleStep] {
        &self.steps
    }

    /// Full names along the path; first and last are equal.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.full_name.as_str()).collect()
    }

    /// Number of distinct entries in the loop.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` when an entry directly depends on itself.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.len() == 1
    }
}

impl fmt::Display for CycleExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{} {}", step.relation, step.full_name)?;
        }
        Ok(())
    }
}
