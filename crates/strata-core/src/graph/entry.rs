//! Arena of graph entries.
//!
//! Every registered item becomes one [`Entry`]; every Container or Group
//! additionally owns a synthetic Head entry marking its opening. Entries
//! reference each other through [`EntryId`] indices only, so containment
//! back-pointers and cyclic declarations need no shared ownership.

#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn,
)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::item::{ItemKind, SetupItem};

/// Stable index of an entry in an [`EntryGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an entry stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Item,
    /// Opening of the Container or Group `owner`.
    Head { owner: EntryId },
    Container { head: EntryId, children: Vec<EntryId> },
    Group { head: EntryId, children: Vec<EntryId> },
}

impl Role {
    pub const fn head(&self) -> Option<EntryId> {
        match self {
            Self::Container { head, .. } | Self::Group { head, .. } => Some(*head),
            Self::Item | Self::Head { .. } => None,
        }
    }

    pub fn children(&self) -> &[EntryId] {
        match self {
            Self::Container { children, .. } | Self::Group { children, .. } => children,
            Self::Item | Self::Head { .. } => &[],
        }
    }

    pub const fn kind(&self) -> ItemKind {
        match self {
            Self::Item | Self::Head { .. } => ItemKind::Item,
            Self::Container { .. } => ItemKind::Container,
            Self::Group { .. } => ItemKind::Group,
        }
    }
}

/// Ranking progress of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankState {
    #[default]
    Unvisited,
    InProgress,
    Done(usize),
}

impl RankState {
    pub const fn rank(self) -> Option<usize> {
        match self {
            Self::Done(rank) => Some(rank),
            Self::Unvisited | Self::InProgress => None,
        }
    }
}

/// A node of the dependency graph.
///
/// Relations are only filled on item/owner entries; a Head carries none
/// of its own and borrows its owner's when ranked.
#[derive(Clone)]
pub struct Entry {
    pub full_name: String,
    pub item: Arc<dyn SetupItem>,
    pub role: Role,
    /// Resolved requirements, deduplicated.
    pub requires: Vec<EntryId>,
    /// Entries that declared themselves required by this one.
    pub required_by: Vec<EntryId>,
    pub generalization: Option<EntryId>,
    pub container: Option<EntryId>,
    pub groups: Vec<EntryId>,
    pub rank: RankState,
}

impl Entry {
    fn new(full_name: String, item: Arc<dyn SetupItem>, role: Role) -> Self {
        Self {
            full_name,
            item,
            role,
            requires: Vec::new(),
            required_by: Vec::new(),
            generalization: None,
            container: None,
            groups: Vec::new(),
            rank: RankState::Unvisited,
        }
    }

    pub const fn is_head(&self) -> bool {
        matches!(self.role, Role::Head { .. })
    }

    pub const fn owner(&self) -> Option<EntryId> {
        match self.role {
            Role::Head { owner } => Some(owner),
            _ => None,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("full_name", &self.full_name)
            .field("role", &self.role)
            .field("requires", &self.requires)
            .field("required_by", &self.required_by)
            .field("generalization", &self.generalization)
            .field("container", &self.container)
            .field("groups", &self.groups)
            .field("rank", &self.rank)
            .finish()
    }
}

/// Name under which a Head entry is registered and displayed.
pub fn head_name(owner: &str) -> String {
    format!("{owner}.Head")
}

/// The entry arena plus the name index.
#[derive(Debug, Default)]
pub struct EntryGraph {
    entries: Vec<Entry>,
    by_name: HashMap<String, EntryId>,
}

impl EntryGraph {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntryId> + use<> {
        (0..self.entries.len()).map(EntryId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (EntryId(idx), entry))
    }

    pub fn get(&self, id: EntryId) -> &Entry {
        &self.entries[id.0]
    }

    pub fn get_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.0]
    }

    /// Look up an item or owner entry by full name. Heads are not indexed.
    pub fn find(&self, full_name: &str) -> Option<EntryId> {
        self.by_name.get(full_name).copied()
    }

    /// Insert an entry for `item`. Containers and groups get their Head
    /// right after them.
    ///
    /// The caller guarantees `full_name` is not registered yet.
    pub fn insert(&mut self, full_name: String, item: Arc<dyn SetupItem>, kind: ItemKind) -> EntryId {
        let id = EntryId(self.entries.len());
        let role = match kind {
            ItemKind::Item => Role::Item,
            ItemKind::Container => Role::Container {
                head: EntryId(id.0 + 1),
                children: Vec::new(),
            },
            ItemKind::Group => Role::Group {
                head: EntryId(id.0 + 1),
                children: Vec::new(),
            },
        };
        let has_head = role.head().is_some();
        self.entries
            .push(Entry::new(full_name.clone(), Arc::clone(&item), role));
        if has_head {
            self.entries.push(Entry::new(
                head_name(&full_name),
                item,
                Role::Head { owner: id },
            ));
        }
        self.by_name.insert(full_name, id);
        id
    }

    /// Head of an owner entry; items and heads are their own start.
    pub fn start_of(&self, id: EntryId) -> EntryId {
        self.get(id).role.head().unwrap_or(id)
    }

    /// Owner of a Head entry; other entries are their own owner.
    pub fn owner_of(&self, id: EntryId) -> EntryId {
        self.get(id).owner().unwrap_or(id)
    }

    /// Add `child` to the children of the owner `parent`.
    ///
    /// Returns `false` when `parent` is not a Container/Group or when the
    /// child is already listed.
    pub fn push_child(&mut self, parent: EntryId, child: EntryId) -> bool {
        match &mut self.entries[parent.0].role {
            Role::Container { children, .. } | Role::Group { children, .. } => {
                if children.contains(&child) {
                    false
                } else {
                    children.push(child);
                    true
                }
            }
            Role::Item | Role::Head { .. } => false,
        }
    }

    /// Container chain of an entry, nearest first.
    pub fn container_chain(&self, id: EntryId) -> Vec<EntryId> {
        let mut chain = Vec::new();
        let mut cursor = self.get(id).container;
        while let Some(container) = cursor {
            if container == id || chain.contains(&container) {
                break;
            }
            chain.push(container);
            cursor = self.get(container).container;
        }
        chain
    }
}
