//! Entry point: register, rank, order.

use std::any::type_name;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::SortOptions;
use crate::error::SortError;
use crate::graph::entry::{EntryGraph, EntryId, RankState, Role};
use crate::graph::rank::{RankComputer, RankOutcome};
use crate::graph::register::{Registerer, Registration};
use crate::item::{ItemDiscoverer, SetupItem};
use crate::result::{SortResult, SortedItem};

type RegisteredHook<'h> = Box<dyn FnMut(&[Arc<dyn SetupItem>]) + 'h>;
type SortedHook<'h> = Box<dyn FnMut(&[SortedItem]) + 'h>;

/// Orders setup items so that every item comes after what it depends on.
///
/// A sorter can run any number of sorts; each one starts from scratch.
///
/// ```
/// use std::sync::Arc;
/// use strata_core::{DependencySorter, ItemDef, SetupItem, SortOptions};
///
/// let items: Vec<Arc<dyn SetupItem>> = vec![
///     ItemDef::new("Orders").depends_on("Customers").shared(),
///     ItemDef::new("Customers").shared(),
/// ];
/// let result = DependencySorter::new(SortOptions::default()).sort(items, &[]);
/// let names: Vec<_> = result
///     .sorted_items()
///     .unwrap_or_default()
///     .iter()
///     .map(|entry| entry.full_name.as_str())
///     .collect();
/// assert_eq!(names, ["Customers", "Orders"]);
/// ```
#[derive(Default)]
pub struct DependencySorter<'h> {
    options: SortOptions,
    on_registered: Option<RegisteredHook<'h>>,
    on_sorted: Option<SortedHook<'h>>,
}

impl<'h> DependencySorter<'h> {
    #[must_use]
    pub fn new(options: SortOptions) -> Self {
        Self {
            options,
            on_registered: None,
            on_sorted: None,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &SortOptions {
        &self.options
    }

    /// Hook called with every registered item once registration is done.
    #[must_use]
    pub fn on_registered(mut self, hook: impl FnMut(&[Arc<dyn SetupItem>]) + 'h) -> Self {
        self.on_registered = Some(Box::new(hook));
        self
    }

    /// Hook called with the order. Not called when a cycle is found.
    #[must_use]
    pub fn on_sorted(mut self, hook: impl FnMut(&[SortedItem]) + 'h) -> Self {
        self.on_sorted = Some(Box::new(hook));
        self
    }

    /// Sort `items`, the items `discoverers` yield, and everything they
    /// reference by object or discover.
    #[instrument(skip_all, fields(reverse_name = self.options.reverse_name))]
    pub fn sort<I>(&mut self, items: I, discoverers: &[&dyn ItemDiscoverer]) -> SortResult
    where
        I: IntoIterator<Item = Arc<dyn SetupItem>>,
    {
        let registration = Registerer::new().register(items, discoverers);
        self.finish(registration)
    }

    /// Like [`sort`](Self::sort), but fails when any registered item,
    /// discovered ones and homonyms that lost their name included, is not
    /// a `T`.
    ///
    /// # Errors
    ///
    /// [`SortError::UnexpectedItemType`] naming the first foreign item in
    /// registration order, then the first foreign homonym. Nothing is
    /// ranked in that case.
    pub fn sort_typed<T, I>(
        &mut self,
        items: I,
        discoverers: &[&dyn ItemDiscoverer],
    ) -> Result<SortResult, SortError>
    where
        T: SetupItem,
        I: IntoIterator<Item = Arc<T>>,
    {
        let registration = Registerer::new().register(
            items.into_iter().map(|item| item as Arc<dyn SetupItem>),
            discoverers,
        );
        let homonyms = registration
            .issues
            .iter()
            .flat_map(|issue| issue.homonyms.iter());
        if let Some(stranger) = registration
            .items
            .iter()
            .chain(homonyms)
            .find(|item| item.as_any().downcast_ref::<T>().is_none())
        {
            return Err(SortError::UnexpectedItemType {
                full_name: stranger.full_name(),
                expected: type_name::<T>(),
            });
        }
        Ok(self.finish(registration))
    }

    fn finish(&mut self, registration: Registration) -> SortResult {
        if let Some(hook) = self.on_registered.as_mut() {
            hook(&registration.items);
        }

        let Registration {
            mut graph, issues, ..
        } = registration;
        let policy = self.options.missing_required_is_structure_error;

        let mut computer = RankComputer::new(&graph, &self.options);
        let ranks = match computer.process() {
            RankOutcome::Ranked(ranks) => ranks,
            RankOutcome::Cycle(cycle) => {
                info!(cycle = %cycle, issues = issues.len(), "sort stopped on a cycle");
                return SortResult::cycle(cycle, issues, policy);
            }
        };
        let dependency_edges = computer.dependency_edges();

        for (index, rank) in ranks.into_iter().enumerate() {
            graph.get_mut(EntryId(index)).rank = RankState::Done(rank);
        }

        let order = self.order(&graph);
        let mut position = vec![0; graph.len()];
        for (index, id) in order.iter().enumerate() {
            position[id.index()] = index;
        }

        let items: Vec<SortedItem> = order
            .iter()
            .enumerate()
            .map(|(index, &id)| sorted_item(&graph, &position, id, index))
            .collect();
        let edges = dependency_edges
            .into_iter()
            .map(|(dependent, relation, dependency)| {
                (position[dependency.index()], position[dependent.index()], relation)
            })
            .collect();

        debug!(entries = items.len(), issues = issues.len(), "sort complete");
        if let Some(hook) = self.on_sorted.as_mut() {
            hook(&items);
        }
        SortResult::sorted(items, edges, issues, policy)
    }

    /// Entries by rank, ties broken by full name.
    fn order(&self, graph: &EntryGraph) -> Vec<EntryId> {
        let mut order: Vec<EntryId> = graph.ids().collect();
        let reverse = self.options.reverse_name;
        order.sort_by(|&a, &b| {
            let (a, b) = (graph.get(a), graph.get(b));
            let by_name = if reverse {
                b.full_name.cmp(&a.full_name)
            } else {
                a.full_name.cmp(&b.full_name)
            };
            a.rank.rank().cmp(&b.rank.rank()).then(by_name)
        });
        order
    }
}

fn sorted_item(graph: &EntryGraph, position: &[usize], id: EntryId, index: usize) -> SortedItem {
    let entry = graph.get(id);
    let at = |id: EntryId| position[id.index()];
    let kind = match entry.role {
        Role::Head { owner } => graph.get(owner).role.kind(),
        _ => entry.role.kind(),
    };

    SortedItem {
        item: Arc::clone(&entry.item),
        full_name: entry.full_name.clone(),
        kind,
        rank: entry.rank.rank().unwrap_or_default(),
        index,
        is_head: entry.is_head(),
        head: entry.role.head().map(at),
        owner: entry.owner().map(at),
        container: entry.container.map(at),
        generalization: entry.generalization.map(at),
        groups: entry.groups.iter().copied().map(at).collect(),
        children: entry.role.children().iter().copied().map(at).collect(),
        requires: entry.requires.iter().copied().map(at).collect(),
        required_by_declarations: entry.required_by.iter().copied().map(at).collect(),
    }
}
