//! Rank computation and first-cycle detection.
//!
//! # Algorithm
//!
//! Depth-first over every entry in registration order, with an explicit
//! frame stack so depth is bounded by memory rather than by the thread
//! stack. An entry's rank is one more than the highest rank among the
//! entries it depends on (0 when it depends on nothing).
//!
//! # Edges
//!
//! A Container/Group owner depends on its Head (`↳`) and on each child
//! (`∋`). A Head or a plain item depends, in this order, on:
//!
//! 1. entries that declared themselves required by it (`↽`),
//! 2. its generalization (`↟`),
//! 3. its requirements (`⇀`),
//! 4. the Head of its container (`∈`),
//! 5. the Head of each of its groups (`∊`).
//!
//! The Head of an owner carries the owner's relations, so everything an
//! owner depends on is ordered before its opening, and everything it
//! contains lands between its Head and itself.
//!
//! # Cycles
//!
//! Meeting an in-progress entry stops the walk. The path from that entry
//! down the frame stack is the cycle; it is reported with owners in place
//! of their Head at both ends and without `owner ↳ owner.Head` steps.

#![allow(clippy::must_use_candidate)]

use tracing::debug;

use crate::config::{ContainerSkipScope, SortOptions};
use crate::cycle::{CycleExplanation, CycleStep, Relation};
use crate::graph::entry::{EntryGraph, EntryId, RankState, Role};

/// Result of ranking a graph.
#[derive(Debug)]
pub enum RankOutcome {
    /// Rank of every entry, indexed by [`EntryId`].
    Ranked(Vec<usize>),
    Cycle(CycleExplanation),
}

struct Frame {
    id: EntryId,
    /// Relation of the edge that reached this entry.
    via: Relation,
    edges: Vec<(Relation, EntryId)>,
    next: usize,
    max_rank: Option<usize>,
}

pub struct RankComputer<'g> {
    graph: &'g EntryGraph,
    options: &'g SortOptions,
    states: Vec<RankState>,
}

impl<'g> RankComputer<'g> {
    pub fn new(graph: &'g EntryGraph, options: &'g SortOptions) -> Self {
        Self {
            graph,
            options,
            states: vec![RankState::Unvisited; graph.len()],
        }
    }

    /// Rank every entry, or stop at the first cycle.
    pub fn process(&mut self) -> RankOutcome {
        for root in self.graph.ids() {
            if self.states[root.index()] != RankState::Unvisited {
                continue;
            }
            if let Some(cycle) = self.compute_rank(root) {
                debug!(cycle = %cycle, "ranking stopped on cycle");
                return RankOutcome::Cycle(cycle);
            }
        }

        let ranks: Vec<usize> = self
            .states
            .iter()
            .map(|state| state.rank().unwrap_or_default())
            .collect();
        debug!(
            entries = ranks.len(),
            max_rank = ranks.iter().max().copied().unwrap_or_default(),
            "ranking complete"
        );
        RankOutcome::Ranked(ranks)
    }

    fn compute_rank(&mut self, root: EntryId) -> Option<CycleExplanation> {
        self.states[root.index()] = RankState::InProgress;
        let mut stack = vec![self.frame(root, Relation::Start)];

        while let Some(top) = stack.last_mut() {
            if let Some(&(relation, target)) = top.edges.get(top.next) {
                top.next += 1;
                match self.states[target.index()] {
                    RankState::Done(rank) => top.max_rank = top.max_rank.max(Some(rank)),
                    RankState::InProgress => return Some(self.explain(&stack, relation, target)),
                    RankState::Unvisited => {
                        self.states[target.index()] = RankState::InProgress;
                        let frame = self.frame(target, relation);
                        stack.push(frame);
                    }
                }
                continue;
            }

            let Some(done) = stack.pop() else { break };
            let rank = done.max_rank.map_or(0, |max| max + 1);
            self.states[done.id.index()] = RankState::Done(rank);
            if let Some(parent) = stack.last_mut() {
                parent.max_rank = parent.max_rank.max(Some(rank));
            }
        }
        None
    }

    /// Every edge ranking follows, as `(dependent, relation, dependency)`.
    pub fn dependency_edges(&self) -> Vec<(EntryId, Relation, EntryId)> {
        self.graph
            .ids()
            .flat_map(|id| {
                self.edges(id)
                    .into_iter()
                    .map(move |(relation, target)| (id, relation, target))
            })
            .collect()
    }

    fn frame(&self, id: EntryId, via: Relation) -> Frame {
        Frame {
            id,
            via,
            edges: self.edges(id),
            next: 0,
            max_rank: None,
        }
    }

    /// Outgoing edges of an entry, in visiting order.
    fn edges(&self, id: EntryId) -> Vec<(Relation, EntryId)> {
        match &self.graph.get(id).role {
            Role::Container { head, children } | Role::Group { head, children } => {
                std::iter::once((Relation::Start, *head))
                    .chain(children.iter().map(|&child| (Relation::Contains, child)))
                    .collect()
            }
            Role::Head { owner } => self.relations(*owner),
            Role::Item => self.relations(id),
        }
    }

    fn relations(&self, id: EntryId) -> Vec<(Relation, EntryId)> {
        let entry = self.graph.get(id);
        let skipped = self.skipped_containers(id);
        let mut edges = Vec::with_capacity(
            entry.required_by.len() + entry.requires.len() + entry.groups.len() + 2,
        );

        for &source in &entry.required_by {
            if Some(source) == entry.generalization || skipped.contains(&source) {
                continue;
            }
            edges.push((Relation::RequiredBy, source));
        }
        if let Some(base) = entry.generalization {
            edges.push((Relation::Generalization, base));
        }
        for &dependency in &entry.requires {
            if skipped.contains(&dependency) {
                continue;
            }
            edges.push((Relation::Requires, dependency));
        }
        if let Some(container) = entry.container {
            edges.push((Relation::ElementOfContainer, self.graph.start_of(container)));
        }
        for &group in &entry.groups {
            edges.push((Relation::ElementOfGroup, self.graph.start_of(group)));
        }
        edges
    }

    /// Containers whose requirement edges are ignored for `id`.
    fn skipped_containers(&self, id: EntryId) -> Vec<EntryId> {
        if !self.options.skip_dependency_to_container {
            return Vec::new();
        }
        match self.options.container_skip_scope {
            ContainerSkipScope::Direct => self.graph.get(id).container.into_iter().collect(),
            ContainerSkipScope::Ancestors => self.graph.container_chain(id),
        }
    }

    fn explain(&self, stack: &[Frame], closing: Relation, target: EntryId) -> CycleExplanation {
        let from = stack.iter().rposition(|f| f.id == target).unwrap_or(0);

        let mut path: Vec<(Relation, EntryId)> = Vec::with_capacity(stack.len() - from + 1);
        path.push((Relation::Start, target));
        path.extend(stack[from + 1..].iter().map(|f| (f.via, f.id)));
        path.push((closing, target));

        let mut steps: Vec<(Relation, EntryId)> = Vec::with_capacity(path.len());
        for (relation, id) in path {
            let opens_previous = relation == Relation::Start
                && steps
                    .last()
                    .is_some_and(|&(_, prev)| prev != id && self.graph.start_of(prev) == id);
            if !opens_previous {
                steps.push((relation, id));
            }
        }

        if let (Some(&(_, first)), Some(&(_, last))) = (steps.first(), steps.last()) {
            if let Some(owner) = self.graph.get(first).owner() {
                if last == first || last == owner {
                    steps[0].1 = owner;
                    let end = steps.len() - 1;
                    steps[end].1 = owner;
                }
            }
        }

        CycleExplanation::new(
            steps
                .into_iter()
                .map(|(relation, id)| {
                    let entry = self.graph.get(id);
                    CycleStep {
                        relation,
                        full_name: entry.full_name.clone(),
                        item: entry.item.clone(),
                        is_head: entry.is_head(),
                    }
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::register::{Registerer, Registration};
    use crate::item::SetupItem;
    use crate::item_def::ItemDef;
    use std::sync::Arc;

    fn register(items: Vec<Arc<ItemDef>>) -> Registration {
        Registerer::new().register(
            items.into_iter().map(|item| item as Arc<dyn SetupItem>),
            &[],
        )
    }

    fn ranks(reg: &Registration, options: &SortOptions) -> Vec<usize> {
        match RankComputer::new(&reg.graph, options).process() {
            RankOutcome::Ranked(ranks) => ranks,
            RankOutcome::Cycle(cycle) => panic!("unexpected cycle: {cycle}"),
        }
    }

    fn cycle(reg: &Registration, options: &SortOptions) -> CycleExplanation {
        match RankComputer::new(&reg.graph, options).process() {
            RankOutcome::Ranked(_) => panic!("expected a cycle"),
            RankOutcome::Cycle(cycle) => cycle,
        }
    }

    fn rank_of(reg: &Registration, ranks: &[usize], name: &str) -> usize {
        let id = reg.graph.find(name).unwrap_or_else(|| panic!("{name}"));
        ranks[id.index()]
    }

    #[test]
    fn chain_ranks_increase() {
        let reg = register(vec![
            ItemDef::new("A").depends_on("B").shared(),
            ItemDef::new("B").depends_on("C").shared(),
            ItemDef::new("C").shared(),
        ]);
        let ranks = ranks(&reg, &SortOptions::default());
        assert_eq!(rank_of(&reg, &ranks, "C"), 0);
        assert_eq!(rank_of(&reg, &ranks, "B"), 1);
        assert_eq!(rank_of(&reg, &ranks, "A"), 2);
    }

    #[test]
    fn empty_container_ranks_head_first() {
        let reg = register(vec![ItemDef::container("C").shared()]);
        let ranks = ranks(&reg, &SortOptions::default());
        let c = reg.graph.find("C").expect("C");
        let head = reg.graph.start_of(c);
        assert_eq!(ranks[head.index()], 0);
        assert_eq!(ranks[c.index()], 1);
    }

    #[test]
    fn container_requirement_is_ordered_before_its_head() {
        let reg = register(vec![
            ItemDef::container("C").depends_on("Dep").with_child("X").shared(),
            ItemDef::new("X").shared(),
            ItemDef::new("Dep").shared(),
        ]);
        let ranks = ranks(&reg, &SortOptions::default());
        let c = reg.graph.find("C").expect("C");
        let head = reg.graph.start_of(c);
        assert!(rank_of(&reg, &ranks, "Dep") < ranks[head.index()]);
        assert!(ranks[head.index()] < rank_of(&reg, &ranks, "X"));
        assert!(rank_of(&reg, &ranks, "X") < ranks[c.index()]);
    }

    #[test]
    fn required_by_orders_declarer_first() {
        let reg = register(vec![
            ItemDef::new("Late").shared(),
            ItemDef::new("Early").dependency_of("Late").shared(),
        ]);
        let ranks = ranks(&reg, &SortOptions::default());
        assert!(rank_of(&reg, &ranks, "Early") < rank_of(&reg, &ranks, "Late"));
    }

    #[test]
    fn mutual_requirement_is_a_cycle() {
        let reg = register(vec![
            ItemDef::new("A").depends_on("B").shared(),
            ItemDef::new("B").depends_on("A").shared(),
        ]);
        let cycle = cycle(&reg, &SortOptions::default());
        assert_eq!(cycle.names(), vec!["A", "B", "A"]);
        assert_eq!(cycle.to_string(), "↳ A ⇀ B ⇀ A");
    }

    #[test]
    fn self_requirement_is_a_one_step_cycle() {
        let reg = register(vec![ItemDef::new("A").depends_on("A").shared()]);
        let cycle = cycle(&reg, &SortOptions::default());
        assert!(cycle.is_self_loop());
        assert_eq!(cycle.names(), vec!["A", "A"]);
    }

    #[test]
    fn requiring_own_container_names_the_container_not_its_head() {
        let reg = register(vec![
            ItemDef::container("C").with_child("X").shared(),
            ItemDef::new("X").depends_on("C").shared(),
        ]);
        let cycle = cycle(&reg, &SortOptions::default());
        let names = cycle.names();
        assert_eq!(names.first(), names.last());
        assert_eq!(names.first(), Some(&"C"));
        assert!(!cycle.to_string().contains("↳ C.Head"));
    }

    #[test]
    fn container_requiring_its_child_explains_through_the_head() {
        let reg = register(vec![
            ItemDef::container("C").depends_on("X").with_child("X").shared(),
            ItemDef::new("X").shared(),
        ]);
        let cycle = cycle(&reg, &SortOptions::default());
        assert_eq!(cycle.to_string(), "↳ C ⇀ X ∈ C");
    }

    #[test]
    fn skip_dependency_to_container_drops_the_edge() {
        let reg = register(vec![
            ItemDef::container("C").with_child("X").shared(),
            ItemDef::new("X").depends_on("C").shared(),
        ]);
        let options = SortOptions::default()
            .with_skip_dependency_to_container(true, ContainerSkipScope::Direct);
        let ranks = ranks(&reg, &options);
        assert!(rank_of(&reg, &ranks, "X") < rank_of(&reg, &ranks, "C"));
    }

    #[test]
    fn skip_dependency_to_container_drops_the_reverse_edge() {
        let items = || -> Vec<Arc<ItemDef>> {
            vec![
                ItemDef::container("C").with_child("X").dependency_of("X").shared(),
                ItemDef::new("X").shared(),
            ]
        };

        let reg = register(items());
        let cycle = cycle(&reg, &SortOptions::default());
        assert_eq!(cycle.names().first(), cycle.names().last());

        for scope in [ContainerSkipScope::Direct, ContainerSkipScope::Ancestors] {
            let options = SortOptions::default().with_skip_dependency_to_container(true, scope);
            let reg = register(items());
            let ranks = ranks(&reg, &options);
            let c = reg.graph.find("C").expect("C");
            let head = reg.graph.start_of(c);
            let x = rank_of(&reg, &ranks, "X");
            assert!(ranks[head.index()] < x);
            assert!(x < ranks[c.index()]);
        }
    }

    #[test]
    fn skip_scope_decides_about_distant_containers() {
        let items = || -> Vec<Arc<ItemDef>> {
            vec![
                ItemDef::container("Outer").with_child("Inner").shared(),
                ItemDef::container("Inner").with_child("X").shared(),
                ItemDef::new("X").depends_on("Outer").shared(),
            ]
        };

        let ancestors = SortOptions::default()
            .with_skip_dependency_to_container(true, ContainerSkipScope::Ancestors);
        let reg = register(items());
        let ranks = ranks(&reg, &ancestors);
        assert!(rank_of(&reg, &ranks, "X") < rank_of(&reg, &ranks, "Outer"));

        let direct = SortOptions::default()
            .with_skip_dependency_to_container(true, ContainerSkipScope::Direct);
        let reg = register(items());
        let cycle = cycle(&reg, &direct);
        assert_eq!(cycle.names().first(), cycle.names().last());
    }

    #[test]
    fn generalization_is_an_implicit_requirement() {
        let reg = register(vec![
            ItemDef::new("ASpec").specializes("A").shared(),
            ItemDef::new("A").shared(),
        ]);
        let ranks = ranks(&reg, &SortOptions::default());
        assert!(rank_of(&reg, &ranks, "A") < rank_of(&reg, &ranks, "ASpec"));
    }

    #[test]
    fn required_by_from_the_generalization_is_not_doubled() {
        let reg = register(vec![
            ItemDef::new("Base").dependency_of("Derived").shared(),
            ItemDef::new("Derived").specializes("Base").shared(),
        ]);
        let options = SortOptions::default();
        let edges = RankComputer::new(&reg.graph, &options).dependency_edges();

        let base = reg.graph.find("Base").expect("Base");
        let derived = reg.graph.find("Derived").expect("Derived");
        assert_eq!(reg.graph.get(derived).required_by, vec![base]);
        assert!(edges.contains(&(derived, Relation::Generalization, base)));
        assert!(!edges.contains(&(derived, Relation::RequiredBy, base)));

        let ranks = ranks(&reg, &options);
        assert!(rank_of(&reg, &ranks, "Base") < rank_of(&reg, &ranks, "Derived"));
    }

    #[test]
    fn group_members_sit_between_head_and_group() {
        let reg = register(vec![
            ItemDef::group("G").shared(),
            ItemDef::new("M").in_group("G").shared(),
        ]);
        let ranks = ranks(&reg, &SortOptions::default());
        let g = reg.graph.find("G").expect("G");
        let head = reg.graph.start_of(g);
        let m = rank_of(&reg, &ranks, "M");
        assert!(ranks[head.index()] < m);
        assert!(m < ranks[g.index()]);
    }

    #[test]
    fn dependency_edges_mirror_ranking() {
        let reg = register(vec![
            ItemDef::container("C").with_child("X").shared(),
            ItemDef::new("X").depends_on("Y").shared(),
            ItemDef::new("Y").shared(),
        ]);
        let options = SortOptions::default();
        let computer = RankComputer::new(&reg.graph, &options);
        let edges = computer.dependency_edges();

        let c = reg.graph.find("C").expect("C");
        let x = reg.graph.find("X").expect("X");
        let y = reg.graph.find("Y").expect("Y");
        let head = reg.graph.start_of(c);
        assert!(edges.contains(&(c, Relation::Start, head)));
        assert!(edges.contains(&(c, Relation::Contains, x)));
        assert!(edges.contains(&(x, Relation::Requires, y)));
        assert!(edges.contains(&(x, Relation::ElementOfContainer, head)));
        assert_eq!(edges.len(), 4);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let depth = 20_000;
        let items: Vec<Arc<ItemDef>> = (0..depth)
            .map(|i| {
                let item = ItemDef::new(format!("N{i:05}"));
                let item = if i + 1 < depth {
                    item.depends_on(format!("N{:05}", i + 1))
                } else {
                    item
                };
                item.shared()
            })
            .collect();
        let reg = register(items);
        let ranks = ranks(&reg, &SortOptions::default());
        assert_eq!(rank_of(&reg, &ranks, "N00000"), depth - 1);
    }
}
