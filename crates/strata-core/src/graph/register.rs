//! Graph builder: discovery, node creation and deferred binding.
//!
//! # Phases
//!
//! 1. **Collection.** Seeds and discoverer output go through a worklist.
//!    Each object (by `Arc` identity) is visited once: its init hook runs,
//!    its declarations are snapshotted into a [`Pending`] record, and the
//!    objects it references are visited depth-first. Items it discovers are
//!    queued behind everything already known.
//! 2. **Materialization.** One entry per distinct full name, in collection
//!    order. A second object under a taken name is a homonym of the first.
//! 3. **Binding.** Every reference is resolved against the complete entry
//!    set, in a fixed order: container-driven children, child-declared
//!    containers, groups, generalizations, container inheritance along
//!    generalization chains, requirements, reverse requirements.
//!
//! Data problems never fail the build; they land in the [`IssueLog`].

#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::graph::entry::{EntryGraph, EntryId};
use crate::issue::{IssueLog, ItemIssue, MissingDependency, StructureError};
use crate::item::{ItemDiscoverer, ItemKind, ItemRef, SetupItem, identity};

/// Declarations of one collected object, read once after its init hook.
struct Pending {
    item: Arc<dyn SetupItem>,
    full_name: String,
    kind: ItemKind,
    container: Option<ItemRef>,
    generalization: Option<ItemRef>,
    requires: Vec<ItemRef>,
    required_by: Vec<ItemRef>,
    groups: Vec<ItemRef>,
    children: Vec<ItemRef>,
}

impl Pending {
    fn snapshot(item: Arc<dyn SetupItem>) -> Self {
        Self {
            full_name: item.full_name(),
            kind: item.kind(),
            container: item.container(),
            generalization: item.generalization(),
            requires: item.requires(),
            required_by: item.required_by(),
            groups: item.groups(),
            children: item.children(),
            item,
        }
    }

    /// Objects to visit before anything else, in declaration order.
    fn referenced_objects(&self) -> Vec<Arc<dyn SetupItem>> {
        self.container
            .iter()
            .chain(self.generalization.iter())
            .chain(self.requires.iter())
            .chain(self.required_by.iter())
            .chain(self.groups.iter())
            .chain(self.children.iter())
            .filter_map(ItemRef::as_object)
            .cloned()
            .collect()
    }
}

/// Outcome of a reference lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolved {
    Found(EntryId),
    Missing { name: String, optional: bool },
}

/// A fully bound graph plus everything found wrong with it.
pub struct Registration {
    pub graph: EntryGraph,
    pub issues: Vec<ItemIssue>,
    /// Materialized items, deduplicated, in registration order.
    pub items: Vec<Arc<dyn SetupItem>>,
}

#[derive(Default)]
pub struct Registerer {
    pending: Vec<Pending>,
    seen: HashSet<usize>,
    queue: VecDeque<Arc<dyn SetupItem>>,
    graph: EntryGraph,
    issues: IssueLog,
    by_identity: HashMap<usize, EntryId>,
}

impl Registerer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `items` and whatever `discoverers` yield, then bind.
    pub fn register<I>(mut self, items: I, discoverers: &[&dyn ItemDiscoverer]) -> Registration
    where
        I: IntoIterator<Item = Arc<dyn SetupItem>>,
    {
        self.queue.extend(items);
        for discoverer in discoverers {
            self.queue.extend(discoverer.discover());
        }
        while let Some(item) = self.queue.pop_front() {
            self.collect(item);
        }

        let pending = std::mem::take(&mut self.pending);
        let decls = self.materialize(&pending);

        self.bind_children(&pending, &decls);
        self.bind_declared_containers(&pending, &decls);
        self.bind_groups(&pending, &decls);
        self.bind_generalizations(&pending, &decls);
        self.inherit_containers(&decls);
        self.bind_requirements(&pending, &decls);
        self.bind_reverse_requirements(&pending, &decls);

        let items: Vec<Arc<dyn SetupItem>> = decls
            .iter()
            .map(|&(id, _)| Arc::clone(&self.graph.get(id).item))
            .collect();

        debug!(
            collected = pending.len(),
            items = items.len(),
            entries = self.graph.len(),
            "registration complete"
        );

        Registration {
            graph: self.graph,
            issues: self.issues.into_vec(),
            items,
        }
    }

    // -----------------------------------------------------------------------
    // Collection
    // -----------------------------------------------------------------------

    fn collect(&mut self, root: Arc<dyn SetupItem>) {
        let mut stack = vec![root];
        while let Some(item) = stack.pop() {
            if !self.seen.insert(identity(&item)) {
                continue;
            }
            item.on_register();
            let pending = Pending::snapshot(item);
            trace!(item = %pending.full_name, kind = %pending.kind, "collected");

            let mut referenced = pending.referenced_objects();
            referenced.reverse();
            stack.extend(referenced);
            self.queue.extend(pending.item.discovered_items());
            self.pending.push(pending);
        }
    }

    /// Create entries; returns `(entry, pending index)` for every
    /// materialized object.
    fn materialize(&mut self, pending: &[Pending]) -> Vec<(EntryId, usize)> {
        let mut decls = Vec::with_capacity(pending.len());
        for (idx, p) in pending.iter().enumerate() {
            let key = identity(&p.item);
            if let Some(existing) = self.graph.find(&p.full_name) {
                let winner = self.graph.get(existing);
                let issue = self
                    .issues
                    .flag(&winner.item, &winner.full_name, StructureError::HOMONYM);
                issue.homonyms.push(Arc::clone(&p.item));
                debug!(item = %p.full_name, "homonym dropped");
                self.by_identity.insert(key, existing);
                continue;
            }
            let id = self
                .graph
                .insert(p.full_name.clone(), Arc::clone(&p.item), p.kind);
            self.by_identity.insert(key, id);
            decls.push((id, idx));
        }
        decls
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    fn resolve(&self, reference: &ItemRef) -> Resolved {
        match reference {
            ItemRef::Object(item) => {
                if let Some(&id) = self.by_identity.get(&identity(item)) {
                    return Resolved::Found(id);
                }
                let name = item.full_name();
                self.graph
                    .find(&name)
                    .map_or(Resolved::Missing { name, optional: false }, Resolved::Found)
            }
            ItemRef::Named {
                full_name,
                optional,
            } => self.graph.find(full_name).map_or_else(
                || Resolved::Missing {
                    name: full_name.clone(),
                    optional: *optional,
                },
                Resolved::Found,
            ),
        }
    }

    fn issue(&mut self, id: EntryId) -> &mut ItemIssue {
        let entry = self.graph.get(id);
        self.issues.entry(&entry.item, &entry.full_name)
    }

    fn flag(&mut self, id: EntryId, flag: StructureError) -> &mut ItemIssue {
        let issue = self.issue(id);
        issue.flags |= flag;
        issue
    }

    /// Make `container` the container of `child`, unless it already has one.
    fn claim(&mut self, container: EntryId, child: EntryId) {
        match self.graph.get(child).container {
            None => {
                self.graph.get_mut(child).container = Some(container);
                self.graph.push_child(container, child);
                trace!(
                    child = %self.graph.get(child).full_name,
                    container = %self.graph.get(container).full_name,
                    "contained"
                );
            }
            Some(current) if current == container => {}
            Some(_) => {
                let name = self.graph.get(container).full_name.clone();
                self.flag(child, StructureError::MULTIPLE_CONTAINER)
                    .extraneous_containers
                    .push(name);
            }
        }
    }

    fn join_group(&mut self, member: EntryId, group: EntryId) {
        let groups = &mut self.graph.get_mut(member).groups;
        if !groups.contains(&group) {
            groups.push(group);
        }
        self.graph.push_child(group, member);
    }

    fn bind_children(&mut self, pending: &[Pending], decls: &[(EntryId, usize)]) {
        for &(owner, idx) in decls {
            let p = &pending[idx];
            if p.children.is_empty() {
                continue;
            }
            if p.kind == ItemKind::Item {
                self.flag(
                    owner,
                    StructureError::CONTAINER_ASKED_TO_NOT_BE_A_GROUP_BUT_CONTAINS_CHILDREN,
                );
                continue;
            }
            for child in &p.children {
                match self.resolve(child) {
                    Resolved::Found(child) if p.kind == ItemKind::Container => {
                        self.claim(owner, child);
                    }
                    Resolved::Found(child) => self.join_group(child, owner),
                    Resolved::Missing { name, optional } => {
                        if optional {
                            trace!(owner = %p.full_name, child = %name, "optional child missing");
                        } else {
                            self.flag(owner, StructureError::MISSING_NAMED_CHILD)
                                .missing_children
                                .push(name);
                        }
                    }
                }
            }
        }
    }

    fn bind_declared_containers(&mut self, pending: &[Pending], decls: &[(EntryId, usize)]) {
        for &(id, idx) in decls {
            let Some(reference) = &pending[idx].container else {
                continue;
            };
            match self.resolve(reference) {
                Resolved::Found(container) => {
                    if self.graph.get(container).role.kind() == ItemKind::Container {
                        self.claim(container, id);
                    } else if reference.as_object().is_some() {
                        self.flag(
                            id,
                            StructureError::EXISTING_CONTAINER_ASKED_TO_NOT_BE_A_CONTAINER,
                        );
                    } else {
                        self.flag(id, StructureError::EXISTING_ITEM_IS_NOT_A_CONTAINER);
                    }
                }
                Resolved::Missing { name, optional } => {
                    if optional {
                        trace!(item = %pending[idx].full_name, container = %name, "optional container missing");
                    } else {
                        self.flag(id, StructureError::MISSING_NAMED_CONTAINER)
                            .missing_container = Some(name);
                    }
                }
            }
        }
    }

    fn bind_groups(&mut self, pending: &[Pending], decls: &[(EntryId, usize)]) {
        for &(id, idx) in decls {
            for reference in &pending[idx].groups {
                match self.resolve(reference) {
                    Resolved::Found(group) => {
                        if self.graph.get(group).role.kind().is_group_like() {
                            self.join_group(id, group);
                        } else {
                            self.flag(id, StructureError::DECLARED_GROUP_REFUSED_TO_BE_A_GROUP);
                        }
                    }
                    Resolved::Missing { name, optional } => {
                        if !optional {
                            self.flag(id, StructureError::MISSING_NAMED_GROUP)
                                .missing_groups
                                .push(name);
                        }
                    }
                }
            }
        }
    }

    fn bind_generalizations(&mut self, pending: &[Pending], decls: &[(EntryId, usize)]) {
        for &(id, idx) in decls {
            let Some(reference) = &pending[idx].generalization else {
                continue;
            };
            match self.resolve(reference) {
                Resolved::Found(base) => self.graph.get_mut(id).generalization = Some(base),
                Resolved::Missing { name, optional } => {
                    if !optional {
                        self.flag(id, StructureError::MISSING_GENERALIZATION)
                            .missing_generalization = Some(name);
                    }
                }
            }
        }
    }

    /// Entries without a container take the one of their nearest
    /// generalization that has one. Each chain is walked once.
    fn inherit_containers(&mut self, decls: &[(EntryId, usize)]) {
        let mut done = vec![false; self.graph.len()];
        for &(start, _) in decls {
            if done[start.index()] {
                continue;
            }
            let mut chain = Vec::new();
            let mut cursor = Some(start);
            while let Some(current) = cursor {
                if done[current.index()] || chain.contains(&current) {
                    break;
                }
                chain.push(current);
                let entry = self.graph.get(current);
                if entry.container.is_some() {
                    break;
                }
                cursor = entry.generalization;
            }

            let mut inherited = chain
                .last()
                .and_then(|&last| self.graph.get(last).generalization)
                .filter(|base| done[base.index()])
                .and_then(|base| self.graph.get(base).container);

            for &id in chain.iter().rev() {
                match self.graph.get(id).container {
                    Some(own) => inherited = Some(own),
                    None => {
                        if let Some(container) = inherited.filter(|&c| c != id) {
                            self.claim(container, id);
                        }
                    }
                }
                done[id.index()] = true;
            }
        }
    }

    fn bind_requirements(&mut self, pending: &[Pending], decls: &[(EntryId, usize)]) {
        for &(id, idx) in decls {
            // name -> (position, optional); a required form hides an optional one
            let mut unique: Vec<(&ItemRef, String, bool)> = Vec::new();
            let mut positions: HashMap<String, usize> = HashMap::new();
            for reference in &pending[idx].requires {
                let name = reference.full_name();
                let optional = reference.is_optional();
                match positions.get(&name) {
                    Some(&pos) => {
                        if !optional && unique[pos].2 {
                            unique[pos] = (reference, name, false);
                        }
                    }
                    None => {
                        positions.insert(name.clone(), unique.len());
                        unique.push((reference, name, optional));
                    }
                }
            }

            for (reference, name, optional) in unique {
                match self.resolve(reference) {
                    Resolved::Found(dependency) => {
                        let requires = &mut self.graph.get_mut(id).requires;
                        if !requires.contains(&dependency) {
                            requires.push(dependency);
                        }
                    }
                    Resolved::Missing { .. } => {
                        let issue = self.issue(id);
                        if !optional {
                            issue.flags |= StructureError::MISSING_DEPENDENCY;
                        }
                        issue
                            .missing_dependencies
                            .push(MissingDependency { name, optional });
                    }
                }
            }
        }
    }

    fn bind_reverse_requirements(&mut self, pending: &[Pending], decls: &[(EntryId, usize)]) {
        for &(id, idx) in decls {
            for reference in &pending[idx].required_by {
                match self.resolve(reference) {
                    Resolved::Found(dependent) => {
                        let required_by = &mut self.graph.get_mut(dependent).required_by;
                        if !required_by.contains(&id) {
                            required_by.push(id);
                        }
                    }
                    Resolved::Missing { name, .. } => {
                        trace!(item = %pending[idx].full_name, dependent = %name, "required-by target not registered");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item_def::ItemDef;

    fn register(items: Vec<Arc<dyn SetupItem>>) -> Registration {
        Registerer::new().register(items, &[])
    }

    fn id(reg: &Registration, name: &str) -> EntryId {
        reg.graph.find(name).unwrap_or_else(|| panic!("{name} not registered"))
    }

    #[test]
    fn referenced_objects_are_collected_once() {
        let shared = ItemDef::new("Shared").shared();
        let a: Arc<dyn SetupItem> = ItemDef::new("A").depends_on(&shared).shared();
        let b: Arc<dyn SetupItem> = ItemDef::new("B").depends_on(&shared).in_group("?G").shared();

        let reg = register(vec![a, b]);
        assert_eq!(reg.items.len(), 3);
        assert_eq!(shared.init_count(), 1);
        assert!(reg.issues.is_empty());
    }

    #[test]
    fn named_references_resolve_after_collection() {
        let a: Arc<dyn SetupItem> = ItemDef::new("A").depends_on("B").shared();
        let b: Arc<dyn SetupItem> = ItemDef::new("B").shared();
        let reg = register(vec![a, b]);

        let a = id(&reg, "A");
        let b = id(&reg, "B");
        assert_eq!(reg.graph.get(a).requires, vec![b]);
    }

    #[test]
    fn container_claims_children_and_children_join() {
        let x = ItemDef::new("X").shared();
        let c: Arc<dyn SetupItem> = ItemDef::container("C").with_child(&x).with_child("Y").shared();
        let y: Arc<dyn SetupItem> = ItemDef::new("Y").in_container("C").shared();

        let reg = register(vec![c, y]);
        let c = id(&reg, "C");
        let x = id(&reg, "X");
        let y = id(&reg, "Y");
        assert_eq!(reg.graph.get(x).container, Some(c));
        assert_eq!(reg.graph.get(y).container, Some(c));
        assert_eq!(reg.graph.get(c).role.children(), &[x, y]);
        assert!(reg.issues.is_empty());
    }

    #[test]
    fn conflicting_container_keeps_the_container_driven_binding() {
        let x: Arc<dyn SetupItem> = ItemDef::new("X").in_container("C2").shared();
        let c1: Arc<dyn SetupItem> = ItemDef::container("C1").with_child("X").shared();
        let c2: Arc<dyn SetupItem> = ItemDef::container("C2").shared();

        let reg = register(vec![x, c1, c2]);
        assert_eq!(reg.graph.get(id(&reg, "X")).container, Some(id(&reg, "C1")));
        assert_eq!(reg.issues.len(), 1);
        assert_eq!(reg.issues[0].full_name, "X");
        assert_eq!(reg.issues[0].flags, StructureError::MULTIPLE_CONTAINER);
        assert_eq!(reg.issues[0].extraneous_containers, vec!["C2".to_string()]);
    }

    #[test]
    fn named_container_that_is_an_item_is_reported() {
        let x: Arc<dyn SetupItem> = ItemDef::new("X").in_container("NotAContainer").shared();
        let other: Arc<dyn SetupItem> = ItemDef::new("NotAContainer").shared();
        let reg = register(vec![x, other]);

        assert_eq!(reg.graph.get(id(&reg, "X")).container, None);
        assert_eq!(
            reg.issues[0].flags,
            StructureError::EXISTING_ITEM_IS_NOT_A_CONTAINER
        );
    }

    #[test]
    fn object_container_refusing_its_kind_is_reported() {
        let refusing = ItemDef::new("Refusing").shared();
        let x: Arc<dyn SetupItem> = ItemDef::new("X").in_container(&refusing).shared();
        let reg = register(vec![x]);
        assert_eq!(
            reg.issues[0].flags,
            StructureError::EXISTING_CONTAINER_ASKED_TO_NOT_BE_A_CONTAINER
        );
    }

    #[test]
    fn item_with_children_refuses_to_be_a_group() {
        let odd: Arc<dyn SetupItem> = ItemDef::new("Odd").with_child("A").shared();
        let a: Arc<dyn SetupItem> = ItemDef::new("A").shared();
        let reg = register(vec![odd, a]);
        assert_eq!(
            reg.issues[0].flags,
            StructureError::CONTAINER_ASKED_TO_NOT_BE_A_GROUP_BUT_CONTAINS_CHILDREN
        );
        assert_eq!(reg.graph.get(id(&reg, "A")).groups, Vec::<EntryId>::new());
    }

    #[test]
    fn group_reference_to_item_is_refused() {
        let a: Arc<dyn SetupItem> = ItemDef::new("A").in_group("B").in_group("Missing").shared();
        let b: Arc<dyn SetupItem> = ItemDef::new("B").shared();
        let reg = register(vec![a, b]);
        let issue = &reg.issues[0];
        assert_eq!(
            issue.flags,
            StructureError::DECLARED_GROUP_REFUSED_TO_BE_A_GROUP | StructureError::MISSING_NAMED_GROUP
        );
        assert_eq!(issue.missing_groups, vec!["Missing".to_string()]);
    }

    #[test]
    fn homonym_keeps_the_first_object() {
        let first: Arc<dyn SetupItem> = ItemDef::new("Dup").depends_on("?A").shared();
        let second: Arc<dyn SetupItem> = ItemDef::new("Dup").shared();
        let reg = register(vec![Arc::clone(&first), second]);

        assert_eq!(reg.items.len(), 1);
        assert!(Arc::ptr_eq(&reg.items[0], &first));
        let issue = &reg.issues[0];
        assert!(issue.flags.contains(StructureError::HOMONYM));
        assert_eq!(issue.homonyms.len(), 1);
    }

    #[test]
    fn required_form_hides_optional_form() {
        let a: Arc<dyn SetupItem> = ItemDef::new("A")
            .depends_on("?X")
            .depends_on("X")
            .depends_on("?X")
            .depends_on("?Y")
            .shared();
        let reg = register(vec![a]);
        let issue = &reg.issues[0];
        assert_eq!(issue.flags, StructureError::MISSING_DEPENDENCY);
        assert_eq!(
            issue.missing_dependencies,
            vec![
                MissingDependency {
                    name: "X".into(),
                    optional: false
                },
                MissingDependency {
                    name: "Y".into(),
                    optional: true
                },
            ]
        );
    }

    #[test]
    fn generalization_container_is_inherited_through_the_chain() {
        let root: Arc<dyn SetupItem> = ItemDef::container("Root").shared();
        let a: Arc<dyn SetupItem> = ItemDef::new("A").in_container("Root").shared();
        let mid: Arc<dyn SetupItem> = ItemDef::new("AMid").specializes("A").shared();
        let derived: Arc<dyn SetupItem> = ItemDef::new("ASpec").specializes("AMid").shared();

        let reg = register(vec![derived, mid, a, root]);
        let root = id(&reg, "Root");
        assert_eq!(reg.graph.get(id(&reg, "AMid")).container, Some(root));
        assert_eq!(reg.graph.get(id(&reg, "ASpec")).container, Some(root));
    }

    #[test]
    fn explicit_container_wins_over_inheritance() {
        let root: Arc<dyn SetupItem> = ItemDef::container("Root").shared();
        let other: Arc<dyn SetupItem> = ItemDef::container("Other").shared();
        let a: Arc<dyn SetupItem> = ItemDef::new("A").in_container("Root").shared();
        let derived: Arc<dyn SetupItem> = ItemDef::new("ASpec")
            .specializes("A")
            .in_container("Other")
            .shared();

        let reg = register(vec![root, other, a, derived]);
        assert_eq!(
            reg.graph.get(id(&reg, "ASpec")).container,
            Some(id(&reg, "Other"))
        );
    }

    #[test]
    fn generalization_loops_do_not_hang() {
        let a: Arc<dyn SetupItem> = ItemDef::new("A").specializes("B").shared();
        let b: Arc<dyn SetupItem> = ItemDef::new("B").specializes("A").shared();
        let reg = register(vec![a, b]);
        assert_eq!(reg.graph.get(id(&reg, "A")).container, None);
    }

    #[test]
    fn missing_generalization_is_reported_unless_optional() {
        let a: Arc<dyn SetupItem> = ItemDef::new("A").specializes("Base").shared();
        let b: Arc<dyn SetupItem> = ItemDef::new("B").specializes("?Base").shared();
        let reg = register(vec![a, b]);
        assert_eq!(reg.issues.len(), 1);
        assert_eq!(reg.issues[0].full_name, "A");
        assert_eq!(reg.issues[0].missing_generalization.as_deref(), Some("Base"));
    }

    #[test]
    fn required_by_is_recorded_on_the_dependent() {
        let a: Arc<dyn SetupItem> = ItemDef::new("A").dependency_of("B").dependency_of("Ghost").shared();
        let b: Arc<dyn SetupItem> = ItemDef::new("B").shared();
        let reg = register(vec![a, b]);
        assert_eq!(reg.graph.get(id(&reg, "B")).required_by, vec![id(&reg, "A")]);
        assert!(reg.issues.is_empty());
    }

    #[test]
    fn required_by_objects_are_registered() {
        let target = ItemDef::new("T").shared();
        let a: Arc<dyn SetupItem> = ItemDef::new("A").dependency_of(&target).shared();
        let reg = register(vec![a]);

        assert_eq!(reg.items.len(), 2);
        assert_eq!(target.init_count(), 1);
        assert_eq!(reg.graph.get(id(&reg, "T")).required_by, vec![id(&reg, "A")]);
        assert!(reg.issues.is_empty());
    }

    #[test]
    fn discovered_items_are_registered_transitively() {
        let deep = ItemDef::new("Deep").shared();
        let mid = ItemDef::new("Mid").discovers(deep.clone()).shared();
        let top: Arc<dyn SetupItem> = ItemDef::new("Top").discovers(mid).shared();

        let reg = register(vec![top]);
        assert_eq!(reg.items.len(), 3);
        assert!(reg.graph.find("Deep").is_some());
        assert_eq!(deep.init_count(), 1);
    }

    #[test]
    fn standalone_discoverers_feed_the_worklist() {
        let extra = ItemDef::new("Extra").shared();
        let source = {
            let extra = extra.clone();
            move || vec![extra.clone() as Arc<dyn SetupItem>]
        };
        let reg = Registerer::new().register(Vec::new(), &[&source]);
        assert_eq!(reg.items.len(), 1);
        assert_eq!(extra.init_count(), 1);
    }
}
