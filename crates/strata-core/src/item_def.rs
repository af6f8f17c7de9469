//! A plain-data [`SetupItem`] implementation.
//!
//! [`ItemDef`] is what declarative graphs (and the test-suite) use instead
//! of a reflection-driven item model: every relation is stored as given.
//! It also records how many times its init hook ran, and can defer its full
//! name until registration when built with a namespace.
//!
//! ```rust,ignore
//! use strata_core::{ItemDef, ItemKind};
//!
//! let root = ItemDef::container("Root").shared();
//! let table = ItemDef::new("Orders").in_container(root.clone()).depends_on("?Audit").shared();
//! ```

#![allow(clippy::must_use_candidate)]

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::item::{ItemKind, ItemRef, SetupItem};

#[derive(Default)]
pub struct ItemDef {
    name: String,
    namespace: Option<String>,
    resolved_name: OnceLock<String>,
    kind: ItemKind,
    container: Option<ItemRef>,
    generalization: Option<ItemRef>,
    requires: Vec<ItemRef>,
    required_by: Vec<ItemRef>,
    groups: Vec<ItemRef>,
    children: Vec<ItemRef>,
    discovers: Vec<Arc<dyn SetupItem>>,
    init_count: AtomicUsize,
}

impl ItemDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(ItemKind::Container)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(ItemKind::Group)
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    /// Prefix the name with `namespace.` once the item is registered.
    /// Until then [`SetupItem::full_name`] returns the bare name.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn in_container(mut self, container: impl Into<ItemRef>) -> Self {
        self.container = Some(container.into());
        self
    }

    #[must_use]
    pub fn specializes(mut self, generalization: impl Into<ItemRef>) -> Self {
        self.generalization = Some(generalization.into());
        self
    }

    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<ItemRef>) -> Self {
        self.requires.push(dependency.into());
        self
    }

    #[must_use]
    pub fn dependency_of(mut self, dependent: impl Into<ItemRef>) -> Self {
        self.required_by.push(dependent.into());
        self
    }

    #[must_use]
    pub fn in_group(mut self, group: impl Into<ItemRef>) -> Self {
        self.groups.push(group.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: impl Into<ItemRef>) -> Self {
        self.children.push(child.into());
        self
    }

    #[must_use]
    pub fn discovers(mut self, item: Arc<dyn SetupItem>) -> Self {
        self.discovers.push(item);
        self
    }

    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of times [`SetupItem::on_register`] ran on this object.
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::Relaxed)
    }
}

impl SetupItem for ItemDef {
    fn full_name(&self) -> String {
        self.resolved_name
            .get()
            .cloned()
            .unwrap_or_else(|| self.name.clone())
    }

    fn on_register(&self) {
        self.init_count.fetch_add(1, Ordering::Relaxed);
        let full = match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        };
        let _ = self.resolved_name.set(full);
    }

    fn kind(&self) -> ItemKind {
        self.kind
    }

    fn container(&self) -> Option<ItemRef> {
        self.container.clone()
    }

    fn generalization(&self) -> Option<ItemRef> {
        self.generalization.clone()
    }

    fn requires(&self) -> Vec<ItemRef> {
        self.requires.clone()
    }

    fn required_by(&self) -> Vec<ItemRef> {
        self.required_by.clone()
    }

    fn groups(&self) -> Vec<ItemRef> {
        self.groups.clone()
    }

    fn children(&self) -> Vec<ItemRef> {
        self.children.clone()
    }

    fn discovered_items(&self) -> Vec<Arc<dyn SetupItem>> {
        self.discovers.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ItemDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemDef")
            .field("full_name", &self.full_name())
            .field("kind", &self.kind)
            .field("container", &self.container)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

impl From<Arc<ItemDef>> for ItemRef {
    fn from(item: Arc<ItemDef>) -> Self {
        Self::Object(item)
    }
}

impl From<&Arc<ItemDef>> for ItemRef {
    fn from(item: &Arc<ItemDef>) -> Self {
        Self::Object(item.clone())
    }
}
