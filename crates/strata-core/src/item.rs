//! Input contract: the items a sort consumes.
//!
//! # Overview
//!
//! A setup item is any object implementing [`SetupItem`]. Items are shared
//! as `Arc<dyn SetupItem>`; object identity (the `Arc` pointer) is what
//! decides whether two references denote the same item. Relations to other
//! items are expressed with [`ItemRef`], either as a direct object reference
//! or as a full name resolved after every reachable item is known.
//!
//! # Optional references
//!
//! A named reference whose text starts with `?` is optional:
//! `ItemRef::named("?Acme.Audit")` resolves to `Acme.Audit` when it exists
//! and is silently dropped (recorded as informational) when it does not.
//! Object references are never optional since the object is always there.
//!
//! # Kinds
//!
//! [`SetupItem::kind`] is evaluated once, at registration. An item that
//! exposes children but reports [`ItemKind::Item`] refuses to be a group;
//! an object used as a container but reporting anything other than
//! [`ItemKind::Container`] refuses to be a container. Both are structural
//! issues, not errors.

#![allow(clippy::module_name_repetitions)]

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The role an item reports at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A plain item.
    #[default]
    Item,
    /// Non-exclusive membership set: an item may belong to many groups.
    Group,
    /// Exclusive owner: an item has at most one container.
    Container,
}

impl ItemKind {
    /// `true` for [`ItemKind::Group`] and [`ItemKind::Container`].
    #[must_use]
    pub const fn is_group_like(self) -> bool {
        matches!(self, Self::Group | Self::Container)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Group => "group",
            Self::Container => "container",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A setup item participating in a sort.
///
/// Only [`full_name`](SetupItem::full_name) and
/// [`as_any`](SetupItem::as_any) are mandatory; every relation defaults to
/// "none". All declarations are read exactly once, right after
/// [`on_register`](SetupItem::on_register) has run.
pub trait SetupItem: Any {
    /// Unique key of the item. Must be stable once `on_register` returned.
    fn full_name(&self) -> String;

    /// One-shot initialization hook, invoked exactly once per object and
    /// per sort, before any other declaration is read.
    fn on_register(&self) {}

    fn kind(&self) -> ItemKind {
        ItemKind::Item
    }

    fn container(&self) -> Option<ItemRef> {
        None
    }

    fn generalization(&self) -> Option<ItemRef> {
        None
    }

    /// Items that must be ordered before this one.
    fn requires(&self) -> Vec<ItemRef> {
        Vec::new()
    }

    /// Items that must be ordered after this one.
    fn required_by(&self) -> Vec<ItemRef> {
        Vec::new()
    }

    /// Groups this item declares itself a member of.
    fn groups(&self) -> Vec<ItemRef> {
        Vec::new()
    }

    /// Children of a group or container. Ignored (and reported) when the
    /// item reports [`ItemKind::Item`].
    fn children(&self) -> Vec<ItemRef> {
        Vec::new()
    }

    /// Additional items pulled into the sort transitively.
    fn discovered_items(&self) -> Vec<Arc<dyn SetupItem>> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;
}

/// A standalone source of items, passed next to the seed items of a sort.
///
/// Discoverers are consulted once, their items queued after the seed items.
/// Items they return may themselves discover more items through
/// [`SetupItem::discovered_items`].
pub trait ItemDiscoverer {
    fn discover(&self) -> Vec<Arc<dyn SetupItem>>;
}

impl<F> ItemDiscoverer for F
where
    F: Fn() -> Vec<Arc<dyn SetupItem>>,
{
    fn discover(&self) -> Vec<Arc<dyn SetupItem>> {
        self()
    }
}

/// Reference from one item to another.
#[derive(Clone)]
pub enum ItemRef {
    /// Direct reference to an object; always registered with the sort.
    Object(Arc<dyn SetupItem>),
    /// Reference by full name, resolved once every item is registered.
    Named { full_name: String, optional: bool },
}

impl ItemRef {
    /// Build a named reference. A leading `?` marks it optional.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.strip_prefix('?') {
            Some(stripped) => Self::Named {
                full_name: stripped.to_string(),
                optional: true,
            },
            None => Self::Named {
                full_name: name,
                optional: false,
            },
        }
    }

    pub fn object(item: Arc<dyn SetupItem>) -> Self {
        Self::Object(item)
    }

    /// Returns `true` for optional named references.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        match self {
            Self::Object(_) => false,
            Self::Named { optional, .. } => *optional,
        }
    }

    /// The referenced name. For object references this calls
    /// [`SetupItem::full_name`].
    #[must_use]
    pub fn full_name(&self) -> String {
        match self {
            Self::Object(item) => item.full_name(),
            Self::Named { full_name, .. } => full_name.clone(),
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&Arc<dyn SetupItem>> {
        match self {
            Self::Object(item) => Some(item),
            Self::Named { .. } => None,
        }
    }
}

impl fmt::Debug for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(item) => write!(f, "Object({})", item.full_name()),
            Self::Named {
                full_name,
                optional: true,
            } => write!(f, "Named(?{full_name})"),
            Self::Named { full_name, .. } => write!(f, "Named({full_name})"),
        }
    }
}

impl From<&str> for ItemRef {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for ItemRef {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<Arc<dyn SetupItem>> for ItemRef {
    fn from(item: Arc<dyn SetupItem>) -> Self {
        Self::Object(item)
    }
}

/// Identity key of an item object: the address of its shared allocation.
pub(crate) fn identity(item: &Arc<dyn SetupItem>) -> usize {
    Arc::as_ptr(item).cast::<()>() as usize
}
