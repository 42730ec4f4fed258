//! The password tree: categories containing categories and entries, entries
//! containing an ordered list of properties.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A parent owns its
//! children exclusively; the `parent` link is a plain id used for navigation.
//!
//! Every mutating call notifies the registered observers once the mutation is
//! complete. Out-of-range indices and wrong node kinds are rejected with
//! `false`/`None` and leave the tree untouched.

use std::fmt;

use coffre_crypto_core::{CryptoError, PasswordStrength, StrengthEstimator};

use crate::error::VaultError;
use crate::property::{Property, PropertyType};

/// Handle to a node of a [`PasswordTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Handle returned by [`PasswordTree::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(usize);

/// Either a container of nodes or a leaf holding properties, never both.
#[derive(Debug)]
pub enum NodeKind {
    Category { children: Vec<NodeId> },
    Entry { properties: Vec<Property> },
}

/// One node of the tree.
#[derive(Debug)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    kind: NodeKind,
    is_open: bool,
    is_selected: bool,
}

impl Node {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_category(&self) -> bool {
        matches!(self.kind, NodeKind::Category { .. })
    }

    /// Expanded state of a category; always `false` for entries.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.is_open
    }

    #[must_use]
    pub const fn is_selected(&self) -> bool {
        self.is_selected
    }

    /// Child nodes of a category; empty for entries.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Category { children } => children,
            NodeKind::Entry { .. } => &[],
        }
    }

    /// Properties of an entry; empty for categories.
    #[must_use]
    pub fn properties(&self) -> &[Property] {
        match &self.kind {
            NodeKind::Entry { properties } => properties,
            NodeKind::Category { .. } => &[],
        }
    }
}

/// A single change to a property.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyEdit {
    Key(String),
    Value(String),
    Type(PropertyType),
    Encrypted(bool),
    Hidden(bool),
}

/// Notification sent to observers after a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeEvent {
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    NodeRenamed(NodeId),
    /// Open or selected flag changed.
    NodeStateChanged(NodeId),
    PropertyAppended { node: NodeId, index: usize },
    PropertyChanged { node: NodeId, index: usize },
    PropertyMoved { node: NodeId, from: usize, to: usize },
    PropertyRemoved { node: NodeId, index: usize },
    PropertiesCleared(NodeId),
    StrengthRecomputed,
    Cleared,
}

impl TreeEvent {
    /// Events that change persisted content. Open/selected state changes are
    /// advisory and do not count.
    #[must_use]
    pub const fn modifies_document(&self) -> bool {
        !matches!(self, Self::NodeStateChanged(_) | Self::StrengthRecomputed)
    }
}

type Observer = Box<dyn FnMut(&TreeEvent)>;

/// Arena-backed tree of categories and entries.
///
/// Slots freed by [`PasswordTree::remove_node`] are reused by later inserts,
/// so a [`NodeId`] must not be kept past the removal of its node.
pub struct PasswordTree {
    nodes: Vec<Option<Node>>,
    /// Indices of empty slots in `nodes`.
    free: Vec<usize>,
    roots: Vec<NodeId>,
    estimator: StrengthEstimator,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: usize,
}

impl Default for PasswordTree {
    fn default() -> Self {
        Self::new(StrengthEstimator::default())
    }
}

impl fmt::Debug for PasswordTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordTree")
            .field("nodes", &self.node_count())
            .field("roots", &self.roots)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl PasswordTree {
    /// Empty tree using `estimator` for password properties.
    #[must_use]
    pub const fn new(estimator: StrengthEstimator) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            estimator,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    // -- observers ----------------------------------------------------------

    /// Register `observer`; it is called after every mutation.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&TreeEvent) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.saturating_add(1);
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    fn notify(&mut self, event: TreeEvent) {
        for (_, observer) in &mut self.observers {
            observer(&event);
        }
    }

    // -- estimator ----------------------------------------------------------

    #[must_use]
    pub const fn estimator(&self) -> &StrengthEstimator {
        &self.estimator
    }

    /// Replace the estimator (e.g. after the thresholds changed) and
    /// re-evaluate every password property with the fast checker.
    pub fn set_estimator(&mut self, estimator: StrengthEstimator) {
        self.estimator = estimator;
        for node in self.nodes.iter_mut().flatten() {
            if let NodeKind::Entry { properties } = &mut node.kind {
                for property in properties {
                    property.update_password_strength(&self.estimator);
                }
            }
        }
        self.notify(TreeEvent::StrengthRecomputed);
    }

    /// Re-evaluate every password property. `thorough` uses the slow checker
    /// when one is configured.
    ///
    /// # Errors
    ///
    /// Propagates the first slow-checker failure; properties evaluated before
    /// it keep their new values.
    pub fn recompute_password_strength(&mut self, thorough: bool) -> Result<(), CryptoError> {
        let mut result = Ok(());
        'outer: for node in self.nodes.iter_mut().flatten() {
            if let NodeKind::Entry { properties } = &mut node.kind {
                for property in properties {
                    if thorough {
                        if let Err(e) = property.update_password_strength_thorough(&self.estimator)
                        {
                            result = Err(e);
                            break 'outer;
                        }
                    } else {
                        property.update_password_strength(&self.estimator);
                    }
                }
            }
        }
        self.notify(TreeEvent::StrengthRecomputed);
        result
    }

    // -- navigation ---------------------------------------------------------

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Top-level nodes in order.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Children of `parent`, or the top-level nodes for `None`.
    #[must_use]
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => &self.roots,
            Some(id) => self.node(id).map_or(&[], Node::children),
        }
    }

    #[must_use]
    pub fn properties(&self, id: NodeId) -> Option<&[Property]> {
        match &self.node(id)?.kind {
            NodeKind::Entry { properties } => Some(properties),
            NodeKind::Category { .. } => None,
        }
    }

    #[must_use]
    pub fn property(&self, id: NodeId, index: usize) -> Option<&Property> {
        self.properties(id)?.get(index)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Depth-first, pre-order traversal of all nodes.
    #[must_use]
    pub fn iter(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.node_count());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(Some(id)).iter().rev().copied());
        }
        out
    }

    /// Names from the top level down to `id`, inclusive.
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|c| self.node(c)) {
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        names
    }

    // -- structure ----------------------------------------------------------

    fn insert(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        kind: NodeKind,
    ) -> Result<NodeId, VaultError> {
        if let Some(pid) = parent {
            match self.node(pid) {
                Some(n) if n.is_category() => {}
                Some(_) => {
                    return Err(VaultError::InvalidArgument(
                        "entries cannot contain other nodes".into(),
                    ))
                }
                None => return Err(VaultError::InvalidArgument("unknown parent node".into())),
            }
        }

        let node = Node {
            name: name.to_string(),
            parent,
            kind,
            is_open: false,
            is_selected: false,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len().saturating_sub(1))
            }
        };

        match parent.and_then(|pid| self.node_mut(pid)) {
            Some(Node {
                kind: NodeKind::Category { children },
                ..
            }) => children.push(id),
            _ => self.roots.push(id),
        }

        self.notify(TreeEvent::NodeAdded(id));
        Ok(id)
    }

    /// Add a category under `parent` (or at top level for `None`).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidArgument`] if `parent` is unknown or an entry.
    pub fn add_category(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
    ) -> Result<NodeId, VaultError> {
        self.insert(parent, name, NodeKind::Category { children: Vec::new() })
    }

    /// Add an entry under `parent` (or at top level for `None`).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidArgument`] if `parent` is unknown or an entry.
    pub fn add_entry(&mut self, parent: Option<NodeId>, name: &str) -> Result<NodeId, VaultError> {
        self.insert(parent, name, NodeKind::Entry { properties: Vec::new() })
    }

    /// Remove `id` and its whole subtree.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.node(id).map(Node::parent) else {
            return false;
        };

        match parent.and_then(|pid| self.node_mut(pid)) {
            Some(Node {
                kind: NodeKind::Category { children },
                ..
            }) => children.retain(|c| *c != id),
            _ => self.roots.retain(|c| *c != id),
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) {
                stack.extend(node.children().iter().copied());
                self.free.push(current.0);
            }
        }

        self.notify(TreeEvent::NodeRemoved(id));
        true
    }

    pub fn rename(&mut self, id: NodeId, name: &str) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        node.name = name.to_string();
        self.notify(TreeEvent::NodeRenamed(id));
        true
    }

    /// Set the expanded flag of a category.
    pub fn set_open(&mut self, id: NodeId, open: bool) -> bool {
        match self.node_mut(id) {
            Some(node) if node.is_category() => node.is_open = open,
            _ => return false,
        }
        self.notify(TreeEvent::NodeStateChanged(id));
        true
    }

    pub fn set_selected(&mut self, id: NodeId, selected: bool) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        node.is_selected = selected;
        self.notify(TreeEvent::NodeStateChanged(id));
        true
    }

    /// Drop every node. Observers stay registered.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.roots.clear();
        self.notify(TreeEvent::Cleared);
    }

    // -- properties ---------------------------------------------------------

    fn properties_mut(&mut self, id: NodeId) -> Option<&mut Vec<Property>> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Entry { properties } => Some(properties),
            NodeKind::Category { .. } => None,
        }
    }

    /// Append `property` to entry `id`; returns its index.
    pub fn append_property(&mut self, id: NodeId, property: Property) -> Option<usize> {
        let properties = self.properties_mut(id)?;
        properties.push(property);
        let index = properties.len().saturating_sub(1);
        self.notify(TreeEvent::PropertyAppended { node: id, index });
        Some(index)
    }

    /// Append an empty property of `kind` with its default key and flags.
    pub fn append_default_property(&mut self, id: NodeId, kind: PropertyType) -> Option<usize> {
        let property = Property::with_defaults(kind, &self.estimator);
        self.append_property(id, property)
    }

    /// Apply one edit to property `index` of entry `id`.
    pub fn edit_property(&mut self, id: NodeId, index: usize, edit: PropertyEdit) -> bool {
        let Some(NodeKind::Entry { properties }) = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .map(|n| &mut n.kind)
        else {
            return false;
        };
        let Some(property) = properties.get_mut(index) else {
            return false;
        };
        match edit {
            PropertyEdit::Key(key) => property.set_key(&key),
            PropertyEdit::Value(value) => property.set_value(&value, &self.estimator),
            PropertyEdit::Type(kind) => property.set_type(kind, &self.estimator),
            PropertyEdit::Encrypted(flag) => property.set_encrypted(flag),
            PropertyEdit::Hidden(flag) => property.set_hidden(flag),
        }
        self.notify(TreeEvent::PropertyChanged { node: id, index });
        true
    }

    /// Swap property `index` with its predecessor. Rejected for index 0.
    pub fn move_property_up(&mut self, id: NodeId, index: usize) -> bool {
        let Some(properties) = self.properties_mut(id) else {
            return false;
        };
        if index == 0 || index >= properties.len() {
            return false;
        }
        let to = index.saturating_sub(1);
        properties.swap(index, to);
        self.notify(TreeEvent::PropertyMoved {
            node: id,
            from: index,
            to,
        });
        true
    }

    /// Swap property `index` with its successor. Rejected for the last index.
    pub fn move_property_down(&mut self, id: NodeId, index: usize) -> bool {
        let Some(properties) = self.properties_mut(id) else {
            return false;
        };
        let to = index.saturating_add(1);
        if to >= properties.len() {
            return false;
        }
        properties.swap(index, to);
        self.notify(TreeEvent::PropertyMoved {
            node: id,
            from: index,
            to,
        });
        true
    }

    pub fn delete_property(&mut self, id: NodeId, index: usize) -> bool {
        let Some(properties) = self.properties_mut(id) else {
            return false;
        };
        if index >= properties.len() {
            return false;
        }
        properties.remove(index);
        self.notify(TreeEvent::PropertyRemoved { node: id, index });
        true
    }

    pub fn delete_all_properties(&mut self, id: NodeId) -> bool {
        let Some(properties) = self.properties_mut(id) else {
            return false;
        };
        properties.clear();
        self.notify(TreeEvent::PropertiesCleared(id));
        true
    }

    // -- queries ------------------------------------------------------------

    /// Nodes whose name or visible (non-hidden) property values contain
    /// `query`, case-insensitively, in tree order. An empty query matches
    /// nothing.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<NodeId> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.iter()
            .into_iter()
            .filter(|id| {
                self.node(*id).is_some_and(|node| {
                    node.name.to_lowercase().contains(&needle)
                        || node.properties().iter().any(|p| {
                            !p.is_hidden() && p.value().to_lowercase().contains(&needle)
                        })
                })
            })
            .collect()
    }

    /// `true` if any password property at or below `id` is rated `Weak`.
    #[must_use]
    pub fn has_weak_children(&self, id: NodeId) -> bool {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            if node.properties().iter().any(|p| {
                p.kind() == PropertyType::Password && p.strength() == PasswordStrength::Weak
            }) {
                return true;
            }
            stack.extend(node.children().iter().copied());
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sample() -> (PasswordTree, NodeId, NodeId) {
        let mut tree = PasswordTree::default();
        let cat = tree.add_category(None, "Web").unwrap();
        let entry = tree.add_entry(Some(cat), "example.org").unwrap();
        let est = StrengthEstimator::default();
        for (key, value) in [("a", "1"), ("b", "2"), ("c", "3")] {
            tree.append_property(
                entry,
                Property::new(key, value, PropertyType::Misc, false, false, &est),
            )
            .unwrap();
        }
        (tree, cat, entry)
    }

    fn keys(tree: &PasswordTree, entry: NodeId) -> Vec<String> {
        tree.properties(entry)
            .unwrap()
            .iter()
            .map(|p| p.key().to_string())
            .collect()
    }

    #[test]
    fn entries_cannot_have_children() {
        let (mut tree, _, entry) = sample();
        assert!(tree.add_entry(Some(entry), "nested").is_err());
        assert!(tree.add_category(Some(entry), "nested").is_err());
    }

    #[test]
    fn categories_cannot_have_properties() {
        let (mut tree, cat, _) = sample();
        assert!(tree.append_default_property(cat, PropertyType::Misc).is_none());
        assert!(tree.properties(cat).is_none());
    }

    #[test]
    fn move_up_at_zero_is_rejected() {
        let (mut tree, _, entry) = sample();
        assert!(!tree.move_property_up(entry, 0));
        assert_eq!(keys(&tree, entry), ["a", "b", "c"]);
    }

    #[test]
    fn move_down_at_last_is_rejected() {
        let (mut tree, _, entry) = sample();
        assert!(!tree.move_property_down(entry, 2));
        assert!(!tree.move_property_down(entry, 99));
        assert_eq!(keys(&tree, entry), ["a", "b", "c"]);
    }

    #[test]
    fn moves_swap_neighbours() {
        let (mut tree, _, entry) = sample();
        assert!(tree.move_property_up(entry, 2));
        assert_eq!(keys(&tree, entry), ["a", "c", "b"]);
        assert!(tree.move_property_down(entry, 0));
        assert_eq!(keys(&tree, entry), ["c", "a", "b"]);
    }

    #[test]
    fn delete_property_checks_bounds() {
        let (mut tree, _, entry) = sample();
        assert!(!tree.delete_property(entry, 3));
        assert!(tree.delete_property(entry, 1));
        assert_eq!(keys(&tree, entry), ["a", "c"]);
        assert!(tree.delete_all_properties(entry));
        assert!(tree.properties(entry).unwrap().is_empty());
    }

    #[test]
    fn observers_fire_after_mutation() {
        let (mut tree, _, entry) = sample();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = tree.subscribe(move |e| sink.borrow_mut().push(*e));

        assert!(tree.edit_property(entry, 1, PropertyEdit::Value("new".into())));
        assert!(!tree.move_property_up(entry, 0));
        assert!(tree.move_property_up(entry, 1));

        assert_eq!(
            *seen.borrow(),
            vec![
                TreeEvent::PropertyChanged { node: entry, index: 1 },
                TreeEvent::PropertyMoved {
                    node: entry,
                    from: 1,
                    to: 0
                },
            ]
        );

        assert!(tree.unsubscribe(id));
        tree.rename(entry, "renamed");
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn remove_node_drops_subtree() {
        let (mut tree, cat, entry) = sample();
        let other = tree.add_category(None, "Mail").unwrap();
        assert_eq!(tree.node_count(), 3);
        assert!(tree.remove_node(cat));
        assert!(tree.node(entry).is_none());
        assert_eq!(tree.roots(), &[other]);
        assert!(!tree.remove_node(cat));
    }

    #[test]
    fn removed_slots_are_reused() {
        let (mut tree, cat, _) = sample();
        let slots = tree.nodes.len();
        for round in 0..10 {
            let added = tree.add_category(None, &format!("tmp-{round}")).unwrap();
            tree.add_entry(Some(added), "inner").unwrap();
            assert!(tree.remove_node(added));
        }
        assert_eq!(tree.nodes.len(), slots + 2);
        assert_eq!(tree.node_count(), 2);

        let fresh = tree.add_entry(Some(cat), "after").unwrap();
        assert_eq!(tree.node(fresh).unwrap().name(), "after");
        assert_eq!(tree.node(fresh).unwrap().parent(), Some(cat));
        assert_eq!(tree.children(Some(cat)).len(), 2);
    }

    #[test]
    fn search_skips_hidden_values_and_empty_query() {
        let (mut tree, _, entry) = sample();
        let est = StrengthEstimator::default();
        tree.append_property(
            entry,
            Property::new("pw", "needle", PropertyType::Password, true, true, &est),
        );
        assert!(tree.search("").is_empty());
        assert!(tree.search("   ").is_empty());
        assert!(tree.search("needle").is_empty());
        assert_eq!(tree.search("EXAMPLE"), vec![entry]);
    }

    #[test]
    fn weak_children_are_reported_up_the_tree() {
        let (mut tree, cat, entry) = sample();
        assert!(!tree.has_weak_children(cat));
        let index = tree.append_default_property(entry, PropertyType::Password).unwrap();
        assert!(tree.edit_property(entry, index, PropertyEdit::Value("abc".into())));
        assert!(tree.has_weak_children(cat));
        assert!(tree.edit_property(entry, index, PropertyEdit::Value("Xk9#mQ2$vL7@pR4!".into())));
        assert!(!tree.has_weak_children(cat));
    }

    #[test]
    fn path_and_traversal_follow_tree_order() {
        let (mut tree, cat, entry) = sample();
        let sub = tree.add_category(Some(cat), "Shops").unwrap();
        let shop = tree.add_entry(Some(sub), "store").unwrap();
        assert_eq!(tree.iter(), vec![cat, entry, sub, shop]);
        assert_eq!(tree.path_of(shop), vec!["Web", "Shops", "store"]);
        assert_eq!(tree.node(shop).unwrap().parent(), Some(sub));
    }

    #[test]
    fn set_open_only_applies_to_categories() {
        let (mut tree, cat, entry) = sample();
        assert!(tree.set_open(cat, true));
        assert!(tree.node(cat).unwrap().is_open());
        assert!(!tree.set_open(entry, true));
    }
}
