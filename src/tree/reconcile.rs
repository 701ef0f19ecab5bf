//! Post-flush reconciliation: patch the surface with minimal structural
//! change.
//!
//! The walk mirrors the mount order (child, then sibling) but
//! short-circuits every subtree whose captured dependencies do not
//! intersect the flush's changed set. Three structural moves exist:
//! toggling visibility at the node's anchor, first-reveal child
//! materialization, and the keyed list diff, which matches new items to
//! previous ones by item identity so reordered items keep their surface
//! handles.

use indexmap::IndexSet;

use super::build::{evaluate_meta, gen_children, init_node};
use super::mount::{mount_component, mount_node};
use super::node::{Meta, NodeFlags, NodeKey, NodeKind, Tree, new_args};
use crate::element::{Element, update_component};
use crate::reactor::{Dep, Input};
use crate::value::Value;

/// Reconcile the whole tree against the flush's changed set.
pub(crate) fn update_tree(element: &Element, changed: &IndexSet<Dep>) {
    let root = element.tree_cell().borrow().root;
    if let Some(root) = root {
        walk(element, root, changed);
    }
}

enum Branch {
    List,
    Text,
    Node { is_component: bool },
}

fn walk(element: &Element, key: NodeKey, changed: &IndexSet<Dep>) {
    let (branch, deps_hit) = {
        let tree = element.tree_cell().borrow();
        let Some(node) = tree.get(key) else {
            return;
        };
        let branch = match &node.kind {
            NodeKind::List { .. } => Branch::List,
            NodeKind::Text { .. } => Branch::Text,
            NodeKind::Component { .. } => Branch::Node { is_component: true },
            NodeKind::Plain | NodeKind::Async { .. } => Branch::Node { is_component: false },
        };
        let hit = !node.deps.is_empty() && node.deps.iter().any(|dep| changed.contains(dep));
        (branch, hit)
    };

    let mut skip_child = false;
    match branch {
        Branch::List => {
            if deps_hit {
                reconcile_list(element, key);
            }
        }
        Branch::Text => {
            if deps_hit {
                refresh_text(element, key);
            }
        }
        Branch::Node { is_component } => {
            if deps_hit {
                let show_out = refresh_node(element, key, is_component);
                if show_out {
                    reveal(element, key, is_component, &mut skip_child);
                }
            }
        }
    }

    // Re-read the links: a list rebuild or a reveal may have changed them.
    let (child, sibling) = {
        let tree = element.tree_cell().borrow();
        match tree.get(key) {
            Some(node) => (node.child, node.sibling),
            None => (None, None),
        }
    };
    if !skip_child {
        if let Some(child) = child {
            walk(element, child, changed);
        }
    }
    if let Some(sibling) = sibling {
        walk(element, sibling, changed);
    }
}

/// First-time reveal: materialize and mount the children the lazy path
/// skipped, and kick off a deferred component instantiation.
fn reveal(element: &Element, key: NodeKey, is_component: bool, skip_child: &mut bool) {
    let (flags, handle) = {
        let tree = element.tree_cell().borrow();
        match tree.get(key) {
            Some(node) => (node.flags, node.handle),
            None => return,
        }
    };

    if is_component && !flags.contains(NodeFlags::REQUESTED) {
        if let Err(err) = mount_component(element, key) {
            log::warn!("component mount on reveal failed: {err}");
        }
    }

    if !flags.contains(NodeFlags::MATERIALIZED) {
        gen_children(element, key);
        let child = element.tree_cell().borrow().get(key).and_then(|node| node.child);
        if let (Some(child), Some(handle)) = (child, handle) {
            if let Err(err) = mount_node(element, child, handle) {
                log::warn!("child mount on reveal failed: {err}");
            }
        }
        // The reveal path just mounted the subtree; the walk must not
        // descend into it again this flush.
        *skip_child = true;
    }
}

fn refresh_text(element: &Element, key: NodeKey) {
    let (getter, handle) = {
        let tree = element.tree_cell().borrow();
        match tree.get(key).map(|node| (&node.kind, node.handle)) {
            Some((NodeKind::Text { getter, .. }, handle)) => (getter.clone(), handle),
            _ => return,
        }
    };

    let g = getter.clone();
    let (text, deps) = element.scope().collect(move || g());

    {
        let mut tree = element.tree_cell().borrow_mut();
        if let Some(node) = tree.get_mut(key) {
            node.deps = deps;
            if let NodeKind::Text { text: slot, .. } = &mut node.kind {
                *slot = text.clone();
            }
        }
    }
    if let Some(handle) = handle {
        element.with_surface(|surface| surface.set_text(handle, &text));
    }
}

/// Re-evaluate a plain/component node's meta under fresh capture and
/// write the differences to the surface. Returns whether the node just
/// became visible.
fn refresh_node(element: &Element, key: NodeKey, is_component: bool) -> bool {
    let (meta, args, handle, parent_handle, old_attrs, was_visible) = {
        let tree = element.tree_cell().borrow();
        let Some(node) = tree.get(key) else {
            return false;
        };
        (
            node.meta.clone(),
            node.args.clone(),
            node.handle,
            node.parent_handle,
            node.attrs.clone(),
            node.is_visible(),
        )
    };

    let (state, deps) = {
        let meta = meta.clone();
        let args = args.clone();
        element.scope().collect(move || evaluate_meta(&meta, &args))
    };

    if let (Some(handle), Some(parent_handle)) = (handle, parent_handle) {
        element.with_surface(|surface| {
            surface.set_classes(handle, &state.class_name);
            surface.set_style_text(handle, &state.style);
            for name in old_attrs.keys() {
                if !state.attrs.contains_key(name) {
                    surface.remove_attribute(handle, name);
                }
            }
            for (name, value) in &state.attrs {
                surface.set_attribute(handle, name, &value.to_string());
            }
            if let Some(bind) = &state.bind {
                surface.set_value(handle, &bind.value.to_string());
            }
            if state.visible != was_visible {
                if state.visible {
                    let anchor = find_anchor(&element.tree_cell().borrow(), key);
                    surface.insert_before(parent_handle, handle, anchor);
                } else {
                    surface.remove_child(parent_handle, handle);
                }
            }
        });
    }

    let nested = {
        let mut tree = element.tree_cell().borrow_mut();
        let Some(node) = tree.get_mut(key) else {
            return false;
        };
        node.deps = deps;
        node.key = state.key;
        node.set_visible(state.visible);
        node.attrs = state.attrs;
        node.class_name = state.class_name;
        node.style = state.style;
        if is_component {
            node.props = state.props.clone();
            node.events = state.events;
        }
        if state.bind.is_some() {
            node.bind = state.bind;
        }
        match &node.kind {
            NodeKind::Component { element: Some(nested), ready } if ready.is_resolved() => {
                Some(nested.clone())
            }
            _ => None,
        }
    };

    // A ready child gets the fresh prop snapshot; its flush is driven by
    // its own graph.
    if let Some(nested) = nested {
        update_component(&nested, state.props);
    }

    state.visible && !was_visible
}

/// Rebuild a list node against a changed source collection.
fn reconcile_list(element: &Element, key: NodeKey) {
    struct Snapshot {
        meta: Meta,
        args: super::node::Args,
        children: Option<super::node::ChildrenFn>,
        node_type: super::node::NodeType,
        parent_handle: Option<crate::surface::SurfaceHandle>,
        prev_items: Value,
        prev_list: Vec<NodeKey>,
    }

    let snapshot = {
        let tree = element.tree_cell().borrow();
        let Some(node) = tree.get(key) else {
            return;
        };
        let NodeKind::List { list, items } = &node.kind else {
            return;
        };
        Snapshot {
            meta: node.meta.clone(),
            args: node.args.clone(),
            children: node.children.clone(),
            node_type: node.node_type.clone(),
            parent_handle: node.parent_handle,
            prev_items: items.clone(),
            prev_list: list.clone(),
        }
    };

    let repeat_getter = match snapshot.meta.repeat.clone() {
        Some(getter) => getter,
        None => return,
    };
    let repeat_args = snapshot.args.clone();
    let (repeat, repeat_deps) = element
        .scope()
        .collect(move || repeat_getter(&repeat_args));

    if let Some(node) = element.tree_cell().borrow_mut().get_mut(key) {
        node.deps = repeat_deps;
    }

    if shallow_equal(&repeat.items, &snapshot.prev_items) {
        return;
    }

    let new_items: Vec<Value> = repeat.items.as_list().map(<[Value]>::to_vec).unwrap_or_default();
    let prev_values: Vec<Value> = snapshot
        .prev_items
        .as_list()
        .map(<[Value]>::to_vec)
        .unwrap_or_default();
    let mut consumed = vec![false; snapshot.prev_list.len()];

    let item_meta = Meta {
        repeat: None,
        ..snapshot.meta.clone()
    };

    // Match by item identity, not index: a reordered item keeps its
    // subtree (and its surface handle); only genuinely new items build
    // fresh subtrees.
    let mut new_keys: Vec<NodeKey> = Vec::new();
    for (index, item) in new_items.iter().enumerate() {
        let matched = prev_values
            .iter()
            .enumerate()
            .position(|(j, prev)| !consumed[j] && prev == item);

        if let Some(j) = matched {
            consumed[j] = true;
            let reused = snapshot.prev_list[j];
            let args = element
                .tree_cell()
                .borrow()
                .get(reused)
                .map(|node| node.args.clone());
            if let Some(args) = args {
                let mut entries = args.borrow_mut();
                entries.insert(repeat.item.clone(), Input::Value(item.clone()));
                entries.insert(repeat.index.clone(), Input::Value(Value::from(index)));
            }
            new_keys.push(reused);
        } else {
            let item_args = new_args();
            {
                let mut entries = item_args.borrow_mut();
                entries.insert(repeat.item.clone(), Input::Value(item.clone()));
                entries.insert(repeat.index.clone(), Input::Value(Value::from(index)));
            }
            let built = init_node(
                element,
                snapshot.node_type.clone(),
                item_meta.clone(),
                snapshot.children.clone(),
                item_args,
            );
            gen_children(element, built);
            new_keys.push(built);
        }
    }

    {
        let mut tree = element.tree_cell().borrow_mut();
        tree.link_children(key, &new_keys);
        if let Some(node) = tree.get_mut(key) {
            if let NodeKind::List { list, items } = &mut node.kind {
                *list = new_keys.clone();
                *items = repeat.items.clone();
            }
        }
    }

    let Some(parent_handle) = snapshot.parent_handle else {
        return;
    };

    // Everything inserts before the first surviving old node, falling
    // back to the list's own successor anchor.
    let leftovers: Vec<NodeKey> = snapshot
        .prev_list
        .iter()
        .enumerate()
        .filter(|(j, _)| !consumed[*j])
        .map(|(_, k)| *k)
        .collect();
    let anchor = {
        let tree = element.tree_cell().borrow();
        leftovers
            .iter()
            .find_map(|k| {
                tree.get(*k)
                    .filter(|node| node.is_visible())
                    .and_then(|node| node.handle)
            })
            .or_else(|| find_anchor(&tree, key))
    };

    for item_key in &new_keys {
        let (handle, visible) = {
            let tree = element.tree_cell().borrow();
            match tree.get(*item_key) {
                Some(node) => (node.handle, node.is_visible()),
                None => continue,
            }
        };
        match handle {
            Some(handle) => {
                if visible {
                    element.with_surface(|surface| {
                        surface.insert_before(parent_handle, handle, anchor);
                    });
                }
            }
            None => {
                if let Err(err) = mount_node(element, *item_key, parent_handle) {
                    log::warn!("list item mount failed: {err}");
                }
                let handle = {
                    let tree = element.tree_cell().borrow();
                    tree.get(*item_key)
                        .filter(|node| node.is_visible())
                        .and_then(|node| node.handle)
                };
                if let (Some(handle), Some(_)) = (handle, anchor) {
                    element.with_surface(|surface| {
                        surface.insert_before(parent_handle, handle, anchor);
                    });
                }
            }
        }
    }

    detach_leftovers(element, &leftovers, parent_handle);
    let mut tree = element.tree_cell().borrow_mut();
    for leftover in leftovers {
        tree.remove_subtree(leftover);
    }
}

/// Detach unmatched previous subtrees from the surface, recursively for
/// nested lists, which own no handle of their own.
fn detach_leftovers(element: &Element, leftovers: &[NodeKey], parent_handle: crate::surface::SurfaceHandle) {
    for key in leftovers {
        let (handle, nested_list) = {
            let tree = element.tree_cell().borrow();
            match tree.get(*key) {
                Some(node) => match &node.kind {
                    NodeKind::List { list, .. } => (node.handle, Some(list.clone())),
                    _ => (node.handle, None),
                },
                None => continue,
            }
        };
        if let Some(handle) = handle {
            element.with_surface(|surface| surface.remove_child(parent_handle, handle));
        } else if let Some(nested) = nested_list {
            detach_leftovers(element, &nested, parent_handle);
        }
    }
}

/// Shallow collection equality: same length, per-slot [`Value`] equality
/// (with its pointer fast path). Anything non-list compares structurally.
fn shallow_equal(a: &Value, b: &Value) -> bool {
    match (a.as_list(), b.as_list()) {
        (Some(a), Some(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y),
        _ => a == b,
    }
}

/// The anchor for inserting a node: the handle of the nearest visible
/// following sibling, descending into list nodes (which own no handle).
pub(crate) fn find_anchor(tree: &Tree, key: NodeKey) -> Option<crate::surface::SurfaceHandle> {
    let sibling = tree.get(key)?.sibling?;
    let node = tree.get(sibling)?;

    if matches!(node.kind, NodeKind::List { .. }) {
        if let Some(child) = node.child {
            if let Some(first) = tree.get(child) {
                if first.is_visible() && first.handle.is_some() {
                    return first.handle;
                }
            }
            if let Some(handle) = find_anchor(tree, child) {
                return Some(handle);
            }
        }
    }

    if node.is_visible() && node.handle.is_some() {
        return node.handle;
    }
    find_anchor(tree, sibling)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceHandle;
    use crate::tree::{NodeType, RenderNode, new_args};

    fn plain(tag: &str, handle: Option<u64>, visible: bool) -> RenderNode {
        let mut node = RenderNode::new(
            NodeType::Tag(tag.to_string()),
            NodeKind::Plain,
            Meta::default(),
            None,
            new_args(),
        );
        node.handle = handle.map(SurfaceHandle);
        node.set_visible(visible);
        node
    }

    #[test]
    fn test_anchor_is_nearest_visible_sibling() {
        let mut tree = Tree::default();
        let parent = tree.insert(plain("div", None, true));
        let first = tree.insert(plain("a", Some(1), true));
        let hidden = tree.insert(plain("b", Some(2), false));
        let shown = tree.insert(plain("c", Some(3), true));
        tree.link_children(parent, &[first, hidden, shown]);

        // The hidden sibling is skipped in favor of the next visible one.
        assert_eq!(find_anchor(&tree, first), Some(SurfaceHandle(3)));
        assert_eq!(find_anchor(&tree, hidden), Some(SurfaceHandle(3)));
        assert_eq!(find_anchor(&tree, shown), None);
    }

    #[test]
    fn test_anchor_descends_into_list_sibling() {
        let mut tree = Tree::default();
        let parent = tree.insert(plain("div", None, true));
        let first = tree.insert(plain("a", Some(1), true));

        let mut list = plain("li", None, true);
        list.kind = NodeKind::List {
            list: Vec::new(),
            items: Value::Null,
        };
        let list_key = tree.insert(list);
        let item = tree.insert(plain("li", Some(9), true));

        tree.link_children(parent, &[first, list_key]);
        tree.link_children(list_key, &[item]);
        if let Some(node) = tree.get_mut(list_key) {
            if let NodeKind::List { list, .. } = &mut node.kind {
                list.push(item);
            }
        }

        // A list owns no handle; its first visible item anchors instead.
        assert_eq!(find_anchor(&tree, first), Some(SurfaceHandle(9)));
    }

    #[test]
    fn test_shallow_equal_on_lists() {
        let a = Value::list([Value::Int(1), Value::Int(2)]);
        let same = Value::list([Value::Int(1), Value::Int(2)]);
        let shorter = Value::list([Value::Int(1)]);
        let reordered = Value::list([Value::Int(2), Value::Int(1)]);

        assert!(shallow_equal(&a, &same));
        assert!(!shallow_equal(&a, &shorter));
        assert!(!shallow_equal(&a, &reordered));
    }
}
