//! The render node model.
//!
//! A component's render function produces a linked tree of render nodes:
//! each node points at its first `child`, next `sibling` and `parent`.
//! The linked shape (rather than child arrays) is what lets list
//! reconciliation splice subtrees without reallocating parents. Nodes
//! live in a slotmap arena owned by their element; `parent`, `child` and
//! `sibling` are plain keys, so the cyclic parent/child references never
//! form an ownership cycle.

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use slotmap::{SlotMap, new_key_type};

use super::task::Deferred;
use crate::component::Ready;
use crate::element::Element;
use crate::reactor::{Dep, Input, ReactorId};
use crate::value::Value;

new_key_type! {
    /// Identity of one render node within its element's arena.
    pub struct NodeKey;
}

bitflags! {
    /// Per-node state bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Currently shown on the presentation surface.
        const VISIBLE = 1 << 0;
        /// Children have been generated (lazy; only while visible).
        const MATERIALIZED = 1 << 1;
        /// The initial mount walk has produced a presentation handle.
        const MOUNTED = 1 << 2;
        /// Component instantiation has been requested (possibly parked on
        /// the registry readiness gate).
        const REQUESTED = 1 << 3;
    }
}

/// What a node renders as: a plain surface element, or a reference to a
/// registered component.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeType {
    Tag(String),
    Component(String),
}

impl NodeType {
    pub fn name(&self) -> &str {
        match self {
            NodeType::Tag(tag) => tag,
            NodeType::Component(name) => name,
        }
    }
}

/// Iteration and async-binding arguments visible to a subtree's getters.
///
/// Shared by handle: list reconciliation refreshes args in place so the
/// closures a subtree captured at build time read the new values.
pub type Args = Rc<RefCell<IndexMap<String, Input>>>;

pub fn new_args() -> Args {
    Rc::new(RefCell::new(IndexMap::new()))
}

/// Read a named arg through the scope: plain values pass through,
/// reactor-backed args (async bindings) are consumed and tracked.
pub fn read_arg(scope: &crate::reactor::Scope, args: &Args, name: &str) -> Value {
    let input = args.borrow().get(name).cloned();
    match input {
        Some(input) => scope.read(&input),
        None => Value::Null,
    }
}

pub type BoolGetter = Rc<dyn Fn(&Args) -> bool>;
pub type StrGetter = Rc<dyn Fn(&Args) -> String>;
pub type MapGetter = Rc<dyn Fn(&Args) -> IndexMap<String, Value>>;
pub type ValueGetter = Rc<dyn Fn(&Args) -> Value>;
pub type EventsGetter = Rc<dyn Fn(&Args) -> IndexMap<String, EventHandler>>;
pub type BindGetter = Rc<dyn Fn() -> Binding>;
pub type RepeatGetter = Rc<dyn Fn(&Args) -> Repeat>;
pub type TaskGetter = Rc<dyn Fn(&Args) -> Task>;
pub type TextGetter = Rc<dyn Fn() -> String>;

/// A node event handler, invoked with the event payload.
pub type EventHandler = Rc<dyn Fn(Value)>;

/// The builder for a node's lazily-materialized children.
pub type ChildrenFn = Rc<dyn Fn(&Element, &Args) -> Vec<NodeKey>>;

/// A two-way binding: the current value pushed to the surface, and the
/// setter invoked when the host reports input.
#[derive(Clone)]
pub struct Binding {
    pub value: Value,
    pub set: Rc<dyn Fn(Value)>,
}

/// The repeat directive's evaluation: the source collection plus the
/// names the per-item and per-index args are bound under.
pub struct Repeat {
    pub items: Value,
    pub item: String,
    pub index: String,
}

/// The await directive's evaluation: the pending operation plus the arg
/// names its `status`/`data`/`error` reactors are bound under.
pub struct Task {
    pub op: Deferred,
    pub status: Option<String>,
    pub data: Option<String>,
    pub error: Option<String>,
}

/// The per-variant evaluators captured from a node's markup.
///
/// Every getter runs under dependency capture; the captured set gates the
/// node during reconciliation.
#[derive(Clone, Default)]
pub struct Meta {
    pub visible: Option<BoolGetter>,
    pub class: Option<StrGetter>,
    pub style: Option<StrGetter>,
    pub attrs: Option<MapGetter>,
    pub props: Option<MapGetter>,
    pub events: Option<EventsGetter>,
    pub key: Option<ValueGetter>,
    pub bind: Option<BindGetter>,
    pub repeat: Option<RepeatGetter>,
    pub task: Option<TaskGetter>,
}

/// Variant payloads, dispatched by pattern match.
pub enum NodeKind {
    /// One surface element.
    Plain,
    /// One text leaf; `getter` recomputes the content under capture.
    Text { getter: TextGetter, text: String },
    /// A repeat directive: ordered child subtrees plus the last-seen
    /// source collection for diffing.
    List { list: Vec<NodeKey>, items: Value },
    /// An await directive: the pending operation and its bound reactors.
    Async {
        op: Deferred,
        status: Option<(String, ReactorId)>,
        data: Option<(String, ReactorId)>,
        error: Option<(String, ReactorId)>,
    },
    /// A reference to a registered component; owns the nested element
    /// once mounted.
    Component { element: Option<Element>, ready: Ready },
}

/// One node of the linked render tree.
pub struct RenderNode {
    pub node_type: NodeType,
    pub kind: NodeKind,
    pub meta: Meta,
    pub children: Option<ChildrenFn>,
    pub args: Args,

    /// Dependencies captured by the last evaluation relevant to this
    /// variant: meta for plain nodes, the text getter for text nodes,
    /// the repeat getter for lists.
    pub deps: Vec<Dep>,
    pub flags: NodeFlags,

    // Last-evaluated presentation state.
    pub key: Value,
    pub attrs: IndexMap<String, Value>,
    pub class_name: String,
    pub style: String,
    pub props: IndexMap<String, Value>,
    pub events: IndexMap<String, EventHandler>,
    pub bind: Option<Binding>,

    // Presentation linkage.
    pub handle: Option<crate::surface::SurfaceHandle>,
    pub parent_handle: Option<crate::surface::SurfaceHandle>,

    // Tree linkage.
    pub child: Option<NodeKey>,
    pub sibling: Option<NodeKey>,
    pub parent: Option<NodeKey>,
}

impl RenderNode {
    pub fn new(node_type: NodeType, kind: NodeKind, meta: Meta, children: Option<ChildrenFn>, args: Args) -> Self {
        Self {
            node_type,
            kind,
            meta,
            children,
            args,
            deps: Vec::new(),
            flags: NodeFlags::VISIBLE,
            key: Value::Null,
            attrs: IndexMap::new(),
            class_name: String::new(),
            style: String::new(),
            props: IndexMap::new(),
            events: IndexMap::new(),
            bind: None,
            handle: None,
            parent_handle: None,
            child: None,
            sibling: None,
            parent: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(NodeFlags::VISIBLE)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.flags.set(NodeFlags::VISIBLE, visible);
    }
}

/// The node arena plus the tree root.
#[derive(Default)]
pub struct Tree {
    pub nodes: SlotMap<NodeKey, RenderNode>,
    pub root: Option<NodeKey>,
}

impl Tree {
    pub fn get(&self, key: NodeKey) -> Option<&RenderNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut RenderNode> {
        self.nodes.get_mut(key)
    }

    pub fn insert(&mut self, node: RenderNode) -> NodeKey {
        self.nodes.insert(node)
    }

    /// Chain `keys` as a sibling list under `parent` and point the
    /// parent's `child` at the first entry.
    pub fn link_children(&mut self, parent: NodeKey, keys: &[NodeKey]) {
        for window in keys.windows(2) {
            if let Some(node) = self.nodes.get_mut(window[0]) {
                node.sibling = Some(window[1]);
            }
        }
        if let Some(last) = keys.last() {
            if let Some(node) = self.nodes.get_mut(*last) {
                node.sibling = None;
            }
        }
        for key in keys {
            if let Some(node) = self.nodes.get_mut(*key) {
                node.parent = Some(parent);
            }
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.child = keys.first().copied();
        }
    }

    /// Remove a node and its entire descendant chain from the arena.
    /// Siblings of `key` itself are untouched.
    pub fn remove_subtree(&mut self, key: NodeKey) {
        let mut stack = Vec::new();
        if let Some(node) = self.nodes.get(key) {
            if let Some(child) = node.child {
                stack.push(child);
            }
        }
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                if let Some(child) = node.child {
                    stack.push(child);
                }
                if let Some(sibling) = node.sibling {
                    stack.push(sibling);
                }
            }
            self.nodes.remove(current);
        }
        self.nodes.remove(key);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(tag: &str) -> RenderNode {
        RenderNode::new(
            NodeType::Tag(tag.to_string()),
            NodeKind::Plain,
            Meta::default(),
            None,
            new_args(),
        )
    }

    #[test]
    fn test_link_children_chains_siblings() {
        let mut tree = Tree::default();
        let parent = tree.insert(plain("div"));
        let a = tree.insert(plain("a"));
        let b = tree.insert(plain("b"));
        let c = tree.insert(plain("c"));

        tree.link_children(parent, &[a, b, c]);

        assert_eq!(tree.get(parent).unwrap().child, Some(a));
        assert_eq!(tree.get(a).unwrap().sibling, Some(b));
        assert_eq!(tree.get(b).unwrap().sibling, Some(c));
        assert_eq!(tree.get(c).unwrap().sibling, None);
        assert_eq!(tree.get(b).unwrap().parent, Some(parent));
    }

    #[test]
    fn test_relink_clears_stale_tail() {
        let mut tree = Tree::default();
        let parent = tree.insert(plain("div"));
        let a = tree.insert(plain("a"));
        let b = tree.insert(plain("b"));

        tree.link_children(parent, &[a, b]);
        // Shrink to a single child: the survivor must not keep pointing
        // at the dropped sibling.
        tree.link_children(parent, &[a]);

        assert_eq!(tree.get(parent).unwrap().child, Some(a));
        assert_eq!(tree.get(a).unwrap().sibling, None);
    }

    #[test]
    fn test_remove_subtree_spares_siblings() {
        let mut tree = Tree::default();
        let parent = tree.insert(plain("div"));
        let doomed = tree.insert(plain("a"));
        let survivor = tree.insert(plain("b"));
        let grandchild = tree.insert(plain("inner"));

        tree.link_children(parent, &[doomed, survivor]);
        tree.link_children(doomed, &[grandchild]);

        tree.remove_subtree(doomed);

        assert!(tree.get(doomed).is_none());
        assert!(tree.get(grandchild).is_none());
        assert!(tree.get(survivor).is_some(), "siblings must survive");
        assert!(tree.get(parent).is_some());
    }

    #[test]
    fn test_visibility_flag() {
        let mut node = plain("div");
        assert!(node.is_visible());
        node.set_visible(false);
        assert!(!node.is_visible());
        assert!(!node.flags.contains(NodeFlags::MATERIALIZED));
    }
}
