//! Render tree construction.
//!
//! `build_node` (the `h` of a compiled render function) and `build_text`
//! (its `t`) create nodes under dependency capture: whatever reactors the
//! meta evaluators read becomes the node's gate for reconciliation.
//! Children are not built here eagerly: [`gen_children`] materializes
//! them only while the node is visible, so hidden subtrees cost nothing
//! until shown.
//!
//! Borrow discipline: the node arena is never borrowed across a user
//! closure (meta getters, children builders); state is snapshotted,
//! the closure runs borrow-free, results are written back.

use indexmap::IndexMap;

use super::node::{
    Args, Binding, EventHandler, Meta, NodeFlags, NodeKey, NodeKind, NodeType, RenderNode,
    TextGetter, new_args,
};
use crate::component::Ready;
use crate::element::Element;
use crate::reactor::Input;
use crate::tree::ChildrenFn;
use crate::value::Value;

/// The result of one pass over a node's meta evaluators.
pub(crate) struct MetaState {
    pub key: Value,
    pub visible: bool,
    pub attrs: IndexMap<String, Value>,
    pub props: IndexMap<String, Value>,
    pub events: IndexMap<String, EventHandler>,
    pub class_name: String,
    pub style: String,
    pub bind: Option<Binding>,
}

/// Run every meta evaluator against the node's args. Runs under whatever
/// capture scope is ambient; the caller owns the collected deps.
pub(crate) fn evaluate_meta(meta: &Meta, args: &Args) -> MetaState {
    MetaState {
        key: meta.key.as_ref().map(|getter| getter(args)).unwrap_or(Value::Null),
        visible: meta.visible.as_ref().map(|getter| getter(args)).unwrap_or(true),
        attrs: meta.attrs.as_ref().map(|getter| getter(args)).unwrap_or_default(),
        props: meta.props.as_ref().map(|getter| getter(args)).unwrap_or_default(),
        events: meta.events.as_ref().map(|getter| getter(args)).unwrap_or_default(),
        class_name: meta.class.as_ref().map(|getter| getter(args)).unwrap_or_default(),
        style: meta.style.as_ref().map(|getter| getter(args)).unwrap_or_default(),
        bind: meta.bind.as_ref().map(|getter| getter()),
    }
}

/// Build one render node (or a whole list, when `meta.repeat` is set)
/// under dependency capture, then materialize visible children.
pub(crate) fn build_node(
    element: &Element,
    node_type: NodeType,
    meta: Meta,
    children: Option<ChildrenFn>,
) -> NodeKey {
    let is_list = meta.repeat.is_some();

    let el = element.clone();
    let (key, meta_deps) = element
        .scope()
        .collect(move || init_node(&el, node_type, meta, children, new_args()));

    // Lists keep the deps of their repeat getter (captured inside
    // init_node); everything else gates on the meta capture.
    if !is_list {
        if let Some(node) = element.tree_cell().borrow_mut().get_mut(key) {
            node.deps = meta_deps;
        }
    }

    let items: Option<Vec<NodeKey>> = {
        let tree = element.tree_cell().borrow();
        match tree.get(key).map(|node| &node.kind) {
            Some(NodeKind::List { list, .. }) => Some(list.clone()),
            _ => None,
        }
    };
    match items {
        Some(items) => {
            for item in items {
                gen_children(element, item);
            }
        }
        None => gen_children(element, key),
    }

    key
}

/// Build one text node under dependency capture.
pub(crate) fn build_text(element: &Element, getter: TextGetter) -> NodeKey {
    let g = getter.clone();
    let (text, deps) = element.scope().collect(move || g());

    let mut node = RenderNode::new(
        NodeType::Tag("#text".to_string()),
        NodeKind::Text { getter, text },
        Meta::default(),
        None,
        new_args(),
    );
    node.deps = deps;
    element.tree_cell().borrow_mut().insert(node)
}

/// Instantiate a node for `node_type` with per-call `args` (iteration
/// variables, async bindings). Dispatches on the directive present in
/// `meta`.
pub(crate) fn init_node(
    element: &Element,
    node_type: NodeType,
    meta: Meta,
    children: Option<ChildrenFn>,
    args: Args,
) -> NodeKey {
    if let Some(repeat) = meta.repeat.clone() {
        return init_list(element, node_type, meta, children, args, repeat);
    }
    if let Some(task) = meta.task.clone() {
        return init_async(element, node_type, meta, children, args, task);
    }

    let kind = match &node_type {
        NodeType::Component(_) => NodeKind::Component {
            element: None,
            ready: Ready::new(),
        },
        NodeType::Tag(_) => NodeKind::Plain,
    };
    make_node(element, node_type, meta, children, args, kind)
}

fn make_node(
    element: &Element,
    node_type: NodeType,
    meta: Meta,
    children: Option<ChildrenFn>,
    args: Args,
    kind: NodeKind,
) -> NodeKey {
    let state = evaluate_meta(&meta, &args);

    let mut node = RenderNode::new(node_type, kind, meta, children, args);
    node.key = state.key;
    node.set_visible(state.visible);
    node.attrs = state.attrs;
    node.props = state.props;
    node.events = state.events;
    node.class_name = state.class_name;
    node.style = state.style;
    node.bind = state.bind;

    element.tree_cell().borrow_mut().insert(node)
}

fn init_list(
    element: &Element,
    node_type: NodeType,
    meta: Meta,
    children: Option<ChildrenFn>,
    args: Args,
    repeat_getter: super::node::RepeatGetter,
) -> NodeKey {
    let list_key = element.tree_cell().borrow_mut().insert(RenderNode::new(
        node_type.clone(),
        NodeKind::List {
            list: Vec::new(),
            items: Value::Null,
        },
        meta.clone(),
        children.clone(),
        args.clone(),
    ));

    // The repeat evaluation owns this node's dependency gate; item metas
    // capture into the ambient (outer) scope like any other evaluation.
    let repeat_args = args.clone();
    let (repeat, repeat_deps) = element
        .scope()
        .collect(move || repeat_getter(&repeat_args));

    let item_meta = Meta {
        repeat: None,
        ..meta
    };
    let mut item_keys = Vec::new();
    if let Some(items) = repeat.items.as_list() {
        for (index, item) in items.iter().enumerate() {
            let item_args = new_args();
            {
                let mut entries = item_args.borrow_mut();
                entries.insert(repeat.item.clone(), Input::Value(item.clone()));
                entries.insert(repeat.index.clone(), Input::Value(Value::from(index)));
            }
            let key = init_node(
                element,
                node_type.clone(),
                item_meta.clone(),
                children.clone(),
                item_args,
            );
            item_keys.push(key);
        }
    }

    {
        let mut tree = element.tree_cell().borrow_mut();
        tree.link_children(list_key, &item_keys);
        if let Some(node) = tree.get_mut(list_key) {
            node.deps = repeat_deps;
            if let NodeKind::List { list, items } = &mut node.kind {
                *list = item_keys;
                *items = repeat.items;
            }
        }
    }
    list_key
}

fn init_async(
    element: &Element,
    node_type: NodeType,
    meta: Meta,
    children: Option<ChildrenFn>,
    args: Args,
    task_getter: super::node::TaskGetter,
) -> NodeKey {
    // The operation handle is a one-shot read; it cannot be reactive.
    let task = task_getter(&args);

    let scope = element.scope();
    let status = task
        .status
        .map(|name| (name, scope.reactive(|| Value::str("pending"), false)));
    let data = task
        .data
        .map(|name| (name, scope.reactive(|| Value::Null, false)));
    let error = task
        .error
        .map(|name| (name, scope.reactive(|| Value::Null, false)));

    // The bound reactors ride along in the args, so descendant getters
    // consume them like any other reactor and settlement flows through
    // the normal update path.
    {
        let mut entries = args.borrow_mut();
        for binding in [&status, &data, &error].into_iter().flatten() {
            entries.insert(binding.0.clone(), Input::Reactor(binding.1));
        }
    }

    let kind = NodeKind::Async {
        op: task.op.clone(),
        status,
        data,
        error,
    };
    let stripped = Meta { task: None, ..meta };
    let key = make_node(element, node_type, stripped, children, args, kind);
    gen_children(element, key);
    key
}

/// Materialize a node's children, if it is visible and has a builder.
///
/// Runs at most once per node: the `MATERIALIZED` flag records that the
/// builder ran (or that there is nothing to build), so a reveal never
/// re-generates an existing subtree.
pub(crate) fn gen_children(element: &Element, key: NodeKey) {
    let (visible, materialized, children, args) = {
        let tree = element.tree_cell().borrow();
        let Some(node) = tree.get(key) else {
            return;
        };
        (
            node.is_visible(),
            node.flags.contains(NodeFlags::MATERIALIZED),
            node.children.clone(),
            node.args.clone(),
        )
    };
    if !visible || materialized {
        return;
    }

    let Some(children) = children else {
        if let Some(node) = element.tree_cell().borrow_mut().get_mut(key) {
            node.flags.insert(NodeFlags::MATERIALIZED);
        }
        return;
    };

    let subs = children(element, &args);

    let mut tree = element.tree_cell().borrow_mut();
    tree.link_children(key, &subs);
    if let Some(node) = tree.get_mut(key) {
        node.flags.insert(NodeFlags::MATERIALIZED);
    }
}
