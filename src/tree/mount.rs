//! Initial attach: walk the render tree and write it onto the surface.
//!
//! The walk is depth-first along `child`, then `sibling`. Every node gets
//! exactly one surface handle; invisible nodes create their handle but
//! stay detached until a reveal inserts them at their anchor. Component
//! nodes instantiate a nested element (possibly deferred behind the
//! registry readiness gate); async nodes register settlement
//! continuations that feed their bound reactors through `update`.

use indexmap::IndexMap;

use super::node::{Binding, EventHandler, NodeFlags, NodeKey, NodeKind};
use super::task::Deferred;
use crate::component;
use crate::component::Ready;
use crate::element::{Element, update_component};
use crate::error::RuntimeError;
use crate::reactor::ReactorId;
use crate::surface::SurfaceHandle;
use crate::value::Value;

enum Shape {
    Plain,
    Text(String),
    List,
    Async,
    Component(String),
}

/// Attach the subtree rooted at `key` under the surface node `root`.
pub(crate) fn mount_node(element: &Element, key: NodeKey, root: SurfaceHandle) -> Result<(), RuntimeError> {
    let Some(surface) = element.surface_rc() else {
        return Ok(());
    };

    struct Snapshot {
        shape: Shape,
        tag: String,
        visible: bool,
        attrs: IndexMap<String, Value>,
        class_name: String,
        style: String,
        bind: Option<Binding>,
        child: Option<NodeKey>,
        sibling: Option<NodeKey>,
    }

    let snapshot = {
        let tree = element.tree_cell().borrow();
        let Some(node) = tree.get(key) else {
            return Ok(());
        };
        let shape = match &node.kind {
            NodeKind::Plain => Shape::Plain,
            NodeKind::Text { text, .. } => Shape::Text(text.clone()),
            NodeKind::List { .. } => Shape::List,
            NodeKind::Async { .. } => Shape::Async,
            NodeKind::Component { .. } => Shape::Component(node.node_type.name().to_string()),
        };
        Snapshot {
            shape,
            tag: node.node_type.name().to_string(),
            visible: node.is_visible(),
            attrs: node.attrs.clone(),
            class_name: node.class_name.clone(),
            style: node.style.clone(),
            bind: node.bind.clone(),
            child: node.child,
            sibling: node.sibling,
        }
    };

    match &snapshot.shape {
        Shape::Component(_) => {
            let handle = surface.create_element(&snapshot.tag);
            set_handle(element, key, handle, root);
            if snapshot.visible {
                surface.append_child(root, handle);
                mount_component(element, key)?;
                if let Some(child) = snapshot.child {
                    mount_node(element, child, handle)?;
                }
            }
        }
        Shape::List => {
            // The list itself owns no handle; its items attach in place.
            set_parent_handle(element, key, root);
            if let Some(child) = snapshot.child {
                mount_node(element, child, root)?;
            }
        }
        Shape::Text(text) => {
            let handle = surface.create_text(text);
            surface.append_child(root, handle);
            set_handle(element, key, handle, root);
        }
        Shape::Plain | Shape::Async => {
            let handle = surface.create_element(&snapshot.tag);
            for (name, value) in &snapshot.attrs {
                surface.set_attribute(handle, name, &value.to_string());
            }
            if !snapshot.class_name.is_empty() {
                surface.set_classes(handle, &snapshot.class_name);
            }
            if !snapshot.style.is_empty() {
                surface.set_style_text(handle, &snapshot.style);
            }
            if snapshot.visible {
                surface.append_child(root, handle);
            }
            set_handle(element, key, handle, root);
            if let Some(child) = snapshot.child {
                mount_node(element, child, handle)?;
            }
            if let Some(bind) = &snapshot.bind {
                surface.set_value(handle, &bind.value.to_string());
            }
        }
    }

    if let Some(node) = element.tree_cell().borrow_mut().get_mut(key) {
        node.flags.insert(NodeFlags::MOUNTED);
    }

    if let Some(sibling) = snapshot.sibling {
        mount_node(element, sibling, root)?;
    }

    // Settlement wiring comes last: the whole initial state is attached
    // before an already-settled operation can re-enter `update`.
    if matches!(snapshot.shape, Shape::Async) {
        wire_settlement(element, key);
    }

    Ok(())
}

fn set_handle(element: &Element, key: NodeKey, handle: SurfaceHandle, root: SurfaceHandle) {
    if let Some(node) = element.tree_cell().borrow_mut().get_mut(key) {
        node.handle = Some(handle);
        node.parent_handle = Some(root);
    }
}

fn set_parent_handle(element: &Element, key: NodeKey, root: SurfaceHandle) {
    if let Some(node) = element.tree_cell().borrow_mut().get_mut(key) {
        node.parent_handle = Some(root);
    }
}

/// Route the operation's settlement into the node's bound reactors.
fn wire_settlement(element: &Element, key: NodeKey) {
    type Bound = Option<(String, ReactorId)>;
    let wiring: Option<(Deferred, Bound, Bound, Bound)> = {
        let tree = element.tree_cell().borrow();
        match tree.get(key).map(|node| &node.kind) {
            Some(NodeKind::Async { op, status, data, error }) => {
                Some((op.clone(), status.clone(), data.clone(), error.clone()))
            }
            _ => None,
        }
    };
    let Some((op, status, data, error)) = wiring else {
        return;
    };

    let scope = element.scope().clone();
    op.on_settle(move |outcome| match outcome {
        Ok(value) => {
            if let Some((_, id)) = &status {
                scope.update(*id, |_| Value::str("resolved"));
            }
            if let Some((_, id)) = &data {
                let value = value.clone();
                scope.update(*id, move |_| value);
            }
        }
        Err(err) => {
            if let Some((_, id)) = &status {
                scope.update(*id, |_| Value::str("rejected"));
            }
            if let Some((_, id)) = &error {
                let err = err.clone();
                scope.update(*id, move |_| err);
            }
        }
    });
}

/// Instantiate and mount the nested element of a component node.
///
/// If the component's module has not been registered yet, the mount parks
/// on the registry readiness gate and completes when registration lands.
pub(crate) fn mount_component(element: &Element, key: NodeKey) -> Result<(), RuntimeError> {
    let name = {
        let mut tree = element.tree_cell().borrow_mut();
        let Some(node) = tree.get_mut(key) else {
            return Ok(());
        };
        node.flags.insert(NodeFlags::REQUESTED);
        node.node_type.name().to_string()
    };

    if component::lookup(&name).is_some() {
        return instantiate_component(element, key);
    }

    log::debug!("component `{name}` not registered yet; deferring mount");
    let el = element.clone();
    component::when_ready(&name, move |_| {
        if let Err(err) = instantiate_component(&el, key) {
            log::warn!("deferred component mount failed: {err}");
        }
    });
    Ok(())
}

fn instantiate_component(element: &Element, key: NodeKey) -> Result<(), RuntimeError> {
    struct Snapshot {
        name: String,
        props: IndexMap<String, Value>,
        events: IndexMap<String, EventHandler>,
        handle: Option<SurfaceHandle>,
        child: Option<NodeKey>,
        ready: Ready,
    }

    let snapshot = {
        let tree = element.tree_cell().borrow();
        let Some(node) = tree.get(key) else {
            return Ok(());
        };
        let NodeKind::Component { ready, .. } = &node.kind else {
            return Ok(());
        };
        Snapshot {
            name: node.node_type.name().to_string(),
            props: node.props.clone(),
            events: node.events.clone(),
            handle: node.handle,
            child: node.child,
            ready: ready.clone(),
        }
    };

    let nested = component::init_component(&snapshot.name, snapshot.props.clone(), snapshot.events)?;

    // The child's flush requests bubble to this element's scheduler, so
    // one host frame callback drains the whole instance tree.
    let parent_scope = element.scope().clone();
    nested.scope().set_schedule_hook(move || parent_scope.request_flush());

    nested.setup(snapshot.child)?;

    let Some(surface) = element.surface_rc() else {
        log::warn!("component `{}` resolved before its host mounted", snapshot.name);
        return Ok(());
    };
    let Some(handle) = snapshot.handle else {
        return Ok(());
    };
    nested.mount(surface, handle)?;

    if let Some(node) = element.tree_cell().borrow_mut().get_mut(key) {
        if let NodeKind::Component { element: slot, .. } = &mut node.kind {
            *slot = Some(nested.clone());
        }
    }
    snapshot.ready.resolve();

    // Push the prop snapshot the node last evaluated; the child's flush
    // runs through its own topological machinery.
    update_component(&nested, snapshot.props);
    Ok(())
}
