//! Element: one component instance's full runtime state.
//!
//! An element owns its reactive [`Scope`], render tree, style rules and
//! surface binding, and exposes the lifecycle the host wrapper drives:
//! `setup` evaluates the render/style functions, `mount` attaches to a
//! surface node, `flush` runs one coalesced recompute-and-reconcile pass
//! (the host calls it from its animation-frame callback), and
//! `unmount`/`destroy` detach and release state.
//!
//! Elements are cheap handles (`Rc` inner); the render closures a
//! component module hands over clone the handle freely. No reactor
//! identity ever crosses an element boundary: parents push prop
//! snapshots with [`update_component`] and children report back through
//! emitted events.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::component::Context;
use crate::error::RuntimeError;
use crate::reactor::{ReactorId, Scope, check_acyclic};
use crate::scheduler;
use crate::style::{self, Brush, StyleRule, StyleValue};
use crate::surface::{Surface, SurfaceHandle};
use crate::tree::{
    self, ChildrenFn, EventHandler, Meta, NodeKey, NodeKind, NodeType, TextGetter, Tree,
};
use crate::value::Value;

struct ElementInner {
    name: String,
    scope: Scope,
    tree: RefCell<Tree>,
    context: RefCell<Option<Context>>,
    styles: RefCell<Vec<StyleRule>>,
    brushes: RefCell<Vec<Brush>>,
    brush_counter: Cell<usize>,
    style_block: Cell<Option<SurfaceHandle>>,
    brush_block: Cell<Option<SurfaceHandle>>,
    surface: RefCell<Option<Rc<dyn Surface>>>,
    root: Cell<Option<SurfaceHandle>>,
    slot: Cell<Option<NodeKey>>,
    mounted: Cell<bool>,
    events: RefCell<IndexMap<String, EventHandler>>,
}

/// See the module docs.
#[derive(Clone)]
pub struct Element {
    inner: Rc<ElementInner>,
}

impl Element {
    /// Create an instance with its initial prop snapshot and the event
    /// callbacks the instantiating parent registered.
    pub fn new(
        name: &str,
        props: IndexMap<String, Value>,
        events: IndexMap<String, EventHandler>,
    ) -> Self {
        let scope = Scope::new();
        scope.set_props(props);
        Self {
            inner: Rc::new(ElementInner {
                name: name.to_string(),
                scope,
                tree: RefCell::new(Tree::default()),
                context: RefCell::new(None),
                styles: RefCell::new(Vec::new()),
                brushes: RefCell::new(Vec::new()),
                brush_counter: Cell::new(0),
                style_block: Cell::new(None),
                brush_block: Cell::new(None),
                surface: RefCell::new(None),
                root: Cell::new(None),
                slot: Cell::new(None),
                mounted: Cell::new(false),
                events: RefCell::new(events),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    /// The slot subtree the instantiating parent passed to `setup`, if
    /// any. The keys belong to the parent's arena; compiled render
    /// functions use this for slot placement.
    pub fn slot(&self) -> Option<NodeKey> {
        self.inner.slot.get()
    }

    // =========================================================================
    // Reactive API (bound to this instance's scope)
    // =========================================================================

    pub fn reactive(&self, getter: impl Fn() -> Value + 'static, computed: bool) -> ReactorId {
        self.inner.scope.reactive(getter, computed)
    }

    pub fn consume(&self, id: ReactorId) -> Value {
        self.inner.scope.consume(id)
    }

    pub fn update(&self, id: ReactorId, f: impl FnOnce(&Value) -> Value) {
        self.inner.scope.update(id, f)
    }

    pub fn watch(&self, reactors: &[ReactorId], callback: impl Fn() + 'static) {
        self.inner.scope.watch(reactors, callback)
    }

    // =========================================================================
    // Render API (bound to this instance's tree)
    // =========================================================================

    /// Build one render node, or a keyed list when `meta.repeat` is set.
    pub fn h(&self, node_type: NodeType, meta: Meta, children: Option<ChildrenFn>) -> NodeKey {
        tree::build_node(self, node_type, meta, children)
    }

    /// Build one text node under dependency capture.
    pub fn t(&self, getter: impl Fn() -> String + 'static) -> NodeKey {
        let getter: TextGetter = Rc::new(getter);
        tree::build_text(self, getter)
    }

    /// Create a dynamic style value, evaluated under capture and exposed
    /// as a named custom property.
    pub fn brush(&self, getter: impl Fn() -> String + 'static) -> Brush {
        let getter: Rc<dyn Fn() -> String> = Rc::new(getter);
        let g = getter.clone();
        let (value, deps) = self.inner.scope.collect(move || g());
        let n = self.inner.brush_counter.get();
        self.inner.brush_counter.set(n + 1);
        Brush::new(format!("b{n}"), getter, value, deps)
    }

    /// Convenience for building one style rule.
    pub fn rule(
        &self,
        selector: &str,
        decls: impl IntoIterator<Item = (String, StyleValue)>,
    ) -> StyleRule {
        StyleRule::Rule {
            selector: selector.to_string(),
            decls: decls.into_iter().collect(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub(crate) fn set_context(&self, context: Context) {
        *self.inner.context.borrow_mut() = Some(context);
    }

    /// Evaluate the style and render functions and store the tree. Must
    /// run before `mount`.
    pub fn setup(&self, slot: Option<NodeKey>) -> Result<(), RuntimeError> {
        let context = self.inner.context.borrow().clone().ok_or_else(|| {
            RuntimeError::UnsupportedStructure(format!(
                "component `{}` has no context before setup",
                self.inner.name
            ))
        })?;

        if let Some(dye) = &context.dye {
            *self.inner.styles.borrow_mut() = dye(self);
        }

        self.inner.slot.set(slot);
        let root = (context.render)(self)?;
        self.inner.tree.borrow_mut().root = root;

        // The graph is fully constructed now; cycles are unsupported and
        // rejected here rather than yielding stale values every frame.
        check_acyclic(&self.inner.scope.relations_snapshot())?;
        Ok(())
    }

    /// Attach the tree to the given surface node. An empty render tree is
    /// a configuration error surfaced here.
    pub fn mount(&self, surface: Rc<dyn Surface>, root: SurfaceHandle) -> Result<(), RuntimeError> {
        let tree_root = self
            .inner
            .tree
            .borrow()
            .root
            .ok_or_else(|| RuntimeError::EmptyRender(self.inner.name.clone()))?;

        *self.inner.surface.borrow_mut() = Some(surface);
        self.inner.root.set(Some(root));

        self.mount_styles(root);
        tree::mount_node(self, tree_root, root)?;
        self.inner.mounted.set(true);
        Ok(())
    }

    fn mount_styles(&self, root: SurfaceHandle) {
        let styles = self.inner.styles.borrow().clone();
        if styles.is_empty() {
            return;
        }
        let mut brushes = Vec::new();
        let css = style::serialize_rules(&styles, &mut brushes);

        self.with_surface(|surface| {
            if !brushes.is_empty() {
                let block = surface.create_element("style");
                surface.set_text(block, &style::brush_block_content(&brushes));
                surface.append_child(root, block);
                self.inner.brush_block.set(Some(block));
            }
            let block = surface.create_element("style");
            surface.set_text(block, &css);
            surface.append_child(root, block);
            self.inner.style_block.set(Some(block));
        });
        *self.inner.brushes.borrow_mut() = brushes;
    }

    /// One coalesced flush: graph recomputation, brush refresh, tree
    /// reconciliation. Afterwards, cascade into nested elements whose own
    /// flushes are pending. The host calls this from its animation-frame
    /// callback.
    pub fn flush(&self) {
        if let Some(changed) = scheduler::flush_graph(&self.inner.scope) {
            style::refresh_brushes(self, &changed);
            self.inner.scope.finish_flush();
            tree::update_tree(self, &changed);
        }
        self.flush_children();
    }

    fn flush_children(&self) {
        let nested: Vec<Element> = {
            let tree = self.inner.tree.borrow();
            tree.nodes
                .values()
                .filter_map(|node| match &node.kind {
                    NodeKind::Component {
                        element: Some(element),
                        ..
                    } => Some(element.clone()),
                    _ => None,
                })
                .collect()
        };
        for child in nested {
            if child.scope().flush_pending() {
                child.flush();
            }
        }
    }

    /// Detach from the surface. Safe only after `mount`.
    pub fn unmount(&self) {
        let Some(root) = self.inner.root.get() else {
            return;
        };
        let tree_root = self.inner.tree.borrow().root;
        if let Some(tree_root) = tree_root {
            self.detach_top(tree_root, root);
        }
        self.with_surface(|surface| {
            if let Some(block) = self.inner.style_block.take() {
                surface.remove_child(root, block);
            }
            if let Some(block) = self.inner.brush_block.take() {
                surface.remove_child(root, block);
            }
        });
        self.inner.mounted.set(false);
    }

    fn detach_top(&self, key: NodeKey, root: SurfaceHandle) {
        let (handle, list) = {
            let tree = self.inner.tree.borrow();
            match tree.get(key) {
                Some(node) => match &node.kind {
                    NodeKind::List { list, .. } => (node.handle, Some(list.clone())),
                    _ => (node.handle, None),
                },
                None => return,
            }
        };
        if let Some(handle) = handle {
            self.with_surface(|surface| surface.remove_child(root, handle));
        } else if let Some(list) = list {
            for item in list {
                self.detach_top(item, root);
            }
        }
    }

    /// Detach and release all per-instance state.
    pub fn destroy(&self) {
        self.unmount();
        self.inner.scope.clear();
        self.inner.tree.borrow_mut().clear();
        self.inner.styles.borrow_mut().clear();
        self.inner.brushes.borrow_mut().clear();
        *self.inner.context.borrow_mut() = None;
        *self.inner.surface.borrow_mut() = None;
        self.inner.root.set(None);
        self.inner.slot.set(None);
        self.inner.events.borrow_mut().clear();
    }

    // =========================================================================
    // Host-driven entry points
    // =========================================================================

    /// Invoke a node's captured event handler (the host wrapper bridges
    /// its native events here).
    pub fn dispatch(&self, key: NodeKey, event: &str, payload: Value) {
        let handler = {
            let tree = self.inner.tree.borrow();
            tree.get(key).and_then(|node| node.events.get(event).cloned())
        };
        if let Some(handler) = handler {
            handler(payload);
        }
    }

    /// Drive a node's two-way binding with a host-reported input value.
    pub fn input(&self, key: NodeKey, value: Value) {
        let (bind, handle) = {
            let tree = self.inner.tree.borrow();
            match tree.get(key) {
                Some(node) => (node.bind.clone(), node.handle),
                None => return,
            }
        };
        let Some(bind) = bind else {
            return;
        };
        if let Some(handle) = handle {
            self.with_surface(|surface| surface.set_value(handle, &value.to_string()));
        }
        if let Some(node) = self.inner.tree.borrow_mut().get_mut(key) {
            if let Some(bind) = &mut node.bind {
                bind.value = value.clone();
            }
        }
        (bind.set)(value);
    }

    /// Call an event callback the instantiating parent registered.
    /// Returns whether a callback was present.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        let handler = self.inner.events.borrow().get(event).cloned();
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Crate-internal accessors
    // =========================================================================

    pub(crate) fn tree_cell(&self) -> &RefCell<Tree> {
        &self.inner.tree
    }

    pub(crate) fn surface_rc(&self) -> Option<Rc<dyn Surface>> {
        self.inner.surface.borrow().clone()
    }

    pub(crate) fn with_surface(&self, f: impl FnOnce(&dyn Surface)) {
        let surface = self.surface_rc();
        if let Some(surface) = surface {
            f(surface.as_ref());
        }
    }

    pub(crate) fn brush_block(&self) -> Option<SurfaceHandle> {
        self.inner.brush_block.get()
    }

    pub(crate) fn brushes(&self) -> Vec<Brush> {
        self.inner.brushes.borrow().clone()
    }
}

/// Prop-change ingestion: diff old vs new prop keys, replace the
/// snapshot, enqueue exactly the changed keys, and schedule a flush.
///
/// A child's prop-driven flush runs through the same topological
/// machinery as its internal mutations.
pub fn update_component(element: &Element, props: IndexMap<String, Value>) {
    let origin = element.scope().props();

    let mut keys: IndexSet<String> = origin.keys().cloned().collect();
    keys.extend(props.keys().cloned());

    let changed: Vec<String> = keys
        .into_iter()
        .filter(|key| origin.get(key) != props.get(key))
        .collect();

    element.scope().set_props(props);
    for key in &changed {
        element.scope().queue_prop(key);
    }
    element.scope().request_flush();
}

// =============================================================================
// Tests
// =============================================================================
