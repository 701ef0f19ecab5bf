//! In-memory presentation surface.
//!
//! A plain ordered tree with attribute maps, used as the host surface in
//! tests and headless embeddings. Beyond the [`Surface`] contract it
//! exposes inspection helpers: a creation counter (subtree-reuse
//! assertions lean on it), child listings, and a compact one-line
//! snapshot via [`MemorySurface::render_to_string`].

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;

use super::{Surface, SurfaceHandle};

#[derive(Default)]
struct MemoryNode {
    tag: Option<String>,
    text: String,
    attrs: IndexMap<String, String>,
    classes: String,
    style: String,
    value: String,
    children: Vec<u64>,
    parent: Option<u64>,
}

#[derive(Default)]
struct MemoryInner {
    nodes: HashMap<u64, MemoryNode>,
    next_id: u64,
    created: usize,
    root: u64,
}

/// See the module docs.
#[derive(Default)]
pub struct MemorySurface {
    inner: RefCell<MemoryInner>,
}

impl MemorySurface {
    pub fn new() -> Self {
        let surface = Self::default();
        {
            let mut inner = surface.inner.borrow_mut();
            let root = inner.next_id;
            inner.next_id += 1;
            inner.nodes.insert(
                root,
                MemoryNode {
                    tag: Some("root".to_string()),
                    ..Default::default()
                },
            );
            inner.root = root;
            // The implicit root does not count as a created node.
            inner.created = 0;
        }
        surface
    }

    /// The implicit root node everything mounts into.
    pub fn root(&self) -> SurfaceHandle {
        SurfaceHandle(self.inner.borrow().root)
    }

    /// How many nodes the engine has created so far (root excluded).
    pub fn created_count(&self) -> usize {
        self.inner.borrow().created
    }

    pub fn children_of(&self, parent: SurfaceHandle) -> Vec<SurfaceHandle> {
        self.inner
            .borrow()
            .nodes
            .get(&parent.0)
            .map(|node| node.children.iter().map(|id| SurfaceHandle(*id)).collect())
            .unwrap_or_default()
    }

    pub fn tag_of(&self, node: SurfaceHandle) -> Option<String> {
        self.inner.borrow().nodes.get(&node.0)?.tag.clone()
    }

    pub fn text_of(&self, node: SurfaceHandle) -> String {
        self.inner
            .borrow()
            .nodes
            .get(&node.0)
            .map(|node| node.text.clone())
            .unwrap_or_default()
    }

    pub fn attr_of(&self, node: SurfaceHandle, name: &str) -> Option<String> {
        self.inner.borrow().nodes.get(&node.0)?.attrs.get(name).cloned()
    }

    pub fn classes_of(&self, node: SurfaceHandle) -> String {
        self.inner
            .borrow()
            .nodes
            .get(&node.0)
            .map(|node| node.classes.clone())
            .unwrap_or_default()
    }

    pub fn style_of(&self, node: SurfaceHandle) -> String {
        self.inner
            .borrow()
            .nodes
            .get(&node.0)
            .map(|node| node.style.clone())
            .unwrap_or_default()
    }

    pub fn value_of(&self, node: SurfaceHandle) -> String {
        self.inner
            .borrow()
            .nodes
            .get(&node.0)
            .map(|node| node.value.clone())
            .unwrap_or_default()
    }

    /// Render a subtree as a compact snapshot, e.g.
    /// `<div class="row"><span>hi</span></div>`.
    pub fn render_to_string(&self, node: SurfaceHandle) -> String {
        let inner = self.inner.borrow();
        let mut out = String::new();
        render_node(&inner, node.0, &mut out);
        out
    }

    fn create(&self, node: MemoryNode) -> SurfaceHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.created += 1;
        inner.nodes.insert(id, node);
        SurfaceHandle(id)
    }

    fn detach(inner: &mut MemoryInner, child: u64) {
        if let Some(parent) = inner.nodes.get(&child).and_then(|node| node.parent) {
            if let Some(parent_node) = inner.nodes.get_mut(&parent) {
                parent_node.children.retain(|id| *id != child);
            }
        }
        if let Some(node) = inner.nodes.get_mut(&child) {
            node.parent = None;
        }
    }
}

fn render_node(inner: &MemoryInner, id: u64, out: &mut String) {
    let Some(node) = inner.nodes.get(&id) else {
        return;
    };
    match &node.tag {
        Some(tag) => {
            out.push('<');
            out.push_str(tag);
            if !node.classes.is_empty() {
                out.push_str(&format!(" class=\"{}\"", node.classes));
            }
            for (name, value) in &node.attrs {
                out.push_str(&format!(" {name}=\"{value}\""));
            }
            if !node.style.is_empty() {
                out.push_str(&format!(" style=\"{}\"", node.style));
            }
            if node.children.is_empty() && node.text.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            out.push_str(&node.text);
            for child in &node.children {
                render_node(inner, *child, out);
            }
            out.push_str(&format!("</{tag}>"));
        }
        None => out.push_str(&node.text),
    }
}

impl Surface for MemorySurface {
    fn create_element(&self, tag: &str) -> SurfaceHandle {
        self.create(MemoryNode {
            tag: Some(tag.to_string()),
            ..Default::default()
        })
    }

    fn create_text(&self, text: &str) -> SurfaceHandle {
        self.create(MemoryNode {
            text: text.to_string(),
            ..Default::default()
        })
    }

    fn insert_before(&self, parent: SurfaceHandle, child: SurfaceHandle, anchor: Option<SurfaceHandle>) {
        let mut inner = self.inner.borrow_mut();
        MemorySurface::detach(&mut inner, child.0);

        let position = anchor.and_then(|anchor| {
            inner
                .nodes
                .get(&parent.0)
                .and_then(|node| node.children.iter().position(|id| *id == anchor.0))
        });
        if let Some(parent_node) = inner.nodes.get_mut(&parent.0) {
            match position {
                Some(index) => parent_node.children.insert(index, child.0),
                None => parent_node.children.push(child.0),
            }
        }
        if let Some(child_node) = inner.nodes.get_mut(&child.0) {
            child_node.parent = Some(parent.0);
        }
    }

    fn remove_child(&self, parent: SurfaceHandle, child: SurfaceHandle) {
        let mut inner = self.inner.borrow_mut();
        let attached = inner
            .nodes
            .get(&child.0)
            .is_some_and(|node| node.parent == Some(parent.0));
        if attached {
            MemorySurface::detach(&mut inner, child.0);
        }
    }

    fn set_text(&self, node: SurfaceHandle, text: &str) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(&node.0) {
            node.text = text.to_string();
        }
    }

    fn set_attribute(&self, node: SurfaceHandle, name: &str, value: &str) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(&node.0) {
            node.attrs.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&self, node: SurfaceHandle, name: &str) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(&node.0) {
            node.attrs.shift_remove(name);
        }
    }

    fn set_classes(&self, node: SurfaceHandle, classes: &str) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(&node.0) {
            node.classes = classes.to_string();
        }
    }

    fn set_style_text(&self, node: SurfaceHandle, css: &str) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(&node.0) {
            node.style = css.to_string();
        }
    }

    fn set_value(&self, node: SurfaceHandle, value: &str) {
        if let Some(node) = self.inner.borrow_mut().nodes.get_mut(&node.0) {
            node.value = value.to_string();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_snapshot() {
        let surface = MemorySurface::new();
        let root = surface.root();

        let div = surface.create_element("div");
        let text = surface.create_text("hello");
        surface.append_child(root, div);
        surface.append_child(div, text);
        surface.set_classes(div, "greeting");

        assert_eq!(
            surface.render_to_string(root),
            "<root><div class=\"greeting\">hello</div></root>"
        );
        assert_eq!(surface.created_count(), 2);
    }

    #[test]
    fn test_insert_before_anchor() {
        let surface = MemorySurface::new();
        let root = surface.root();

        let a = surface.create_element("a");
        let c = surface.create_element("c");
        surface.append_child(root, a);
        surface.append_child(root, c);

        let b = surface.create_element("b");
        surface.insert_before(root, b, Some(c));

        let tags: Vec<String> = surface
            .children_of(root)
            .into_iter()
            .filter_map(|child| surface.tag_of(child))
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reinsert_moves_instead_of_duplicating() {
        let surface = MemorySurface::new();
        let root = surface.root();

        let a = surface.create_element("a");
        let b = surface.create_element("b");
        surface.append_child(root, a);
        surface.append_child(root, b);

        // Move `a` to the end.
        surface.insert_before(root, a, None);

        let tags: Vec<String> = surface
            .children_of(root)
            .into_iter()
            .filter_map(|child| surface.tag_of(child))
            .collect();
        assert_eq!(tags, vec!["b", "a"], "re-insertion must move, not copy");
        assert_eq!(surface.created_count(), 2);
    }

    #[test]
    fn test_remove_child() {
        let surface = MemorySurface::new();
        let root = surface.root();

        let div = surface.create_element("div");
        surface.append_child(root, div);
        surface.remove_child(root, div);

        assert!(surface.children_of(root).is_empty());
        // The node itself survives detached; a re-insert can bring it back.
        surface.append_child(root, div);
        assert_eq!(surface.children_of(root).len(), 1);
    }

    #[test]
    fn test_attribute_roundtrip() {
        let surface = MemorySurface::new();
        let div = surface.create_element("div");

        surface.set_attribute(div, "data-id", "7");
        assert_eq!(surface.attr_of(div, "data-id"), Some("7".to_string()));

        surface.remove_attribute(div, "data-id");
        assert_eq!(surface.attr_of(div, "data-id"), None);
    }
}
