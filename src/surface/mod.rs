//! The presentation surface: the host tree the engine patches.
//!
//! The engine never talks to a concrete host (DOM, terminal, scene graph)
//! directly. It writes through [`Surface`], a handle-based structural API
//! the host wrapper implements. All methods take `&self`: the engine is
//! single-threaded and implementations use interior mutability.
//!
//! [`MemorySurface`] is the complete in-memory implementation used by
//! tests and headless hosts; its creation counter and snapshot rendering
//! are what the reconciliation tests assert against.

mod memory;

pub use memory::MemorySurface;

/// Opaque handle to one node of the host tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

pub trait Surface {
    /// Create a detached element node.
    fn create_element(&self, tag: &str) -> SurfaceHandle;

    /// Create a detached text leaf.
    fn create_text(&self, text: &str) -> SurfaceHandle;

    /// Insert `child` into `parent` before `anchor` (append when `None`).
    /// Re-inserting an attached node moves it.
    fn insert_before(&self, parent: SurfaceHandle, child: SurfaceHandle, anchor: Option<SurfaceHandle>);

    /// Detach `child` from `parent`. Unknown children are ignored.
    fn remove_child(&self, parent: SurfaceHandle, child: SurfaceHandle);

    /// Replace a node's text content (text leaves and style blocks).
    fn set_text(&self, node: SurfaceHandle, text: &str);

    fn set_attribute(&self, node: SurfaceHandle, name: &str, value: &str);

    fn remove_attribute(&self, node: SurfaceHandle, name: &str);

    /// Replace the node's class list wholesale.
    fn set_classes(&self, node: SurfaceHandle, classes: &str);

    /// Replace the node's inline style text wholesale.
    fn set_style_text(&self, node: SurfaceHandle, css: &str);

    /// Write a form value (two-way bindings).
    fn set_value(&self, node: SurfaceHandle, value: &str);

    fn append_child(&self, parent: SurfaceHandle, child: SurfaceHandle) {
        self.insert_before(parent, child, None);
    }
}
