//! The render tree: node model, construction, initial attach and
//! incremental reconciliation.
//!
//! - [`node`] - the linked node arena and variant payloads
//! - [`build`] - `h`/`t` construction under dependency capture
//! - [`mount`] - the initial attach walk over the presentation surface
//! - [`reconcile`] - the post-flush walk that patches only dependent nodes
//! - [`task`] - settlement handles for await-directive nodes

mod build;
mod mount;
mod node;
mod reconcile;
mod task;

pub use node::{
    Args, Binding, BindGetter, BoolGetter, ChildrenFn, EventHandler, EventsGetter, MapGetter,
    Meta, NodeFlags, NodeKey, NodeKind, NodeType, Repeat, RepeatGetter, RenderNode, StrGetter,
    Task, TaskGetter, TextGetter, Tree, ValueGetter, new_args, read_arg,
};
pub use task::Deferred;

pub(crate) use build::{build_node, build_text};
pub(crate) use mount::mount_node;
pub(crate) use reconcile::update_tree;
