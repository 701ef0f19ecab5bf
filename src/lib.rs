//! # filament
//!
//! Fine-grained reactive component runtime for Rust.
//!
//! filament runs compiled components against an abstract presentation
//! surface: a component module hands over a render function (and an
//! optional style function), and the runtime tracks which reactive values
//! each part of the tree reads, batches mutations into one flush per
//! animation frame, recomputes exactly the affected derived values in
//! dependency order, and patches the surface with minimal structural
//! change: keyed list diffing, lazy reveal, async-node settlement.
//!
//! ## Architecture
//!
//! Each component instance is one [`Element`] owning a reactive scope,
//! a linked render-node tree and its style bridge:
//!
//! ```text
//! update(reactor) → mutation queue → flush (topological recompute)
//!                 → brush refresh → tree reconciliation → surface
//! ```
//!
//! The compiler, module loader, worker transport and host wrapper are
//! collaborators, not part of this crate: they register components via
//! [`component::define`], drive [`Element::flush`] from their frame
//! callback, and implement [`Surface`] over the real host tree.
//!
//! ## Modules
//!
//! - [`value`] - dynamic values with copy-on-write structural sharing
//! - [`reactor`] - reactor store, dependency collector, relation graph
//! - [`tree`] - render node model, mount walk, reconciliation
//! - [`surface`] - the presentation surface abstraction
//! - [`style`] - brushes and per-instance style blocks
//! - [`component`] - registry and readiness gates
//! - [`element`] - per-instance lifecycle

pub mod component;
pub mod element;
pub mod error;
pub mod reactor;
mod scheduler;
pub mod style;
pub mod surface;
pub mod tree;
pub mod value;

pub use component::{
    ComponentDef, Context, Ready, define, init_component, lookup, reset_components, when_ready,
};

pub use element::{Element, update_component};

pub use error::RuntimeError;

pub use reactor::{Dep, Input, ReactorId, Relation, Scope};

pub use style::{Brush, StyleRule, StyleValue};

pub use surface::{MemorySurface, Surface, SurfaceHandle};

pub use tree::{
    Args, Binding, ChildrenFn, Deferred, EventHandler, Meta, NodeFlags, NodeKey, NodeKind,
    NodeType, Repeat, Task, read_arg,
};

pub use value::{PathSeg, Value};
