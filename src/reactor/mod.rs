//! Reactive state: the reactor store, dependency collector and relation
//! graph.
//!
//! A [`Scope`] is the reactive half of one component instance. It owns the
//! reactor arena, the ambient dependency collector, the relation graph and
//! the pending mutation queue. Every element gets its own scope; reactor
//! identity is never shared across component boundaries.
//!
//! The flow is deliberately simple:
//! 1. `reactive()` creates a value cell; computed cells evaluate under
//!    capture and record a [`Relation`].
//! 2. `consume()` reads a cell and, if a capture is in progress, records
//!    the read into the ambient collector.
//! 3. `update()` replaces a cell's value, fires watchers synchronously and
//!    enqueues the cell for the next flush.
//! 4. The scheduler recomputes derived cells in relation order once per
//!    frame (see [`crate::scheduler`]).

mod graph;
mod store;

pub use graph::{Layering, Relation, check_acyclic, layer_relations, would_cycle};
pub use store::{Dep, Getter, Input, ReactorId, Scope};
