//! Relation graph and topological recompute order.
//!
//! A [`Relation`] records which dependencies a derived reactor read during
//! its last evaluation. The flush pass needs the relations ordered from
//! pure sources toward their transitive dependents so that every derived
//! value observes a consistent single-pass snapshot of the frame's
//! changes, and is recomputed at most once.
//!
//! [`layer_relations`] peels that order out of the edge list: each round
//! takes every endpoint that no remaining edge derives (and that was not
//! peeled before), then drops the edges those endpoints feed. Whatever is
//! left when no endpoint is free sits on a cycle; those members land in a
//! final catch-all layer. True cycles are unsupported; they are rejected
//! where the graph is constructed and only tolerated here so a flush never
//! wedges.

use indexmap::IndexSet;

use super::store::{Dep, ReactorId};
use crate::error::RuntimeError;

/// Records that `by` (a derived reactor) was last computed while reading
/// `deps`. At most one relation exists per derived reactor;
/// re-evaluation replaces it.
#[derive(Clone, Debug)]
pub struct Relation {
    pub deps: Vec<Dep>,
    pub by: ReactorId,
}

/// The flush order for one frame: layers from pure sources toward their
/// dependents, plus the catch-all layer of cycle members.
#[derive(Debug, Default)]
pub struct Layering {
    pub layers: Vec<Vec<Dep>>,
    pub catch_all: Vec<Dep>,
}

impl Layering {
    /// Every dep in flush order, catch-all last.
    pub fn iter(&self) -> impl Iterator<Item = &Dep> {
        self.layers.iter().flatten().chain(self.catch_all.iter())
    }
}

/// Compute the layered recompute order for a set of relations.
///
/// Tie-break within a layer is discovery order: sources in the order their
/// relations were recorded, then derived endpoints.
pub fn layer_relations(relations: &[Relation]) -> Layering {
    // Edge (source, derived-by). `all` keeps discovery order.
    let mut edges: Vec<(Dep, ReactorId)> = Vec::new();
    let mut all: IndexSet<Dep> = IndexSet::new();

    for relation in relations {
        for dep in &relation.deps {
            edges.push((dep.clone(), relation.by));
            all.insert(dep.clone());
        }
        all.insert(Dep::Reactor(relation.by));
    }

    let mut assigned: IndexSet<Dep> = IndexSet::new();
    let mut layers: Vec<Vec<Dep>> = Vec::new();

    loop {
        let blocked: IndexSet<ReactorId> = edges.iter().map(|(_, by)| *by).collect();
        let ready: Vec<Dep> = all
            .iter()
            .filter(|dep| !assigned.contains(*dep))
            .filter(|dep| match dep {
                Dep::Reactor(id) => !blocked.contains(id),
                Dep::Prop(_) => true,
            })
            .cloned()
            .collect();

        if ready.is_empty() {
            break;
        }
        for dep in &ready {
            assigned.insert(dep.clone());
        }
        edges.retain(|(source, _)| !assigned.contains(source));
        layers.push(ready);
    }

    let catch_all: Vec<Dep> = all
        .iter()
        .filter(|dep| !assigned.contains(*dep))
        .cloned()
        .collect();

    Layering { layers, catch_all }
}

/// Validate that the relation graph is acyclic.
///
/// Run where the graph is constructed (component setup); a cyclic graph
/// would otherwise only yield stale-by-one-frame values at flush time.
pub fn check_acyclic(relations: &[Relation]) -> Result<(), RuntimeError> {
    let layering = layer_relations(relations);
    if layering.catch_all.is_empty() {
        Ok(())
    } else {
        Err(RuntimeError::CyclicRelation)
    }
}

/// Whether replacing `by`'s dependency set with `deps` would close a
/// cycle: does any dep reach `by` through the existing relations?
pub fn would_cycle(relations: &[Relation], by: ReactorId, deps: &[Dep]) -> bool {
    fn reaches(relations: &[Relation], from: ReactorId, target: ReactorId, seen: &mut IndexSet<ReactorId>) -> bool {
        if from == target {
            return true;
        }
        if !seen.insert(from) {
            return false;
        }
        let Some(relation) = relations.iter().find(|relation| relation.by == from) else {
            return false;
        };
        relation.deps.iter().any(|dep| match dep {
            Dep::Reactor(id) => reaches(relations, *id, target, seen),
            Dep::Prop(_) => false,
        })
    }

    deps.iter().any(|dep| match dep {
        Dep::Reactor(id) => {
            let mut seen = IndexSet::new();
            reaches(relations, *id, by, &mut seen)
        }
        Dep::Prop(_) => false,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<ReactorId> {
        // Keys must come from a real slotmap to be meaningful.
        let mut arena: SlotMap<ReactorId, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn test_chain_layers_in_dependency_order() {
        let keys = ids(3);
        let (a, b, c) = (keys[0], keys[1], keys[2]);
        let relations = vec![
            Relation { deps: vec![Dep::Reactor(a)], by: b },
            Relation { deps: vec![Dep::Reactor(b)], by: c },
        ];

        let layering = layer_relations(&relations);

        assert_eq!(layering.layers.len(), 3);
        assert_eq!(layering.layers[0], vec![Dep::Reactor(a)]);
        assert_eq!(layering.layers[1], vec![Dep::Reactor(b)]);
        assert_eq!(layering.layers[2], vec![Dep::Reactor(c)]);
        assert!(layering.catch_all.is_empty());
    }

    #[test]
    fn test_diamond_assigns_each_endpoint_once() {
        // a -> b, a -> c, {b, c} -> d
        let keys = ids(4);
        let (a, b, c, d) = (keys[0], keys[1], keys[2], keys[3]);
        let relations = vec![
            Relation { deps: vec![Dep::Reactor(a)], by: b },
            Relation { deps: vec![Dep::Reactor(a)], by: c },
            Relation { deps: vec![Dep::Reactor(b), Dep::Reactor(c)], by: d },
        ];

        let layering = layer_relations(&relations);

        let flat: Vec<&Dep> = layering.iter().collect();
        assert_eq!(flat.len(), 4, "each endpoint appears exactly once");
        assert_eq!(layering.layers[0], vec![Dep::Reactor(a)]);
        assert_eq!(layering.layers[1], vec![Dep::Reactor(b), Dep::Reactor(c)]);
        assert_eq!(layering.layers[2], vec![Dep::Reactor(d)]);
    }

    #[test]
    fn test_prop_sources_peel_first() {
        let keys = ids(1);
        let derived = keys[0];
        let relations = vec![Relation {
            deps: vec![Dep::Prop("title".to_string())],
            by: derived,
        }];

        let layering = layer_relations(&relations);
        assert_eq!(layering.layers[0], vec![Dep::Prop("title".to_string())]);
        assert_eq!(layering.layers[1], vec![Dep::Reactor(derived)]);
    }

    #[test]
    fn test_cycle_lands_in_catch_all() {
        let keys = ids(2);
        let (a, b) = (keys[0], keys[1]);
        let relations = vec![
            Relation { deps: vec![Dep::Reactor(b)], by: a },
            Relation { deps: vec![Dep::Reactor(a)], by: b },
        ];

        let layering = layer_relations(&relations);
        assert!(layering.layers.is_empty());
        assert_eq!(layering.catch_all.len(), 2);
        assert!(check_acyclic(&relations).is_err());
    }

    #[test]
    fn test_would_cycle_detects_back_edge() {
        let keys = ids(3);
        let (a, b, c) = (keys[0], keys[1], keys[2]);
        // b derives from a; c derives from b.
        let relations = vec![
            Relation { deps: vec![Dep::Reactor(a)], by: b },
            Relation { deps: vec![Dep::Reactor(b)], by: c },
        ];

        // Re-pointing b at c closes b -> c -> b.
        assert!(would_cycle(&relations, b, &[Dep::Reactor(c)]));
        // Re-pointing c at a stays acyclic.
        assert!(!would_cycle(&relations, c, &[Dep::Reactor(a)]));
    }
}
