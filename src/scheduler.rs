//! Update scheduler: the once-per-frame flush over the relation graph.
//!
//! Mutations coalesce in the scope's queue; the host's animation-frame
//! callback drives one flush. The flush walks the layered recompute order
//! from [`crate::reactor::layer_relations`] and re-evaluates exactly the
//! derived reactors whose recorded dependencies intersect the running
//! changed set, once each and in dependency order, so every getter
//! observes a consistent snapshot of all upstream changes within the frame.
//!
//! Style brushes and tree reconciliation run after this pass; the element
//! coordinates those (see [`crate::element`]).

use indexmap::IndexSet;

use crate::reactor::{Dep, Relation, Scope, layer_relations, would_cycle};

/// Recompute the relation graph against the pending mutation set.
///
/// Returns the final changed set for brush refresh and reconciliation, or
/// `None` when the queue was empty (the pending flag is lowered either
/// way; callers must still invoke [`Scope::finish_flush`] on `Some`).
pub(crate) fn flush_graph(scope: &Scope) -> Option<IndexSet<Dep>> {
    let mut changed = scope.take_changed_seed()?;

    let relations = scope.relations_snapshot();
    let layering = layer_relations(&relations);
    if !layering.catch_all.is_empty() {
        log::warn!(
            "relation graph has {} member(s) reachable only through a cycle; \
             recomputing once without ordering guarantees",
            layering.catch_all.len()
        );
    }

    for dep in layering.iter() {
        let Dep::Reactor(id) = dep else {
            continue;
        };
        // Pure sources have no relation and nothing to recompute.
        let Some(prev_deps) = scope.relation_deps(*id) else {
            continue;
        };
        if !prev_deps.iter().any(|dep| changed.contains(dep)) {
            continue;
        }
        let Some(getter) = scope.getter_of(*id) else {
            continue;
        };

        let (value, mut deps) = scope.collect(move || getter());
        scope.set_value(*id, value);

        // Self-referential recomputation (increment-style getters) would
        // otherwise record a self-edge and loop forever: splice the
        // previous dependency set in at the self-edge's position.
        if let Some(pos) = deps.iter().position(|dep| *dep == Dep::Reactor(*id)) {
            let tail = deps.split_off(pos + 1);
            deps.pop();
            deps.extend(prev_deps.iter().cloned());
            deps.extend(tail);
        }
        let deps: Vec<Dep> = deps
            .into_iter()
            .collect::<IndexSet<Dep>>()
            .into_iter()
            .collect();

        if would_cycle(&relations_without(&scope.relations_snapshot(), *id), *id, &deps) {
            log::warn!("recaptured dependencies would close a relation cycle; keeping the previous set");
        } else {
            scope.replace_relation_deps(*id, deps);
        }

        changed.insert(Dep::Reactor(*id));
    }

    Some(changed)
}

fn relations_without(relations: &[Relation], by: crate::reactor::ReactorId) -> Vec<Relation> {
    relations
        .iter()
        .filter(|relation| relation.by != by)
        .cloned()
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::cell::Cell;
    use std::rc::Rc;

    fn flush(scope: &Scope) -> IndexSet<Dep> {
        let changed = flush_graph(scope).expect("queue should not be empty");
        scope.finish_flush();
        changed
    }

    #[test]
    fn test_two_updates_one_flush_one_recompute() {
        let scope = Scope::new();
        let count = scope.reactive(|| Value::Int(0), false);

        let invocations = Rc::new(Cell::new(0));
        let s = scope.clone();
        let calls = invocations.clone();
        let doubled = scope.reactive(
            move || {
                calls.set(calls.get() + 1);
                Value::Int(s.consume(count).as_int().unwrap_or(0) * 2)
            },
            true,
        );
        invocations.set(0); // discard the setup evaluation

        scope.update(count, |c| Value::Int(c.as_int().unwrap() + 1));
        scope.update(count, |c| Value::Int(c.as_int().unwrap() + 1));

        let changed = flush(&scope);

        assert_eq!(scope.value(count), Value::Int(2));
        assert_eq!(scope.value(doubled), Value::Int(4));
        assert_eq!(
            invocations.get(),
            1,
            "the derived getter runs exactly once per flush"
        );
        assert!(changed.contains(&Dep::Reactor(doubled)));
        assert!(!scope.flush_pending());
    }

    #[test]
    fn test_chain_recomputes_in_topological_order() {
        let scope = Scope::new();
        let a = scope.reactive(|| Value::Int(1), false);

        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        let s = scope.clone();
        let trace = order.clone();
        let b = scope.reactive(
            move || {
                trace.borrow_mut().push("b");
                Value::Int(s.consume(a).as_int().unwrap_or(0) + 10)
            },
            true,
        );

        let s = scope.clone();
        let trace = order.clone();
        let c = scope.reactive(
            move || {
                trace.borrow_mut().push("c");
                Value::Int(s.consume(b).as_int().unwrap_or(0) * 2)
            },
            true,
        );

        order.borrow_mut().clear();
        scope.update(a, |_| Value::Int(5));
        flush(&scope);

        assert_eq!(
            *order.borrow(),
            vec!["b", "c"],
            "b must recompute before c"
        );
        assert_eq!(scope.value(b), Value::Int(15));
        assert_eq!(
            scope.value(c),
            Value::Int(30),
            "c must see b's post-update value, never a stale one"
        );
    }

    #[test]
    fn test_untouched_derived_is_skipped() {
        let scope = Scope::new();
        let a = scope.reactive(|| Value::Int(1), false);
        let unrelated = scope.reactive(|| Value::Int(100), false);

        let invocations = Rc::new(Cell::new(0));
        let s = scope.clone();
        let calls = invocations.clone();
        let _watching_unrelated = scope.reactive(
            move || {
                calls.set(calls.get() + 1);
                s.consume(unrelated)
            },
            true,
        );
        invocations.set(0);

        scope.update(a, |_| Value::Int(2));
        flush(&scope);

        assert_eq!(
            invocations.get(),
            0,
            "deriveds with no changed dependency must not recompute"
        );
    }

    #[test]
    fn test_multiple_sources_single_recompute() {
        let scope = Scope::new();
        let a = scope.reactive(|| Value::Int(1), false);
        let b = scope.reactive(|| Value::Int(2), false);

        let invocations = Rc::new(Cell::new(0));
        let s = scope.clone();
        let calls = invocations.clone();
        let sum = scope.reactive(
            move || {
                calls.set(calls.get() + 1);
                Value::Int(
                    s.consume(a).as_int().unwrap_or(0) + s.consume(b).as_int().unwrap_or(0),
                )
            },
            true,
        );
        invocations.set(0);

        scope.update(a, |_| Value::Int(10));
        scope.update(b, |_| Value::Int(20));
        flush(&scope);

        assert_eq!(scope.value(sum), Value::Int(30));
        assert_eq!(
            invocations.get(),
            1,
            "updating both sources before the flush still recomputes once"
        );
    }

    #[test]
    fn test_self_edge_replaced_with_previous_deps() {
        let scope = Scope::new();
        let step = scope.reactive(|| Value::Int(1), false);

        // total = total + step: a self-referential accumulator.
        let s = scope.clone();
        let total_slot: Rc<Cell<Option<crate::reactor::ReactorId>>> = Rc::new(Cell::new(None));
        let slot = total_slot.clone();
        let total = scope.reactive(
            move || {
                let base = slot
                    .get()
                    .map(|id| s.consume(id).as_int().unwrap_or(0))
                    .unwrap_or(0);
                Value::Int(base + s.consume(step).as_int().unwrap_or(0))
            },
            true,
        );
        total_slot.set(Some(total));

        assert_eq!(scope.value(total), Value::Int(1));

        scope.update(step, |_| Value::Int(5));
        flush(&scope);

        assert_eq!(scope.value(total), Value::Int(6));
        let deps = scope.relation_deps(total).unwrap();
        assert!(
            !deps.contains(&Dep::Reactor(total)),
            "the self-edge must be expanded away, not recorded"
        );
        assert!(deps.contains(&Dep::Reactor(step)));

        // A second flush converges instead of looping on the self-edge.
        scope.update(step, |_| Value::Int(2));
        flush(&scope);
        assert_eq!(scope.value(total), Value::Int(8));
    }

    #[test]
    fn test_prop_change_drives_derived() {
        let scope = Scope::new();
        scope.set_props(indexmap::IndexMap::from([(
            "count".to_string(),
            Value::Int(3),
        )]));

        let s = scope.clone();
        let doubled = scope.reactive(
            move || Value::Int(s.prop("count").as_int().unwrap_or(0) * 2),
            true,
        );
        assert_eq!(scope.value(doubled), Value::Int(6));

        scope.set_props(indexmap::IndexMap::from([(
            "count".to_string(),
            Value::Int(5),
        )]));
        scope.queue_prop("count");
        scope.request_flush();
        let changed = flush(&scope);

        assert_eq!(scope.value(doubled), Value::Int(10));
        assert!(changed.contains(&Dep::Reactor(doubled)));
    }
}
