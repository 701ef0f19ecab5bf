//! Reactor store and dependency collector.
//!
//! Reactors live in a slotmap arena keyed by [`ReactorId`]; the key is the
//! reactor's identity everywhere else in the engine (relations, node deps,
//! the mutation queue). Prop reads from the host are tracked as
//! [`Dep::Prop`] keyed by name, so a parent's prop push and an internal
//! mutation drive the very same flush machinery.
//!
//! Borrow discipline: user closures (getters, watchers, updaters) are
//! never invoked while the inner `RefCell` is borrowed. Capture state is
//! swapped out, the closure runs borrow-free, then state is swapped back.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use slotmap::{SlotMap, new_key_type};

use super::graph::Relation;
use crate::value::{PathSeg, Value};

new_key_type! {
    /// Identity of one reactor within its owning scope.
    pub struct ReactorId;
}

/// A recomputation recipe. After an explicit `update` the getter is a
/// constant closure over the new value, so recomputation is a no-op until
/// the cell changes again.
pub type Getter = Rc<dyn Fn() -> Value>;

/// One endpoint of a dependency edge: an internal reactor, or an external
/// prop identified by key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dep {
    Reactor(ReactorId),
    Prop(String),
}

/// Something a render expression reads: a plain value (identity
/// passthrough) or a reactor (tracked read). Iteration args and async
/// bindings flow through this, so expressions mix both uniformly.
#[derive(Clone)]
pub enum Input {
    Value(Value),
    Reactor(ReactorId),
}

struct ReactorSlot {
    value: Value,
    getter: Getter,
    derived: bool,
}

struct Watcher {
    dep: Dep,
    callback: Rc<dyn Fn()>,
}

#[derive(Default)]
struct ScopeInner {
    reactors: SlotMap<ReactorId, ReactorSlot>,
    relations: Vec<Relation>,
    collector: IndexSet<Dep>,
    collecting: bool,
    queue: IndexSet<Dep>,
    flush_pending: bool,
    on_schedule: Option<Rc<dyn Fn()>>,
    watchers: Vec<Watcher>,
    props: IndexMap<String, Value>,
}

/// The reactive state of one component instance. Cheap to clone; all
/// clones share the same store.
#[derive(Clone, Default)]
pub struct Scope {
    inner: Rc<RefCell<ScopeInner>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Creation and reads
    // =========================================================================

    /// Create a reactor.
    ///
    /// With `computed` set, the getter evaluates immediately under capture
    /// and a non-empty dependency set becomes a [`Relation`]; the reactor
    /// then recomputes whenever a dependency changes. Otherwise the getter
    /// is invoked once and the reactor is a plain mutable cell.
    pub fn reactive(&self, getter: impl Fn() -> Value + 'static, computed: bool) -> ReactorId {
        let getter: Getter = Rc::new(getter);

        let (value, deps) = if computed {
            let g = getter.clone();
            self.collect(move || g())
        } else {
            (getter(), Vec::new())
        };

        let mut inner = self.inner.borrow_mut();
        let id = inner.reactors.insert(ReactorSlot {
            value,
            getter,
            derived: computed,
        });
        if !deps.is_empty() {
            inner.relations.push(Relation { deps, by: id });
        }
        id
    }

    /// Read a reactor's current value, recording the read into the ambient
    /// collector if a capture is in progress.
    pub fn consume(&self, id: ReactorId) -> Value {
        let mut inner = self.inner.borrow_mut();
        if inner.collecting {
            inner.collector.insert(Dep::Reactor(id));
        }
        inner
            .reactors
            .get(id)
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    /// Read an [`Input`]: plain values pass through untouched, reactors are
    /// consumed (and tracked).
    pub fn read(&self, input: &Input) -> Value {
        match input {
            Input::Value(value) => value.clone(),
            Input::Reactor(id) => self.consume(*id),
        }
    }

    /// Read an external prop from the current snapshot, recording a
    /// [`Dep::Prop`] into the ambient collector.
    pub fn prop(&self, key: &str) -> Value {
        let mut inner = self.inner.borrow_mut();
        if inner.collecting {
            inner.collector.insert(Dep::Prop(key.to_string()));
        }
        inner.props.get(key).cloned().unwrap_or_default()
    }

    /// Peek at a reactor's value without tracking. Host and test code use
    /// this; render expressions use [`Scope::consume`].
    pub fn value(&self, id: ReactorId) -> Value {
        self.inner
            .borrow()
            .reactors
            .get(id)
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    /// Whether a reactor was created as a derived (computed) cell.
    pub fn is_derived(&self, id: ReactorId) -> bool {
        self.inner
            .borrow()
            .reactors
            .get(id)
            .is_some_and(|slot| slot.derived)
    }

    // =========================================================================
    // Capture scopes
    // =========================================================================

    /// Run `f` under dependency capture and return its result together
    /// with the captured dependency set.
    ///
    /// Capture scopes nest by save/restore of the ambient collector; the
    /// engine is single-threaded per element, so one ambient collector per
    /// scope is sufficient.
    pub fn collect<R>(&self, f: impl FnOnce() -> R) -> (R, Vec<Dep>) {
        let (saved_collector, saved_flag) = {
            let mut inner = self.inner.borrow_mut();
            let saved = std::mem::take(&mut inner.collector);
            let flag = inner.collecting;
            inner.collecting = true;
            (saved, flag)
        };

        let result = f();

        let mut inner = self.inner.borrow_mut();
        let captured = std::mem::replace(&mut inner.collector, saved_collector);
        inner.collecting = saved_flag;
        (result, captured.into_iter().collect())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Replace a reactor's value with `f(current)`.
    ///
    /// The getter becomes a constant closure over the new value, any stale
    /// relation keyed by this reactor is dropped, matching watchers fire
    /// synchronously, and the reactor joins the pending mutation set for
    /// the next flush.
    pub fn update(&self, id: ReactorId, f: impl FnOnce(&Value) -> Value) {
        let current = {
            let inner = self.inner.borrow();
            match inner.reactors.get(id) {
                Some(slot) => slot.value.clone(),
                None => return,
            }
        };

        let next = f(&current);

        {
            let mut inner = self.inner.borrow_mut();
            let Some(slot) = inner.reactors.get_mut(id) else {
                return;
            };
            slot.value = next.clone();
            let frozen = next;
            slot.getter = Rc::new(move || frozen.clone());
            inner.relations.retain(|relation| relation.by != id);
            inner.queue.insert(Dep::Reactor(id));
        }

        self.fire_watchers(&Dep::Reactor(id));
        self.request_flush();
    }

    /// Set a key path inside a container reactor, copy-on-write. Readers
    /// holding the previous snapshot observe no change.
    pub fn update_at(&self, id: ReactorId, path: &[PathSeg], value: Value) {
        self.update(id, |current| current.set_path(path, value));
    }

    /// Remove a key path inside a container reactor, copy-on-write.
    pub fn remove_at(&self, id: ReactorId, path: &[PathSeg]) {
        self.update(id, |current| current.remove_path(path));
    }

    /// Register a synchronous observer on a set of reactors. Watchers run
    /// inside `update`, before the flush is scheduled.
    pub fn watch(&self, reactors: &[ReactorId], callback: impl Fn() + 'static) {
        let callback: Rc<dyn Fn()> = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        for id in reactors {
            inner.watchers.push(Watcher {
                dep: Dep::Reactor(*id),
                callback: callback.clone(),
            });
        }
    }

    fn fire_watchers(&self, dep: &Dep) {
        let matching: Vec<Rc<dyn Fn()>> = {
            let inner = self.inner.borrow();
            inner
                .watchers
                .iter()
                .filter(|watcher| watcher.dep == *dep)
                .map(|watcher| watcher.callback.clone())
                .collect()
        };
        for callback in matching {
            callback();
        }
    }

    // =========================================================================
    // Props (host-pushed snapshots)
    // =========================================================================

    /// Replace the prop snapshot wholesale.
    pub fn set_props(&self, props: IndexMap<String, Value>) {
        self.inner.borrow_mut().props = props;
    }

    pub fn props(&self) -> IndexMap<String, Value> {
        self.inner.borrow().props.clone()
    }

    /// Enqueue a changed prop key for the next flush and fire matching
    /// watchers. Used by the prop-change ingestion path.
    pub fn queue_prop(&self, key: &str) {
        self.inner
            .borrow_mut()
            .queue
            .insert(Dep::Prop(key.to_string()));
        self.fire_watchers(&Dep::Prop(key.to_string()));
    }

    // =========================================================================
    // Scheduling (driven by the update scheduler)
    // =========================================================================

    /// Install the hook invoked when a flush is first requested. The host
    /// wires this to its animation-frame machinery; requests coalesce
    /// until the frame callback runs the flush.
    pub fn set_schedule_hook(&self, hook: impl Fn() + 'static) {
        self.inner.borrow_mut().on_schedule = Some(Rc::new(hook));
    }

    /// Whether a flush has been requested and not yet run.
    pub fn flush_pending(&self) -> bool {
        self.inner.borrow().flush_pending
    }

    pub(crate) fn request_flush(&self) {
        let hook = {
            let mut inner = self.inner.borrow_mut();
            if inner.flush_pending {
                return;
            }
            inner.flush_pending = true;
            inner.on_schedule.clone()
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Drain the pending mutation set into the initial changed set for a
    /// flush. Returns `None` (and lowers the pending flag) when there is
    /// nothing to do.
    pub(crate) fn take_changed_seed(&self) -> Option<IndexSet<Dep>> {
        let mut inner = self.inner.borrow_mut();
        if inner.queue.is_empty() {
            inner.flush_pending = false;
            return None;
        }
        Some(inner.queue.clone())
    }

    /// Clear the pending mutation set and lower the pending flag. Runs
    /// after graph recomputation, before tree reconciliation.
    pub(crate) fn finish_flush(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.queue.clear();
        inner.flush_pending = false;
    }

    // =========================================================================
    // Relation graph access (for the scheduler)
    // =========================================================================

    pub(crate) fn relations_snapshot(&self) -> Vec<Relation> {
        self.inner.borrow().relations.clone()
    }

    pub(crate) fn relation_deps(&self, by: ReactorId) -> Option<Vec<Dep>> {
        self.inner
            .borrow()
            .relations
            .iter()
            .find(|relation| relation.by == by)
            .map(|relation| relation.deps.clone())
    }

    pub(crate) fn replace_relation_deps(&self, by: ReactorId, deps: Vec<Dep>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(relation) = inner
            .relations
            .iter_mut()
            .find(|relation| relation.by == by)
        {
            relation.deps = deps;
        }
    }

    pub(crate) fn getter_of(&self, id: ReactorId) -> Option<Getter> {
        self.inner
            .borrow()
            .reactors
            .get(id)
            .map(|slot| slot.getter.clone())
    }

    pub(crate) fn set_value(&self, id: ReactorId, value: Value) {
        if let Some(slot) = self.inner.borrow_mut().reactors.get_mut(id) {
            slot.value = value;
        }
    }

    /// Release all per-scope state. Called by `destroy`.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.reactors.clear();
        inner.relations.clear();
        inner.collector.clear();
        inner.queue.clear();
        inner.watchers.clear();
        inner.props.clear();
        inner.flush_pending = false;
        inner.on_schedule = None;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_plain_reactor_reads_back() {
        let scope = Scope::new();
        let count = scope.reactive(|| Value::Int(0), false);
        assert_eq!(scope.value(count), Value::Int(0));
        assert!(!scope.is_derived(count));
    }

    #[test]
    fn test_consume_is_idempotent() {
        let scope = Scope::new();
        let cell = scope.reactive(|| Value::str("stable"), false);

        let first = scope.consume(cell);
        let second = scope.consume(cell);
        assert_eq!(first, second, "consume must be idempotent between updates");
    }

    #[test]
    fn test_read_passes_plain_values_through() {
        let scope = Scope::new();
        let input = Input::Value(Value::Int(7));
        assert_eq!(scope.read(&input), Value::Int(7));
    }

    #[test]
    fn test_consumed_value_reads_back_unchanged() {
        // Consuming an already-consumed value is the identity: the result
        // of a consume is a plain value, and plain values pass through.
        let scope = Scope::new();
        let x = scope.reactive(|| Value::Int(3), false);

        let once = scope.consume(x);
        let twice = scope.read(&Input::Value(once.clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_computed_records_relation() {
        let scope = Scope::new();
        let count = scope.reactive(|| Value::Int(2), false);

        let s = scope.clone();
        let doubled = scope.reactive(
            move || Value::Int(s.consume(count).as_int().unwrap_or(0) * 2),
            true,
        );

        assert_eq!(scope.value(doubled), Value::Int(4));
        assert!(scope.is_derived(doubled));
        assert_eq!(
            scope.relation_deps(doubled),
            Some(vec![Dep::Reactor(count)]),
            "the captured read should become a relation"
        );
    }

    #[test]
    fn test_collect_nests_by_save_restore() {
        let scope = Scope::new();
        let outer_cell = scope.reactive(|| Value::Int(1), false);
        let inner_cell = scope.reactive(|| Value::Int(2), false);

        let s = scope.clone();
        let ((), outer_deps) = scope.collect(move || {
            s.consume(outer_cell);
            let s2 = s.clone();
            let ((), inner_deps) = s.collect(move || {
                s2.consume(inner_cell);
            });
            assert_eq!(inner_deps, vec![Dep::Reactor(inner_cell)]);
        });

        assert_eq!(
            outer_deps,
            vec![Dep::Reactor(outer_cell)],
            "inner capture must not leak into the outer set"
        );
    }

    #[test]
    fn test_update_drops_relation_and_freezes_getter() {
        let scope = Scope::new();
        let source = scope.reactive(|| Value::Int(1), false);
        let s = scope.clone();
        let derived = scope.reactive(move || s.consume(source), true);

        scope.update(derived, |_| Value::Int(99));

        assert_eq!(scope.value(derived), Value::Int(99));
        assert_eq!(
            scope.relation_deps(derived),
            None,
            "explicit update must drop the stale relation"
        );
        let getter = scope.getter_of(derived).unwrap();
        assert_eq!(getter(), Value::Int(99), "getter is now a constant");
    }

    #[test]
    fn test_update_enqueues_and_requests_one_flush() {
        let scope = Scope::new();
        let count = scope.reactive(|| Value::Int(0), false);

        let requests = Rc::new(Cell::new(0));
        let requests_hook = requests.clone();
        scope.set_schedule_hook(move || requests_hook.set(requests_hook.get() + 1));

        scope.update(count, |c| Value::Int(c.as_int().unwrap() + 1));
        scope.update(count, |c| Value::Int(c.as_int().unwrap() + 1));

        assert_eq!(scope.value(count), Value::Int(2));
        assert_eq!(
            requests.get(),
            1,
            "multiple updates before the frame coalesce into one request"
        );
        assert!(scope.flush_pending());
    }

    #[test]
    fn test_watchers_fire_synchronously_on_update() {
        let scope = Scope::new();
        let cell = scope.reactive(|| Value::Int(0), false);

        let fired = Rc::new(Cell::new(0));
        let fired_cb = fired.clone();
        scope.watch(&[cell], move || fired_cb.set(fired_cb.get() + 1));

        scope.update(cell, |_| Value::Int(1));
        assert_eq!(fired.get(), 1, "watcher fires inside update, not at flush");
    }

    #[test]
    fn test_update_at_preserves_old_snapshot() {
        let scope = Scope::new();
        let user = scope.reactive(
            || Value::map([("name".to_string(), Value::str("alpha"))]),
            false,
        );

        let before = scope.value(user);
        scope.update_at(user, &["name".into()], Value::str("beta"));

        assert_eq!(
            before.get_path(&["name".into()]),
            Some(&Value::str("alpha")),
            "previous snapshot must be untouched"
        );
        assert_eq!(
            scope.value(user).get_path(&["name".into()]),
            Some(&Value::str("beta"))
        );
    }

    #[test]
    fn test_prop_reads_are_tracked_by_key() {
        let scope = Scope::new();
        scope.set_props(IndexMap::from([("title".to_string(), Value::str("hi"))]));

        let s = scope.clone();
        let (value, deps) = scope.collect(move || s.prop("title"));

        assert_eq!(value, Value::str("hi"));
        assert_eq!(deps, vec![Dep::Prop("title".to_string())]);
    }
}
