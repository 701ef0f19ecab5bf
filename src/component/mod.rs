//! Component registry and readiness gates.
//!
//! The compiler/loader collaborator registers each compiled component
//! under a name via [`define`]; the runtime instantiates them with
//! [`init_component`]. Loading order is not guaranteed: a component
//! referenced before its module arrives is not an error for consumers
//! that can wait; they park on [`when_ready`] and mount when the
//! registration lands. [`Ready`] is the per-consumer gate; it resolves
//! exactly once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::Element;
use crate::error::RuntimeError;
use crate::style::StyleRule;
use crate::tree::{EventHandler, NodeKey};
use crate::value::Value;

/// What a component module hands the runtime: a render function and an
/// optional style function, both bound to the instantiating element.
#[derive(Clone)]
pub struct Context {
    pub render: Rc<dyn Fn(&Element) -> Result<Option<NodeKey>, RuntimeError>>,
    pub dye: Option<Rc<dyn Fn(&Element) -> Vec<StyleRule>>>,
}

/// The setup function a component module registers: given the fresh
/// element, produce the instance [`Context`].
pub type InitFn = Rc<dyn Fn(&Element) -> Context>;

/// A registered component: its name, the components it depends on, and
/// its setup function.
#[derive(Clone)]
pub struct ComponentDef {
    pub name: String,
    pub deps: Vec<String>,
    pub init: InitFn,
}

thread_local! {
    static COMPONENTS: RefCell<HashMap<String, ComponentDef>> = RefCell::new(HashMap::new());
    static WAITERS: RefCell<HashMap<String, Vec<Box<dyn FnOnce(ComponentDef)>>>> =
        RefCell::new(HashMap::new());
}

/// Register a component. Registering the same name twice is an error.
///
/// Consumers parked on [`when_ready`] for this name run before `define`
/// returns.
pub fn define(
    name: &str,
    deps: Vec<String>,
    init: impl Fn(&Element) -> Context + 'static,
) -> Result<(), RuntimeError> {
    let def = ComponentDef {
        name: name.to_string(),
        deps,
        init: Rc::new(init),
    };

    let inserted = COMPONENTS.with(|components| {
        let mut components = components.borrow_mut();
        if components.contains_key(name) {
            return false;
        }
        components.insert(name.to_string(), def.clone());
        true
    });
    if !inserted {
        return Err(RuntimeError::AlreadyDefined(name.to_string()));
    }

    let waiters = WAITERS.with(|waiters| waiters.borrow_mut().remove(name));
    if let Some(waiters) = waiters {
        for waiter in waiters {
            waiter(def.clone());
        }
    }
    Ok(())
}

/// Look up a registered component.
pub fn lookup(name: &str) -> Option<ComponentDef> {
    COMPONENTS.with(|components| components.borrow().get(name).cloned())
}

/// Run `f` once the named component is registered, immediately if it
/// already is.
pub fn when_ready(name: &str, f: impl FnOnce(ComponentDef) + 'static) {
    if let Some(def) = lookup(name) {
        f(def);
        return;
    }
    WAITERS.with(|waiters| {
        waiters
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(Box::new(f));
    });
}

/// Instantiate a registered component: resolve its dependency list,
/// create the element, and evaluate its setup function.
///
/// The component itself or any dependency being unregistered yields
/// [`RuntimeError::NotReady`]; callers that can wait should park on
/// [`when_ready`] instead of propagating.
pub fn init_component(
    name: &str,
    props: IndexMap<String, Value>,
    events: IndexMap<String, EventHandler>,
) -> Result<Element, RuntimeError> {
    let def = lookup(name).ok_or_else(|| RuntimeError::NotReady(name.to_string()))?;

    for dep in &def.deps {
        if lookup(dep).is_none() {
            return Err(RuntimeError::NotReady(dep.clone()));
        }
    }

    let element = Element::new(name, props, events);
    let context = (def.init)(&element);
    element.set_context(context);
    Ok(element)
}

/// Reset all registry state (for testing).
pub fn reset_components() {
    COMPONENTS.with(|components| components.borrow_mut().clear());
    WAITERS.with(|waiters| waiters.borrow_mut().clear());
}

// =============================================================================
// Ready gate
// =============================================================================

enum ReadyState {
    Pending(Vec<Box<dyn FnOnce()>>),
    Resolved,
}

/// A one-shot readiness gate: resolves exactly once, and late `then`
/// callbacks run immediately.
#[derive(Clone)]
pub struct Ready {
    state: Rc<RefCell<ReadyState>>,
}

impl Default for Ready {
    fn default() -> Self {
        Self::new()
    }
}

impl Ready {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ReadyState::Pending(Vec::new()))),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.borrow(), ReadyState::Resolved)
    }

    pub fn resolve(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                ReadyState::Pending(callbacks) => {
                    let drained = std::mem::take(callbacks);
                    *state = ReadyState::Resolved;
                    drained
                }
                ReadyState::Resolved => return,
            }
        };
        for callback in callbacks {
            callback();
        }
    }

    pub fn then(&self, f: impl FnOnce() + 'static) {
        let resolved = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                ReadyState::Pending(callbacks) => {
                    callbacks.push(Box::new(f));
                    false
                }
                ReadyState::Resolved => true,
            }
        };
        if resolved {
            f();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn noop_context() -> Context {
        Context {
            render: Rc::new(|_| Ok(None)),
            dye: None,
        }
    }

    #[test]
    fn test_define_and_lookup() {
        reset_components();

        define("card", Vec::new(), |_| noop_context()).unwrap();
        assert!(lookup("card").is_some());
        assert!(lookup("missing").is_none());
    }

    #[test]
    fn test_duplicate_define_is_an_error() {
        reset_components();

        define("card", Vec::new(), |_| noop_context()).unwrap();
        let err = define("card", Vec::new(), |_| noop_context()).unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyDefined(name) if name == "card"));
    }

    #[test]
    fn test_when_ready_fires_on_registration() {
        reset_components();

        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        when_ready("late", move |def| {
            assert_eq!(def.name, "late");
            flag.set(true);
        });
        assert!(!fired.get(), "gate must wait for registration");

        define("late", Vec::new(), |_| noop_context()).unwrap();
        assert!(fired.get(), "gate fires inside define");
    }

    #[test]
    fn test_init_component_not_ready() {
        reset_components();

        let err = init_component("ghost", IndexMap::new(), IndexMap::new()).unwrap_err();
        assert!(matches!(err, RuntimeError::NotReady(name) if name == "ghost"));
    }

    #[test]
    fn test_init_component_missing_dep_not_ready() {
        reset_components();

        define("page", vec!["widget".to_string()], |_| noop_context()).unwrap();
        let err = init_component("page", IndexMap::new(), IndexMap::new()).unwrap_err();
        assert!(matches!(err, RuntimeError::NotReady(name) if name == "widget"));
    }

    #[test]
    fn test_ready_resolves_exactly_once() {
        let ready = Ready::new();
        let count = Rc::new(Cell::new(0));

        let counter = count.clone();
        ready.then(move || counter.set(counter.get() + 1));

        ready.resolve();
        ready.resolve();
        assert_eq!(count.get(), 1);

        // Late callbacks run immediately.
        let counter = count.clone();
        ready.then(move || counter.set(counter.get() + 1));
        assert_eq!(count.get(), 2);
    }
}
