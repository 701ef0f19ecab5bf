//! Style bridge: per-instance dynamic style values.
//!
//! A component's optional `dye()` returns structured style rules whose
//! declaration values are either literal strings or [`Brush`]es: values
//! computed under dependency capture and exposed as named custom
//! properties. Mounting writes one static style block (brush declarations
//! reference `var(--id)`) plus, when any brush exists, one dynamic block
//! holding the current property values. The flush pass rewrites only the
//! dynamic block; the static block is never touched again.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::element::Element;
use crate::reactor::Dep;

/// A dependency-tracked style value, emitted as custom property `--{id}`.
///
/// Shared by handle: the rule that references the brush and the element's
/// refresh list point at the same state.
#[derive(Clone)]
pub struct Brush {
    inner: Rc<BrushInner>,
}

struct BrushInner {
    id: String,
    getter: Rc<dyn Fn() -> String>,
    value: RefCell<String>,
    deps: RefCell<Vec<Dep>>,
}

impl Brush {
    pub(crate) fn new(id: String, getter: Rc<dyn Fn() -> String>, value: String, deps: Vec<Dep>) -> Self {
        Self {
            inner: Rc::new(BrushInner {
                id,
                getter,
                value: RefCell::new(value),
                deps: RefCell::new(deps),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn value(&self) -> String {
        self.inner.value.borrow().clone()
    }

    fn depends_on(&self, changed: &IndexSet<Dep>) -> bool {
        let deps = self.inner.deps.borrow();
        !deps.is_empty() && deps.iter().any(|dep| changed.contains(dep))
    }
}

/// One declaration value inside a rule.
#[derive(Clone)]
pub enum StyleValue {
    Literal(String),
    Brush(Brush),
}

impl From<&str> for StyleValue {
    fn from(s: &str) -> Self {
        StyleValue::Literal(s.to_string())
    }
}

impl From<Brush> for StyleValue {
    fn from(brush: Brush) -> Self {
        StyleValue::Brush(brush)
    }
}

/// A structured style rule, as returned by `dye()`.
#[derive(Clone)]
pub enum StyleRule {
    /// `selector { prop: value; ... }`
    Rule {
        selector: String,
        decls: IndexMap<String, StyleValue>,
    },
    /// `@import "url";`
    Import(String),
    /// `@keyword query { ...nested rules... }` (media queries and the like).
    At {
        keyword: String,
        query: String,
        rules: Vec<StyleRule>,
    },
}

/// Serialize rules into static-block css, collecting every brush
/// encountered along the way.
pub(crate) fn serialize_rules(rules: &[StyleRule], brushes: &mut Vec<Brush>) -> String {
    let mut blocks = Vec::new();
    for rule in rules {
        blocks.push(serialize_rule(rule, brushes));
    }
    blocks.join("\n")
}

fn serialize_rule(rule: &StyleRule, brushes: &mut Vec<Brush>) -> String {
    match rule {
        StyleRule::Rule { selector, decls } => {
            let mut text = format!("{selector} {{");
            for (prop, value) in decls {
                match value {
                    StyleValue::Literal(literal) => {
                        text.push_str(&format!("{prop}: {literal};"));
                    }
                    StyleValue::Brush(brush) => {
                        text.push_str(&format!("{prop}: var(--{});", brush.id()));
                        brushes.push(brush.clone());
                    }
                }
            }
            text.push('}');
            text
        }
        StyleRule::Import(url) => format!("@import \"{url}\";"),
        StyleRule::At { keyword, query, rules } => {
            let mut text = format!("{keyword} {query} {{");
            for nested in rules {
                text.push(' ');
                text.push_str(&serialize_rule(nested, brushes));
            }
            text.push_str(" }");
            text
        }
    }
}

/// The dynamic block's content: one custom property per brush.
pub(crate) fn brush_block_content(brushes: &[Brush]) -> String {
    let lines: Vec<String> = brushes
        .iter()
        .map(|brush| format!("--{}: {};", brush.id(), brush.value()))
        .collect();
    format!(":host {{\n{}\n}}", lines.join("\n"))
}

/// Flush step 5: recompute every brush whose dependencies intersect the
/// changed set, then rewrite the dynamic block.
pub(crate) fn refresh_brushes(element: &Element, changed: &IndexSet<Dep>) {
    let Some(block) = element.brush_block() else {
        return;
    };
    let brushes = element.brushes();
    if brushes.is_empty() {
        return;
    }

    for brush in &brushes {
        if brush.depends_on(changed) {
            let getter = brush.inner.getter.clone();
            let (next, deps) = element.scope().collect(move || getter());
            *brush.inner.value.borrow_mut() = next;
            *brush.inner.deps.borrow_mut() = deps;
        }
    }

    let content = brush_block_content(&brushes);
    element.with_surface(|surface| surface.set_text(block, &content));
}

// =============================================================================
// Tests
// =============================================================================
