//! Dynamic values flowing through the reactive graph.
//!
//! Reactors, props, attributes and list items all carry [`Value`]. Payloads
//! are shared behind `Rc`, so cloning a value is cheap and a mutation never
//! touches the snapshot a previous reader still holds: [`Value::set_path`]
//! and [`Value::remove_path`] rebuild only the spine from the root to the
//! edited slot and share everything else.
//!
//! Equality takes a pointer fast path before structural comparison. List
//! reconciliation matches items by identity through this, so reordering a
//! list of shared values never degenerates into deep comparisons.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

/// A dynamic runtime value.
///
/// Maps preserve insertion order so that attribute writes and test
/// snapshots are deterministic.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Map(Rc<IndexMap<String, Value>>),
}

/// One step of a key path into a container value.
#[derive(Clone, Debug, PartialEq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSeg {
    fn from(key: &str) -> Self {
        PathSeg::Key(key.to_string())
    }
}

impl From<usize> for PathSeg {
    fn from(index: usize) -> Self {
        PathSeg::Index(index)
    }
}

impl Value {
    /// Build a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Build a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(items.into_iter().collect()))
    }

    /// Build a map value.
    pub fn map(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Map(Rc::new(entries.into_iter().collect()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JavaScript-flavored truthiness: null, false, 0, NaN and "" are falsy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Read the value at a key path, if present.
    pub fn get_path(&self, path: &[PathSeg]) -> Option<&Value> {
        let mut current = self;
        for seg in path {
            current = match (current, seg) {
                (Value::Map(map), PathSeg::Key(key)) => map.get(key)?,
                (Value::List(items), PathSeg::Index(i)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Return a new value with `next` written at `path`.
    ///
    /// Containers along the path are cloned copy-on-write; siblings keep
    /// sharing their payloads with the previous snapshot. Missing map keys
    /// are created, missing list indices are ignored (no implicit growth).
    /// An empty path replaces the value wholesale.
    pub fn set_path(&self, path: &[PathSeg], next: Value) -> Value {
        let Some((seg, rest)) = path.split_first() else {
            return next;
        };
        match (self, seg) {
            (Value::Map(map), PathSeg::Key(key)) => {
                let mut map = Rc::clone(map);
                let edited = Rc::make_mut(&mut map);
                let slot = edited.entry(key.clone()).or_insert(Value::Null);
                *slot = slot.set_path(rest, next);
                Value::Map(map)
            }
            (Value::List(items), PathSeg::Index(i)) => {
                let mut items = Rc::clone(items);
                if *i < items.len() {
                    let edited = Rc::make_mut(&mut items);
                    edited[*i] = edited[*i].set_path(rest, next);
                }
                Value::List(items)
            }
            _ => self.clone(),
        }
    }

    /// Return a new value with the slot at `path` removed.
    ///
    /// Removing from a non-container or a missing slot is a no-op clone.
    pub fn remove_path(&self, path: &[PathSeg]) -> Value {
        let Some((seg, rest)) = path.split_first() else {
            return Value::Null;
        };
        match (self, seg) {
            (Value::Map(map), PathSeg::Key(key)) => {
                if !map.contains_key(key) {
                    return self.clone();
                }
                let mut map = Rc::clone(map);
                let edited = Rc::make_mut(&mut map);
                if rest.is_empty() {
                    edited.shift_remove(key);
                } else if let Some(slot) = edited.get_mut(key) {
                    *slot = slot.remove_path(rest);
                }
                Value::Map(map)
            }
            (Value::List(items), PathSeg::Index(i)) => {
                if *i >= items.len() {
                    return self.clone();
                }
                let mut items = Rc::clone(items);
                let edited = Rc::make_mut(&mut items);
                if rest.is_empty() {
                    edited.remove(*i);
                } else {
                    edited[*i] = edited[*i].remove_path(rest);
                }
                Value::List(items)
            }
            _ => self.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Render the value the way it would be written into an attribute.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(map) => {
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::str("").truthy());
        assert!(Value::Int(1).truthy());
        assert!(Value::str("x").truthy());
        assert!(Value::list([]).truthy());
    }

    #[test]
    fn test_set_path_preserves_previous_snapshot() {
        let original = Value::map([
            ("name".to_string(), Value::str("alpha")),
            ("tags".to_string(), Value::list([Value::str("a")])),
        ]);

        let next = original.set_path(&["name".into()], Value::str("beta"));

        assert_eq!(
            original.get_path(&["name".into()]),
            Some(&Value::str("alpha")),
            "old snapshot must observe no change"
        );
        assert_eq!(next.get_path(&["name".into()]), Some(&Value::str("beta")));
    }

    #[test]
    fn test_set_path_shares_untouched_siblings() {
        let tags = Rc::new(vec![Value::str("a"), Value::str("b")]);
        let original = Value::map([
            ("name".to_string(), Value::str("alpha")),
            ("tags".to_string(), Value::List(tags.clone())),
        ]);

        let next = original.set_path(&["name".into()], Value::str("beta"));

        let Some(Value::List(next_tags)) = next.get_path(&["tags".into()]) else {
            panic!("tags missing after edit");
        };
        assert!(
            Rc::ptr_eq(&tags, next_tags),
            "untouched sibling should still share its payload"
        );
    }

    #[test]
    fn test_set_path_nested() {
        let original = Value::map([(
            "user".to_string(),
            Value::map([("age".to_string(), Value::Int(30))]),
        )]);

        let next = original.set_path(&["user".into(), "age".into()], Value::Int(31));

        assert_eq!(
            next.get_path(&["user".into(), "age".into()]),
            Some(&Value::Int(31))
        );
        assert_eq!(
            original.get_path(&["user".into(), "age".into()]),
            Some(&Value::Int(30))
        );
    }

    #[test]
    fn test_remove_path() {
        let original = Value::map([
            ("keep".to_string(), Value::Int(1)),
            ("drop".to_string(), Value::Int(2)),
        ]);

        let next = original.remove_path(&["drop".into()]);

        assert_eq!(next.get_path(&["drop".into()]), None);
        assert_eq!(original.get_path(&["drop".into()]), Some(&Value::Int(2)));
        assert_eq!(next.get_path(&["keep".into()]), Some(&Value::Int(1)));
    }

    #[test]
    fn test_identity_fast_path() {
        let shared = Value::list([Value::Int(1), Value::Int(2)]);
        let clone = shared.clone();
        assert_eq!(shared, clone);

        // Structurally equal but separately allocated values still compare equal.
        let rebuilt = Value::list([Value::Int(1), Value::Int(2)]);
        assert_eq!(shared, rebuilt);
    }

    #[test]
    fn test_display_for_attributes() {
        assert_eq!(Value::str("btn primary").to_string(), "btn primary");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Null.to_string(), "");
    }
}
