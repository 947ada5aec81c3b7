use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reference to a remote object, identified by its guid.
///
/// On the wire a handle is an index into the side list of a
/// [`SerializedArgument`](crate::SerializedArgument); in process it is the
/// guid that index resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRef {
    pub guid: String,
}

impl HandleRef {
    pub fn new(guid: impl Into<String>) -> Self {
        HandleRef { guid: guid.into() }
    }
}

/// Regular expression flags understood by the codec.
///
/// The wire carries flags as a letter string; only `i`, `m` and `s` are
/// modeled. Unknown letters are dropped on decode and never produced on
/// encode, so the mapping is lossy in both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexFlags {
    pub ignore_case: bool,
    pub multiline: bool,
    pub dot_all: bool,
}

impl RegexFlags {
    /// Renders the flags in the wire's letter vocabulary, in `i` `m` `s` order.
    pub fn to_wire(self) -> String {
        let mut out = String::new();
        if self.ignore_case {
            out.push('i');
        }
        if self.multiline {
            out.push('m');
        }
        if self.dot_all {
            out.push('s');
        }
        out
    }

    /// Reads a wire flag string, ignoring letters outside the modeled set.
    pub fn from_wire(flags: &str) -> Self {
        let mut out = RegexFlags::default();
        for ch in flags.chars() {
            match ch {
                'i' => out.ignore_case = true,
                'm' => out.multiline = true,
                's' => out.dot_all = true,
                other => debug!(flag = %other, "dropping unmodeled regex flag"),
            }
        }
        out
    }
}

/// A regular expression as pattern source plus flags.
///
/// The pattern travels verbatim; it is never compiled on this side because
/// the dialect is the driver's, not Rust's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsRegex {
    pub source: String,
    pub flags: RegexFlags,
}

impl JsRegex {
    pub fn new(source: impl Into<String>, flags: RegexFlags) -> Self {
        JsRegex { source: source.into(), flags }
    }
}

/// An in-process structured value.
///
/// This is the full vocabulary the protocol can express: JSON plus
/// `Undefined` (distinct from `Null`), symbolic non-finite numbers, dates,
/// regular expressions and remote-object handles. Composite variants are
/// reference-counted so a single array or object can appear in several
/// positions of one value, including cyclically.
#[derive(Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Regex(JsRegex),
    Array(Rc<RefCell<Vec<JsValue>>>),
    Object(Rc<RefCell<Vec<(String, JsValue)>>>),
    Handle(HandleRef),
}

impl JsValue {
    /// Builds a fresh array value from the given items.
    pub fn array(items: Vec<JsValue>) -> Self {
        JsValue::Array(Rc::new(RefCell::new(items)))
    }

    /// Builds a fresh object value from the given entries, preserving order.
    pub fn object(entries: Vec<(String, JsValue)>) -> Self {
        JsValue::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn string(s: impl Into<String>) -> Self {
        JsValue::String(s.into())
    }

    /// Converts plain JSON into a structured value.
    ///
    /// Total by construction: every JSON tree maps to exactly one value.
    /// JSON `null` becomes [`JsValue::Null`], never `Undefined`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => JsValue::Null,
            serde_json::Value::Bool(b) => JsValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => JsValue::Number(f),
                None => JsValue::Number(f64::NAN),
            },
            serde_json::Value::String(s) => JsValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                JsValue::array(items.iter().map(JsValue::from_json).collect())
            }
            serde_json::Value::Object(entries) => JsValue::object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), JsValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// True for the composite variants that can participate in cycles.
    pub fn is_composite(&self) -> bool {
        matches!(self, JsValue::Array(_) | JsValue::Object(_))
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Bool(b)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        JsValue::Number(n.into())
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::String(s.to_owned())
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        JsValue::String(s)
    }
}

/// Structural equality that terminates on cyclic values.
///
/// Numbers compare bitwise, so `NaN == NaN` holds and `0.0 != -0.0`; a value
/// always equals a faithful round-trip of itself. A pair of composites
/// already under comparison counts as equal, which keeps the recursion
/// finite on cycles.
impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        let mut in_progress = HashSet::new();
        eq_value(self, other, &mut in_progress)
    }
}

fn eq_value(a: &JsValue, b: &JsValue, in_progress: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (JsValue::Undefined, JsValue::Undefined) => true,
        (JsValue::Null, JsValue::Null) => true,
        (JsValue::Bool(x), JsValue::Bool(y)) => x == y,
        (JsValue::Number(x), JsValue::Number(y)) => x.to_bits() == y.to_bits(),
        (JsValue::String(x), JsValue::String(y)) => x == y,
        (JsValue::Date(x), JsValue::Date(y)) => x == y,
        (JsValue::Regex(x), JsValue::Regex(y)) => x == y,
        (JsValue::Handle(x), JsValue::Handle(y)) => x == y,
        (JsValue::Array(x), JsValue::Array(y)) => {
            let pair = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if pair.0 == pair.1 || !in_progress.insert(pair) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(i, j)| eq_value(i, j, in_progress))
        }
        (JsValue::Object(x), JsValue::Object(y)) => {
            let pair = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if pair.0 == pair.1 || !in_progress.insert(pair) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && eq_value(va, vb, in_progress))
        }
        _ => false,
    }
}

/// Debug rendering that terminates on cyclic values.
///
/// A composite revisited within its own rendering prints as `[…]` or `{…}`.
impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut on_stack = HashSet::new();
        fmt_value(self, f, &mut on_stack)
    }
}

fn fmt_value(
    value: &JsValue,
    f: &mut fmt::Formatter<'_>,
    on_stack: &mut HashSet<usize>,
) -> fmt::Result {
    match value {
        JsValue::Undefined => write!(f, "undefined"),
        JsValue::Null => write!(f, "null"),
        JsValue::Bool(b) => write!(f, "{b}"),
        JsValue::Number(n) => write!(f, "{n:?}"),
        JsValue::String(s) => write!(f, "{s:?}"),
        JsValue::Date(d) => write!(f, "Date({d:?})"),
        JsValue::Regex(re) => write!(f, "/{}/{}", re.source, re.flags.to_wire()),
        JsValue::Handle(h) => write!(f, "Handle({})", h.guid),
        JsValue::Array(rc) => {
            let key = Rc::as_ptr(rc) as usize;
            if !on_stack.insert(key) {
                return write!(f, "[…]");
            }
            write!(f, "[")?;
            for (i, item) in rc.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_value(item, f, on_stack)?;
            }
            write!(f, "]")?;
            on_stack.remove(&key);
            Ok(())
        }
        JsValue::Object(rc) => {
            let key = Rc::as_ptr(rc) as usize;
            if !on_stack.insert(key) {
                return write!(f, "{{…}}");
            }
            write!(f, "{{")?;
            for (i, (k, v)) in rc.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k:?}: ")?;
                fmt_value(v, f, on_stack)?;
            }
            write!(f, "}}")?;
            on_stack.remove(&key);
            Ok(())
        }
    }
}
