use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{CodecError, Result};
use crate::value::{HandleRef, JsValue};
use crate::wire::{SerializedArgument, WireEntry, WireRegex, WireValue};

/// Maximum composite nesting the serializer and parser will walk.
///
/// Cycles are followed through back-references and never hit this limit;
/// only genuinely deep acyclic trees do.
pub const MAX_DEPTH: usize = 256;

/// Wire timestamp format: ISO-8601 in UTC with millisecond precision.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Converts an in-process value into its wire form.
///
/// Composites are numbered in first-visit order; a composite reached a
/// second time within the same call, whether by sharing or by cycle, is
/// emitted as a `ref` node pointing at its number. Every [`JsValue::Handle`]
/// occurrence appends one entry to the returned side list and is emitted as
/// an `h` node carrying that entry's index.
pub fn serialize(value: &JsValue) -> Result<SerializedArgument> {
    let mut ctx = SerializeCtx::default();
    let tree = serialize_value(value, &mut ctx, 0)?;
    Ok(SerializedArgument { value: tree, handles: ctx.handles })
}

#[derive(Default)]
struct SerializeCtx {
    handles: Vec<HandleRef>,
    /// Composite identity (allocation address) to wire sequence number.
    visited: HashMap<usize, u32>,
    next_id: u32,
}

impl SerializeCtx {
    fn assign(&mut self, key: usize) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.visited.insert(key, id);
        id
    }
}

fn serialize_value(value: &JsValue, ctx: &mut SerializeCtx, depth: usize) -> Result<WireValue> {
    if depth > MAX_DEPTH {
        return Err(CodecError::unserializable(format!(
            "value nested deeper than {MAX_DEPTH} levels"
        )));
    }
    match value {
        JsValue::Undefined => Ok(WireValue::symbolic("undefined")),
        JsValue::Null => Ok(WireValue::symbolic("null")),
        JsValue::Bool(b) => Ok(WireValue { b: Some(*b), ..Default::default() }),
        JsValue::Number(n) => Ok(serialize_number(*n)),
        JsValue::String(s) => Ok(WireValue { s: Some(s.clone()), ..Default::default() }),
        JsValue::Date(d) => Ok(WireValue {
            d: Some(d.format(DATE_FORMAT).to_string()),
            ..Default::default()
        }),
        JsValue::Regex(re) => Ok(WireValue {
            r: Some(WireRegex { p: re.source.clone(), f: re.flags.to_wire() }),
            ..Default::default()
        }),
        JsValue::Handle(handle) => {
            ctx.handles.push(handle.clone());
            Ok(WireValue {
                h: Some(ctx.handles.len() - 1),
                ..Default::default()
            })
        }
        JsValue::Array(rc) => {
            let key = Rc::as_ptr(rc) as usize;
            if let Some(&id) = ctx.visited.get(&key) {
                return Ok(WireValue { back_ref: Some(id), ..Default::default() });
            }
            // Register before recursing so self-references resolve.
            let id = ctx.assign(key);
            let items = rc.borrow();
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(serialize_value(item, ctx, depth + 1)?);
            }
            Ok(WireValue { a: Some(out), id: Some(id), ..Default::default() })
        }
        JsValue::Object(rc) => {
            let key = Rc::as_ptr(rc) as usize;
            if let Some(&id) = ctx.visited.get(&key) {
                return Ok(WireValue { back_ref: Some(id), ..Default::default() });
            }
            let id = ctx.assign(key);
            let entries = rc.borrow();
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries.iter() {
                out.push(WireEntry {
                    k: k.clone(),
                    v: serialize_value(v, ctx, depth + 1)?,
                });
            }
            Ok(WireValue { o: Some(out), id: Some(id), ..Default::default() })
        }
    }
}

fn serialize_number(n: f64) -> WireValue {
    if n.is_nan() {
        WireValue::symbolic("NaN")
    } else if n == f64::INFINITY {
        WireValue::symbolic("Infinity")
    } else if n == f64::NEG_INFINITY {
        WireValue::symbolic("-Infinity")
    } else if n == 0.0 && n.is_sign_negative() {
        WireValue::symbolic("-0")
    } else {
        WireValue::number(n)
    }
}
