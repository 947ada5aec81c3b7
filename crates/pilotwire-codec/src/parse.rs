use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::error::{CodecError, Result};
use crate::serialize::MAX_DEPTH;
use crate::value::{HandleRef, JsRegex, JsValue, RegexFlags};
use crate::wire::WireValue;

/// Converts a wire tree back into an in-process value.
///
/// `handles` is the message's side list; `h` nodes index into it. Sharing is
/// reconstructed faithfully: every `ref` node resolves to the same
/// allocation as the composite that introduced its `id`, so aliasing and
/// cycles survive a round trip.
///
/// When a node populates several tag fields the first one in declaration
/// order wins; a node with no recognized tag is malformed.
pub fn parse(value: &WireValue, handles: &[HandleRef]) -> Result<JsValue> {
    let mut ctx = ParseCtx::default();
    parse_value(value, handles, &mut ctx, 0)
}

#[derive(Default)]
struct ParseCtx {
    /// Wire sequence number to the composite it introduced.
    refs: HashMap<u32, JsValue>,
}

fn parse_value(
    wire: &WireValue,
    handles: &[HandleRef],
    ctx: &mut ParseCtx,
    depth: usize,
) -> Result<JsValue> {
    if depth > MAX_DEPTH {
        return Err(CodecError::malformed(format!(
            "wire value nested deeper than {MAX_DEPTH} levels"
        )));
    }
    if let Some(tag) = &wire.v {
        return parse_symbolic(tag);
    }
    if let Some(b) = wire.b {
        return Ok(JsValue::Bool(b));
    }
    if let Some(n) = wire.n {
        return Ok(JsValue::Number(n));
    }
    if let Some(s) = &wire.s {
        return Ok(JsValue::String(s.clone()));
    }
    if let Some(d) = &wire.d {
        let parsed = DateTime::parse_from_rfc3339(d)
            .map_err(|e| CodecError::malformed(format!("bad date {d:?}: {e}")))?;
        return Ok(JsValue::Date(parsed.with_timezone(&Utc)));
    }
    if let Some(re) = &wire.r {
        return Ok(JsValue::Regex(JsRegex {
            source: re.p.clone(),
            flags: RegexFlags::from_wire(&re.f),
        }));
    }
    if let Some(items) = &wire.a {
        let cell = Rc::new(RefCell::new(Vec::with_capacity(items.len())));
        if let Some(id) = wire.id {
            // Register before recursing so nested refs to this node resolve.
            ctx.refs.insert(id, JsValue::Array(cell.clone()));
        }
        for item in items {
            let parsed = parse_value(item, handles, ctx, depth + 1)?;
            cell.borrow_mut().push(parsed);
        }
        return Ok(JsValue::Array(cell));
    }
    if let Some(entries) = &wire.o {
        let cell = Rc::new(RefCell::new(Vec::with_capacity(entries.len())));
        if let Some(id) = wire.id {
            ctx.refs.insert(id, JsValue::Object(cell.clone()));
        }
        for entry in entries {
            let parsed = parse_value(&entry.v, handles, ctx, depth + 1)?;
            cell.borrow_mut().push((entry.k.clone(), parsed));
        }
        return Ok(JsValue::Object(cell));
    }
    if let Some(index) = wire.h {
        return match handles.get(index) {
            Some(handle) => Ok(JsValue::Handle(handle.clone())),
            None => Err(CodecError::malformed(format!(
                "handle index {index} out of range ({} handles)",
                handles.len()
            ))),
        };
    }
    if let Some(id) = wire.back_ref {
        return match ctx.refs.get(&id) {
            Some(value) => Ok(value.clone()),
            None => Err(CodecError::malformed(format!(
                "back-reference to unknown id {id}"
            ))),
        };
    }
    Err(CodecError::malformed("node carries no recognized tag"))
}

fn parse_symbolic(tag: &str) -> Result<JsValue> {
    match tag {
        "undefined" => Ok(JsValue::Undefined),
        "null" => Ok(JsValue::Null),
        "NaN" => Ok(JsValue::Number(f64::NAN)),
        "Infinity" => Ok(JsValue::Number(f64::INFINITY)),
        "-Infinity" => Ok(JsValue::Number(f64::NEG_INFINITY)),
        "-0" => Ok(JsValue::Number(-0.0)),
        other => Err(CodecError::malformed(format!(
            "unknown symbolic tag {other:?}"
        ))),
    }
}
