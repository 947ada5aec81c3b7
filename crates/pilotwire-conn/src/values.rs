//! Bridges between structured values and call payloads.
//!
//! Arguments leave as the `{value, handles}` envelope produced by the
//! codec; results come back either in that same envelope or as a bare
//! wire value. Handles in results are checked against the live registry
//! before anything is handed to the caller.

use pilotwire_codec::{JsValue, SerializedArgument, WireValue};

use crate::connection::Connection;
use crate::error::{ConnError, Result};

/// Serializes one call argument into its JSON wire form.
pub fn serialize_arg(value: &JsValue) -> Result<serde_json::Value> {
    let argument = pilotwire_codec::serialize(value)?;
    Ok(serde_json::to_value(&argument)?)
}

/// Parses a result payload back into a [`JsValue`].
///
/// Every handle in the payload must name an object the registry still
/// knows; a guid this connection never saw, or already disposed, fails
/// with [`ConnError::UnknownObject`].
pub fn parse_result(connection: &Connection, payload: &serde_json::Value) -> Result<JsValue> {
    let argument: SerializedArgument = match payload {
        // The argument envelope always carries a "value" key; a bare wire
        // value never does, its keys are the single-letter tags.
        serde_json::Value::Object(fields) if fields.contains_key("value") => {
            serde_json::from_value(payload.clone())?
        }
        _ => SerializedArgument {
            value: serde_json::from_value::<WireValue>(payload.clone())?,
            handles: Vec::new(),
        },
    };
    for handle in &argument.handles {
        if connection.object(&handle.guid).is_none() {
            return Err(ConnError::UnknownObject {
                guid: handle.guid.clone(),
            });
        }
    }
    Ok(pilotwire_codec::parse(&argument.value, &argument.handles)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilotwire_codec::HandleRef;
    use serde_json::json;

    #[test]
    fn arguments_embed_value_and_handles() {
        let value = JsValue::array(vec![
            JsValue::from("click"),
            JsValue::Handle(HandleRef::new("element@7")),
        ]);
        let encoded = serialize_arg(&value).unwrap();
        assert_eq!(
            encoded,
            json!({
                "value": {"a": [{"s": "click"}, {"h": 0}], "id": 0},
                "handles": [{"guid": "element@7"}]
            })
        );
    }
}
