use serde::{Deserialize, Serialize};

use crate::value::HandleRef;

/// One node of the wire's tagged value union.
///
/// Exactly one tag field is meaningful per node. Composite nodes (`a`, `o`)
/// additionally carry `id`, a per-message sequence number that later `ref`
/// nodes point back at to express sharing and cycles. Scalars under the
/// symbolic tag `v` are the spellings `undefined`, `null`, `NaN`,
/// `Infinity`, `-Infinity` and `-0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<WireRegex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Vec<WireValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o: Option<Vec<WireEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<usize>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub back_ref: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

/// A regular expression on the wire: pattern source plus flag letters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRegex {
    pub p: String,
    pub f: String,
}

/// One key/value entry of an `o` node. Entry order is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntry {
    pub k: String,
    pub v: WireValue,
}

/// A fully serialized argument: the value tree plus its handle side list.
///
/// `h` nodes inside `value` index into `handles`; the list holds one entry
/// per handle occurrence, in serialization order, without deduplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedArgument {
    pub value: WireValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handles: Vec<HandleRef>,
}

impl WireValue {
    pub(crate) fn symbolic(tag: &str) -> Self {
        WireValue { v: Some(tag.to_owned()), ..Default::default() }
    }

    pub(crate) fn number(n: f64) -> Self {
        WireValue { n: Some(n), ..Default::default() }
    }
}
