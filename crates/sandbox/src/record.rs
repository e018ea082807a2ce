//! The canonical output unit of a Code node.
//!
//! A [`Record`] is what flows between workflow nodes: a JSON object, an
//! optional map of binary attachments, and an optional pointer back to the
//! input item it was derived from. It is the only structure this crate
//! exchanges with the host, so its serde shape (`json`, `binary`,
//! `pairedItem`) must stay stable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One workflow item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Item payload. Always an object.
    pub json: Map<String, Value>,
    /// Binary attachments keyed by property name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<IndexMap<String, BinaryPayload>>,
    /// Source item this record was produced from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_item: Option<ItemPointer>,
}

impl Record {
    /// Create a record with the given payload and nothing else.
    pub fn new(json: Map<String, Value>) -> Self {
        Self {
            json,
            binary: None,
            paired_item: None,
        }
    }

    /// Build a record from an arbitrary JSON value.
    ///
    /// Objects become the payload directly; anything else is placed under
    /// `key` so the payload stays object-shaped.
    pub fn wrapping(value: Value, key: &str) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            other => {
                let mut map = Map::new();
                map.insert(key.to_owned(), other);
                Self::new(map)
            }
        }
    }

    /// The synthetic record produced when a failure is degraded into output.
    pub fn error(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("error".to_owned(), Value::String(message.into()));
        Self::new(map)
    }

    /// Tag this record with a pointer to input item `index`.
    pub fn paired_with(mut self, index: usize) -> Self {
        self.paired_item = Some(ItemPointer::item(index));
        self
    }

    /// The record as a JSON value in its wire shape.
    pub fn to_value(&self) -> Value {
        // Serializing string-keyed maps of plain data cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(json: Map<String, Value>) -> Self {
        Self::new(json)
    }
}

/// Reference to the input item a record originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPointer {
    /// Index of the source item within its input.
    pub item: usize,
    /// Index of the input connection, when a node has several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<usize>,
}

impl ItemPointer {
    /// Pointer to item `index` of the first input.
    pub fn item(index: usize) -> Self {
        Self {
            item: index,
            input: None,
        }
    }
}

/// A binary attachment.
///
/// `data` is opaque to this crate: depending on the host's binary storage
/// mode it holds base64 content or a storage identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryPayload {
    /// Content or storage reference.
    pub data: String,
    /// MIME type of the content.
    pub mime_type: String,
    /// Original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// File extension without the dot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    /// Coarse file category (`image`, `text`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Human-readable size, as produced by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<String>,
    /// Storage identifier when the content lives outside the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}
