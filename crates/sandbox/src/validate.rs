//! Result validation.
//!
//! Enforces the shape contract of each execution cardinality and turns the
//! runtime's raw return value into [`Record`]s. Every record that leaves
//! this module has been standardized.

use std::io;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::{NonObjectPolicy, ValidationOptions, WRAP_KEY};
use crate::error::SandboxError;
use crate::record::{BinaryPayload, ItemPointer, Record};
use crate::standardize::{standardize, unwrap_nonplain};

/// Top-level keys an item-shaped object may carry.
const ITEM_KEYS: &[&str] = &["json", "binary", "pairedItem"];

/// Longest excerpt of a wrong-shaped value quoted in an error message.
const EXCERPT_LIMIT: usize = 60;

/// Validate the result of a run-once execution.
///
/// The result must be a sequence. `None` stands for a snippet that returned
/// nothing at all.
pub fn run_once(
    result: Option<Value>,
    options: &ValidationOptions,
) -> Result<Vec<Record>, SandboxError> {
    let elements = match result.map(unwrap_nonplain) {
        Some(Value::Array(elements)) => elements,
        Some(other) => {
            return Err(SandboxError::validation(format!(
                "Code doesn't return items properly: expected an array of objects, got {}",
                describe(&other)
            )));
        }
        None => {
            return Err(SandboxError::validation(
                "Code doesn't return items properly: nothing was returned, \
                 please return an array of objects, one for each output item",
            ));
        }
    };

    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| {
            to_record(unwrap_nonplain(element), options.run_once_non_object)
                .map(finish)
                .map_err(|error| error.at_item(index))
        })
        .collect()
}

/// Validate the result of a per-item execution for item `item_index`.
///
/// `None` and `null` both mean "drop this item". Arrays are rejected
/// regardless of the non-object policy.
pub fn per_item(
    result: Option<Value>,
    item_index: usize,
    options: &ValidationOptions,
) -> Result<Option<Record>, SandboxError> {
    match result {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(_)) => Err(SandboxError::validation_at(
            "Code doesn't return a single object: got an array. \
             Return one object per item, or use runOnceForAllItems to return several",
            item_index,
        )),
        Some(value) => to_record(unwrap_nonplain(value), options.per_item_non_object)
            .map(|record| Some(finish(record)))
            .map_err(|error| error.at_item(item_index)),
    }
}

fn finish(mut record: Record) -> Record {
    record.json = standardize(record.json);
    record
}

fn to_record(value: Value, policy: NonObjectPolicy) -> Result<Record, SandboxError> {
    match value {
        Value::Object(map) if map.contains_key("json") => item_record(map),
        Value::Object(map) => Ok(Record::new(map)),
        other => match policy {
            NonObjectPolicy::Wrap => Ok(Record::wrapping(other, WRAP_KEY)),
            NonObjectPolicy::Reject => Err(SandboxError::validation(format!(
                "Code doesn't return an object: got {} instead",
                describe(&other)
            ))),
        },
    }
}

fn item_record(mut map: Map<String, Value>) -> Result<Record, SandboxError> {
    if let Some(unknown) = map.keys().find(|key| !ITEM_KEYS.contains(&key.as_str())) {
        return Err(SandboxError::validation(format!(
            "Unknown top-level item key: {unknown}. Item properties belong under `json`"
        )));
    }

    let json = match map.remove("json").map(unwrap_nonplain) {
        Some(Value::Object(json)) => json,
        Some(other) => {
            return Err(SandboxError::validation(format!(
                "A 'json' property isn't an object: got {}",
                describe(&other)
            )));
        }
        None => Map::new(),
    };

    let binary = match map.remove("binary") {
        None | Some(Value::Null) => None,
        Some(Value::Object(binary)) => Some(binary_map(binary)?),
        Some(other) => {
            return Err(SandboxError::validation(format!(
                "A 'binary' property isn't an object: got {}",
                describe(&other)
            )));
        }
    };

    let paired_item = match map.remove("pairedItem") {
        None | Some(Value::Null) => None,
        Some(pointer) => Some(item_pointer(pointer)?),
    };

    Ok(Record {
        json,
        binary,
        paired_item,
    })
}

fn binary_map(binary: Map<String, Value>) -> Result<IndexMap<String, BinaryPayload>, SandboxError> {
    binary
        .into_iter()
        .map(|(key, payload)| {
            serde_json::from_value::<BinaryPayload>(payload)
                .map(|payload| (key.clone(), payload))
                .map_err(|error| {
                    SandboxError::validation(format!(
                        "binary property `{key}` is not valid binary data: {error}"
                    ))
                })
        })
        .collect()
}

fn item_pointer(pointer: Value) -> Result<ItemPointer, SandboxError> {
    let pointer = match pointer {
        Value::Array(mut pointers) if !pointers.is_empty() => pointers.swap_remove(0),
        other => other,
    };
    match pointer {
        Value::Number(index) => index
            .as_u64()
            .map(|index| ItemPointer::item(index as usize))
            .ok_or_else(|| SandboxError::validation(format!("invalid pairedItem index {index}"))),
        other => serde_json::from_value(other)
            .map_err(|error| SandboxError::validation(format!("invalid pairedItem: {error}"))),
    }
}

fn describe(value: &Value) -> String {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    let mut excerpt = Excerpt::default();
    let complete = serde_json::to_writer(&mut excerpt, value).is_ok();
    let mut shown = String::from_utf8_lossy(&excerpt.bytes).into_owned();
    if !complete {
        let cut = (0..=EXCERPT_LIMIT.min(shown.len()))
            .rev()
            .find(|i| shown.is_char_boundary(*i))
            .unwrap_or(0);
        shown.truncate(cut);
        shown.push_str("...");
    }
    format!("{kind} ({shown})")
}

/// Serialization sink that refuses input past [`EXCERPT_LIMIT`] bytes.
#[derive(Default)]
struct Excerpt {
    bytes: Vec<u8>,
}

impl io::Write for Excerpt {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = EXCERPT_LIMIT - self.bytes.len();
        if room == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WriteZero.into());
        }
        let taken = room.min(buf.len());
        self.bytes.extend_from_slice(&buf[..taken]);
        Ok(taken)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
