//! Output standardization.
//!
//! Runtime conversion layers hand back plain JSON, with two kinds of
//! leftovers that differ between runtimes: values that were not plain data
//! inside the snippet (dates, class instances) arrive as marker objects, and
//! numbers carry the runtime's int/float distinction. `standardize` folds
//! both into one JSON-safe shape.

use serde_json::{Map, Number, Value};

/// Key identifying a marker object for a non-plain value. Its value is the
/// original type name.
pub const NONPLAIN_MARKER: &str = "__codenode_nonplain__";

/// Key holding the string form of a non-plain value inside a marker.
pub const NONPLAIN_REPR: &str = "repr";

/// Key holding the own enumerable properties of a class instance inside a
/// marker. Absent for values without any.
pub const NONPLAIN_FIELDS: &str = "fields";

/// Largest integer a float can represent exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Standardize a record payload.
pub fn standardize(json: Map<String, Value>) -> Map<String, Value> {
    json.into_iter()
        .map(|(key, value)| (key, standardize_value(value)))
        .collect()
}

/// Standardize a single value.
pub fn standardize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => match nonplain_repr(&map) {
            Some(repr) => repr,
            None => Value::Object(standardize(map)),
        },
        Value::Array(values) => Value::Array(values.into_iter().map(standardize_value).collect()),
        Value::Number(number) => Value::Number(integral(number)),
        other => other,
    }
}

/// Replace a marker standing for a whole item (or a whole `json` payload)
/// by a plain value.
///
/// An instance with own properties becomes an object of those properties;
/// any other marker becomes its string form, which callers then treat as a
/// non-object. Values that are not markers are returned unchanged.
pub fn unwrap_nonplain(value: Value) -> Value {
    match value {
        Value::Object(mut map) if is_marker(&map) => match map.remove(NONPLAIN_FIELDS) {
            Some(Value::Object(fields)) => Value::Object(fields),
            _ => nonplain_repr(&map).unwrap_or(Value::Null),
        },
        other => other,
    }
}

fn is_marker(map: &Map<String, Value>) -> bool {
    map.get(NONPLAIN_MARKER).is_some_and(Value::is_string)
}

fn nonplain_repr(map: &Map<String, Value>) -> Option<Value> {
    map.get(NONPLAIN_MARKER)?.as_str()?;
    Some(match map.get(NONPLAIN_REPR) {
        Some(Value::String(repr)) => Value::String(repr.clone()),
        _ => Value::Null,
    })
}

/// Floats without a fractional part become integers, so `2.0` coming from
/// a runtime without an integer type compares equal to `2`.
fn integral(number: Number) -> Number {
    match number.as_f64() {
        Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() <= MAX_SAFE_INTEGER => {
            Number::from(float as i64)
        }
        _ => number,
    }
}
