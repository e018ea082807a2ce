//! Line-delimited JSON messages exchanged with the interpreter process.
//!
//! The host writes [`Request`]s to the interpreter's stdin and reads
//! [`Response`]s from its stdout, one JSON object per line. A `run` request
//! may be answered by any number of `call` and `print` messages before the
//! final `result` or `error`; every `call` is answered with exactly one
//! `reply`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Host → interpreter.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Request<'a> {
    /// Execute wrapped source in a fresh namespace built from `globals`.
    Run {
        source: &'a str,
        globals: &'a Map<String, Value>,
        interactive: bool,
    },
    /// Make `modules` importable, installing the ones that are missing.
    Install {
        modules: &'a [String],
        args: &'a [String],
    },
    /// Answer to the pending `call`.
    Reply {
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Request<'_> {
    pub(crate) fn reply(outcome: Result<Value, String>) -> Self {
        match outcome {
            Ok(value) => Self::Reply {
                value: Some(value),
                error: None,
            },
            Err(error) => Self::Reply {
                value: None,
                error: Some(error),
            },
        }
    }
}

/// Interpreter → host.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Response {
    /// Sent once after startup.
    Ready { version: String },
    /// Successful run. `null` and a missing value both mean "no result".
    Result {
        #[serde(default)]
        value: Option<Value>,
    },
    /// Failed run.
    Error {
        kind: String,
        message: String,
        #[serde(default)]
        category: ErrorCategory,
    },
    /// The snippet called a host function.
    Call {
        function: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// The snippet printed in an interactive run.
    Print {
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Install finished; `installed` lists what was actually fetched.
    Installed {
        #[serde(default)]
        installed: Vec<String>,
    },
    /// Install failed.
    InstallError { module: String, message: String },
}

/// Stage a failed run broke in.
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ErrorCategory {
    /// The snippet raised.
    #[default]
    Execution,
    /// The result could not be turned into plain data.
    Conversion,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn run_request_shape() {
        let globals = match json!({"_itemIndex": {"type": "value", "value": 0}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let request = Request::Run {
            source: "pass",
            globals: &globals,
            interactive: false,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "op": "run",
                "source": "pass",
                "globals": {"_itemIndex": {"type": "value", "value": 0}},
                "interactive": false
            })
        );
    }

    #[test]
    fn replies_carry_value_or_error() {
        assert_eq!(
            serde_json::to_value(Request::reply(Ok(json!([1])))).unwrap(),
            json!({"op": "reply", "value": [1]})
        );
        assert_eq!(
            serde_json::to_value(Request::reply(Err("nope".into()))).unwrap(),
            json!({"op": "reply", "error": "nope"})
        );
    }

    #[test]
    fn parses_interpreter_messages() {
        let parse = |line: &str| serde_json::from_str::<Response>(line).unwrap();
        assert_eq!(
            parse(r#"{"op":"ready","version":"3.12.1"}"#),
            Response::Ready {
                version: "3.12.1".into()
            }
        );
        assert_eq!(parse(r#"{"op":"result","value":null}"#), Response::Result { value: None });
        assert_eq!(
            parse(r#"{"op":"error","kind":"KeyError","message":"KeyError: 'a'"}"#),
            Response::Error {
                kind: "KeyError".into(),
                message: "KeyError: 'a'".into(),
                category: ErrorCategory::Execution,
            }
        );
        assert_eq!(
            parse(r#"{"op":"call","function":"_input.all","args":[]}"#),
            Response::Call {
                function: "_input.all".into(),
                args: vec![],
            }
        );
        assert_eq!(
            parse(r#"{"op":"install_error","module":"nope","message":"not found"}"#),
            Response::InstallError {
                module: "nope".into(),
                message: "not found".into(),
            }
        );
    }
}
