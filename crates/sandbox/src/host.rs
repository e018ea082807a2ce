//! Host accessors the execution context is projected from.
//!
//! The workflow engine owns everything a snippet can read: node parameters,
//! static data, environment, run metadata, and the expression evaluator.
//! [`WorkflowHost`] is the seam through which the context builder pulls
//! them. [`StaticHost`] implements it over fixed data for tests and the CLI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the current workflow run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Started by a user from the editor. Console output goes to the UI.
    Manual,
    /// Started by a trigger node.
    #[default]
    Trigger,
    /// Started by an incoming webhook.
    Webhook,
    /// Started by the engine itself (sub-workflows, retries).
    Internal,
    /// Started by a CLI invocation.
    Cli,
}

impl WorkflowMode {
    /// Whether console output should be routed to an interactive sink.
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Manual)
    }

    /// Serialized name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Trigger => "trigger",
            Self::Webhook => "webhook",
            Self::Internal => "internal",
            Self::Cli => "cli",
        }
    }
}

/// Identity of the workflow being run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowInfo {
    /// Workflow identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the workflow is activated.
    pub active: bool,
}

/// Per-run metadata exposed to snippets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// Execution identifier.
    pub execution_id: String,
    /// How many times this node already ran in the current execution.
    pub run_index: usize,
    /// How the run was started.
    pub mode: WorkflowMode,
    /// Workflow identity.
    pub workflow: WorkflowInfo,
    /// Name of the node running the snippet.
    pub node_name: String,
}

/// Outbound interface to the workflow engine.
///
/// Every method must be cheap and side-effect free: the context builder
/// calls them once per item, and the runtimes may call the function-style
/// accessors any number of times while a snippet runs.
pub trait WorkflowHost: Send + Sync {
    /// Run metadata for the current execution.
    fn run_metadata(&self) -> RunMetadata;

    /// Value of node parameter `name` resolved for item `item_index`.
    fn node_parameter(&self, name: &str, item_index: usize) -> Option<Value>;

    /// All node parameters, resolved for item `item_index`.
    fn node_parameters(&self, item_index: usize) -> Map<String, Value>;

    /// Evaluate a workflow expression in the context of item `item_index`.
    fn evaluate_expression(&self, expression: &str, item_index: usize) -> Result<Value, String>;

    /// Workflow static data for `scope` (`"global"` or `"node"`).
    fn workflow_static_data(&self, scope: &str) -> Result<Value, String>;

    /// Environment variables visible to snippets.
    fn environment(&self) -> BTreeMap<String, String>;

    /// Current instant. Hosts override this to make runs reproducible.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A [`WorkflowHost`] backed by fixed data.
///
/// Expressions are resolved as `{{ $json.path.to.field }}` or
/// `$parameter.name` lookups; anything else evaluates to itself as a string.
#[derive(Debug, Default)]
pub struct StaticHost {
    metadata: RunMetadata,
    parameters: Map<String, Value>,
    environment: BTreeMap<String, String>,
    static_data: RwLock<BTreeMap<String, Value>>,
    items_json: Vec<Value>,
    now: Option<DateTime<Utc>>,
}

impl StaticHost {
    /// Create a host with default metadata and no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set run metadata.
    pub fn with_metadata(mut self, metadata: RunMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the workflow mode.
    pub fn with_mode(mut self, mode: WorkflowMode) -> Self {
        self.metadata.mode = mode;
        self
    }

    /// Add a node parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    /// Seed static data for `scope`.
    pub fn with_static_data(self, scope: impl Into<String>, value: Value) -> Self {
        self.static_data.write().insert(scope.into(), value);
        self
    }

    /// Item payloads expressions resolve `$json` against.
    pub fn with_items_json(mut self, items: Vec<Value>) -> Self {
        self.items_json = items;
        self
    }

    /// Freeze the clock.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn resolve_path(&self, root: &Value, path: &str) -> Value {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(root, |value, segment| value.get(segment))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl WorkflowHost for StaticHost {
    fn run_metadata(&self) -> RunMetadata {
        self.metadata.clone()
    }

    fn node_parameter(&self, name: &str, _item_index: usize) -> Option<Value> {
        self.parameters.get(name).cloned()
    }

    fn node_parameters(&self, _item_index: usize) -> Map<String, Value> {
        self.parameters.clone()
    }

    fn evaluate_expression(&self, expression: &str, item_index: usize) -> Result<Value, String> {
        let trimmed = expression.trim();
        let inner = trimmed
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .map_or(trimmed, str::trim);

        if let Some(path) = inner.strip_prefix("$json") {
            let item = self.items_json.get(item_index).ok_or_else(|| {
                format!("no input item at index {item_index} to evaluate `{expression}`")
            })?;
            return Ok(self.resolve_path(item, path));
        }
        if let Some(path) = inner.strip_prefix("$parameter") {
            return Ok(self.resolve_path(&Value::Object(self.parameters.clone()), path));
        }
        Ok(Value::String(expression.to_owned()))
    }

    fn workflow_static_data(&self, scope: &str) -> Result<Value, String> {
        match scope {
            "global" | "node" => Ok(self
                .static_data
                .read()
                .get(scope)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()))),
            other => Err(format!(
                "the static data type `{other}` is not known, valid types are `global` and `node`"
            )),
        }
    }

    fn environment(&self) -> BTreeMap<String, String> {
        self.environment.clone()
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expressions_resolve_json_paths_per_item() {
        let host = StaticHost::new().with_items_json(vec![json!({"a": {"b": 1}}), json!({"a": {"b": 2}})]);
        assert_eq!(host.evaluate_expression("{{ $json.a.b }}", 1), Ok(json!(2)));
        assert_eq!(host.evaluate_expression("$json.missing", 0), Ok(Value::Null));
        assert!(host.evaluate_expression("$json.a", 5).is_err());
    }

    #[test]
    fn expressions_resolve_parameters() {
        let host = StaticHost::new().with_parameter("limit", json!(10));
        assert_eq!(host.evaluate_expression("{{ $parameter.limit }}", 0), Ok(json!(10)));
        assert_eq!(host.evaluate_expression("plain", 0), Ok(json!("plain")));
    }

    #[test]
    fn static_data_scopes() {
        let host = StaticHost::new().with_static_data("global", json!({"counter": 3}));
        assert_eq!(host.workflow_static_data("global"), Ok(json!({"counter": 3})));
        assert_eq!(host.workflow_static_data("node"), Ok(json!({})));
        assert!(host.workflow_static_data("other").is_err());
    }

    #[test]
    fn only_manual_mode_is_interactive() {
        assert!(WorkflowMode::Manual.is_interactive());
        assert!(!WorkflowMode::Trigger.is_interactive());
        assert!(!WorkflowMode::Webhook.is_interactive());
    }
}
