//! Execution driver.
//!
//! [`CodeExecutor::execute`] is the entry point of the crate: it picks the
//! runtime adapter, runs the snippet in the requested cardinality and
//! applies the caller's failure policy. It is the only place where a failure
//! is turned into output instead of being propagated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::config::SandboxConfig;
use crate::context::ContextBuilder;
use crate::error::SandboxError;
use crate::host::WorkflowHost;
use crate::modules::ModuleRequest;
use crate::record::Record;
use crate::runtime::python::PythonInterpreter;
use crate::runtime::{JavaScriptRuntime, MessageSink, PythonRuntime, RuntimeAdapter};

/// Snippet language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Language {
    /// JavaScript, run by the embedded engine.
    #[default]
    JavaScript,
    /// Python, run by the shared interpreter.
    Python,
}

impl Language {
    /// Language for a node of `node_version`.
    ///
    /// Version 1 nodes have no language parameter and always run
    /// JavaScript.
    pub fn resolve(node_version: u32, configured: Option<Self>) -> Self {
        if node_version < 2 {
            Self::JavaScript
        } else {
            configured.unwrap_or_default()
        }
    }

    /// Parameter value naming this language.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javaScript",
            Self::Python => "python",
        }
    }
}

/// Execution cardinality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionMode {
    /// One run over the whole input batch.
    #[default]
    RunOnceForAllItems,
    /// One run per input item.
    RunOnceForEachItem,
}

impl ExecutionMode {
    /// Parameter value naming this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunOnceForAllItems => "runOnceForAllItems",
            Self::RunOnceForEachItem => "runOnceForEachItem",
        }
    }
}

/// What to do when a run fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Propagate the error; the batch produces nothing.
    #[default]
    Abort,
    /// Replace the failed run's output with an `{error: message}` record.
    Degrade,
}

/// One call of the Code node.
#[derive(Clone)]
pub struct ExecuteRequest {
    /// Snippet language.
    pub language: Language,
    /// Execution cardinality.
    pub mode: ExecutionMode,
    /// Input items.
    pub items: Vec<Record>,
    /// Snippet source.
    pub code: String,
    /// Python modules to install first. Ignored for JavaScript.
    pub modules: ModuleRequest,
    /// Failure handling.
    pub failure_policy: FailurePolicy,
    /// Console sink, honoured only for manual runs.
    pub interactive: Option<Arc<dyn MessageSink>>,
}

impl ExecuteRequest {
    /// A request with no items, modules or sink that aborts on failure.
    pub fn new(language: Language, mode: ExecutionMode, code: impl Into<String>) -> Self {
        Self {
            language,
            mode,
            items: Vec::new(),
            code: code.into(),
            modules: ModuleRequest::default(),
            failure_policy: FailurePolicy::Abort,
            interactive: None,
        }
    }

    /// Set the input items.
    pub fn with_items(mut self, items: Vec<Record>) -> Self {
        self.items = items;
        self
    }

    /// Set the modules to install.
    pub fn with_modules(mut self, modules: ModuleRequest) -> Self {
        self.modules = modules;
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the interactive console sink.
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.interactive = Some(sink);
        self
    }
}

/// Runs Code node requests.
#[derive(Clone, Default)]
pub struct CodeExecutor {
    config: SandboxConfig,
    python: Option<Arc<PythonInterpreter>>,
}

impl CodeExecutor {
    /// Create an executor. Python runs use the process-wide interpreter.
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            python: None,
        }
    }

    /// Use `interpreter` instead of the process-wide one.
    pub fn with_interpreter(mut self, interpreter: Arc<PythonInterpreter>) -> Self {
        self.python = Some(interpreter);
        self
    }

    /// Executor configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute `request` against `host`.
    pub async fn execute(
        &self,
        host: Arc<dyn WorkflowHost>,
        request: ExecuteRequest,
    ) -> Result<Vec<Record>, SandboxError> {
        let span = tracing::info_span!(
            "code_execution",
            language = request.language.as_str(),
            mode = request.mode.as_str(),
            items = request.items.len(),
        );
        self.run(host, request).instrument(span).await
    }

    async fn run(
        &self,
        host: Arc<dyn WorkflowHost>,
        request: ExecuteRequest,
    ) -> Result<Vec<Record>, SandboxError> {
        let sink = request
            .interactive
            .filter(|_| host.run_metadata().mode.is_interactive());
        let adapter = self.adapter(request.language, &request.modules, sink);
        let item_count = request.items.len();
        let builder = ContextBuilder::new(host, request.items.into());
        let degrade = request.failure_policy == FailurePolicy::Degrade;

        match request.mode {
            ExecutionMode::RunOnceForAllItems => {
                match adapter.run_once(builder.build(0), &request.code).await {
                    Ok(records) => {
                        tracing::debug!(records = records.len(), "code execution finished");
                        Ok(records)
                    }
                    Err(error) if degrade => {
                        tracing::warn!(%error, "code execution failed, continuing with error record");
                        Ok(vec![Record::error(error.message())])
                    }
                    Err(error) => Err(error),
                }
            }
            ExecutionMode::RunOnceForEachItem => {
                let mut records = Vec::with_capacity(item_count);
                for item_index in 0..item_count {
                    match adapter
                        .run_per_item(builder.build(item_index), &request.code)
                        .await
                    {
                        Ok(Some(record)) => records.push(record.paired_with(item_index)),
                        Ok(None) => tracing::trace!(item_index, "item dropped"),
                        Err(error) if degrade => {
                            tracing::warn!(item_index, %error, "item failed, continuing with error record");
                            records.push(Record::error(error.message()).paired_with(item_index));
                        }
                        Err(error) => return Err(error.at_item(item_index)),
                    }
                }
                Ok(records)
            }
        }
    }

    fn adapter(
        &self,
        language: Language,
        modules: &ModuleRequest,
        sink: Option<Arc<dyn MessageSink>>,
    ) -> Box<dyn RuntimeAdapter> {
        let options = self.config.validation;
        match language {
            Language::JavaScript => {
                let runtime = JavaScriptRuntime::new(options);
                Box::new(match sink {
                    Some(sink) => runtime.with_sink(sink),
                    None => runtime,
                })
            }
            Language::Python => {
                let interpreter = self
                    .python
                    .clone()
                    .unwrap_or_else(|| PythonInterpreter::shared(&self.config.python));
                let runtime = PythonRuntime::new(interpreter, options).with_modules(modules);
                Box::new(match sink {
                    Some(sink) => runtime.with_sink(sink),
                    None => runtime,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{StaticHost, WorkflowMode};
    use crate::record::ItemPointer;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::{Value, json};

    fn items(values: &[Value]) -> Vec<Record> {
        values
            .iter()
            .cloned()
            .map(|value| Record::wrapping(value, "value"))
            .collect()
    }

    fn host() -> Arc<dyn WorkflowHost> {
        Arc::new(StaticHost::new())
    }

    fn js(mode: ExecutionMode, code: &str, inputs: &[Value]) -> ExecuteRequest {
        ExecuteRequest::new(Language::JavaScript, mode, code).with_items(items(inputs))
    }

    #[tokio::test]
    async fn per_item_outputs_are_tagged_in_order() {
        let records = CodeExecutor::default()
            .execute(
                host(),
                js(
                    ExecutionMode::RunOnceForEachItem,
                    "return { b: $json.a * 2 };",
                    &[json!({"a": 1}), json!({"a": 2})],
                ),
            )
            .await
            .unwrap();
        assert_eq!(
            records.iter().map(Record::to_value).collect::<Vec<_>>(),
            vec![
                json!({"json": {"b": 2}, "pairedItem": {"item": 0}}),
                json!({"json": {"b": 4}, "pairedItem": {"item": 1}}),
            ]
        );
    }

    #[tokio::test]
    async fn dropped_items_do_not_shift_tags() {
        let records = CodeExecutor::default()
            .execute(
                host(),
                js(
                    ExecutionMode::RunOnceForEachItem,
                    "if ($itemIndex === 1) return;\nreturn { i: $itemIndex };",
                    &[json!({}), json!({}), json!({})],
                ),
            )
            .await
            .unwrap();
        let tags: Vec<_> = records.iter().map(|r| r.paired_item).collect();
        assert_eq!(tags, vec![Some(ItemPointer::item(0)), Some(ItemPointer::item(2))]);
        assert_eq!(Value::Object(records[1].json.clone()), json!({"i": 2}));
    }

    #[tokio::test]
    async fn run_once_returns_one_record_per_element() {
        let records = CodeExecutor::default()
            .execute(
                host(),
                js(
                    ExecutionMode::RunOnceForAllItems,
                    "return items.map((item, i) => ({ i, a: item.json.a }));",
                    &[json!({"a": "x"}), json!({"a": "y"}), json!({"a": "z"})],
                ),
            )
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(Value::Object(records[2].json.clone()), json!({"i": 2, "a": "z"}));
    }

    #[rstest]
    #[case(FailurePolicy::Degrade)]
    #[case(FailurePolicy::Abort)]
    #[tokio::test]
    async fn run_once_failure_follows_policy(#[case] policy: FailurePolicy) {
        let request = js(ExecutionMode::RunOnceForAllItems, "throw new Error('boom');", &[json!({})])
            .with_failure_policy(policy);
        let outcome = CodeExecutor::default().execute(host(), request).await;
        match policy {
            FailurePolicy::Degrade => {
                let records = outcome.unwrap();
                assert_eq!(records, vec![Record::error("boom")]);
            }
            FailurePolicy::Abort => assert!(outcome.is_err()),
        }
    }

    #[tokio::test]
    async fn per_item_degrade_interleaves_error_records() {
        let request = js(
            ExecutionMode::RunOnceForEachItem,
            "if ($json.bad) throw new Error('bad item');\nreturn $json;",
            &[json!({"n": 1}), json!({"bad": true}), json!({"n": 3})],
        )
        .with_failure_policy(FailurePolicy::Degrade);
        let records = CodeExecutor::default().execute(host(), request).await.unwrap();
        assert_eq!(
            records.iter().map(Record::to_value).collect::<Vec<_>>(),
            vec![
                json!({"json": {"n": 1}, "pairedItem": {"item": 0}}),
                json!({"json": {"error": "bad item"}, "pairedItem": {"item": 1}}),
                json!({"json": {"n": 3}, "pairedItem": {"item": 2}}),
            ]
        );
    }

    #[tokio::test]
    async fn per_item_abort_stops_the_batch() {
        let request = js(
            ExecutionMode::RunOnceForEachItem,
            "return [1, 2];",
            &[json!({}), json!({})],
        );
        let executor = CodeExecutor::new(SandboxConfig::strict());
        let error = executor.execute(host(), request).await.unwrap_err();
        assert!(matches!(error, SandboxError::Validation { item_index: Some(0), .. }));
    }

    #[rstest]
    #[case(WorkflowMode::Manual, 1)]
    #[case(WorkflowMode::Trigger, 0)]
    #[tokio::test]
    async fn sink_is_only_used_for_manual_runs(#[case] mode: WorkflowMode, #[case] expected: usize) {
        let seen = Arc::new(Mutex::new(0));
        let sink: Arc<dyn MessageSink> = {
            let seen = Arc::clone(&seen);
            Arc::new(move |_: Vec<Value>| *seen.lock() += 1)
        };
        let request = js(ExecutionMode::RunOnceForAllItems, "console.log('hi');\nreturn [];", &[])
            .with_sink(sink);
        CodeExecutor::default()
            .execute(Arc::new(StaticHost::new().with_mode(mode)), request)
            .await
            .unwrap();
        assert_eq!(*seen.lock(), expected);
    }

    #[rstest]
    #[case(1, Some(Language::Python), Language::JavaScript)]
    #[case(2, Some(Language::Python), Language::Python)]
    #[case(2, None, Language::JavaScript)]
    fn language_is_gated_by_node_version(
        #[case] version: u32,
        #[case] configured: Option<Language>,
        #[case] expected: Language,
    ) {
        assert_eq!(Language::resolve(version, configured), expected);
    }

    #[test]
    fn parameter_names_match_serde() {
        for language in [Language::JavaScript, Language::Python] {
            assert_eq!(serde_json::to_value(language).unwrap(), json!(language.as_str()));
        }
        for mode in [ExecutionMode::RunOnceForAllItems, ExecutionMode::RunOnceForEachItem] {
            assert_eq!(serde_json::to_value(mode).unwrap(), json!(mode.as_str()));
        }
    }
}
