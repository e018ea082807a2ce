//! End-to-end tests for `CodeExecutor` over both runtimes.
//!
//! Python tests return early when no `python3` is on `PATH`.

use std::sync::Arc;

use codenode_sandbox::{
    CodeExecutor, ExecuteRequest, ExecutionMode, FailurePolicy, ItemPointer, Language,
    ModuleRequest, PythonInterpreter, Record, SandboxConfig, SandboxError,
    StaticHost, WorkflowHost, python_available,
};
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
    Arc::new(
        StaticHost::new()
            .with_parameter("factor", json!(3))
            .with_items_json(vec![json!({"a": 1}), json!({"a": 2})]),
    )
}

/// Executor with its own interpreter, or `None` without Python.
fn python_executor() -> Option<CodeExecutor> {
    let config = SandboxConfig::default();
    if !python_available(&config.python.executable) {
        return None;
    }
    let interpreter = Arc::new(PythonInterpreter::new(config.python.clone()));
    Some(CodeExecutor::new(config).with_interpreter(interpreter))
}

fn per_item(language: Language, code: &str) -> ExecuteRequest {
    ExecuteRequest::new(language, ExecutionMode::RunOnceForEachItem, code)
        .with_items(items(&[json!({"a": 1}), json!({"a": 2})]))
}

fn expected_doubled() -> Vec<Value> {
    vec![
        json!({"json": {"b": 2}, "pairedItem": {"item": 0}}),
        json!({"json": {"b": 4}, "pairedItem": {"item": 1}}),
    ]
}

fn wire(records: &[Record]) -> Vec<Value> {
    records.iter().map(Record::to_value).collect()
}

#[tokio::test]
async fn javascript_per_item_scenario() {
    let records = CodeExecutor::default()
        .execute(host(), per_item(Language::JavaScript, "return { b: $json.a * 2 };"))
        .await
        .unwrap();
    assert_eq!(wire(&records), expected_doubled());
}

#[tokio::test]
async fn python_per_item_scenario() {
    let Some(executor) = python_executor() else { return };
    let records = executor
        .execute(host(), per_item(Language::Python, "return {'b': _json.a * 2}"))
        .await
        .unwrap();
    assert_eq!(wire(&records), expected_doubled());
}

#[rstest]
#[case(Language::JavaScript, "return [{ f: $getNodeParameter('factor'), e: $evaluateExpression('{{ $json.a }}', 1) }];")]
#[case(Language::Python, "return [{'f': _getNodeParameter('factor'), 'e': _evaluateExpression('{{ $json.a }}', 1)}]")]
#[tokio::test]
async fn host_accessors_are_reachable(#[case] language: Language, #[case] code: &str) {
    let executor = match language {
        Language::Python => match python_executor() {
            Some(executor) => executor,
            None => return,
        },
        Language::JavaScript => CodeExecutor::default(),
    };
    let request = ExecuteRequest::new(language, ExecutionMode::RunOnceForAllItems, code)
        .with_items(items(&[json!({"a": 1}), json!({"a": 2})]));
    let records = executor.execute(host(), request).await.unwrap();
    assert_eq!(wire(&records), vec![json!({"json": {"f": 3, "e": 2}})]);
}

#[rstest]
#[case(Language::JavaScript, "throw new Error('boom');", "boom")]
#[case(Language::Python, "raise ValueError('boom')", "ValueError: boom")]
#[tokio::test]
async fn run_once_degrade_yields_one_error_record(
    #[case] language: Language,
    #[case] code: &str,
    #[case] message: &str,
) {
    let executor = match language {
        Language::Python => match python_executor() {
            Some(executor) => executor,
            None => return,
        },
        Language::JavaScript => CodeExecutor::default(),
    };
    let request = ExecuteRequest::new(language, ExecutionMode::RunOnceForAllItems, code)
        .with_items(items(&[json!({})]));

    let degraded = executor
        .execute(host(), request.clone().with_failure_policy(FailurePolicy::Degrade))
        .await
        .unwrap();
    assert_eq!(wire(&degraded), vec![json!({"json": {"error": message}})]);

    let aborted = executor.execute(host(), request).await.unwrap_err();
    assert!(matches!(aborted, SandboxError::Execution(_)), "{aborted:?}");
}

#[tokio::test]
async fn per_item_scalar_results_are_wrapped() {
    let records = CodeExecutor::default()
        .execute(host(), per_item(Language::JavaScript, "return $json.a > 1 ? 'big' : 7;"))
        .await
        .unwrap();
    assert_eq!(
        wire(&records),
        vec![
            json!({"json": {"value": 7}, "pairedItem": {"item": 0}}),
            json!({"json": {"value": "big"}, "pairedItem": {"item": 1}}),
        ]
    );
}

#[tokio::test]
async fn run_once_non_sequence_is_rejected() {
    let request = ExecuteRequest::new(
        Language::JavaScript,
        ExecutionMode::RunOnceForAllItems,
        "return { a: 1 };",
    );
    let error = CodeExecutor::default().execute(host(), request).await.unwrap_err();
    assert!(matches!(error, SandboxError::Validation { .. }));
}

#[tokio::test]
async fn per_item_output_never_exceeds_input() {
    let inputs: Vec<Value> = (0..6).map(|n| json!({"n": n})).collect();
    let request = ExecuteRequest::new(
        Language::JavaScript,
        ExecutionMode::RunOnceForEachItem,
        "return $json.n % 2 === 0 ? $json : undefined;",
    )
    .with_items(items(&inputs));
    let records = CodeExecutor::default().execute(host(), request).await.unwrap();
    assert!(records.len() <= inputs.len());
    let tags: Vec<usize> = records
        .iter()
        .map(|record| record.paired_item.map_or(usize::MAX, |p| p.item))
        .collect();
    assert_eq!(tags, vec![0, 2, 4]);
    assert_eq!(records[1].paired_item, Some(ItemPointer::item(2)));
}

#[tokio::test]
async fn python_builtin_modules_install_nothing() {
    let Some(executor) = python_executor() else { return };
    let request = ExecuteRequest::new(
        Language::Python,
        ExecutionMode::RunOnceForAllItems,
        "import json, math\nreturn [{'pi': round(math.pi, 2), 's': json.dumps([1])}]",
    )
    .with_modules(ModuleRequest::parse("json, math"));
    for _ in 0..2 {
        let records = executor.execute(host(), request.clone()).await.unwrap();
        assert_eq!(wire(&records), vec![json!({"json": {"pi": 3.14, "s": "[1]"}})]);
    }
}

#[tokio::test]
async fn python_interpreter_survives_failed_runs() {
    let Some(executor) = python_executor() else { return };
    let failing = ExecuteRequest::new(
        Language::Python,
        ExecutionMode::RunOnceForAllItems,
        "import sys\nsys.exit(1)",
    );
    assert!(executor.execute(host(), failing).await.is_err());

    let ok = ExecuteRequest::new(
        Language::Python,
        ExecutionMode::RunOnceForAllItems,
        "return [{'ok': True}]",
    );
    let records = executor.execute(host(), ok).await.unwrap();
    assert_eq!(wire(&records), vec![json!({"json": {"ok": true}})]);
}
