//! `codenode run`

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use codenode_sandbox::runtime::render_message;
use codenode_sandbox::{
    CodeExecutor, ExecuteRequest, FailurePolicy, Language, MessageSink, ModuleRequest, Record,
    SandboxConfig, StaticHost, WorkflowMode,
};

use crate::RunArgs;

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let code = std::fs::read_to_string(&args.code)
        .with_context(|| format!("reading snippet {}", args.code.display()))?;
    let items = match args.items.as_deref() {
        Some(source) => read_items(source)?,
        None => Vec::new(),
    };

    let language = Language::resolve(args.node_version, args.language);
    let mode = if args.manual {
        WorkflowMode::Manual
    } else {
        WorkflowMode::Cli
    };
    let host = StaticHost::new()
        .with_mode(mode)
        .with_items_json(items.iter().map(Record::to_value).collect());

    let mut request = ExecuteRequest::new(language, args.mode, code)
        .with_items(items)
        .with_modules(ModuleRequest::parse(&args.modules));
    if args.continue_on_fail {
        request = request.with_failure_policy(FailurePolicy::Degrade);
    }
    if args.manual {
        let sink: Arc<dyn MessageSink> =
            Arc::new(|message: Vec<Value>| eprintln!("{}", render_message(&message)));
        request = request.with_sink(sink);
    }

    tracing::debug!(
        language = language.as_str(),
        mode = args.mode.as_str(),
        "running snippet"
    );
    let records = CodeExecutor::new(config)
        .execute(Arc::new(host), request)
        .await
        .context("code execution failed")?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SandboxConfig> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SandboxConfig::default(),
    };
    Ok(config.with_overrides(|key| std::env::var(key).ok()))
}

fn read_items(source: &str) -> Result<Vec<Record>> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading items from stdin")?;
        text
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading items {source}"))?
    };
    parse_items(&text)
}

/// Items are a JSON array. Elements with an object `json` property are read
/// as full items; any other element becomes the payload of a new item.
fn parse_items(text: &str) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_str(text).context("items are not valid JSON")?;
    let Value::Array(elements) = value else {
        bail!("items must be a JSON array");
    };
    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| {
            if element.get("json").is_some_and(Value::is_object) {
                serde_json::from_value(element).with_context(|| format!("item {index}"))
            } else {
                Ok(Record::wrapping(element, "value"))
            }
        })
        .collect()
}
