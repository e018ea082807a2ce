//! JavaScript runtime adapter, backed by the Boa engine.
//!
//! Every invocation gets its own engine on a blocking worker thread; nothing
//! survives the call. Context data is copied in as plain JSON, host
//! functions are reached through a single native entry point that looks the
//! function up in the invocation's registry.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use boa_engine::job::SimpleJobQueue;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsError, JsResult, JsString, JsValue, NativeFunction, Source};
use indexmap::IndexMap;
use serde_json::{Value, json};

use super::{MessageSink, RuntimeAdapter, render_message};
use crate::config::ValidationOptions;
use crate::context::{ExecutionContext, HostFunction, symbols};
use crate::error::{RuntimeError, SandboxError};
use crate::record::Record;
use crate::validate;

const PRELUDE: &str = include_str!("prelude.js");

/// Error kind the prelude reports when a result cannot be converted.
const CONVERSION_KIND: &str = "ConversionError";

/// Runs snippets in a fresh JavaScript engine per invocation.
#[derive(Clone, Default)]
pub struct JavaScriptRuntime {
    options: ValidationOptions,
    sink: Option<Arc<dyn MessageSink>>,
}

impl JavaScriptRuntime {
    /// Create an adapter validating results with `options`.
    pub fn new(options: ValidationOptions) -> Self {
        Self {
            options,
            sink: None,
        }
    }

    /// Forward `console.*` calls to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    async fn evaluate(
        &self,
        context: ExecutionContext,
        code: &str,
    ) -> Result<Option<Value>, SandboxError> {
        let context = context.for_runtime(&symbols::JAVASCRIPT);
        let code = code.to_owned();
        let sink = self.sink.clone();
        tokio::task::spawn_blocking(move || evaluate(&context, &code, sink))
            .await
            .map_err(|error| SandboxError::interpreter(format!("JavaScript task failed: {error}")))?
    }
}

#[async_trait]
impl RuntimeAdapter for JavaScriptRuntime {
    async fn run_once(
        &self,
        context: ExecutionContext,
        code: &str,
    ) -> Result<Vec<Record>, SandboxError> {
        let result = self.evaluate(context, code).await?;
        validate::run_once(result, &self.options)
    }

    async fn run_per_item(
        &self,
        context: ExecutionContext,
        code: &str,
    ) -> Result<Option<Record>, SandboxError> {
        let item_index = context.item_index();
        let result = self.evaluate(context, code).await?;
        validate::per_item(result, item_index, &self.options)
    }
}

struct Invocation {
    functions: IndexMap<String, HostFunction>,
    sink: Option<Arc<dyn MessageSink>>,
}

thread_local! {
    static INVOCATION: RefCell<Option<Invocation>> = const { RefCell::new(None) };
}

/// Installs the registry for the current thread and clears it on drop.
struct InvocationScope;

impl InvocationScope {
    fn enter(invocation: Invocation) -> Self {
        INVOCATION.with(|slot| *slot.borrow_mut() = Some(invocation));
        Self
    }
}

impl Drop for InvocationScope {
    fn drop(&mut self) {
        INVOCATION.with(|slot| slot.borrow_mut().take());
    }
}

fn evaluate(
    context: &ExecutionContext,
    code: &str,
    sink: Option<Arc<dyn MessageSink>>,
) -> Result<Option<Value>, SandboxError> {
    let _scope = InvocationScope::enter(Invocation {
        functions: context.functions(),
        sink,
    });

    let mut engine = Context::builder()
        .job_queue(Rc::new(SimpleJobQueue::new()))
        .build()
        .map_err(engine_error)?;
    engine
        .register_global_callable(
            JsString::from("__codenodeCall"),
            2,
            NativeFunction::from_fn_ptr(host_call),
        )
        .map_err(engine_error)?;
    engine
        .register_global_callable(
            JsString::from("__codenodeConsole"),
            2,
            NativeFunction::from_fn_ptr(console),
        )
        .map_err(engine_error)?;
    engine
        .eval(Source::from_bytes(PRELUDE))
        .map_err(engine_error)?;

    let mut bindings = context.bindings();
    let items: Vec<Value> = context.items().iter().map(Record::to_value).collect();
    bindings.insert("items".to_owned(), json!({"type": "value", "value": items}));
    let bindings = JsValue::from_json(&Value::Object(bindings), &mut engine).map_err(engine_error)?;
    engine
        .register_global_property(JsString::from("__codenodeBindings"), bindings, Attribute::all())
        .map_err(engine_error)?;
    engine
        .eval(Source::from_bytes("__codenodeInstall(__codenodeBindings);"))
        .map_err(engine_error)?;

    engine
        .eval(Source::from_bytes(&wrap(code)))
        .map_err(snippet_error)?;
    engine.run_jobs();

    let settled = engine
        .eval(Source::from_bytes("globalThis.__codenodeSettled"))
        .map_err(engine_error)?;
    if settled.is_undefined() {
        return Err(RuntimeError::new(
            "Error",
            "Code did not finish: it awaits a promise that is never settled",
        )
        .into());
    }
    let settled = settled
        .to_json(&mut engine)
        .map_err(|error| SandboxError::Conversion {
            message: error.to_string(),
        })?;
    outcome(settled)
}

/// Embed the snippet in an async entry function whose outcome is recorded
/// on the global object.
fn wrap(code: &str) -> String {
    format!(
        "(async () => {{\n{code}\n}})().then(\n  (value) => __codenodeSettle({{ ok: true, value }}),\n  (error) => __codenodeSettle({{ ok: false, error }})\n);\n"
    )
}

fn outcome(settled: Value) -> Result<Option<Value>, SandboxError> {
    let Value::Object(mut settled) = settled else {
        return Err(SandboxError::Conversion {
            message: format!("unexpected outcome {settled}"),
        });
    };
    if settled.get("ok") == Some(&Value::Bool(true)) {
        return Ok(settled.remove("value"));
    }
    let field = |name: &str| settled.get(name).and_then(Value::as_str).map(str::to_owned);
    let kind = field("kind").unwrap_or_else(|| "Error".to_owned());
    let message = field("message").unwrap_or_default();
    if kind == CONVERSION_KIND {
        Err(SandboxError::Conversion { message })
    } else {
        Err(RuntimeError::new(kind, message).into())
    }
}

/// Errors raised while evaluating the snippet source itself.
fn snippet_error(error: JsError) -> SandboxError {
    let message = error.to_string();
    let kind = message
        .split_once(':')
        .map(|(kind, _)| kind.trim())
        .filter(|kind| kind.ends_with("Error") && !kind.contains(' '))
        .unwrap_or("Error")
        .to_owned();
    RuntimeError::new(kind, message).trimmed().into()
}

fn engine_error(error: JsError) -> SandboxError {
    SandboxError::interpreter(format!("JavaScript engine setup failed: {error}"))
}

fn json_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<Value> {
    match args.get(index) {
        Some(value) if !value.is_undefined() => value.to_json(context),
        _ => Ok(Value::Null),
    }
}

fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(values) => values,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn host_call(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let path = json_arg(args, 0, context)?;
    let arguments = into_list(json_arg(args, 1, context)?);
    let path = path.as_str().unwrap_or_default();

    let reply = INVOCATION.with(|slot| {
        let slot = slot.borrow();
        match slot.as_ref().and_then(|invocation| invocation.functions.get(path)) {
            Some(function) => match function.call(&arguments) {
                Ok(value) => json!({"ok": true, "value": value}),
                Err(error) => json!({"ok": false, "error": error}),
            },
            None => json!({"ok": false, "error": format!("unknown host function `{path}`")}),
        }
    });
    JsValue::from_json(&reply, context)
}

fn console(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let level = json_arg(args, 0, context)?;
    let level = level.as_str().unwrap_or("log");
    let values = into_list(json_arg(args, 1, context)?);

    INVOCATION.with(|slot| {
        let slot = slot.borrow();
        match slot.as_ref().and_then(|invocation| invocation.sink.as_ref()) {
            Some(sink) => sink.send_message(values),
            None => tracing::trace!(
                target: "codenode::javascript",
                level,
                text = %render_message(&values),
                "console"
            ),
        }
    });
    Ok(JsValue::undefined())
}
