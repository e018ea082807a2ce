//! Python runtime adapter.
//!
//! Snippets run in the shared [`PythonInterpreter`], each in a fresh global
//! namespace that the interpreter clears once the run is over. Context
//! symbols use the `_` prefix since `$` is not a legal Python identifier.

mod interpreter;
pub(crate) mod protocol;
pub(crate) mod source;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use interpreter::{PythonInterpreter, python_available};

use super::{MessageSink, RuntimeAdapter};
use crate::config::ValidationOptions;
use crate::context::{ExecutionContext, symbols};
use crate::error::SandboxError;
use crate::modules::ModuleRequest;
use crate::record::Record;
use crate::validate;

/// Runs snippets in the shared Python interpreter.
#[derive(Clone)]
pub struct PythonRuntime {
    interpreter: Arc<PythonInterpreter>,
    options: ValidationOptions,
    modules: Vec<String>,
    sink: Option<Arc<dyn MessageSink>>,
}

impl PythonRuntime {
    /// Create an adapter over `interpreter`.
    pub fn new(interpreter: Arc<PythonInterpreter>, options: ValidationOptions) -> Self {
        Self {
            interpreter,
            options,
            modules: Vec::new(),
            sink: None,
        }
    }

    /// Install the non-builtin names of `request` before every run.
    pub fn with_modules(mut self, request: &ModuleRequest) -> Self {
        self.modules = request.without_builtins(&self.interpreter.config().builtin_modules);
        self
    }

    /// Route `print` to `sink` instead of the interpreter's stderr.
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Modules that will be handed to the installer.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    async fn evaluate(
        &self,
        context: ExecutionContext,
        code: &str,
    ) -> Result<Option<Value>, SandboxError> {
        if !self.modules.is_empty() {
            self.interpreter.install(&self.modules).await?;
        }
        let context = context.for_runtime(&symbols::PYTHON);
        tracing::debug!(item_index = context.item_index(), "running python snippet");
        self.interpreter
            .run(&source::wrap(code), &context, self.sink.as_ref())
            .await
    }
}

#[async_trait]
impl RuntimeAdapter for PythonRuntime {
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
