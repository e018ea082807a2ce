//! Runtime adapters.
//!
//! A [`RuntimeAdapter`] runs a snippet in one embedded language. The two
//! implementations share nothing but this contract:
//!
//! - [`JavaScriptRuntime`]: a fresh engine instance per invocation.
//! - [`PythonRuntime`]: one shared interpreter process behind an execution
//!   queue.

pub mod javascript;
pub mod python;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::SandboxError;
use crate::record::Record;

pub use javascript::JavaScriptRuntime;
pub use python::PythonRuntime;

/// Executes snippets for one language.
///
/// Failures leave no shared state behind: an error in one invocation never
/// affects the next.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Run `code` once for the whole input batch.
    async fn run_once(
        &self,
        context: ExecutionContext,
        code: &str,
    ) -> Result<Vec<Record>, SandboxError>;

    /// Run `code` for the item the context was built for.
    ///
    /// `Ok(None)` drops the item from the output.
    async fn run_per_item(
        &self,
        context: ExecutionContext,
        code: &str,
    ) -> Result<Option<Record>, SandboxError>;
}

/// Receives console output of interactive runs.
///
/// `args` are the converted arguments of one `console.log(...)` or
/// `print(...)` call.
pub trait MessageSink: Send + Sync {
    /// Deliver one message.
    fn send_message(&self, args: Vec<Value>);
}

impl<F> MessageSink for F
where
    F: Fn(Vec<Value>) + Send + Sync,
{
    fn send_message(&self, args: Vec<Value>) {
        self(args)
    }
}

/// Render console arguments the way a terminal would print them.
pub fn render_message(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
