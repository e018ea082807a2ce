#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Codenode Sandbox
//!
//! Snippet execution core of the workflow Code node.
//!
//! This crate provides:
//! - [`CodeExecutor`] -- runs a snippet over input items in either
//!   cardinality and applies the failure policy
//! - [`RuntimeAdapter`] -- the contract shared by [`JavaScriptRuntime`]
//!   (fresh engine per invocation) and [`PythonRuntime`] (one shared
//!   interpreter process behind an execution queue)
//! - [`ContextBuilder`] -- projects host state into the symbols a snippet
//!   sees (`$input`, `$json`, `$evaluateExpression`, ...)
//! - [`validate`] and [`standardize`] -- the result shape contract
//!
//! The host side is abstracted by [`WorkflowHost`]; [`StaticHost`]
//! implements it over fixed data.

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod host;
pub mod modules;
pub mod record;
pub mod runtime;
pub mod standardize;
pub mod validate;

pub use config::{NonObjectPolicy, PythonConfig, SandboxConfig, ValidationOptions};
pub use context::{ContextBuilder, ContextValue, ExecutionContext, HostFunction};
pub use driver::{CodeExecutor, ExecuteRequest, ExecutionMode, FailurePolicy, Language};
pub use error::{RuntimeError, SandboxError};
pub use host::{RunMetadata, StaticHost, WorkflowHost, WorkflowInfo, WorkflowMode};
pub use modules::ModuleRequest;
pub use record::{BinaryPayload, ItemPointer, Record};
pub use runtime::python::{PythonInterpreter, python_available};
pub use runtime::{JavaScriptRuntime, MessageSink, PythonRuntime, RuntimeAdapter};
