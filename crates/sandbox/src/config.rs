//! Sandbox configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::modules::DEFAULT_BUILTIN_MODULES;

/// Top-level sandbox configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Python runtime settings.
    pub python: PythonConfig,
    /// Result validation policies.
    pub validation: ValidationOptions,
}

/// Settings for the shared Python interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Interpreter executable, resolved through `PATH` when relative.
    pub executable: PathBuf,
    /// Module names that ship with the interpreter.
    pub builtin_modules: Vec<String>,
    /// Extra arguments passed to `pip install`.
    pub install_args: Vec<String>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("python3"),
            builtin_modules: DEFAULT_BUILTIN_MODULES
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            install_args: vec!["--quiet".to_owned()],
        }
    }
}

/// What to do with a result value that is not an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonObjectPolicy {
    /// Place the value under [`WRAP_KEY`].
    Wrap,
    /// Fail validation.
    Reject,
}

/// Key non-object values are wrapped under.
pub const WRAP_KEY: &str = "value";

/// Validation policies per execution cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Elements of a run-once result that are not objects.
    pub run_once_non_object: NonObjectPolicy,
    /// A per-item result that is not an object.
    pub per_item_non_object: NonObjectPolicy,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            run_once_non_object: NonObjectPolicy::Reject,
            per_item_non_object: NonObjectPolicy::Wrap,
        }
    }
}

impl SandboxConfig {
    /// Reject non-object results in both cardinalities.
    pub fn strict() -> Self {
        Self {
            validation: ValidationOptions {
                run_once_non_object: NonObjectPolicy::Reject,
                per_item_non_object: NonObjectPolicy::Reject,
            },
            ..Self::default()
        }
    }

    /// Defaults overlaid with `CODENODE_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Recognised keys: `CODENODE_PYTHON`, `CODENODE_PYTHON_BUILTINS`
    /// (comma list) and `CODENODE_NON_OBJECT` (`wrap` or `reject`, applied to
    /// both cardinalities). Unparseable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(executable) = lookup("CODENODE_PYTHON").filter(|v| !v.trim().is_empty()) {
            self.python.executable = PathBuf::from(executable.trim());
        }
        if let Some(builtins) = lookup("CODENODE_PYTHON_BUILTINS") {
            self.python.builtin_modules = builtins
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(policy) = lookup("CODENODE_NON_OBJECT") {
            let policy = match policy.trim().to_lowercase().as_str() {
                "wrap" => Some(NonObjectPolicy::Wrap),
                "reject" => Some(NonObjectPolicy::Reject),
                other => {
                    tracing::warn!(value = other, "ignoring unknown CODENODE_NON_OBJECT");
                    None
                }
            };
            if let Some(policy) = policy {
                self.validation.run_once_non_object = policy;
                self.validation.per_item_non_object = policy;
            }
        }
        self
    }
}
