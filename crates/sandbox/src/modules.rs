//! Dependency requests for the Python runtime.

use indexmap::IndexSet;

/// Modules that ship with the interpreter and are never sent to the
/// installer.
pub const DEFAULT_BUILTIN_MODULES: &[&str] = &[
    "asyncio",
    "base64",
    "collections",
    "csv",
    "datetime",
    "functools",
    "hashlib",
    "itertools",
    "json",
    "math",
    "random",
    "re",
    "statistics",
    "string",
    "time",
    "typing",
    "urllib",
    "uuid",
];

/// Distinct module names requested for installation, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRequest {
    names: IndexSet<String>,
}

impl ModuleRequest {
    /// Parse the comma-separated `modules` parameter of a node.
    ///
    /// Whitespace around names is trimmed, empty entries are dropped and
    /// duplicates collapse onto their first occurrence.
    pub fn parse(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Whether nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Requested names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Names left after removing the given built-ins.
    pub fn without_builtins<S: AsRef<str>>(&self, builtins: &[S]) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| !builtins.iter().any(|builtin| builtin.as_ref() == name.as_str()))
            .cloned()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ModuleRequest {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_trimmed_distinct_names() {
        let request = ModuleRequest::parse(" pandas, numpy ,,pandas, requests ");
        assert_eq!(
            request.iter().collect::<Vec<_>>(),
            vec!["pandas", "numpy", "requests"]
        );
        assert_eq!(request.len(), 3);
    }

    #[test]
    fn empty_list_requests_nothing() {
        assert!(ModuleRequest::parse("").is_empty());
        assert!(ModuleRequest::parse(" , ,").is_empty());
    }

    #[test]
    fn builtins_are_filtered() {
        let request = ModuleRequest::parse("asyncio, math, pandas");
        assert_eq!(request.without_builtins(DEFAULT_BUILTIN_MODULES), vec!["pandas"]);
        assert!(
            ModuleRequest::parse("json,re")
                .without_builtins(DEFAULT_BUILTIN_MODULES)
                .is_empty()
        );
    }
}
