//! Per-runtime symbol conventions.
//!
//! Context symbols are built under host-style names (`$input`, `$json`).
//! Python cannot declare identifiers starting with `$`, so its adapter sees
//! the same accessors with the prefix swapped for `_`. The mapping is a fixed
//! table, not reflection.

/// Prefix every host-style symbol starts with.
pub const HOST_PREFIX: &str = "$";

/// How a runtime names context symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolConvention {
    /// Replacement for [`HOST_PREFIX`].
    pub prefix: &'static str,
    /// Renamed symbols that are never exported to the runtime.
    pub reserved: &'static [&'static str],
}

/// JavaScript keeps the host names unchanged.
pub const JAVASCRIPT: SymbolConvention = SymbolConvention {
    prefix: HOST_PREFIX,
    reserved: &[],
};

/// Python swaps `$` for `_` and withholds the environment accessor.
pub const PYTHON: SymbolConvention = SymbolConvention {
    prefix: "_",
    reserved: &["_env"],
};

impl SymbolConvention {
    /// Name of `symbol` under this convention.
    pub fn rename(&self, symbol: &str) -> String {
        match symbol.strip_prefix(HOST_PREFIX) {
            Some(rest) => format!("{}{rest}", self.prefix),
            None => symbol.to_owned(),
        }
    }

    /// Whether a renamed symbol must be left out of the exported mapping.
    pub fn is_reserved(&self, renamed: &str) -> bool {
        self.reserved.contains(&renamed)
    }
}
