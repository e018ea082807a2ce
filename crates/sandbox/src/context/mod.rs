//! Context builder.
//!
//! Projects the host's per-item and per-run data into a flat
//! symbol → value mapping that a runtime adapter can expose to a snippet.
//! A context is built once per invocation and never mutated after it is
//! handed to a runtime; [`ExecutionContext::for_runtime`] consumes it and
//! returns the renamed copy a specific runtime needs.

mod datetime;
pub mod symbols;

use std::fmt;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};

pub use symbols::SymbolConvention;

use crate::host::WorkflowHost;
use crate::record::Record;

type HostFn = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

/// A host-side function callable from snippets.
#[derive(Clone)]
pub struct HostFunction {
    name: Arc<str>,
    call: Arc<HostFn>,
}

impl HostFunction {
    /// Wrap a closure as a host function.
    pub fn new<F>(name: &str, call: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            call: Arc::new(call),
        }
    }

    /// Name used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function.
    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.call)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostFunction").field(&self.name).finish()
    }
}

/// One entry of an [`ExecutionContext`].
#[derive(Debug, Clone)]
pub enum ContextValue {
    /// Plain data, copied into the runtime.
    Data(Value),
    /// A function that calls back into the host.
    Function(HostFunction),
    /// A named group of entries (`$input.all`, `DateTime.now`).
    Namespace(IndexMap<String, ContextValue>),
}

/// Per-invocation symbol → value mapping.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    symbols: IndexMap<String, ContextValue>,
    items: Arc<[Record]>,
    item_index: usize,
}

impl ExecutionContext {
    /// Look up a symbol.
    pub fn get(&self, symbol: &str) -> Option<&ContextValue> {
        self.symbols.get(symbol)
    }

    /// Whether `symbol` is exported.
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Exported symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.symbols.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of exported symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the context exports nothing.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Snapshot of all input items.
    pub fn items(&self) -> &[Record] {
        &self.items
    }

    /// Index of the item this context was built for.
    pub fn item_index(&self) -> usize {
        self.item_index
    }

    /// Rename symbols for a runtime and drop the ones it reserves.
    pub fn for_runtime(self, convention: &SymbolConvention) -> Self {
        let symbols = self
            .symbols
            .into_iter()
            .filter_map(|(name, value)| {
                let renamed = convention.rename(&name);
                (!convention.is_reserved(&renamed)).then_some((renamed, value))
            })
            .collect();
        Self {
            symbols,
            items: self.items,
            item_index: self.item_index,
        }
    }

    /// Every host function reachable from the context, keyed by dotted path
    /// (`$input.all`, `DateTime.now`).
    pub fn functions(&self) -> IndexMap<String, HostFunction> {
        fn collect(
            prefix: &str,
            entries: &IndexMap<String, ContextValue>,
            out: &mut IndexMap<String, HostFunction>,
        ) {
            for (name, value) in entries {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                match value {
                    ContextValue::Function(function) => {
                        out.insert(path, function.clone());
                    }
                    ContextValue::Namespace(members) => collect(&path, members, out),
                    ContextValue::Data(_) => {}
                }
            }
        }

        let mut out = IndexMap::new();
        collect("", &self.symbols, &mut out);
        out
    }

    /// The context as plain JSON a runtime can rebuild its globals from.
    ///
    /// Each symbol maps to `{"type": "value", "value": …}`,
    /// `{"type": "function", "path": …}` or
    /// `{"type": "namespace", "members": {…}}`. Function paths are the keys
    /// of [`functions`](Self::functions).
    pub fn bindings(&self) -> Map<String, Value> {
        self.symbols
            .iter()
            .map(|(name, value)| (name.clone(), value.binding(name)))
            .collect()
    }
}

impl ContextValue {
    fn binding(&self, path: &str) -> Value {
        match self {
            Self::Data(value) => json!({"type": "value", "value": value}),
            Self::Function(_) => json!({"type": "function", "path": path}),
            Self::Namespace(members) => {
                let members: Map<String, Value> = members
                    .iter()
                    .map(|(name, value)| (name.clone(), value.binding(&format!("{path}.{name}"))))
                    .collect();
                json!({"type": "namespace", "members": members})
            }
        }
    }
}

/// Builds [`ExecutionContext`]s from host state.
pub struct ContextBuilder {
    host: Arc<dyn WorkflowHost>,
    items: Arc<[Record]>,
}

impl ContextBuilder {
    /// Create a builder over the host and the node's input items.
    pub fn new(host: Arc<dyn WorkflowHost>, items: Arc<[Record]>) -> Self {
        Self { host, items }
    }

    /// Build the context for item `item_index`.
    ///
    /// Deterministic for a given host state: calling it twice yields
    /// contexts with the same symbols and data.
    pub fn build(&self, item_index: usize) -> ExecutionContext {
        let metadata = self.host.run_metadata();
        let now = self.host.now();
        let today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |midnight| Utc.from_utc_datetime(&midnight));
        let current = self.items.get(item_index);

        let mut symbols = IndexMap::new();
        symbols.insert("$input".to_owned(), self.input_namespace(item_index));
        symbols.insert(
            "$json".to_owned(),
            ContextValue::Data(current.map_or_else(
                || Value::Object(Map::new()),
                |record| Value::Object(record.json.clone()),
            )),
        );
        symbols.insert(
            "$binary".to_owned(),
            ContextValue::Data(
                current
                    .and_then(|record| record.binary.as_ref())
                    .and_then(|binary| serde_json::to_value(binary).ok())
                    .unwrap_or_else(|| Value::Object(Map::new())),
            ),
        );
        symbols.insert(
            "$itemIndex".to_owned(),
            ContextValue::Data(Value::from(item_index)),
        );
        symbols.insert(
            "$runIndex".to_owned(),
            ContextValue::Data(Value::from(metadata.run_index)),
        );
        symbols.insert(
            "$mode".to_owned(),
            ContextValue::Data(Value::from(metadata.mode.as_str())),
        );
        symbols.insert(
            "$now".to_owned(),
            ContextValue::Data(Value::String(datetime::iso(now))),
        );
        symbols.insert(
            "$today".to_owned(),
            ContextValue::Data(Value::String(datetime::iso(today))),
        );
        symbols.insert(
            "$env".to_owned(),
            ContextValue::Data(json!(self.host.environment())),
        );
        symbols.insert(
            "$workflow".to_owned(),
            ContextValue::Data(json!({
                "id": metadata.workflow.id,
                "name": metadata.workflow.name,
                "active": metadata.workflow.active,
            })),
        );
        symbols.insert(
            "$execution".to_owned(),
            ContextValue::Data(json!({
                "id": metadata.execution_id,
                "mode": if metadata.mode.is_interactive() { "test" } else { "production" },
            })),
        );
        symbols.insert(
            "$parameter".to_owned(),
            ContextValue::Data(Value::Object(self.host.node_parameters(item_index))),
        );
        symbols.insert(
            "$evaluateExpression".to_owned(),
            self.evaluate_expression(item_index),
        );
        symbols.insert(
            "$getNodeParameter".to_owned(),
            self.get_node_parameter(item_index),
        );
        symbols.insert(
            "$getWorkflowStaticData".to_owned(),
            self.get_workflow_static_data(),
        );
        symbols.insert(
            "DateTime".to_owned(),
            datetime::date_time_namespace(&self.host),
        );
        symbols.insert("Duration".to_owned(), datetime::duration_namespace());

        ExecutionContext {
            symbols,
            items: Arc::clone(&self.items),
            item_index,
        }
    }

    fn input_namespace(&self, item_index: usize) -> ContextValue {
        let mut members = IndexMap::new();

        let items = Arc::clone(&self.items);
        members.insert(
            "all".to_owned(),
            ContextValue::Function(HostFunction::new("$input.all", move |_| {
                Ok(Value::Array(items.iter().map(Record::to_value).collect()))
            })),
        );
        let items = Arc::clone(&self.items);
        members.insert(
            "first".to_owned(),
            ContextValue::Function(HostFunction::new("$input.first", move |_| {
                Ok(items.first().map_or(Value::Null, Record::to_value))
            })),
        );
        let items = Arc::clone(&self.items);
        members.insert(
            "last".to_owned(),
            ContextValue::Function(HostFunction::new("$input.last", move |_| {
                Ok(items.last().map_or(Value::Null, Record::to_value))
            })),
        );
        members.insert(
            "item".to_owned(),
            ContextValue::Data(
                self.items
                    .get(item_index)
                    .map_or(Value::Null, Record::to_value),
            ),
        );
        ContextValue::Namespace(members)
    }

    fn evaluate_expression(&self, item_index: usize) -> ContextValue {
        let host = Arc::clone(&self.host);
        ContextValue::Function(HostFunction::new("$evaluateExpression", move |args| {
            let expression = arg_str(args, 0, "$evaluateExpression")?;
            let index = arg_index(args, 1, item_index)?;
            host.evaluate_expression(expression, index)
        }))
    }

    fn get_node_parameter(&self, item_index: usize) -> ContextValue {
        let host = Arc::clone(&self.host);
        ContextValue::Function(HostFunction::new("$getNodeParameter", move |args| {
            let name = arg_str(args, 0, "$getNodeParameter")?;
            let index = arg_index(args, 1, item_index)?;
            match (host.node_parameter(name, index), args.get(2)) {
                (Some(value), _) => Ok(value),
                (None, Some(fallback)) => Ok(fallback.clone()),
                (None, None) => Err(format!("could not get parameter `{name}`")),
            }
        }))
    }

    fn get_workflow_static_data(&self) -> ContextValue {
        let host = Arc::clone(&self.host);
        ContextValue::Function(HostFunction::new("$getWorkflowStaticData", move |args| {
            host.workflow_static_data(arg_str(args, 0, "$getWorkflowStaticData")?)
        }))
    }
}

pub(crate) fn arg_str<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{function}: argument {} must be a string", index + 1))
}

pub(crate) fn arg_i64(args: &[Value], index: usize, function: &str) -> Result<i64, String> {
    args.get(index)
        .and_then(|value| {
            value
                .as_i64()
                .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        })
        .ok_or_else(|| format!("{function}: argument {} must be an integer", index + 1))
}

/// Optional item-index argument, defaulting to the context's own item.
fn arg_index(args: &[Value], index: usize, default: usize) -> Result<usize, String> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(|n| n as usize)
            .ok_or_else(|| format!("item index must be a non-negative integer, got {value}")),
    }
}
