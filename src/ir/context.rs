//! `Context`: the top-level container of functions and the data segment
//! (spec §3).

use crate::ir::function::Function;
use indexmap::IndexMap;

/// A `(label, bytes)` entry in the data segment. Labels are globally unique
/// within a [`Context`] (spec §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataEntry {
    /// The data segment's label.
    pub label: String,
    /// The raw bytes stored at that label.
    pub bytes: Vec<u8>,
}

/// The compilation unit: every function plus the data segment.
///
/// Functions are kept in an [`IndexMap`] rather than a `HashMap` so that
/// iteration order (and therefore assembly/bytecode layout for anything that
/// depends on function order) is deterministic and matches declaration order
/// — load-bearing for reproducible builds, not just convenience.
#[derive(Clone, Debug, Default)]
pub struct Context {
    functions: IndexMap<String, Function>,
    /// Data-segment entries, in declaration order.
    pub data_segment: Vec<DataEntry>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Context::default()
    }

    /// Insert a function, keyed by its own name. Returns the previous
    /// function with that name, if any (callers should treat that as a bug —
    /// the upstream HIR lowering guarantees unique names).
    pub fn insert_function(&mut self, func: Function) -> Option<Function> {
        self.functions.insert(func.name.clone(), func)
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Mutably look up a function by name.
    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    /// Iterate all functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    /// Iterate all functions mutably, in declaration order.
    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.values_mut()
    }

    /// Iterate `(name, function)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Function)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Append a data-segment entry. Panics if `label` is already used
    /// (spec §3: "labels are globally unique within the context").
    pub fn push_data(&mut self, label: impl Into<String>, bytes: Vec<u8>) {
        let label = label.into();
        assert!(
            !self.data_segment.iter().any(|e| e.label == label),
            "duplicate data-segment label `{label}`"
        );
        self.data_segment.push(DataEntry { label, bytes });
    }

    /// Number of functions in this context.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// `true` iff this context has no functions.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
