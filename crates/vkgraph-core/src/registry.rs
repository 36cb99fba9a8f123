//! Operator registry
//!
//! Maps operator names from the IR chain to functions that grow a
//! [`ComputeGraph`]. The builder resolves every name through an explicit
//! registry, so tests can build graphs against a registry of their own.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::error::Result;
use crate::graph::ComputeGraph;
use crate::ops;
use crate::value::ValueRef;

/// Graph mutation performed for one operator call
pub type OpFunction = fn(&mut ComputeGraph, &[ValueRef]) -> Result<()>;

#[derive(Clone, Default)]
pub struct OperatorRegistry {
    table: HashMap<String, OpFunction>,
}

impl OperatorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every operator this crate implements
    pub fn with_default_ops() -> Self {
        let mut registry = Self::new();
        ops::register_default_ops(&mut registry);
        registry
    }

    /// Add `function` under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, function: OpFunction) {
        self.table.insert(name.into(), function);
    }

    pub fn has(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<OpFunction> {
        self.table.get(name).copied()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorRegistry").field("operators", &self.names()).finish()
    }
}

/// Process-wide registry with the default operators, built on first use
pub fn default_registry() -> Arc<OperatorRegistry> {
    static REGISTRY: OnceLock<Arc<OperatorRegistry>> = OnceLock::new();
    Arc::clone(REGISTRY.get_or_init(|| Arc::new(OperatorRegistry::with_default_ops())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_graph: &mut ComputeGraph, _args: &[ValueRef]) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_default_ops_registered() {
        let registry = OperatorRegistry::with_default_ops();
        for name in [
            "aten.add.Tensor",
            "aten.sub.Tensor",
            "aten.mul.Tensor",
            "aten.div.Tensor",
            "aten.floor_divide.default",
            "aten.pow.Tensor_Tensor",
            "add_scalar",
            "aten.abs.default",
            "aten.relu.default",
            "aten.clone.default",
        ] {
            assert!(registry.has(name), "{name}");
        }
        assert!(!registry.has("aten.convolution.default"));
        assert!(registry.get("aten.convolution.default").is_none());
    }

    #[test]
    fn test_scoped_registry() {
        let mut registry = OperatorRegistry::new();
        assert!(registry.is_empty());
        registry.register("custom.noop", noop);
        assert!(registry.has("custom.noop"));
        assert_eq!(registry.names(), vec!["custom.noop"]);
        assert!(!default_registry().has("custom.noop"));
    }

    #[test]
    fn test_default_registry_shared() {
        assert!(Arc::ptr_eq(&default_registry(), &default_registry()));
    }
}
