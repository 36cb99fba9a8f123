//! Graph configuration

use std::env;

pub use vkgraph_backends::ContextConfig;

/// Environment variable overriding [`GraphConfig::descriptor_pool_safety_factor`]
pub const ENV_DESCRIPTOR_POOL_SAFETY_FACTOR: &str = "VKGRAPH_DESCRIPTOR_POOL_SAFETY_FACTOR";

pub const DEFAULT_DESCRIPTOR_POOL_SAFETY_FACTOR: f32 = 1.25;

/// Settings for one compute graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphConfig {
    /// Settings for the context created when the graph does not share one
    pub context: ContextConfig,
    /// Multiplier applied to the tallied descriptor demand when sizing the pool
    pub descriptor_pool_safety_factor: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            context: ContextConfig::default(),
            descriptor_pool_safety_factor: DEFAULT_DESCRIPTOR_POOL_SAFETY_FACTOR,
        }
    }
}

impl GraphConfig {
    /// Defaults overridden by `VKGRAPH_DESCRIPTOR_POOL_SAFETY_FACTOR`.
    ///
    /// Values that do not parse, or are below 1.0, are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var(ENV_DESCRIPTOR_POOL_SAFETY_FACTOR) {
            match raw.trim().parse::<f32>() {
                Ok(factor) if factor.is_finite() && factor >= 1.0 => config.descriptor_pool_safety_factor = factor,
                _ => tracing::warn!(value = %raw, "ignoring invalid descriptor pool safety factor"),
            }
        }
        config
    }

    pub fn with_safety_factor(mut self, factor: f32) -> Self {
        self.descriptor_pool_safety_factor = factor;
        self
    }

    pub fn with_memory_limit(mut self, limit: Option<usize>) -> Self {
        self.context.device_memory_limit = limit;
        self
    }
}
