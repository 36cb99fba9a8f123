//! Convenience macros for performance instrumentation.

/// Create a [`crate::performance::PerformanceSpan`] with optional fields.
///
/// ```rust
/// use vkgraph_tracing::perf_span;
///
/// {
///     let _span = perf_span!("graph.prepare", values = 12, nodes = 4);
///     // ... work ...
/// } // duration logged on drop
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::new($name, None)
    }};
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        let _span = tracing::debug_span!(
            "perf",
            name = $name,
            $($field = $value),+
        ).entered();
        $crate::performance::PerformanceSpan::new($name, None)
    }};
}

/// Emit a debug-level performance event with the given metrics.
///
/// ```rust
/// use vkgraph_tracing::perf_event;
///
/// perf_event!("descriptor_pool_sized", max_sets = 8, storage_buffers = 20);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {
        tracing::debug!(
            event = $name,
            $($field = $value),+
        );
    };
}
