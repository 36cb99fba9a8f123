//! Timing spans and standard performance events.
//!
//! ```rust
//! use vkgraph_tracing::performance::{record_dispatch, PerformanceSpan};
//!
//! let span = PerformanceSpan::new("graph.execute", Some(100));
//! record_dispatch("binary_add", 1024, 3);
//! drop(span); // logs only when performance tracing is on and the span took >= 100us
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tracing::Level;

static ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));
// u64::MAX encodes "no threshold".
static THRESHOLD_US: AtomicU64 = AtomicU64::new(u64::MAX);

/// Apply process-wide performance span settings.
pub fn configure(enabled: bool, threshold_us: Option<u64>) {
    ENABLED.store(enabled, Ordering::Relaxed);
    THRESHOLD_US.store(threshold_us.unwrap_or(u64::MAX), Ordering::Relaxed);
}

/// Whether performance spans currently log on drop.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// The process-wide threshold, if one was configured.
pub fn global_threshold_us() -> Option<u64> {
    match THRESHOLD_US.load(Ordering::Relaxed) {
        u64::MAX => None,
        threshold => Some(threshold),
    }
}

/// RAII guard that measures how long it lived and logs the duration on drop.
///
/// Logging is skipped when performance tracing is disabled or the duration is
/// below the span's threshold (falling back to the global threshold).
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    start_time: Instant,
    enabled: bool,
    span: tracing::Span,
}

impl PerformanceSpan {
    pub fn new(name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, name, threshold_us)
    }

    /// Create a span at a specific tracing level.
    pub fn with_level(level: Level, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %name),
            Level::DEBUG => tracing::debug_span!("perf", name = %name),
            Level::INFO => tracing::info_span!("perf", name = %name),
            Level::WARN => tracing::warn_span!("perf", name = %name),
            Level::ERROR => tracing::error_span!("perf", name = %name),
        };

        Self {
            name,
            threshold_us: threshold_us.or_else(global_threshold_us),
            start_time: Instant::now(),
            enabled: is_enabled(),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold_us(&self) -> Option<u64> {
        self.threshold_us
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.is_none_or(|t| elapsed_us >= t) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Record one recorded shader dispatch being executed.
pub fn record_dispatch(shader: &str, invocations: u64, bindings: usize) {
    tracing::debug!(
        event = "dispatch",
        shader = shader,
        invocations = invocations,
        bindings = bindings,
        "shader_dispatch"
    );
}

/// Record a host/device copy with bandwidth derived from its duration.
///
/// `direction` is `"H2D"` or `"D2H"`.
pub fn record_transfer(bytes: usize, direction: &str, duration_us: u64) {
    let bandwidth_mbps = if duration_us > 0 {
        (bytes as f64 / duration_us as f64) * 1_000_000.0 / (1024.0 * 1024.0)
    } else {
        0.0
    };

    tracing::debug!(
        event = "transfer",
        bytes = bytes,
        direction = direction,
        duration_us = duration_us,
        bandwidth_mbps = bandwidth_mbps,
        "data_transfer"
    );
}

/// Record a device allocation.
pub fn record_allocation(size_bytes: usize, live_buffers: usize, allocated_bytes: usize) {
    tracing::debug!(
        event = "allocation",
        size_bytes = size_bytes,
        live_buffers = live_buffers,
        allocated_bytes = allocated_bytes,
        "device_allocation"
    );
}
