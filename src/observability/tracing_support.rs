//! Tracing integration for structured logging and spans.

use std::sync::OnceLock;
use tracing::{Level, Span, span};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "vswitch=info";

/// Configuration for the log subscriber.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Whether to print the event target (module path).
    pub with_target: bool,
    /// Whether to colour the output.
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            with_target: false,
            ansi: true,
        }
    }
}

impl TracingConfig {
    /// Verbose configuration: everything in this crate at debug level.
    pub fn verbose() -> Self {
        Self {
            filter: "vswitch=debug".to_string(),
            with_target: true,
            ..Self::default()
        }
    }

    /// Set the fallback filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over [`TracingConfig::filter`]. Only the first
/// call has an effect.
pub fn init_tracing(config: &TracingConfig) {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.with_target)
            .with_ansi(config.ansi)
            .try_init()
            .ok();
    });
}

/// Create a span for a graph lifecycle operation.
///
/// # Example
///
/// ```rust
/// use vswitch::observability::span_graph;
///
/// let span = span_graph("stop");
/// let _guard = span.enter();
/// // Teardown here...
/// ```
#[inline]
pub fn span_graph(operation: &str) -> Span {
    span!(Level::INFO, "graph", op = %operation)
}

/// Create a span for a stage worker.
#[inline]
pub fn span_stage(stage: &str, factory: &str) -> Span {
    span!(
        Level::DEBUG,
        "stage",
        stage = %stage,
        factory = %factory
    )
}

/// Log end-of-stream.
#[inline]
pub fn trace_eos(stage: &str) {
    tracing::debug!(stage = %stage, "end of stream");
}

/// Log a graph state change.
#[inline]
pub fn trace_state_change(from: &str, to: &str) {
    tracing::info!(from = %from, to = %to, "pipeline state changed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert_eq!(config.filter, "vswitch=info");
        assert!(!config.with_target);
    }

    #[test]
    fn test_tracing_config_verbose() {
        let config = TracingConfig::verbose().with_filter("vswitch=trace");
        assert_eq!(config.filter, "vswitch=trace");
        assert!(config.with_target);
    }

    #[test]
    fn test_span_creation() {
        // These should not panic
        let _span = span_graph("start");
        let _span = span_stage("src0", "rtspsrc");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(&TracingConfig::default());
        init_tracing(&TracingConfig::verbose());
        trace_eos("video_sink");
        trace_state_change("playing", "stopped");
    }
}
