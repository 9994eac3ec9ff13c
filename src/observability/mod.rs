//! Observability: structured logging and spans via `tracing`.
//!
//! vswitch emits spans for:
//! - Graph lifecycle operations (`start`, `drain`, `stop`, `wire`)
//! - Every stage worker run by the built-in engine
//!
//! Log output goes through `tracing-subscriber`'s fmt layer. The default
//! filter is `vswitch=info`; set `RUST_LOG` to override it.
//!
//! ## Example
//!
//! ```rust
//! use vswitch::observability::{TracingConfig, init_tracing};
//!
//! // Call once at startup
//! init_tracing(&TracingConfig::default());
//! ```

mod tracing_support;

pub use tracing_support::{
    DEFAULT_FILTER, TracingConfig, init_tracing, span_graph, span_stage, trace_eos,
    trace_state_change,
};
