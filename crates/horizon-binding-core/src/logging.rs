//! Logging facilities for Horizon Binding.
//!
//! Horizon Binding uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_binding::manager=debug")
//!     .init();
//! ```
//!
//! Every subsystem logs under one of the [`targets`] so that position moves,
//! edit transactions and relation propagation can be filtered independently.

/// Span names used throughout Horizon Binding for tracing.
pub mod span_names {
    /// Relation path resolution span.
    pub const RESOLVE: &str = "horizon_binding::resolve";
    /// Parent-to-child propagation span.
    pub const PROPAGATE: &str = "horizon_binding::propagate";
}

/// Target names for log filtering.
pub mod targets {
    /// Signal dispatch target.
    pub const SIGNAL: &str = "horizon_binding::signal";
    /// Position cursor target.
    pub const CURSOR: &str = "horizon_binding::cursor";
    /// Currency manager target.
    pub const MANAGER: &str = "horizon_binding::manager";
    /// Manager registry target.
    pub const REGISTRY: &str = "horizon_binding::registry";
    /// Relation graph target.
    pub const GRAPH: &str = "horizon_binding::graph";
    /// Bindable list implementations target.
    pub const LIST: &str = "horizon_binding::list";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for measuring how long a propagation cascade or a registry
/// resolution takes.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "horizon_binding::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span() {
        let _span = PerfSpan::new(span_names::PROPAGATE);
    }

    #[test]
    fn test_targets_share_prefix() {
        for target in [
            targets::SIGNAL,
            targets::CURSOR,
            targets::MANAGER,
            targets::REGISTRY,
            targets::GRAPH,
            targets::LIST,
        ] {
            assert!(target.starts_with("horizon_binding::"));
        }
    }
}
