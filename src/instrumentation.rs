//! Instrumentation (spec §2 C11, §9): a `Tracer` plus the three counters and
//! one up/down gauge the rest of the pipeline is instrumented with. Passed
//! explicitly to handlers — never smuggled through globals.

use std::sync::Arc;

use tracing::Span;

/// Thin tracing handle. Spans are named `toolbox/server/<component>/<op>`
/// per §4.7; this type just centralizes that naming convention so call
/// sites don't repeat the prefix.
#[derive(Clone, Default)]
pub struct Tracer;

impl Tracer {
    /// Start a span named `toolbox/server/<component>/<op>`.
    pub fn span(&self, component: &str, op: &str) -> Span {
        tracing::info_span!("toolbox/server", component = %component, op = %op)
    }
}

/// The three counters and one gauge from §2 C11, plus the `Tracer`.
/// Cloning is cheap — internally an `Arc`.
#[derive(Clone, Default)]
pub struct Instrumentation {
    inner: Arc<Tracer>,
}

impl Instrumentation {
    /// A fresh instrumentation record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracer half of this record.
    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.inner
    }

    /// Increment `toolset.get` tagged by toolset name and outcome.
    pub fn toolset_get(&self, toolset: &str, status: &str) {
        telemetry_metrics::counter!(
            "toolbox_toolset_get_total",
            "toolset" => toolset.to_string(),
            "status" => status.to_string(),
        )
        .increment(1);
    }

    /// Increment `tool.get` tagged by tool name and outcome.
    pub fn tool_get(&self, tool: &str, status: &str) {
        telemetry_metrics::counter!(
            "toolbox_tool_get_total",
            "tool" => tool.to_string(),
            "status" => status.to_string(),
        )
        .increment(1);
    }

    /// Increment `tool.invoke` tagged by tool name and outcome.
    pub fn tool_invoke(&self, tool: &str, status: &str) {
        telemetry_metrics::counter!(
            "toolbox_tool_invoke_total",
            "tool" => tool.to_string(),
            "status" => status.to_string(),
        )
        .increment(1);
    }

    /// Mark the start of an in-flight operation; pair with
    /// `end_active_operation` regardless of outcome.
    pub fn begin_active_operation(&self) {
        telemetry_metrics::gauge!("toolbox_active_operations").increment(1.0);
    }

    /// Mark the end of an in-flight operation.
    pub fn end_active_operation(&self) {
        telemetry_metrics::gauge!("toolbox_active_operations").decrement(1.0);
    }
}
