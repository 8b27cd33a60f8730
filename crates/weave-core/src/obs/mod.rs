//! Observability: runtime event counters and the sink boundary executors
//! report through.

pub mod metrics;
pub mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState, ModelCounters};
pub use sink::{ExecKind, MetricsEvent, MetricsSink, WriteKind, metrics_report, metrics_reset_all};
