//! Metrics sink boundary.
//!
//! Engine logic does not touch obs::metrics directly; all instrumentation
//! flows through MetricsEvent and MetricsSink.
use crate::obs::metrics::{self, EventState, ModelCounters};
use std::cell::RefCell;

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<*const dyn MetricsSink>> = RefCell::new(None);
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Find,
    Save,
    Delete,
}

///
/// WriteKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    ExecStart {
        kind: ExecKind,
        model: &'a str,
    },
    ExecFinish {
        kind: ExecKind,
        model: &'a str,
        rows_touched: u64,
    },
    RowsFetched {
        model: &'a str,
        rows: u64,
    },
    JoinRowsFetched {
        join: &'a str,
        rows: u64,
    },
    RowWrite {
        model: &'a str,
        kind: WriteKind,
    },
    JoinDelta {
        model: &'a str,
        inserts: u64,
        removes: u64,
    },
    NodeFailed {
        model: &'a str,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default thread-local sink that writes into the metrics state.
/// Used whenever no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

fn model_entry<'s>(state: &'s mut EventState, model: &str) -> &'s mut ModelCounters {
    state.models.entry(model.to_string()).or_default()
}

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::ExecStart { kind, model } => {
                metrics::with_state_mut(|m| {
                    match kind {
                        ExecKind::Find => m.ops.find_calls = m.ops.find_calls.saturating_add(1),
                        ExecKind::Save => m.ops.save_calls = m.ops.save_calls.saturating_add(1),
                        ExecKind::Delete => {
                            m.ops.delete_calls = m.ops.delete_calls.saturating_add(1);
                        }
                    }

                    let entry = model_entry(m, model);
                    match kind {
                        ExecKind::Find => entry.find_calls = entry.find_calls.saturating_add(1),
                        ExecKind::Save => entry.save_calls = entry.save_calls.saturating_add(1),
                        ExecKind::Delete => {
                            entry.delete_calls = entry.delete_calls.saturating_add(1);
                        }
                    }
                });
            }

            MetricsEvent::ExecFinish {
                kind,
                model,
                rows_touched,
            } => {
                metrics::with_state_mut(|m| {
                    match kind {
                        ExecKind::Find => {
                            m.ops.rows_loaded = m.ops.rows_loaded.saturating_add(rows_touched);
                        }
                        ExecKind::Delete => {
                            m.ops.rows_deleted = m.ops.rows_deleted.saturating_add(rows_touched);
                        }
                        ExecKind::Save => {}
                    }

                    let entry = model_entry(m, model);
                    match kind {
                        ExecKind::Find => {
                            entry.rows_loaded = entry.rows_loaded.saturating_add(rows_touched);
                        }
                        ExecKind::Delete => {
                            entry.rows_deleted = entry.rows_deleted.saturating_add(rows_touched);
                        }
                        ExecKind::Save => {}
                    }
                });
            }

            MetricsEvent::RowsFetched { model, rows } => {
                metrics::with_state_mut(|m| {
                    m.ops.fetches = m.ops.fetches.saturating_add(1);
                    m.ops.rows_fetched = m.ops.rows_fetched.saturating_add(rows);
                    let entry = model_entry(m, model);
                    entry.fetches = entry.fetches.saturating_add(1);
                    entry.rows_fetched = entry.rows_fetched.saturating_add(rows);
                });
            }

            MetricsEvent::JoinRowsFetched { join: _, rows } => {
                metrics::with_state_mut(|m| {
                    m.ops.join_fetches = m.ops.join_fetches.saturating_add(1);
                    m.ops.join_rows_fetched = m.ops.join_rows_fetched.saturating_add(rows);
                });
            }

            MetricsEvent::RowWrite { model, kind } => {
                metrics::with_state_mut(|m| {
                    match kind {
                        WriteKind::Insert => m.ops.inserts = m.ops.inserts.saturating_add(1),
                        WriteKind::Update => m.ops.updates = m.ops.updates.saturating_add(1),
                        WriteKind::Delete => m.ops.deletes = m.ops.deletes.saturating_add(1),
                    }
                    let entry = model_entry(m, model);
                    match kind {
                        WriteKind::Insert => entry.inserts = entry.inserts.saturating_add(1),
                        WriteKind::Update => entry.updates = entry.updates.saturating_add(1),
                        WriteKind::Delete => entry.deletes = entry.deletes.saturating_add(1),
                    }
                });
            }

            MetricsEvent::JoinDelta {
                model,
                inserts,
                removes,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.join_inserts = m.ops.join_inserts.saturating_add(inserts);
                    m.ops.join_removes = m.ops.join_removes.saturating_add(removes);
                    let entry = model_entry(m, model);
                    entry.join_inserts = entry.join_inserts.saturating_add(inserts);
                    entry.join_removes = entry.join_removes.saturating_add(removes);
                });
            }

            MetricsEvent::NodeFailed { model } => {
                metrics::with_state_mut(|m| {
                    m.ops.failed_nodes = m.ops.failed_nodes.saturating_add(1);
                    let entry = model_entry(m, model);
                    entry.failed_nodes = entry.failed_nodes.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let override_ptr = SINK_OVERRIDE.with(|cell| *cell.borrow());
    if let Some(ptr) = override_ptr {
        // SAFETY:
        // - `ptr` was produced from a live `&dyn MetricsSink` in `with_metrics_sink`,
        //   which restores the previous slot on every exit, including unwind.
        // - `record` dereferences synchronously and never stores `ptr`.
        // - Only a shared reference is materialized.
        unsafe { (&*ptr).record(event) };
    } else {
        GLOBAL_METRICS_SINK.record(event);
    }
}

/// Snapshot the current metrics state.
///
/// `window_start_ms` filters by window start (`EventState::window_start_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
pub(crate) fn with_metrics_sink<T>(sink: &dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<*const dyn MetricsSink>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0;
            });
        }
    }

    // SAFETY:
    // - The pointer is installed only for this dynamic scope and the guard
    //   restores the previous slot on all exits.
    // - Lifetime erasure only; access stays shared.
    let sink_ptr = unsafe { std::mem::transmute::<&dyn MetricsSink, *const dyn MetricsSink>(sink) };
    let prev = SINK_OVERRIDE.with(|cell| {
        let mut slot = cell.borrow_mut();
        slot.replace(sink_ptr)
    });
    let _guard = Guard(prev);

    f()
}

/// Span
/// RAII guard that emits start/finish events for one session call.
/// Finish accounting happens even on early return or unwind.

pub(crate) struct Span {
    kind: ExecKind,
    model: String,
    rows: u64,
}

impl Span {
    #[must_use]
    pub(crate) fn new(kind: ExecKind, model: &str) -> Self {
        record(MetricsEvent::ExecStart { kind, model });

        Self {
            kind,
            model: model.to_string(),
            rows: 0,
        }
    }

    pub(crate) const fn set_rows(&mut self, rows: u64) {
        self.rows = rows;
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        record(MetricsEvent::ExecFinish {
            kind: self.kind,
            model: &self.model,
            rows_touched: self.rows,
        });
    }
}
