use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for engine operations.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub models: BTreeMap<String, ModelCounters>,
    pub window_start_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            models: BTreeMap::new(),
            window_start_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Session entrypoints
    pub find_calls: u64,
    pub save_calls: u64,
    pub delete_calls: u64,

    // Rows touched
    pub rows_loaded: u64,
    pub rows_fetched: u64,
    pub rows_deleted: u64,
    pub fetches: u64,

    // Row writes
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,

    // Join maintenance
    pub join_fetches: u64,
    pub join_rows_fetched: u64,
    pub join_inserts: u64,
    pub join_removes: u64,

    pub failed_nodes: u64,
}

///
/// ModelCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ModelCounters {
    pub find_calls: u64,
    pub save_calls: u64,
    pub delete_calls: u64,
    pub rows_loaded: u64,
    pub rows_fetched: u64,
    pub rows_deleted: u64,
    pub fetches: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub join_inserts: u64,
    pub join_removes: u64,
    pub failed_nodes: u64,
}

///
/// EventReport
/// Counters as of the report call, filtered by window start.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: Option<EventState>,
    pub model_counters: Vec<ModelSummary>,
}

///
/// ModelSummary
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub counters: ModelCounters,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters and restart the window.
pub fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Report counters if the current window started at or after
/// `window_start_ms`; `None` reports unconditionally.
#[must_use]
pub fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    with_state(|state| {
        if window_start_ms.is_some_and(|start| state.window_start_ms < start) {
            return EventReport::default();
        }

        let model_counters = state
            .models
            .iter()
            .map(|(model, counters)| ModelSummary {
                model: model.clone(),
                counters: counters.clone(),
            })
            .collect();

        EventReport {
            counters: Some(state.clone()),
            model_counters,
        }
    })
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
