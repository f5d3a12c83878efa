//! Downstream telemetry sinks.

use super::{Event, EventHandler, EventName};
use dashmap::DashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Logs every event through `tracing`: failures at warn, the rest at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHandler;

impl EventHandler for TracingHandler {
    fn handle_event(&self, event: Event) {
        let worker_id = event.worker_id();
        match event.error() {
            Some(err) => {
                warn!(event = %event.name, worker_id = ?worker_id, error = %err, "Attack event")
            }
            None => debug!(event = %event.name, worker_id = ?worker_id, "Attack event"),
        }
    }
}

/// Point-in-time view of a `ConnectionTally`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TallySnapshot {
    pub dialed: u64,
    pub closed: u64,
    /// Formatted failure events seen since the previous snapshot.
    pub failures: Vec<String>,
}

impl TallySnapshot {
    /// Share of dials whose connection is still counted as open, in `[0, 1]`.
    pub fn connected_ratio(&self) -> f64 {
        let total = self.dialed + self.closed;
        if total == 0 {
            return 0.0;
        }
        self.dialed as f64 / total as f64
    }
}

#[derive(Debug, Default)]
struct TallyState {
    dialed: u64,
    closed: u64,
    failures: Vec<String>,
}

/// Aggregates connection counts for a dashboard.
///
/// Totals are mutex guarded so a reader gets a consistent snapshot; dials per
/// worker slot are kept separately to show how often each slot respawned.
#[derive(Debug, Default)]
pub struct ConnectionTally {
    state: Mutex<TallyState>,
    attempts: DashMap<usize, u64>,
}

impl ConnectionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the totals and drains the buffered failure descriptions.
    pub fn snapshot(&self) -> TallySnapshot {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        TallySnapshot {
            dialed: state.dialed,
            closed: state.closed,
            failures: std::mem::take(&mut state.failures),
        }
    }

    /// Number of connections dialed by the given worker slot.
    pub fn attempts(&self, worker_id: usize) -> u64 {
        self.attempts.get(&worker_id).map(|v| *v).unwrap_or(0)
    }

    /// Number of worker slots that dialed at least once.
    pub fn active_slots(&self) -> usize {
        self.attempts.len()
    }
}

impl EventHandler for ConnectionTally {
    fn handle_event(&self, event: Event) {
        if event.name == EventName::TcpDial {
            if let Some(id) = event.worker_id() {
                *self.attempts.entry(id).or_insert(0) += 1;
            }
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match event.name {
            EventName::TcpDial => state.dialed += 1,
            EventName::TcpClosed => state.closed += 1,
            EventName::WorkerError | EventName::WorkerPanic => {
                state.failures.push(format_event(&event));
            }
        }
    }
}

/// One-line rendering: `x [007] worker/error <message>`.
pub fn format_event(event: &Event) -> String {
    let mut s = String::new();
    s.push(if event.error().is_some() { 'x' } else { ' ' });
    if let Some(id) = event.worker_id() {
        s.push_str(&format!(" [{:03}]", id));
    }
    s.push(' ');
    s.push_str(event.name.as_str());
    if let Some(err) = event.error() {
        s.push(' ');
        s.push_str(err);
    }
    s
}
