//! Progress accounting for one ingest invocation.
//!
//! The indexer owns a [`ProgressBar`] and is the only writer; callers keep a
//! [`ProgressWatch`] taken before handing the bar over. Updates are
//! serialized through a mutex, so concurrent `add_n` calls are safe.

use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub total: u64,
    pub done: u64,
    pub failed: u64,
    pub error_message: Option<String>,
}

/// What `get_progress` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub remaining_seconds: u64,
    pub error_message: Option<String>,
}

#[derive(Debug)]
struct Inner {
    state: ProgressState,
    started: Instant,
}

impl Inner {
    fn fresh(total: u64) -> Self {
        Self { state: ProgressState { total, ..ProgressState::default() }, started: Instant::now() }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressBar {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ProgressBar {
    pub fn new(total: u64) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::fresh(total))) }
    }

    /// Read-only handle sharing this bar's state.
    pub fn watch(&self) -> ProgressWatch {
        ProgressWatch { inner: Arc::clone(&self.inner) }
    }

    /// Explicit reset: the only way `done` may go backwards.
    pub fn reset(&self, total: u64) {
        *self.inner.lock() = Inner::fresh(total);
    }

    /// Ignored once an error has been reported. `done` never exceeds `total`.
    pub fn add_n(&self, n: u64) {
        let mut inner = self.inner.lock();
        let state = &mut inner.state;
        if state.error_message.is_some() {
            return;
        }
        state.done = state.done.saturating_add(n).min(state.total);
    }

    /// Freezes `done`; every unit not yet done is counted as failed.
    pub fn report_error(&self, err: &dyn Display) {
        let mut inner = self.inner.lock();
        let state = &mut inner.state;
        if state.error_message.is_some() {
            return;
        }
        state.failed = state.total - state.done;
        state.error_message = Some(err.to_string());
    }

    pub fn get_progress(&self) -> ProgressSnapshot {
        snapshot(&self.inner.lock())
    }

    pub fn state(&self) -> ProgressState {
        self.inner.lock().state.clone()
    }
}

/// Read capability over a [`ProgressBar`].
#[derive(Debug, Clone)]
pub struct ProgressWatch {
    inner: Arc<Mutex<Inner>>,
}

impl ProgressWatch {
    pub fn get_progress(&self) -> ProgressSnapshot {
        snapshot(&self.inner.lock())
    }

    pub fn state(&self) -> ProgressState {
        self.inner.lock().state.clone()
    }

    pub fn is_finished(&self) -> bool {
        let state = &self.inner.lock().state;
        state.error_message.is_some() || (state.total > 0 && state.done >= state.total)
    }
}

fn snapshot(inner: &Inner) -> ProgressSnapshot {
    let state = &inner.state;
    ProgressSnapshot {
        percent: percent(state.done, state.total),
        remaining_seconds: remaining_seconds(state.done, state.total, inner.started.elapsed()),
        error_message: state.error_message.clone(),
    }
}

/// `100 * done / total`, rounded down and capped at 100; 0 when nothing is registered.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let p = done.saturating_mul(100) / total;
    u8::try_from(p.min(100)).unwrap_or(100)
}

/// Linear estimate from the current rate; 0 while the rate is unknown.
pub fn remaining_seconds(done: u64, total: u64, elapsed: Duration) -> u64 {
    if done == 0 || done >= total {
        return 0;
    }
    let per_unit = elapsed.as_secs_f64() / done as f64;
    (per_unit * (total - done) as f64).round() as u64
}
