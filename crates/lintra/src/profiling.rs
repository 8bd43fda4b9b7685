//! Process-global event counters for the capture and compile paths.
//!
//! The counters exist so behavior that must not repeat (re-tracing a
//! captured function, re-compiling a cached kernel) is observable from
//! tests without instrumenting the call sites themselves.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

static COUNTERS: Lazy<Mutex<HashMap<&'static str, u64>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Records one occurrence of a named cache event.
pub fn cache_event(name: &'static str) {
    let mut counters = COUNTERS.lock().expect("profiling counters poisoned");
    *counters.entry(name).or_insert(0) += 1;
}

/// Current value of a named counter; zero when never recorded.
pub fn counter_value(name: &str) -> u64 {
    let counters = COUNTERS.lock().expect("profiling counters poisoned");
    counters.get(name).copied().unwrap_or(0)
}

/// Snapshot of every counter, for diagnostics.
pub fn snapshot() -> HashMap<&'static str, u64> {
    COUNTERS
        .lock()
        .expect("profiling counters poisoned")
        .clone()
}
