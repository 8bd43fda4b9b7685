//! One-shot distributed-execution session state.
//!
//! A session is created absent, transitions to initialized exactly once,
//! and is never re-initialized within the process. The execution engine
//! consults it only for computations marked distributed; purely local
//! evaluation never requires initialization.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};

const UNINITIALIZED: usize = 0;

/// Process-wide locality bookkeeping, owned by the session manager.
///
/// Other components hold only an `Arc` reference to query it; the
/// uninitialized-to-initialized transition is a single compare-and-set so
/// concurrent `init` calls see exactly one winner.
#[derive(Debug, Default)]
pub struct SessionState {
    localities: AtomicUsize,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            localities: AtomicUsize::new(UNINITIALIZED),
        }
    }

    /// Establishes `locality_count` cooperating localities.
    ///
    /// Callable at most once per session; every later call observes
    /// `SessionAlreadyInitialized` regardless of the count it carried.
    pub fn init(&self, locality_count: usize) -> Result<()> {
        if locality_count == 0 {
            return Err(Error::InvalidLocalityCount);
        }
        self.localities
            .compare_exchange(
                UNINITIALIZED,
                locality_count,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| Error::SessionAlreadyInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.localities.load(Ordering::SeqCst) != UNINITIALIZED
    }

    /// Number of localities established by `init`.
    pub fn locality_count(&self) -> Result<usize> {
        match self.localities.load(Ordering::SeqCst) {
            UNINITIALIZED => Err(Error::SessionNotInitialized),
            count => Ok(count),
        }
    }
}

static GLOBAL_SESSION: OnceLock<Arc<SessionState>> = OnceLock::new();

/// The session consulted by the annotation boundary's callables.
pub fn global_session() -> &'static Arc<SessionState> {
    GLOBAL_SESSION.get_or_init(|| Arc::new(SessionState::new()))
}

/// Initializes the process-wide session with `locality_count` localities.
pub fn session_init(locality_count: usize) -> Result<()> {
    global_session().init(locality_count)
}
