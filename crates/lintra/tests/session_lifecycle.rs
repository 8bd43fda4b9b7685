//! Process-wide session lifecycle through the public `session_init` surface.
//!
//! Kept in a single test function: the global session can only transition
//! once per process.

use lintra::{global_session, session_init, Error};

#[test]
fn global_session_initializes_exactly_once() {
    assert!(!global_session().is_initialized());
    assert!(matches!(
        global_session().locality_count(),
        Err(Error::SessionNotInitialized)
    ));

    session_init(16).unwrap();
    assert!(global_session().is_initialized());
    assert_eq!(global_session().locality_count().unwrap(), 16);

    assert!(matches!(
        session_init(8),
        Err(Error::SessionAlreadyInitialized)
    ));
    assert_eq!(global_session().locality_count().unwrap(), 16);
}
