//! Error taxonomy shared by capture, dispatch, evaluation, and the session.

use thiserror::Error;

/// Errors surfaced synchronously by `capture`, `evaluate`, and `session_init`.
///
/// Nothing in this crate retries on failure; a call either returns a fully
/// valid value or one of these.
#[derive(Debug, Error)]
pub enum Error {
    /// Capture-time rejection of a construct outside the primitive catalog
    /// and the fixed arithmetic vocabulary. Permanently fatal for that
    /// function definition.
    #[error("unsupported expression while capturing `{function}`: {detail}")]
    UnsupportedExpression { function: String, detail: String },

    #[error("primitive `{0}` is already registered")]
    DuplicatePrimitive(&'static str),

    #[error("unknown primitive `{0}`")]
    UnknownPrimitive(String),

    #[error("shape mismatch in `{primitive}`: expected {expected}, got {actual}")]
    ShapeMismatch {
        primitive: &'static str,
        expected: String,
        actual: String,
    },

    #[error("backend `{backend}` does not support primitive `{primitive}`")]
    BackendUnsupportedPrimitive {
        backend: String,
        primitive: &'static str,
    },

    #[error("no registered backend supports primitive `{0}`")]
    NoBackendAvailable(&'static str),

    #[error("arity mismatch: computation takes {expected} arguments, {actual} were supplied")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("execution session is already initialized")]
    SessionAlreadyInitialized,

    #[error("execution session has not been initialized")]
    SessionNotInitialized,

    #[error("locality count must be at least 1")]
    InvalidLocalityCount,

    /// Distributed evaluation aborts as a whole when any locality fails;
    /// the first failing locality is reported and no partial result exists.
    #[error("locality {locality} failed: {source}")]
    LocalityFailed {
        locality: usize,
        #[source]
        source: Box<Error>,
    },

    /// Adapter compile or execute failure, attributed to the backend and
    /// primitive that produced it. The engine never retries with a
    /// different backend; switching requires an explicit hint change.
    #[error("backend `{backend}` failed executing `{primitive}`: {message}")]
    BackendExecutionFailed {
        backend: &'static str,
        primitive: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
