//! Annotation-driven compiler and dispatcher for dense linear algebra.
//!
//! An annotated function is captured once into an immutable
//! [`ComputationDescription`](graph::ComputationDescription) and replayed on
//! every call with fresh argument values. Each primitive node in the
//! description is routed through the [`dispatch`] layer to one of the
//! registered backend adapters (native library, shape-specialized codegen,
//! expression templates); the [`engine`] walks the frozen topological order
//! and threads intermediate results between nodes. Distributed placement is
//! gated on the one-shot [`session`] state.

pub mod catalog;
pub mod dispatch;
pub mod engine;
mod env;
pub mod error;
pub mod graph;
pub mod hashing;
pub mod profiling;
pub mod session;
pub mod value;

pub use catalog::{catalog, Catalog, Primitive, PrimitiveFlags, PrimitiveSignature};
pub use dispatch::{register_adapter, BackendAdapter, Dispatcher};
pub use engine::Engine;
pub use error::{Error, Result};
pub use graph::{annotate, capture, Callable, ComputationDescription, Expr, FunctionDef};
pub use session::{global_session, session_init, SessionState};
pub use value::{Array, Shape, Value, ValueSpec};
