//! Distributed placement over real backends: the session gates evaluation,
//! and the fanned-out result matches the purely local one. The global
//! session transitions once per process, so this file holds a single test.

use anyhow::Result;
use lintra::{annotate, session_init, Array, Error, Expr, FunctionDef, Shape, Value};
// Linked for its load-time registration; gemm dispatches to it.
use lintra_backend_native as _;

fn dgemm_body() -> Expr {
    Expr::call(
        "gemm",
        vec![
            Expr::param(0),
            Expr::param(1),
            Expr::param(2),
            Expr::param(3),
            Expr::param(4),
        ],
    )
}

#[test]
fn distributed_gemm_matches_local_after_init() -> Result<()> {
    std::env::remove_var("LINTRA_BACKEND");

    let args = {
        let ones = || Value::Array(Array::ones(Shape::new([4, 4])));
        [Value::Scalar(2.0), ones(), ones(), Value::Scalar(1.0), ones()]
    };

    let distributed = annotate(
        &FunctionDef::new("dist_dgemm", ["alpha", "A", "B", "beta", "C"], dgemm_body())
            .distributed(),
    )?;

    // Before the session exists, distributed placement is rejected.
    let err = distributed.call(&args).unwrap_err();
    assert!(matches!(err, Error::SessionNotInitialized));

    session_init(4)?;

    let local = annotate(&FunctionDef::new(
        "local_dgemm",
        ["alpha", "A", "B", "beta", "C"],
        dgemm_body(),
    ))?;
    assert_eq!(distributed.call(&args)?, local.call(&args)?);
    Ok(())
}
