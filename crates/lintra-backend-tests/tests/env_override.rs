//! `LINTRA_BACKEND` acts as a process-default hint when a computation
//! carries none of its own. The variable is read once per process, so this
//! file holds a single test that sets it before any dispatch happens.

use std::sync::Arc;

use anyhow::Result;
use lintra::{annotate, register_adapter, Array, Expr, FunctionDef, Value};
use lintra_backend_expr::ExprTemplateBackend;
use lintra_backend_tests::counting::CountingAdapter;
// Linked for its load-time registration: the native adapter must be present
// for the override to be meaningful.
use lintra_backend_native as _;

#[test]
fn env_default_overrides_priority_order() -> Result<()> {
    std::env::set_var("LINTRA_BACKEND", "expr-template");

    let expr = Arc::new(CountingAdapter::new(Arc::new(ExprTemplateBackend::new())));
    register_adapter(expr.clone());

    // Without the override the native adapter would win the priority walk.
    let callable = annotate(&FunctionDef::new(
        "env_override_axpy",
        ["alpha", "x", "y"],
        Expr::call(
            "axpy",
            vec![Expr::param(0), Expr::param(1), Expr::param(2)],
        ),
    ))?;
    let result = callable.call(&[
        Value::Scalar(3.0),
        Value::Array(Array::vector(vec![1.0, 1.0])),
        Value::Array(Array::vector(vec![1.0, 1.0])),
    ])?;
    assert_eq!(result, Value::Array(Array::vector(vec![4.0, 4.0])));
    assert_eq!(expr.executes(), 1);
    Ok(())
}
