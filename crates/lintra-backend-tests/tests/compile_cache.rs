//! Compile-cache behavior observed through the full annotate/evaluate path.
//!
//! Registry mutation keeps this file to a single test function.

use std::sync::Arc;

use anyhow::Result;
use lintra::{annotate, register_adapter, Array, Expr, FunctionDef, Shape, Value};
use lintra_backend_codegen::CodegenBackend;

#[test]
fn replay_with_matching_shapes_never_recompiles() -> Result<()> {
    let backend = Arc::new(CodegenBackend::new());
    register_adapter(backend.clone());

    let callable = annotate(
        &FunctionDef::new(
            "compile_cache_axpy",
            ["alpha", "x", "y"],
            Expr::call(
                "axpy",
                vec![Expr::param(0), Expr::param(1), Expr::param(2)],
            ),
        )
        .with_backend("codegen"),
    )?;

    let args = [
        Value::Scalar(2.0),
        Value::Array(Array::vector(vec![1.0, 2.0])),
        Value::Array(Array::vector(vec![10.0, 20.0])),
    ];
    callable.call(&args)?;
    let compiles_after_first = backend.compile_count();
    assert!(compiles_after_first >= 1);
    callable.call(&args)?;
    callable.call(&args)?;
    assert_eq!(backend.compile_count(), compiles_after_first);

    // A new shape compiles one more kernel and leaves the old entry alone.
    callable.call(&[
        Value::Scalar(2.0),
        Value::Array(Array::ones(Shape::new([3]))),
        Value::Array(Array::ones(Shape::new([3]))),
    ])?;
    assert_eq!(backend.compile_count(), compiles_after_first + 1);
    callable.call(&args)?;
    assert_eq!(backend.compile_count(), compiles_after_first + 1);
    Ok(())
}
