//! Counter-level proof that replay never re-enters the capture path.
//!
//! Lives in its own test binary so the process-global counters are not
//! perturbed by unrelated tests running in parallel threads.

use anyhow::Result;
use lintra::{annotate, profiling, Expr, FunctionDef, Value};

#[test]
fn replay_and_recapture_touch_the_trace_path_once() -> Result<()> {
    let def = FunctionDef::new(
        "counter_probe",
        ["x", "y"],
        Expr::scalar(2.0)
            .scale(Expr::param(0))
            .add(Expr::param(1)),
    );

    let traces_before = profiling::counter_value("capture.trace");
    let hits_before = profiling::counter_value("capture.cache_hit");

    let callable = annotate(&def)?;
    callable.call(&[Value::Scalar(1.0), Value::Scalar(10.0)])?;
    callable.call(&[Value::Scalar(2.0), Value::Scalar(20.0)])?;
    let again = annotate(&def)?;
    assert_eq!(
        again.call(&[Value::Scalar(3.0), Value::Scalar(30.0)])?,
        Value::Scalar(36.0)
    );

    assert_eq!(profiling::counter_value("capture.trace"), traces_before + 1);
    assert_eq!(
        profiling::counter_value("capture.cache_hit"),
        hits_before + 1
    );
    Ok(())
}
