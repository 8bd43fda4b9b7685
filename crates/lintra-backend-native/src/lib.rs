//! Native-library backend: forwards the matrix primitives to precompiled
//! `faer` routines and runs the level-1 vector kernels as tight loops over
//! contiguous slices.

use std::sync::Arc;

use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::{Accum, Par};

use lintra::{Array, BackendAdapter, Error, Primitive, PrimitiveFlags, Value};

const BACKEND_NAME: &str = "native";

fn faer_parallelism() -> Par {
    let par = faer::get_global_parallelism();
    if par.degree() == 1 {
        Par::Seq
    } else {
        par
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        NativeBackend
    }
}

impl BackendAdapter for NativeBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn supports(&self, _primitive: Primitive) -> bool {
        true
    }

    fn execute(
        &self,
        primitive: Primitive,
        flags: PrimitiveFlags,
        operands: &[Value],
    ) -> lintra::Result<Value> {
        match primitive {
            Primitive::Gemm => gemm(flags, operands),
            Primitive::Gemv => gemv(flags, operands),
            Primitive::Scal => scal(operands),
            Primitive::Asum => asum(operands),
            Primitive::Nrm2 => nrm2(operands),
            Primitive::Axpy => axpy(operands),
            Primitive::Ger => ger(operands),
        }
    }
}

fn execution_error(primitive: Primitive, message: impl Into<String>) -> Error {
    Error::BackendExecutionFailed {
        backend: BACKEND_NAME,
        primitive: primitive.name(),
        message: message.into(),
    }
}

fn scalar_operand(operands: &[Value], index: usize) -> f64 {
    operands[index]
        .as_scalar()
        .expect("operand roles are validated before dispatch")
}

fn array_operand(operands: &[Value], index: usize) -> &Array {
    operands[index]
        .as_array()
        .expect("operand roles are validated before dispatch")
}

fn stride_operand(primitive: Primitive, operands: &[Value], index: usize) -> lintra::Result<usize> {
    let raw = scalar_operand(operands, index);
    let stride = raw as usize;
    if stride == 0 || raw.fract() != 0.0 {
        return Err(execution_error(
            primitive,
            format!("stride must be a positive integer, got {raw}"),
        ));
    }
    Ok(stride)
}

/// `C <- alpha * op(A) * op(B) + beta * C`.
///
/// faer prefers column-major output, so compute `C^T = op(B)^T * op(A)^T`
/// into a column-major (n x m) view; the underlying buffer layout matches
/// row-major (m x n) for `C` and is returned without a transpose copy.
fn gemm(flags: PrimitiveFlags, operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let a = array_operand(operands, 1);
    let b = array_operand(operands, 2);
    let beta = scalar_operand(operands, 3);
    let c = array_operand(operands, 4);

    let (m, _k) = oriented_dims(a, flags.trans_a);
    let (_, n) = oriented_dims(b, flags.trans_b);

    let mut out: Vec<f64> = c.data().iter().map(|v| beta * v).collect();
    let a_view = MatRef::from_row_major_slice(a.data(), a.shape().rows(), a.shape().cols());
    let b_view = MatRef::from_row_major_slice(b.data(), b.shape().rows(), b.shape().cols());
    let op_a_t = if flags.trans_a {
        a_view
    } else {
        a_view.transpose()
    };
    let op_b_t = if flags.trans_b {
        b_view
    } else {
        b_view.transpose()
    };

    let mut out_view = MatMut::from_column_major_slice_mut(out.as_mut_slice(), n, m);
    matmul(
        &mut out_view,
        Accum::Add,
        op_b_t,
        op_a_t,
        alpha,
        faer_parallelism(),
    );

    Array::matrix(m, n, out)
        .map(Value::Array)
        .map_err(|e| execution_error(Primitive::Gemm, e.to_string()))
}

/// `y <- alpha * op(A) * x + beta * y` via a (m x k) by (k x 1) matmul.
fn gemv(flags: PrimitiveFlags, operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let a = array_operand(operands, 1);
    let x = array_operand(operands, 2);
    let beta = scalar_operand(operands, 3);
    let y = array_operand(operands, 4);

    let (m, k) = oriented_dims(a, flags.trans_a);
    let mut out: Vec<f64> = y.data().iter().map(|v| beta * v).collect();
    let a_view = MatRef::from_row_major_slice(a.data(), a.shape().rows(), a.shape().cols());
    let op_a = if flags.trans_a {
        a_view.transpose()
    } else {
        a_view
    };
    let x_view = MatRef::from_row_major_slice(x.data(), k, 1);

    let mut out_view = MatMut::from_column_major_slice_mut(out.as_mut_slice(), m, 1);
    matmul(
        &mut out_view,
        Accum::Add,
        op_a,
        x_view,
        alpha,
        faer_parallelism(),
    );

    Ok(Value::Array(Array::vector(out)))
}

fn scal(operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    Ok(Value::Array(Array::vector(
        x.data().iter().map(|v| alpha * v).collect(),
    )))
}

fn asum(operands: &[Value]) -> lintra::Result<Value> {
    let mult = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    let incx = stride_operand(Primitive::Asum, operands, 2)?;
    let sum: f64 = x.data().iter().step_by(incx).map(|v| v.abs()).sum();
    Ok(Value::Scalar(mult * sum))
}

fn nrm2(operands: &[Value]) -> lintra::Result<Value> {
    let mult = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    let incx = stride_operand(Primitive::Nrm2, operands, 2)?;
    let sum: f64 = x.data().iter().step_by(incx).map(|v| v * v).sum();
    Ok(Value::Scalar(mult * sum.sqrt()))
}

fn axpy(operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    let y = array_operand(operands, 2);
    Ok(Value::Array(Array::vector(
        x.data()
            .iter()
            .zip(y.data().iter())
            .map(|(xv, yv)| alpha * xv + yv)
            .collect(),
    )))
}

/// `A <- alpha * x * y^T + A`.
fn ger(operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    let y = array_operand(operands, 2);
    let a = array_operand(operands, 3);

    let (m, n) = (a.shape().rows(), a.shape().cols());
    let mut out = a.data().to_vec();
    for (i, &xv) in x.data().iter().enumerate().take(m) {
        let row = &mut out[i * n..(i + 1) * n];
        let weight = alpha * xv;
        for (slot, &yv) in row.iter_mut().zip(y.data().iter()) {
            *slot += weight * yv;
        }
    }

    Array::matrix(m, n, out)
        .map(Value::Array)
        .map_err(|e| execution_error(Primitive::Ger, e.to_string()))
}

/// `(rows, cols)` of the stored matrix after applying a transpose flag.
fn oriented_dims(a: &Array, transposed: bool) -> (usize, usize) {
    let shape = a.shape();
    if transposed {
        (shape.cols(), shape.rows())
    } else {
        (shape.rows(), shape.cols())
    }
}

/// Register the native backend with the global adapter registry.
///
/// Called automatically via a static initializer; safe to call again.
pub fn register_native_backend() {
    lintra::register_adapter(Arc::new(NativeBackend::new()));
}

#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_NATIVE_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_native_backend();
    }
    register
};
