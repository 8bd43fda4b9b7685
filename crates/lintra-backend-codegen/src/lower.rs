//! Kernel lowering: emits a loop nest specialized to the shapes and flags
//! observed at compile time.
//!
//! Loop bounds and index strides are baked into the emitted closure as
//! constants, and the scalar arithmetic belonging to the primitive
//! (alpha/beta scaling, accumulation into the destination) is fused into
//! the same loop nest rather than staged through temporaries. Transpose
//! flags collapse into constant index strides chosen at compile time, not
//! re-derived per element.

use lintra::{Array, Error, Primitive, PrimitiveFlags, Value};

use crate::BACKEND_NAME;

pub(crate) type KernelFn = Box<dyn Fn(&[Value]) -> lintra::Result<Value> + Send + Sync>;

/// A compiled artifact replayed for every call with matching shapes.
pub(crate) struct Kernel {
    pub(crate) run: KernelFn,
}

impl Kernel {
    fn new(run: impl Fn(&[Value]) -> lintra::Result<Value> + Send + Sync + 'static) -> Self {
        Kernel { run: Box::new(run) }
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

fn execution_error(primitive: Primitive, message: impl Into<String>) -> Error {
    Error::BackendExecutionFailed {
        backend: BACKEND_NAME,
        primitive: primitive.name(),
        message: message.into(),
    }
}

/// Lowers `primitive` against the shapes of `operands` into a specialized
/// kernel. The operand values seen here only supply shapes; payloads are
/// read at run time.
pub(crate) fn lower_kernel(
    primitive: Primitive,
    flags: PrimitiveFlags,
    operands: &[Value],
) -> Kernel {
    match primitive {
        Primitive::Gemm => lower_gemm(flags, operands),
        Primitive::Gemv => lower_gemv(flags, operands),
        Primitive::Scal => lower_map_scale(),
        Primitive::Asum => lower_reduce(Primitive::Asum),
        Primitive::Nrm2 => lower_reduce(Primitive::Nrm2),
        Primitive::Axpy => lower_axpy(),
        Primitive::Ger => lower_ger(operands),
    }
}

fn lower_gemm(flags: PrimitiveFlags, operands: &[Value]) -> Kernel {
    let a = array_operand(operands, 1).shape();
    let b = array_operand(operands, 2).shape();
    let (m, k) = if flags.trans_a {
        (a.cols(), a.rows())
    } else {
        (a.rows(), a.cols())
    };
    let n = if flags.trans_b { b.rows() } else { b.cols() };

    // The transpose flags collapse into constant index strides over the
    // row-major operand buffers: op(A)[i, p] = a[i * a_rs + p * a_cs] and
    // op(B)[p, j] = b[p * b_rs + j * b_cs].
    let (a_rs, a_cs) = if flags.trans_a { (1, m) } else { (k, 1) };
    let (b_rs, b_cs) = if flags.trans_b { (1, k) } else { (n, 1) };

    Kernel::new(move |operands: &[Value]| {
        let alpha = scalar_operand(operands, 0);
        let a = array_operand(operands, 1).data();
        let b = array_operand(operands, 2).data();
        let beta = scalar_operand(operands, 3);
        let c = array_operand(operands, 4).data();
        let mut out = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0;
                for p in 0..k {
                    acc += a[i * a_rs + p * a_cs] * b[p * b_rs + j * b_cs];
                }
                out[i * n + j] = alpha * acc + beta * c[i * n + j];
            }
        }
        Array::matrix(m, n, out)
            .map(Value::Array)
            .map_err(|e| execution_error(Primitive::Gemm, e.to_string()))
    })
}

fn lower_gemv(flags: PrimitiveFlags, operands: &[Value]) -> Kernel {
    let a = array_operand(operands, 1).shape();
    let (m, k) = if flags.trans_a {
        (a.cols(), a.rows())
    } else {
        (a.rows(), a.cols())
    };
    let trans_a = flags.trans_a;

    Kernel::new(move |operands: &[Value]| {
        let alpha = scalar_operand(operands, 0);
        let a = array_operand(operands, 1).data();
        let x = array_operand(operands, 2).data();
        let beta = scalar_operand(operands, 3);
        let y = array_operand(operands, 4).data();
        let mut out = vec![0.0; m];
        for i in 0..m {
            let mut acc = 0.0;
            if trans_a {
                for p in 0..k {
                    acc += a[p * m + i] * x[p];
                }
            } else {
                let row = &a[i * k..(i + 1) * k];
                for (av, xv) in row.iter().zip(x.iter()) {
                    acc += av * xv;
                }
            }
            out[i] = alpha * acc + beta * y[i];
        }
        Ok(Value::Array(Array::vector(out)))
    })
}

fn lower_map_scale() -> Kernel {
    Kernel::new(move |operands: &[Value]| {
        let alpha = scalar_operand(operands, 0);
        let x = array_operand(operands, 1).data();
        Ok(Value::Array(Array::vector(
            x.iter().map(|v| alpha * v).collect(),
        )))
    })
}

fn lower_reduce(primitive: Primitive) -> Kernel {
    Kernel::new(move |operands: &[Value]| {
        let mult = scalar_operand(operands, 0);
        let x = array_operand(operands, 1).data();
        let raw = scalar_operand(operands, 2);
        let incx = raw as usize;
        if incx == 0 || raw.fract() != 0.0 {
            return Err(execution_error(
                primitive,
                format!("stride must be a positive integer, got {raw}"),
            ));
        }
        let result = match primitive {
            Primitive::Asum => mult * x.iter().step_by(incx).map(|v| v.abs()).sum::<f64>(),
            Primitive::Nrm2 => {
                mult * x.iter().step_by(incx).map(|v| v * v).sum::<f64>().sqrt()
            }
            _ => unreachable!("lower_reduce handles asum and nrm2 only"),
        };
        Ok(Value::Scalar(result))
    })
}

fn lower_axpy() -> Kernel {
    Kernel::new(move |operands: &[Value]| {
        let alpha = scalar_operand(operands, 0);
        let x = array_operand(operands, 1).data();
        let y = array_operand(operands, 2).data();
        Ok(Value::Array(Array::vector(
            x.iter()
                .zip(y.iter())
                .map(|(xv, yv)| alpha * xv + yv)
                .collect(),
        )))
    })
}

fn lower_ger(operands: &[Value]) -> Kernel {
    let shape = array_operand(operands, 3).shape();
    let (m, n) = (shape.rows(), shape.cols());

    Kernel::new(move |operands: &[Value]| {
        let alpha = scalar_operand(operands, 0);
        let x = array_operand(operands, 1).data();
        let y = array_operand(operands, 2).data();
        let a = array_operand(operands, 3).data();
        let mut out = a.to_vec();
        for i in 0..m {
            let weight = alpha * x[i];
            let row = &mut out[i * n..(i + 1) * n];
            for (slot, yv) in row.iter_mut().zip(y.iter()) {
                *slot += weight * yv;
            }
        }
        Array::matrix(m, n, out)
            .map(Value::Array)
            .map_err(|e| execution_error(Primitive::Ger, e.to_string()))
    })
}
