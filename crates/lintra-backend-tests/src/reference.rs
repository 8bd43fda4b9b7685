//! Naive loop oracle the adapter suites compare against.

use lintra::{Array, Primitive, PrimitiveFlags, Value};

fn scalar(operands: &[Value], index: usize) -> f64 {
    operands[index].as_scalar().expect("scalar operand")
}

fn array(operands: &[Value], index: usize) -> &Array {
    operands[index].as_array().expect("array operand")
}

fn oriented_at(a: &Array, transposed: bool, row: usize, col: usize) -> f64 {
    if transposed {
        a.at(col, row)
    } else {
        a.at(row, col)
    }
}

fn oriented_dims(a: &Array, transposed: bool) -> (usize, usize) {
    let shape = a.shape();
    if transposed {
        (shape.cols(), shape.rows())
    } else {
        (shape.rows(), shape.cols())
    }
}

/// Reference result for any primitive, computed with plain loops.
pub fn evaluate(primitive: Primitive, flags: PrimitiveFlags, operands: &[Value]) -> Value {
    match primitive {
        Primitive::Gemm => {
            let alpha = scalar(operands, 0);
            let a = array(operands, 1);
            let b = array(operands, 2);
            let beta = scalar(operands, 3);
            let c = array(operands, 4);
            let (m, k) = oriented_dims(a, flags.trans_a);
            let (_, n) = oriented_dims(b, flags.trans_b);
            let mut out = vec![0.0; m * n];
            for i in 0..m {
                for j in 0..n {
                    let mut acc = 0.0;
                    for p in 0..k {
                        acc += oriented_at(a, flags.trans_a, i, p)
                            * oriented_at(b, flags.trans_b, p, j);
                    }
                    out[i * n + j] = alpha * acc + beta * c.at(i, j);
                }
            }
            Value::Array(Array::matrix(m, n, out).expect("gemm reference shape"))
        }
        Primitive::Scal => {
            let alpha = scalar(operands, 0);
            let x = array(operands, 1);
            Value::Array(Array::vector(x.data().iter().map(|v| alpha * v).collect()))
        }
        Primitive::Asum => {
            let mult = scalar(operands, 0);
            let x = array(operands, 1);
            let incx = scalar(operands, 2) as usize;
            Value::Scalar(mult * x.data().iter().step_by(incx).map(|v| v.abs()).sum::<f64>())
        }
        Primitive::Nrm2 => {
            let mult = scalar(operands, 0);
            let x = array(operands, 1);
            let incx = scalar(operands, 2) as usize;
            let squares: f64 = x.data().iter().step_by(incx).map(|v| v * v).sum();
            Value::Scalar(mult * squares.sqrt())
        }
        Primitive::Axpy => {
            let alpha = scalar(operands, 0);
            let x = array(operands, 1);
            let y = array(operands, 2);
            Value::Array(Array::vector(
                x.data()
                    .iter()
                    .zip(y.data().iter())
                    .map(|(xv, yv)| alpha * xv + yv)
                    .collect(),
            ))
        }
        Primitive::Gemv => {
            let alpha = scalar(operands, 0);
            let a = array(operands, 1);
            let x = array(operands, 2);
            let beta = scalar(operands, 3);
            let y = array(operands, 4);
            let (m, k) = oriented_dims(a, flags.trans_a);
            let mut out = vec![0.0; m];
            for (i, slot) in out.iter_mut().enumerate() {
                let mut acc = 0.0;
                for p in 0..k {
                    acc += oriented_at(a, flags.trans_a, i, p) * x.data()[p];
                }
                *slot = alpha * acc + beta * y.data()[i];
            }
            Value::Array(Array::vector(out))
        }
        Primitive::Ger => {
            let alpha = scalar(operands, 0);
            let x = array(operands, 1);
            let y = array(operands, 2);
            let a = array(operands, 3);
            let (m, n) = (a.shape().rows(), a.shape().cols());
            let mut out = a.data().to_vec();
            for i in 0..m {
                for j in 0..n {
                    out[i * n + j] += alpha * x.data()[i] * y.data()[j];
                }
            }
            Value::Array(Array::matrix(m, n, out).expect("ger reference shape"))
        }
    }
}
