//! Expression-template backend: evaluates the vector primitives as fused
//! operator trees materialized in a single output pass, and the matrix
//! primitives as dot-product reductions over lazy row and column views.
//!
//! A scalar-weighted combination like AXPY is represented as
//! `Sum(Scaled(x), y)` and written out element by element; the scaled
//! intermediate never exists as an allocation.

use std::sync::Arc;

use lintra::{Array, BackendAdapter, Error, Primitive, PrimitiveFlags, Value};

const BACKEND_NAME: &str = "expr-template";

/// A lazily evaluated vector-valued expression.
trait VecExpr {
    fn len(&self) -> usize;
    fn at(&self, index: usize) -> f64;
}

/// Leaf view over a contiguous slice.
struct SliceView<'a> {
    data: &'a [f64],
}

impl VecExpr for SliceView<'_> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn at(&self, index: usize) -> f64 {
        self.data[index]
    }
}

/// Strided view selecting every `stride`-th element.
struct StridedView<'a> {
    data: &'a [f64],
    stride: usize,
}

impl VecExpr for StridedView<'_> {
    fn len(&self) -> usize {
        self.data.len().div_ceil(self.stride)
    }

    fn at(&self, index: usize) -> f64 {
        self.data[index * self.stride]
    }
}

/// Scalar-weighted operand: `alpha * inner`.
struct Scaled<E> {
    alpha: f64,
    inner: E,
}

impl<E: VecExpr> VecExpr for Scaled<E> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn at(&self, index: usize) -> f64 {
        self.alpha * self.inner.at(index)
    }
}

/// Elementwise sum of two operands of equal length.
struct Sum<A, B> {
    lhs: A,
    rhs: B,
}

impl<A: VecExpr, B: VecExpr> VecExpr for Sum<A, B> {
    fn len(&self) -> usize {
        self.lhs.len()
    }

    fn at(&self, index: usize) -> f64 {
        self.lhs.at(index) + self.rhs.at(index)
    }
}

/// One row of op(A) as a lazy vector view.
struct MatrixRow<'a> {
    data: &'a [f64],
    row: usize,
    len: usize,
    row_stride: usize,
    col_stride: usize,
}

impl VecExpr for MatrixRow<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn at(&self, index: usize) -> f64 {
        self.data[self.row * self.row_stride + index * self.col_stride]
    }
}

/// Writes an expression into a freshly allocated vector in one pass.
fn materialize(expr: &impl VecExpr) -> Vec<f64> {
    (0..expr.len()).map(|i| expr.at(i)).collect()
}

fn dot(lhs: &impl VecExpr, rhs: &impl VecExpr) -> f64 {
    (0..lhs.len()).map(|i| lhs.at(i) * rhs.at(i)).sum()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExprTemplateBackend;

impl ExprTemplateBackend {
    pub fn new() -> Self {
        ExprTemplateBackend
    }
}

impl BackendAdapter for ExprTemplateBackend {
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
            Primitive::Asum => reduce(Primitive::Asum, operands),
            Primitive::Nrm2 => reduce(Primitive::Nrm2, operands),
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

/// Row view factory over op(A) given the stored shape and transpose flag.
fn op_rows(a: &Array, transposed: bool) -> (usize, usize, usize, usize) {
    let shape = a.shape();
    if transposed {
        // op(A)[i, p] = A[p, i] over the stored (k x m) buffer.
        (shape.cols(), shape.rows(), 1, shape.cols())
    } else {
        (shape.rows(), shape.cols(), shape.cols(), 1)
    }
}

fn gemm(flags: PrimitiveFlags, operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let a = array_operand(operands, 1);
    let b = array_operand(operands, 2);
    let beta = scalar_operand(operands, 3);
    let c = array_operand(operands, 4);

    let (m, k, a_rs, a_cs) = op_rows(a, flags.trans_a);
    let (_, n, b_rs, b_cs) = op_rows(b, flags.trans_b);

    let mut out = vec![0.0; m * n];
    for i in 0..m {
        let row = MatrixRow {
            data: a.data(),
            row: i,
            len: k,
            row_stride: a_rs,
            col_stride: a_cs,
        };
        for j in 0..n {
            // Column j of op(B) is a row of op(B)^T: swap the strides.
            let col = MatrixRow {
                data: b.data(),
                row: j,
                len: k,
                row_stride: b_cs,
                col_stride: b_rs,
            };
            out[i * n + j] = alpha * dot(&row, &col) + beta * c.at(i, j);
        }
    }
    Array::matrix(m, n, out)
        .map(Value::Array)
        .map_err(|e| execution_error(Primitive::Gemm, e.to_string()))
}

fn gemv(flags: PrimitiveFlags, operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let a = array_operand(operands, 1);
    let x = array_operand(operands, 2);
    let beta = scalar_operand(operands, 3);
    let y = array_operand(operands, 4);

    let (m, k, a_rs, a_cs) = op_rows(a, flags.trans_a);
    let x_view = SliceView { data: x.data() };

    let mut out = vec![0.0; m];
    for (i, slot) in out.iter_mut().enumerate() {
        let row = MatrixRow {
            data: a.data(),
            row: i,
            len: k,
            row_stride: a_rs,
            col_stride: a_cs,
        };
        *slot = alpha * dot(&row, &x_view) + beta * y.data()[i];
    }
    Ok(Value::Array(Array::vector(out)))
}

fn scal(operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    let expr = Scaled {
        alpha,
        inner: SliceView { data: x.data() },
    };
    Ok(Value::Array(Array::vector(materialize(&expr))))
}

fn reduce(primitive: Primitive, operands: &[Value]) -> lintra::Result<Value> {
    let mult = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    let raw = scalar_operand(operands, 2);
    let stride = raw as usize;
    if stride == 0 || raw.fract() != 0.0 {
        return Err(execution_error(
            primitive,
            format!("stride must be a positive integer, got {raw}"),
        ));
    }
    let view = StridedView {
        data: x.data(),
        stride,
    };
    let result = match primitive {
        Primitive::Asum => mult * (0..view.len()).map(|i| view.at(i).abs()).sum::<f64>(),
        Primitive::Nrm2 => {
            let squares: f64 = (0..view.len()).map(|i| view.at(i) * view.at(i)).sum();
            mult * squares.sqrt()
        }
        _ => unreachable!("reduce handles asum and nrm2 only"),
    };
    Ok(Value::Scalar(result))
}

fn axpy(operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    let y = array_operand(operands, 2);
    let expr = Sum {
        lhs: Scaled {
            alpha,
            inner: SliceView { data: x.data() },
        },
        rhs: SliceView { data: y.data() },
    };
    Ok(Value::Array(Array::vector(materialize(&expr))))
}

fn ger(operands: &[Value]) -> lintra::Result<Value> {
    let alpha = scalar_operand(operands, 0);
    let x = array_operand(operands, 1);
    let y = array_operand(operands, 2);
    let a = array_operand(operands, 3);

    let (m, n) = (a.shape().rows(), a.shape().cols());
    let y_view = SliceView { data: y.data() };
    let mut out = Vec::with_capacity(m * n);
    for i in 0..m {
        // Row i of the update is Sum(Scaled(alpha * x[i], y), row_i(A)),
        // materialized straight into the output.
        let update = Sum {
            lhs: Scaled {
                alpha: alpha * x.data()[i],
                inner: SliceView { data: y_view.data },
            },
            rhs: SliceView {
                data: &a.data()[i * n..(i + 1) * n],
            },
        };
        for j in 0..n {
            out.push(update.at(j));
        }
    }
    Array::matrix(m, n, out)
        .map(Value::Array)
        .map_err(|e| execution_error(Primitive::Ger, e.to_string()))
}

/// Register the expression-template backend with the global adapter registry.
///
/// Called automatically via a static initializer; safe to call again.
pub fn register_expr_template_backend() {
    lintra::register_adapter(Arc::new(ExprTemplateBackend::new()));
}

#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_EXPR_TEMPLATE_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_expr_template_backend();
    }
    register
};

#[cfg(test)]
mod tests {
    use super::*;
    use lintra::Shape;

    #[test]
    fn axpy_fuses_scale_and_add() {
        let backend = ExprTemplateBackend::new();
        let result = backend
            .execute(
                Primitive::Axpy,
                PrimitiveFlags::default(),
                &[
                    Value::Scalar(2.0),
                    Value::Array(Array::vector(vec![1.0, 2.0, 3.0])),
                    Value::Array(Array::vector(vec![10.0, 20.0, 30.0])),
                ],
            )
            .unwrap();
        assert_eq!(
            result,
            Value::Array(Array::vector(vec![12.0, 24.0, 36.0]))
        );
    }

    #[test]
    fn strided_reduction_selects_every_second_element() {
        let backend = ExprTemplateBackend::new();
        let result = backend
            .execute(
                Primitive::Asum,
                PrimitiveFlags::default(),
                &[
                    Value::Scalar(1.0),
                    Value::Array(Array::vector(vec![1.0, -100.0, -2.0, -100.0, 3.0])),
                    Value::Scalar(2.0),
                ],
            )
            .unwrap();
        assert_eq!(result, Value::Scalar(6.0));
    }

    #[test]
    fn zero_stride_is_an_execution_failure() {
        let backend = ExprTemplateBackend::new();
        let err = backend
            .execute(
                Primitive::Nrm2,
                PrimitiveFlags::default(),
                &[
                    Value::Scalar(1.0),
                    Value::Array(Array::ones(Shape::new([4]))),
                    Value::Scalar(0.0),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::BackendExecutionFailed {
                backend: "expr-template",
                ..
            }
        ));
    }

    #[test]
    fn gemm_transposed_operands_match_untransposed_layout() {
        let backend = ExprTemplateBackend::new();
        // A = [[1, 2], [3, 4]] stored transposed as [[1, 3], [2, 4]].
        let a_t = Array::matrix(2, 2, vec![1.0, 3.0, 2.0, 4.0]).unwrap();
        let b = Array::matrix(2, 2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let c = Array::zeros(Shape::new([2, 2]));
        let result = backend
            .execute(
                Primitive::Gemm,
                PrimitiveFlags::transpose(true, false),
                &[
                    Value::Scalar(1.0),
                    Value::Array(a_t),
                    Value::Array(b),
                    Value::Scalar(0.0),
                    Value::Array(c),
                ],
            )
            .unwrap();
        let out = result.into_array().unwrap();
        assert_eq!(out.data(), &[19.0, 22.0, 43.0, 50.0]);
    }
}
