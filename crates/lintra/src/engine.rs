//! Evaluates captured computations against concrete arguments.
//!
//! The engine binds arguments to input slots, walks the description's
//! frozen topological order, validates primitive operands through the
//! catalog, and routes each primitive to the adapter chosen by the
//! dispatcher. Arithmetic nodes are evaluated in place without dispatch.
//! The engine itself is stateless across calls; only adapters carry caches.

use std::sync::Arc;
use std::thread;

use crate::catalog::catalog;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::graph::{ArithmeticOp, ComputationDescription, Node};
use crate::session::SessionState;
use crate::value::{Array, Value};

pub struct Engine {
    session: Arc<SessionState>,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Builds an engine around an injected session reference.
    pub fn new(session: Arc<SessionState>) -> Self {
        Engine {
            session,
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Evaluates `description` with positionally bound `args`.
    pub fn evaluate(&self, description: &ComputationDescription, args: &[Value]) -> Result<Value> {
        if args.len() != description.arity() {
            return Err(Error::ArityMismatch {
                expected: description.arity(),
                actual: args.len(),
            });
        }
        if description.is_distributed() {
            self.evaluate_distributed(description, args)
        } else {
            self.evaluate_local(description, args)
        }
    }

    fn evaluate_local(&self, description: &ComputationDescription, args: &[Value]) -> Result<Value> {
        let mut values: Vec<Option<Value>> = vec![None; description.nodes().len()];
        for (index, node) in description.nodes().iter().enumerate() {
            let value = match node {
                Node::InputSlot { index: slot } => args[*slot].clone(),
                Node::Constant(value) => value.clone(),
                Node::PrimitiveCall {
                    primitive,
                    flags,
                    operands,
                } => {
                    let operand_values: Vec<Value> = operands
                        .iter()
                        .map(|id| {
                            values[id.index()]
                                .clone()
                                .expect("topological order guarantees operands are evaluated")
                        })
                        .collect();
                    let specs: Vec<_> = operand_values.iter().map(Value::spec).collect();
                    catalog().validate(primitive.name(), *flags, &specs)?;

                    let adapter = self
                        .dispatcher
                        .select(*primitive, description.backend_hint())?;
                    adapter
                        .execute(*primitive, *flags, &operand_values)
                        .map_err(|e| match e {
                            already @ Error::BackendExecutionFailed { .. } => already,
                            other => Error::BackendExecutionFailed {
                                backend: adapter.name(),
                                primitive: primitive.name(),
                                message: other.to_string(),
                            },
                        })?
                }
                Node::Arithmetic { op, operands } => {
                    let lhs = values[operands[0].index()]
                        .clone()
                        .expect("topological order guarantees operands are evaluated");
                    let rhs = values[operands[1].index()]
                        .clone()
                        .expect("topological order guarantees operands are evaluated");
                    eval_arithmetic(*op, lhs, rhs)?
                }
            };
            values[index] = Some(value);
        }
        Ok(values[description.output().index()]
            .take()
            .expect("output node is always evaluated"))
    }

    /// SPMD fan-out across the initialized localities.
    ///
    /// Every locality evaluates the whole description; the engine joins
    /// all of them before returning, and the first locality failure aborts
    /// the call with no partial result.
    fn evaluate_distributed(
        &self,
        description: &ComputationDescription,
        args: &[Value],
    ) -> Result<Value> {
        let localities = self.session.locality_count()?;
        let results: Vec<Result<Value>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..localities)
                .map(|_| scope.spawn(|| self.evaluate_local(description, args)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .expect("locality worker must not panic")
                })
                .collect()
        });

        let mut first = None;
        for (locality, result) in results.into_iter().enumerate() {
            match result {
                Ok(value) => {
                    if first.is_none() {
                        first = Some(value);
                    }
                }
                Err(source) => {
                    return Err(Error::LocalityFailed {
                        locality,
                        source: Box::new(source),
                    })
                }
            }
        }
        Ok(first.expect("locality count is at least 1"))
    }
}

fn eval_arithmetic(op: ArithmeticOp, lhs: Value, rhs: Value) -> Result<Value> {
    match op {
        ArithmeticOp::Add | ArithmeticOp::Sub => {
            let sign = if op == ArithmeticOp::Add { 1.0 } else { -1.0 };
            match (lhs, rhs) {
                (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a + sign * b)),
                (Value::Array(a), Value::Array(b)) => {
                    if a.shape() != b.shape() {
                        return Err(Error::ShapeMismatch {
                            primitive: op.name(),
                            expected: format!("array [{}]", a.shape()),
                            actual: format!("array [{}]", b.shape()),
                        });
                    }
                    let shape = a.shape().clone();
                    let data = a
                        .data()
                        .iter()
                        .zip(b.data().iter())
                        .map(|(x, y)| x + sign * y)
                        .collect();
                    Ok(Value::Array(
                        Array::from_vec(shape, data).expect("shapes already agree"),
                    ))
                }
                (lhs, rhs) => Err(Error::ShapeMismatch {
                    primitive: op.name(),
                    expected: "operands of matching kind".to_string(),
                    actual: format!("{} and {}", lhs.spec(), rhs.spec()),
                }),
            }
        }
        ArithmeticOp::Scale => {
            let factor = lhs.as_scalar().ok_or_else(|| Error::ShapeMismatch {
                primitive: op.name(),
                expected: "scalar factor".to_string(),
                actual: lhs.spec().to_string(),
            })?;
            match rhs {
                Value::Scalar(v) => Ok(Value::Scalar(factor * v)),
                Value::Array(a) => {
                    let shape = a.shape().clone();
                    let data = a.data().iter().map(|v| factor * v).collect();
                    Ok(Value::Array(
                        Array::from_vec(shape, data).expect("shape is unchanged"),
                    ))
                }
            }
        }
    }
}
