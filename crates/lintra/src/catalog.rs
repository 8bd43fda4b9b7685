//! Static registry of the recognized linear-algebra primitives.
//!
//! The catalog owns one [`PrimitiveSignature`] per operation: its operand
//! roles and the shape-compatibility rule applied before dispatch. It is
//! populated once at process start and read-only afterwards.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{Shape, ValueSpec};

/// The fixed vocabulary of linear-algebra operations recognized by capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    /// General matrix multiply: `C <- alpha * op(A) * op(B) + beta * C`.
    Gemm,
    /// Vector scaling: `alpha * x`.
    Scal,
    /// Scaled sum of absolute values over a strided vector.
    Asum,
    /// Scaled euclidean norm over a strided vector.
    Nrm2,
    /// `y <- alpha * x + y`.
    Axpy,
    /// Matrix-vector product: `y <- alpha * op(A) * x + beta * y`.
    Gemv,
    /// Rank-1 update: `A <- alpha * x * y^T + A`.
    Ger,
}

impl Primitive {
    pub const ALL: [Primitive; 7] = [
        Primitive::Gemm,
        Primitive::Scal,
        Primitive::Asum,
        Primitive::Nrm2,
        Primitive::Axpy,
        Primitive::Gemv,
        Primitive::Ger,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Gemm => "gemm",
            Primitive::Scal => "scal",
            Primitive::Asum => "asum",
            Primitive::Nrm2 => "nrm2",
            Primitive::Axpy => "axpy",
            Primitive::Gemv => "gemv",
            Primitive::Ger => "ger",
        }
    }

    pub fn parse(name: &str) -> Option<Primitive> {
        Primitive::ALL.iter().copied().find(|p| p.name() == name)
    }
}

/// Compile-time flags attached to a primitive call node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PrimitiveFlags {
    pub trans_a: bool,
    pub trans_b: bool,
}

impl PrimitiveFlags {
    pub fn transpose(trans_a: bool, trans_b: bool) -> Self {
        PrimitiveFlags { trans_a, trans_b }
    }
}

/// The kind of value a signature expects at one operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandRole {
    Scalar(&'static str),
    Vector(&'static str),
    Matrix(&'static str),
}

impl OperandRole {
    fn describe(&self) -> String {
        match self {
            OperandRole::Scalar(name) => format!("scalar `{name}`"),
            OperandRole::Vector(name) => format!("vector `{name}`"),
            OperandRole::Matrix(name) => format!("matrix `{name}`"),
        }
    }
}

/// Name, operand roles, and shape rule of one catalog entry.
///
/// Read-only after registration.
#[derive(Debug, Clone)]
pub struct PrimitiveSignature {
    primitive: Primitive,
    roles: &'static [OperandRole],
}

const GEMM_ROLES: &[OperandRole] = &[
    OperandRole::Scalar("alpha"),
    OperandRole::Matrix("A"),
    OperandRole::Matrix("B"),
    OperandRole::Scalar("beta"),
    OperandRole::Matrix("C"),
];
const SCAL_ROLES: &[OperandRole] = &[OperandRole::Scalar("alpha"), OperandRole::Vector("x")];
const ASUM_ROLES: &[OperandRole] = &[
    OperandRole::Scalar("n"),
    OperandRole::Vector("x"),
    OperandRole::Scalar("incx"),
];
const NRM2_ROLES: &[OperandRole] = &[
    OperandRole::Scalar("n"),
    OperandRole::Vector("x"),
    OperandRole::Scalar("incx"),
];
const AXPY_ROLES: &[OperandRole] = &[
    OperandRole::Scalar("alpha"),
    OperandRole::Vector("x"),
    OperandRole::Vector("y"),
];
const GEMV_ROLES: &[OperandRole] = &[
    OperandRole::Scalar("alpha"),
    OperandRole::Matrix("A"),
    OperandRole::Vector("x"),
    OperandRole::Scalar("beta"),
    OperandRole::Vector("y"),
];
const GER_ROLES: &[OperandRole] = &[
    OperandRole::Scalar("alpha"),
    OperandRole::Vector("x"),
    OperandRole::Vector("y"),
    OperandRole::Matrix("A"),
];

impl PrimitiveSignature {
    pub fn new(primitive: Primitive) -> Self {
        let roles = match primitive {
            Primitive::Gemm => GEMM_ROLES,
            Primitive::Scal => SCAL_ROLES,
            Primitive::Asum => ASUM_ROLES,
            Primitive::Nrm2 => NRM2_ROLES,
            Primitive::Axpy => AXPY_ROLES,
            Primitive::Gemv => GEMV_ROLES,
            Primitive::Ger => GER_ROLES,
        };
        PrimitiveSignature { primitive, roles }
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    pub fn roles(&self) -> &'static [OperandRole] {
        self.roles
    }

    pub fn arity(&self) -> usize {
        self.roles.len()
    }

    /// Applies the shape-compatibility rule and returns the result spec.
    pub fn result_spec(
        &self,
        flags: PrimitiveFlags,
        operands: &[ValueSpec],
    ) -> Result<ValueSpec> {
        let name = self.primitive.name();
        if operands.len() != self.roles.len() {
            return Err(Error::ShapeMismatch {
                primitive: name,
                expected: format!("{} operands", self.roles.len()),
                actual: format!("{} operands", operands.len()),
            });
        }
        for (role, spec) in self.roles.iter().zip(operands.iter()) {
            let ok = match (role, spec) {
                (OperandRole::Scalar(_), ValueSpec::Scalar) => true,
                (OperandRole::Vector(_), ValueSpec::Array(shape)) => shape.is_vector(),
                (OperandRole::Matrix(_), ValueSpec::Array(shape)) => shape.is_matrix(),
                _ => false,
            };
            if !ok {
                return Err(Error::ShapeMismatch {
                    primitive: name,
                    expected: role.describe(),
                    actual: spec.to_string(),
                });
            }
        }
        match self.primitive {
            Primitive::Gemm => {
                let a = expect_matrix(&operands[1]);
                let b = expect_matrix(&operands[2]);
                let c = expect_matrix(&operands[4]);
                let (m, k_a) = oriented(a, flags.trans_a);
                let (k_b, n) = oriented(b, flags.trans_b);
                if k_a != k_b {
                    return Err(Error::ShapeMismatch {
                        primitive: name,
                        expected: format!("shared inner dimension K={k_a}"),
                        actual: format!("J={k_b}"),
                    });
                }
                if (c.rows(), c.cols()) != (m, n) {
                    return Err(Error::ShapeMismatch {
                        primitive: name,
                        expected: format!("C of shape {m}x{n}"),
                        actual: format!("C of shape {c}"),
                    });
                }
                Ok(ValueSpec::Array(Shape::new([m, n])))
            }
            Primitive::Scal => Ok(operands[1].clone()),
            Primitive::Asum | Primitive::Nrm2 => Ok(ValueSpec::Scalar),
            Primitive::Axpy => {
                let x = expect_vector(&operands[1]);
                let y = expect_vector(&operands[2]);
                if x != y {
                    return Err(Error::ShapeMismatch {
                        primitive: name,
                        expected: format!("y of length {x}"),
                        actual: format!("y of length {y}"),
                    });
                }
                Ok(operands[2].clone())
            }
            Primitive::Gemv => {
                let a = expect_matrix(&operands[1]);
                let x = expect_vector(&operands[2]);
                let y = expect_vector(&operands[4]);
                let (m, k) = oriented(a, flags.trans_a);
                if x != k {
                    return Err(Error::ShapeMismatch {
                        primitive: name,
                        expected: format!("x of length {k}"),
                        actual: format!("x of length {x}"),
                    });
                }
                if y != m {
                    return Err(Error::ShapeMismatch {
                        primitive: name,
                        expected: format!("y of length {m}"),
                        actual: format!("y of length {y}"),
                    });
                }
                Ok(ValueSpec::Array(Shape::new([m])))
            }
            Primitive::Ger => {
                let x = expect_vector(&operands[1]);
                let y = expect_vector(&operands[2]);
                let a = expect_matrix(&operands[3]);
                if (a.rows(), a.cols()) != (x, y) {
                    return Err(Error::ShapeMismatch {
                        primitive: name,
                        expected: format!("A of shape {x}x{y}"),
                        actual: format!("A of shape {a}"),
                    });
                }
                Ok(ValueSpec::Array(a.clone()))
            }
        }
    }
}

fn expect_matrix(spec: &ValueSpec) -> &Shape {
    match spec {
        ValueSpec::Array(shape) => shape,
        ValueSpec::Scalar => unreachable!("role check admits only matrices here"),
    }
}

fn expect_vector(spec: &ValueSpec) -> usize {
    match spec {
        ValueSpec::Array(shape) => shape.num_elements(),
        ValueSpec::Scalar => unreachable!("role check admits only vectors here"),
    }
}

/// `(rows, cols)` of the stored matrix after applying a transpose flag.
fn oriented(shape: &Shape, transposed: bool) -> (usize, usize) {
    if transposed {
        (shape.cols(), shape.rows())
    } else {
        (shape.rows(), shape.cols())
    }
}

/// Registry mapping primitive names to their signatures.
#[derive(Debug, Default)]
pub struct Catalog {
    signatures: HashMap<&'static str, PrimitiveSignature>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            signatures: HashMap::new(),
        }
    }

    /// Catalog pre-populated with the full primitive vocabulary.
    pub fn with_builtins() -> Self {
        let mut catalog = Catalog::new();
        for primitive in Primitive::ALL {
            catalog
                .register(PrimitiveSignature::new(primitive))
                .expect("builtin primitives are distinct");
        }
        catalog
    }

    pub fn register(&mut self, signature: PrimitiveSignature) -> Result<()> {
        let name = signature.primitive.name();
        if self.signatures.contains_key(name) {
            return Err(Error::DuplicatePrimitive(name));
        }
        self.signatures.insert(name, signature);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&PrimitiveSignature> {
        self.signatures
            .get(name)
            .ok_or_else(|| Error::UnknownPrimitive(name.to_string()))
    }

    /// Validates operand shapes for `name` and returns the result spec.
    pub fn validate(
        &self,
        name: &str,
        flags: PrimitiveFlags,
        operands: &[ValueSpec],
    ) -> Result<ValueSpec> {
        self.lookup(name)?.result_spec(flags, operands)
    }
}

static CATALOG: OnceLock<Catalog> = OnceLock::new();

/// The process-wide catalog, populated once with the builtin vocabulary.
pub fn catalog() -> &'static Catalog {
    CATALOG.get_or_init(Catalog::with_builtins)
}
