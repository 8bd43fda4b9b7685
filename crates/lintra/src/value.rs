//! Dense host-backed array values threaded between computation nodes.

use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Stores the logical dimensions of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if `dims` is empty, ensuring every array has at least one axis.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        let dims = dims.into();
        assert!(!dims.is_empty(), "shape must have at least one dimension");
        Shape { dims }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_vector(&self) -> bool {
        self.rank() == 1
    }

    pub fn is_matrix(&self) -> bool {
        self.rank() == 2
    }

    /// Row count of a rank-2 shape.
    ///
    /// Panics when the shape is not a matrix; callers validate rank first.
    pub fn rows(&self) -> usize {
        assert!(self.is_matrix(), "rows() requires a rank-2 shape");
        self.dims[0]
    }

    /// Column count of a rank-2 shape.
    pub fn cols(&self) -> usize {
        assert!(self.is_matrix(), "cols() requires a rank-2 shape");
        self.dims[1]
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", rendered.join("x"))
    }
}

/// Dense row-major `f64` array used for primitive operands and results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    shape: Shape,
    data: Vec<f64>,
}

impl Array {
    /// Constructs an array from raw values, validating the length against the shape.
    pub fn from_vec(shape: Shape, data: Vec<f64>) -> Result<Self> {
        if data.len() != shape.num_elements() {
            bail!(
                "array data length ({}) does not match shape {}",
                data.len(),
                shape
            );
        }
        Ok(Array { shape, data })
    }

    /// Constructs a row-major matrix, validating the payload length.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        Self::from_vec(Shape::new([rows, cols]), data)
    }

    /// Constructs a rank-1 vector from the provided values.
    ///
    /// Panics on an empty payload, matching the non-empty shape invariant.
    pub fn vector(data: Vec<f64>) -> Self {
        assert!(!data.is_empty(), "vector must have at least one element");
        Array {
            shape: Shape::new([data.len()]),
            data,
        }
    }

    /// Returns a zero-initialized array of the requested shape.
    pub fn zeros(shape: Shape) -> Self {
        let len = shape.num_elements();
        Array {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Returns a one-initialized array of the requested shape.
    pub fn ones(shape: Shape) -> Self {
        let len = shape.num_elements();
        Array {
            shape,
            data: vec![1.0; len],
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Returns the total number of elements stored in the array.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at `(row, col)` of a rank-2 array.
    pub fn at(&self, row: usize, col: usize) -> f64 {
        let cols = self.shape.cols();
        self.data[row * cols + col]
    }

    /// Structural comparison within a relative tolerance, used when
    /// checking agreement across backends.
    pub fn approx_eq(&self, other: &Array, rel_tol: f64) -> bool {
        if self.shape != other.shape {
            return false;
        }
        self.data
            .iter()
            .zip(other.data.iter())
            .all(|(a, b)| approx_scalar(*a, *b, rel_tol))
    }
}

/// A value flowing along a graph edge: a scalar or a dense array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(f64),
    Array(Array),
}

impl Value {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Scalar(_) => None,
            Value::Array(a) => Some(a),
        }
    }

    pub fn into_array(self) -> Option<Array> {
        match self {
            Value::Scalar(_) => None,
            Value::Array(a) => Some(a),
        }
    }

    /// The shape-level description used by catalog validation.
    pub fn spec(&self) -> ValueSpec {
        match self {
            Value::Scalar(_) => ValueSpec::Scalar,
            Value::Array(a) => ValueSpec::Array(a.shape().clone()),
        }
    }

    pub fn approx_eq(&self, other: &Value, rel_tol: f64) -> bool {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => approx_scalar(*a, *b, rel_tol),
            (Value::Array(a), Value::Array(b)) => a.approx_eq(b, rel_tol),
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

/// Shape-level view of a value, without its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSpec {
    Scalar,
    Array(Shape),
}

impl fmt::Display for ValueSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSpec::Scalar => write!(f, "scalar"),
            ValueSpec::Array(shape) => write!(f, "array [{shape}]"),
        }
    }
}

fn approx_scalar(a: f64, b: f64, rel_tol: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= rel_tol * scale
}
