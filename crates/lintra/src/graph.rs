//! Expression capture: turning an annotated function into a reusable
//! computation description.
//!
//! A [`FunctionDef`] is traced exactly once into an immutable
//! [`ComputationDescription`]: a DAG of input slots, constants, primitive
//! calls, and arithmetic nodes stored in emission order, which is the
//! topological order the engine replays on every call. Capture records
//! structure only; no array arithmetic is evaluated. Descriptions are
//! cached per definition fingerprint so re-capturing an identical
//! definition is a pure lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use serde::Serialize;
use smallvec::SmallVec;

use crate::catalog::{catalog, Primitive, PrimitiveFlags};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::hashing::hash_serializable;
use crate::profiling;
use crate::session::global_session;
use crate::value::{Array, Value};

/// Index of a node inside a description's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Elementwise and scalar combinators recognized alongside the primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithmeticOp {
    /// Elementwise sum of two operands of identical shape.
    Add,
    /// Elementwise difference of two operands of identical shape.
    Sub,
    /// Scalar-weighted operand: `scalar * value`.
    Scale,
}

impl ArithmeticOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Scale => "scale",
        }
    }
}

/// One node of a captured computation.
#[derive(Debug, Clone, Serialize)]
pub enum Node {
    /// Positional parameter placeholder, bound on every call.
    InputSlot { index: usize },
    /// Compile-time known scalar or array.
    Constant(Value),
    /// Catalog primitive with compile-time flags and operand references.
    PrimitiveCall {
        primitive: Primitive,
        flags: PrimitiveFlags,
        operands: SmallVec<[NodeId; 5]>,
    },
    /// Arithmetic combination evaluated by the engine without dispatch.
    Arithmetic {
        op: ArithmeticOp,
        operands: SmallVec<[NodeId; 2]>,
    },
}

/// Immutable, once-built DAG describing one annotated function body.
///
/// Nodes are stored in a topological order fixed at capture time; every
/// operand reference points at an earlier node, and the input slots appear
/// first, one per declared parameter, in declaration order.
#[derive(Debug, Serialize)]
pub struct ComputationDescription {
    name: String,
    arity: usize,
    nodes: Vec<Node>,
    output: NodeId,
    backend: Option<String>,
    distributed: bool,
    fingerprint: u64,
}

impl ComputationDescription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Explicit backend requested for every primitive in this computation.
    pub fn backend_hint(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    /// Whether evaluation requires the distributed session.
    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    /// Structural fingerprint identifying the originating definition.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// Body expression of an annotated function.
///
/// The vocabulary is closed: parameters, literals, catalog primitives, the
/// arithmetic combinators, and composition through an already-captured
/// computation. Anything else fails capture with `UnsupportedExpression`.
#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    Param(usize),
    Scalar(f64),
    Array(Array),
    Call {
        name: String,
        flags: PrimitiveFlags,
        args: Vec<Expr>,
    },
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Scale(Box<Expr>, Box<Expr>),
    Compose {
        callee: Arc<ComputationDescription>,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn param(index: usize) -> Expr {
        Expr::Param(index)
    }

    pub fn scalar(value: f64) -> Expr {
        Expr::Scalar(value)
    }

    pub fn array(value: Array) -> Expr {
        Expr::Array(value)
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.into(),
            flags: PrimitiveFlags::default(),
            args,
        }
    }

    pub fn call_with_flags(
        name: impl Into<String>,
        flags: PrimitiveFlags,
        args: Vec<Expr>,
    ) -> Expr {
        Expr::Call {
            name: name.into(),
            flags,
            args,
        }
    }

    pub fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }

    pub fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    /// Scalar-weighted value: `self` must evaluate to a scalar.
    pub fn scale(self, value: Expr) -> Expr {
        Expr::Scale(Box::new(self), Box::new(value))
    }

    /// Composition through an already-captured computation.
    pub fn compose(callee: &Arc<ComputationDescription>, args: Vec<Expr>) -> Expr {
        Expr::Compose {
            callee: Arc::clone(callee),
            args,
        }
    }
}

/// An annotated function submitted for capture: declared parameters plus a
/// body expression over them.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDef {
    name: String,
    params: Vec<String>,
    body: Expr,
    backend: Option<String>,
    distributed: bool,
}

impl FunctionDef {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = S>,
        body: Expr,
    ) -> Self {
        FunctionDef {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            body,
            backend: None,
            distributed: false,
        }
    }

    /// Requests a named backend for every primitive in this function.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Marks the computation for distributed placement across localities.
    pub fn distributed(mut self) -> Self {
        self.distributed = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

static CAPTURE_CACHE: Lazy<Mutex<HashMap<u64, Arc<ComputationDescription>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Captures `def` into a computation description, at most once per distinct
/// definition.
///
/// A repeated capture of the same definition returns the cached
/// description without re-tracing the body.
pub fn capture(def: &FunctionDef) -> Result<Arc<ComputationDescription>> {
    let fingerprint = hash_serializable(def).map_err(|e| Error::UnsupportedExpression {
        function: def.name.clone(),
        detail: format!("definition could not be fingerprinted: {e}"),
    })?;

    if let Some(found) = CAPTURE_CACHE
        .lock()
        .expect("capture cache poisoned")
        .get(&fingerprint)
    {
        profiling::cache_event("capture.cache_hit");
        return Ok(Arc::clone(found));
    }

    profiling::cache_event("capture.trace");
    let description = Arc::new(trace(def, fingerprint)?);
    let mut cache = CAPTURE_CACHE.lock().expect("capture cache poisoned");
    let entry = cache
        .entry(fingerprint)
        .or_insert_with(|| Arc::clone(&description));
    Ok(Arc::clone(entry))
}

/// The annotation boundary: capture `def` and wrap the description in a
/// callable that binds arguments and evaluates on each invocation.
pub fn annotate(def: &FunctionDef) -> Result<Callable> {
    Ok(Callable {
        description: capture(def)?,
    })
}

/// A captured computation bound to the process-wide session, invokable
/// with fresh argument values.
#[derive(Clone)]
pub struct Callable {
    description: Arc<ComputationDescription>,
}

impl Callable {
    pub fn description(&self) -> &Arc<ComputationDescription> {
        &self.description
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let engine = Engine::new(Arc::clone(global_session()));
        engine.evaluate(&self.description, args)
    }
}

struct Tracer<'a> {
    def: &'a FunctionDef,
    nodes: Vec<Node>,
    slots: Vec<NodeId>,
}

impl<'a> Tracer<'a> {
    fn unsupported(&self, detail: impl Into<String>) -> Error {
        Error::UnsupportedExpression {
            function: self.def.name().to_string(),
            detail: detail.into(),
        }
    }

    fn emit(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn lower(&mut self, expr: &Expr) -> Result<NodeId> {
        match expr {
            Expr::Param(index) => self
                .slots
                .get(*index)
                .copied()
                .ok_or_else(|| {
                    self.unsupported(format!(
                        "parameter index {index} out of range for {} declared parameters",
                        self.def.params().len()
                    ))
                }),
            Expr::Scalar(value) => Ok(self.emit(Node::Constant(Value::Scalar(*value)))),
            Expr::Array(value) => Ok(self.emit(Node::Constant(Value::Array(value.clone())))),
            Expr::Call { name, flags, args } => {
                let signature = catalog().lookup(name).map_err(|_| {
                    self.unsupported(format!("`{name}` is not a recognized primitive"))
                })?;
                if args.len() != signature.arity() {
                    return Err(self.unsupported(format!(
                        "`{name}` takes {} operands, {} were given",
                        signature.arity(),
                        args.len()
                    )));
                }
                let primitive = signature.primitive();
                let mut operands = SmallVec::new();
                for arg in args {
                    operands.push(self.lower(arg)?);
                }
                Ok(self.emit(Node::PrimitiveCall {
                    primitive,
                    flags: *flags,
                    operands,
                }))
            }
            Expr::Add(lhs, rhs) => self.lower_arithmetic(ArithmeticOp::Add, lhs, rhs),
            Expr::Sub(lhs, rhs) => self.lower_arithmetic(ArithmeticOp::Sub, lhs, rhs),
            Expr::Scale(scalar, value) => self.lower_arithmetic(ArithmeticOp::Scale, scalar, value),
            Expr::Compose { callee, args } => {
                if args.len() != callee.arity() {
                    return Err(self.unsupported(format!(
                        "composed computation `{}` takes {} arguments, {} were given",
                        callee.name(),
                        callee.arity(),
                        args.len()
                    )));
                }
                let mut bound = Vec::with_capacity(args.len());
                for arg in args {
                    bound.push(self.lower(arg)?);
                }
                Ok(self.inline(callee, &bound))
            }
        }
    }

    fn lower_arithmetic(&mut self, op: ArithmeticOp, lhs: &Expr, rhs: &Expr) -> Result<NodeId> {
        let lhs = self.lower(lhs)?;
        let rhs = self.lower(rhs)?;
        let mut operands = SmallVec::new();
        operands.push(lhs);
        operands.push(rhs);
        Ok(self.emit(Node::Arithmetic { op, operands }))
    }

    /// Splices a captured callee into this arena, substituting the bound
    /// argument nodes for its input slots.
    fn inline(&mut self, callee: &ComputationDescription, bound: &[NodeId]) -> NodeId {
        let mut remap: HashMap<NodeId, NodeId> = HashMap::with_capacity(callee.nodes().len());
        for (index, node) in callee.nodes().iter().enumerate() {
            let old = NodeId(index as u32);
            let new = match node {
                Node::InputSlot { index } => bound[*index],
                Node::Constant(value) => self.emit(Node::Constant(value.clone())),
                Node::PrimitiveCall {
                    primitive,
                    flags,
                    operands,
                } => {
                    let operands = operands.iter().map(|id| remap[id]).collect();
                    self.emit(Node::PrimitiveCall {
                        primitive: *primitive,
                        flags: *flags,
                        operands,
                    })
                }
                Node::Arithmetic { op, operands } => {
                    let operands = operands.iter().map(|id| remap[id]).collect();
                    self.emit(Node::Arithmetic { op: *op, operands })
                }
            };
            remap.insert(old, new);
        }
        remap[&callee.output()]
    }
}

fn trace(def: &FunctionDef, fingerprint: u64) -> Result<ComputationDescription> {
    let mut tracer = Tracer {
        def,
        nodes: Vec::new(),
        slots: Vec::new(),
    };
    for index in 0..def.params.len() {
        let slot = tracer.emit(Node::InputSlot { index });
        tracer.slots.push(slot);
    }
    let output = tracer.lower(&def.body)?;

    let description = ComputationDescription {
        name: def.name.clone(),
        arity: def.params.len(),
        nodes: tracer.nodes,
        output,
        backend: def.backend.clone(),
        distributed: def.distributed,
        fingerprint,
    };
    debug_assert!(description_is_topological(&description));
    Ok(description)
}

/// Every operand reference must point at an earlier node.
fn description_is_topological(description: &ComputationDescription) -> bool {
    description.nodes().iter().enumerate().all(|(index, node)| {
        let operands: &[NodeId] = match node {
            Node::InputSlot { .. } | Node::Constant(_) => &[],
            Node::PrimitiveCall { operands, .. } => operands,
            Node::Arithmetic { operands, .. } => operands,
        };
        operands.iter().all(|id| id.index() < index)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Shape;

    fn axpy_def(tag: &str) -> FunctionDef {
        FunctionDef::new(
            format!("axpy_{tag}"),
            ["alpha", "x", "y"],
            Expr::call(
                "axpy",
                vec![Expr::param(0), Expr::param(1), Expr::param(2)],
            ),
        )
    }

    #[test]
    fn capture_is_cached_per_definition() {
        let def = axpy_def("cache");
        let first = capture(&def).unwrap();
        let second = capture(&def).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn distinct_definitions_do_not_share_descriptions() {
        let first = capture(&axpy_def("one")).unwrap();
        let second = capture(&axpy_def("two")).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn input_slots_match_parameter_list() {
        let description = capture(&axpy_def("slots")).unwrap();
        assert_eq!(description.arity(), 3);
        for index in 0..3 {
            match description.nodes()[index] {
                Node::InputSlot { index: slot } => assert_eq!(slot, index),
                ref other => panic!("expected input slot, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_primitive_is_unsupported_at_capture() {
        let def = FunctionDef::new(
            "bad_primitive",
            ["x"],
            Expr::call("cholesky", vec![Expr::param(0)]),
        );
        let err = capture(&def).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression { .. }));
    }

    #[test]
    fn wrong_operand_count_is_unsupported_at_capture() {
        let def = FunctionDef::new(
            "bad_arity",
            ["x"],
            Expr::call("axpy", vec![Expr::param(0)]),
        );
        assert!(matches!(
            capture(&def),
            Err(Error::UnsupportedExpression { .. })
        ));
    }

    #[test]
    fn out_of_range_parameter_is_unsupported_at_capture() {
        let def = FunctionDef::new("bad_param", ["x"], Expr::param(3));
        assert!(matches!(
            capture(&def),
            Err(Error::UnsupportedExpression { .. })
        ));
    }

    #[test]
    fn capture_does_not_evaluate_array_arithmetic() {
        // A shape-invalid constant body must still capture; shapes are a
        // per-call concern.
        let def = FunctionDef::new(
            "deferred",
            Vec::<String>::new(),
            Expr::array(Array::ones(Shape::new([2])))
                .add(Expr::array(Array::ones(Shape::new([3])))),
        );
        assert!(capture(&def).is_ok());
    }

    #[test]
    fn composition_inlines_the_callee() {
        let scale = capture(&FunctionDef::new(
            "just_scal",
            ["a", "x"],
            Expr::call("scal", vec![Expr::param(0), Expr::param(1)]),
        ))
        .unwrap();

        let composed = capture(&FunctionDef::new(
            "scal_twice",
            ["a", "x"],
            Expr::compose(
                &scale,
                vec![
                    Expr::param(0),
                    Expr::compose(&scale, vec![Expr::param(0), Expr::param(1)]),
                ],
            ),
        ))
        .unwrap();

        let primitive_calls = composed
            .nodes()
            .iter()
            .filter(|node| matches!(node, Node::PrimitiveCall { .. }))
            .count();
        assert_eq!(primitive_calls, 2);
    }
}
