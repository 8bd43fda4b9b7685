//! Conformance suite run against each adapter: results must agree with the
//! loop oracle within the cross-backend tolerance, for square and
//! non-square shapes and every transpose-flag combination.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lintra::{Array, BackendAdapter, Primitive, PrimitiveFlags, Shape, Value};

use crate::reference;

/// Relative tolerance all backends must agree within.
pub const REL_TOLERANCE: f64 = 1e-9;

fn random_array(rng: &mut StdRng, shape: Shape) -> Value {
    let data = (0..shape.num_elements())
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    Value::Array(Array::from_vec(shape, data).expect("random array shape"))
}

fn assert_matches_reference(
    backend: &impl BackendAdapter,
    primitive: Primitive,
    flags: PrimitiveFlags,
    operands: &[Value],
    context: &str,
) {
    let actual = backend
        .execute(primitive, flags, operands)
        .unwrap_or_else(|e| panic!("{} failed on `{context}`: {e}", backend.name()));
    let expected = reference::evaluate(primitive, flags, operands);
    assert!(
        actual.approx_eq(&expected, REL_TOLERANCE),
        "{} disagrees with reference on `{context}`: {actual:?} vs {expected:?}",
        backend.name()
    );
}

pub fn gemm_matches_reference(backend: &impl BackendAdapter) {
    let mut rng = StdRng::seed_from_u64(7);
    // (m, k, n) covering square and rectangular cases.
    for (m, k, n) in [(4, 4, 4), (3, 5, 2), (1, 7, 3)] {
        for trans_a in [false, true] {
            for trans_b in [false, true] {
                let flags = PrimitiveFlags::transpose(trans_a, trans_b);
                let a_shape = if trans_a { [k, m] } else { [m, k] };
                let b_shape = if trans_b { [n, k] } else { [k, n] };
                let operands = [
                    Value::Scalar(rng.gen_range(-2.0..2.0)),
                    random_array(&mut rng, Shape::new(a_shape)),
                    random_array(&mut rng, Shape::new(b_shape)),
                    Value::Scalar(rng.gen_range(-2.0..2.0)),
                    random_array(&mut rng, Shape::new([m, n])),
                ];
                let context =
                    format!("gemm m={m} k={k} n={n} trans_a={trans_a} trans_b={trans_b}");
                assert_matches_reference(backend, Primitive::Gemm, flags, &operands, &context);
            }
        }
    }
}

pub fn gemm_ones_closed_form(backend: &impl BackendAdapter) {
    let n = 2;
    let ones = || Value::Array(Array::ones(Shape::new([n, n])));
    let result = backend
        .execute(
            Primitive::Gemm,
            PrimitiveFlags::default(),
            &[Value::Scalar(2.0), ones(), ones(), Value::Scalar(1.0), ones()],
        )
        .expect("gemm over ones");
    let out = result.into_array().expect("matrix result");
    // alpha sums N ones, plus beta: every entry is 2 * N + 1.
    assert!(out.data().iter().all(|&v| v == 5.0));
}

pub fn gemv_matches_reference(backend: &impl BackendAdapter) {
    let mut rng = StdRng::seed_from_u64(11);
    for (m, k) in [(4, 4), (3, 6)] {
        for trans_a in [false, true] {
            let flags = PrimitiveFlags::transpose(trans_a, false);
            let a_shape = if trans_a { [k, m] } else { [m, k] };
            let operands = [
                Value::Scalar(rng.gen_range(-2.0..2.0)),
                random_array(&mut rng, Shape::new(a_shape)),
                random_array(&mut rng, Shape::new([k])),
                Value::Scalar(rng.gen_range(-2.0..2.0)),
                random_array(&mut rng, Shape::new([m])),
            ];
            let context = format!("gemv m={m} k={k} trans_a={trans_a}");
            assert_matches_reference(backend, Primitive::Gemv, flags, &operands, &context);
        }
    }
}

pub fn ger_matches_reference(backend: &impl BackendAdapter) {
    let mut rng = StdRng::seed_from_u64(13);
    for (m, n) in [(4, 4), (2, 5)] {
        let operands = [
            Value::Scalar(rng.gen_range(-2.0..2.0)),
            random_array(&mut rng, Shape::new([m])),
            random_array(&mut rng, Shape::new([n])),
            random_array(&mut rng, Shape::new([m, n])),
        ];
        let context = format!("ger m={m} n={n}");
        assert_matches_reference(
            backend,
            Primitive::Ger,
            PrimitiveFlags::default(),
            &operands,
            &context,
        );
    }
}

pub fn level1_matches_reference(backend: &impl BackendAdapter) {
    let mut rng = StdRng::seed_from_u64(17);
    for len in [1, 4, 9] {
        let x = random_array(&mut rng, Shape::new([len]));
        let y = random_array(&mut rng, Shape::new([len]));
        let alpha = Value::Scalar(rng.gen_range(-2.0..2.0));

        assert_matches_reference(
            backend,
            Primitive::Scal,
            PrimitiveFlags::default(),
            &[alpha.clone(), x.clone()],
            &format!("scal len={len}"),
        );
        assert_matches_reference(
            backend,
            Primitive::Axpy,
            PrimitiveFlags::default(),
            &[alpha.clone(), x.clone(), y],
            &format!("axpy len={len}"),
        );
        for incx in [1, 2] {
            assert_matches_reference(
                backend,
                Primitive::Asum,
                PrimitiveFlags::default(),
                &[Value::Scalar(1.0), x.clone(), Value::Scalar(incx as f64)],
                &format!("asum len={len} incx={incx}"),
            );
            assert_matches_reference(
                backend,
                Primitive::Nrm2,
                PrimitiveFlags::default(),
                &[Value::Scalar(1.0), x.clone(), Value::Scalar(incx as f64)],
                &format!("nrm2 len={len} incx={incx}"),
            );
        }
    }
}

pub fn reductions_match_pinned_values(backend: &impl BackendAdapter) {
    let norm = backend
        .execute(
            Primitive::Nrm2,
            PrimitiveFlags::default(),
            &[
                Value::Scalar(1.0),
                Value::Array(Array::vector(vec![1.0, -2.0, 1.0, 1.0])),
                Value::Scalar(1.0),
            ],
        )
        .expect("nrm2");
    let norm = norm.as_scalar().expect("scalar result");
    assert!((norm - 7.0_f64.sqrt()).abs() < REL_TOLERANCE);

    let sum = backend
        .execute(
            Primitive::Asum,
            PrimitiveFlags::default(),
            &[
                Value::Scalar(2.0),
                Value::Array(Array::ones(Shape::new([4]))),
                Value::Scalar(1.0),
            ],
        )
        .expect("asum");
    assert_eq!(sum.as_scalar(), Some(8.0));
}
