//! Every supported primitive must produce numerically equivalent results
//! across the native, codegen, and expression-template adapters.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lintra::{Array, BackendAdapter, Primitive, PrimitiveFlags, Shape, Value};
use lintra_backend_codegen::CodegenBackend;
use lintra_backend_expr::ExprTemplateBackend;
use lintra_backend_native::NativeBackend;
use lintra_backend_tests::parity::REL_TOLERANCE;

fn adapters() -> Vec<Box<dyn BackendAdapter>> {
    vec![
        Box::new(NativeBackend::new()),
        Box::new(CodegenBackend::new()),
        Box::new(ExprTemplateBackend::new()),
    ]
}

fn random_array(rng: &mut StdRng, shape: Shape) -> Value {
    let data = (0..shape.num_elements())
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    Value::Array(Array::from_vec(shape, data).expect("random array shape"))
}

fn assert_all_agree(
    primitive: Primitive,
    flags: PrimitiveFlags,
    operands: &[Value],
    context: &str,
) {
    let adapters = adapters();
    let results: Vec<(&'static str, Value)> = adapters
        .iter()
        .map(|adapter| {
            let result = adapter
                .execute(primitive, flags, operands)
                .unwrap_or_else(|e| panic!("{} failed on `{context}`: {e}", adapter.name()));
            (adapter.name(), result)
        })
        .collect();
    let (base_name, base) = &results[0];
    for (name, result) in &results[1..] {
        assert!(
            result.approx_eq(base, REL_TOLERANCE),
            "`{context}`: {name} disagrees with {base_name}: {result:?} vs {base:?}"
        );
    }
}

#[test]
fn gemm_agrees_across_backends() {
    let mut rng = StdRng::seed_from_u64(23);
    for (m, k, n) in [(4, 4, 4), (3, 5, 2)] {
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
                assert_all_agree(Primitive::Gemm, flags, &operands, &context);
            }
        }
    }
}

#[test]
fn gemv_agrees_across_backends() {
    let mut rng = StdRng::seed_from_u64(29);
    for (m, k) in [(4, 4), (2, 6)] {
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
            assert_all_agree(
                Primitive::Gemv,
                flags,
                &operands,
                &format!("gemv m={m} k={k} trans_a={trans_a}"),
            );
        }
    }
}

#[test]
fn vector_primitives_agree_across_backends() {
    let mut rng = StdRng::seed_from_u64(31);
    for len in [1, 5, 8] {
        let x = random_array(&mut rng, Shape::new([len]));
        let y = random_array(&mut rng, Shape::new([len]));
        let alpha = Value::Scalar(rng.gen_range(-2.0..2.0));

        assert_all_agree(
            Primitive::Scal,
            PrimitiveFlags::default(),
            &[alpha.clone(), x.clone()],
            &format!("scal len={len}"),
        );
        assert_all_agree(
            Primitive::Axpy,
            PrimitiveFlags::default(),
            &[alpha.clone(), x.clone(), y.clone()],
            &format!("axpy len={len}"),
        );
        for incx in [1, 2] {
            assert_all_agree(
                Primitive::Asum,
                PrimitiveFlags::default(),
                &[Value::Scalar(2.0), x.clone(), Value::Scalar(incx as f64)],
                &format!("asum len={len} incx={incx}"),
            );
            assert_all_agree(
                Primitive::Nrm2,
                PrimitiveFlags::default(),
                &[Value::Scalar(1.0), x.clone(), Value::Scalar(incx as f64)],
                &format!("nrm2 len={len} incx={incx}"),
            );
        }
    }
}

#[test]
fn ger_agrees_across_backends() {
    let mut rng = StdRng::seed_from_u64(37);
    for (m, n) in [(3, 3), (4, 2)] {
        let operands = [
            Value::Scalar(rng.gen_range(-2.0..2.0)),
            random_array(&mut rng, Shape::new([m])),
            random_array(&mut rng, Shape::new([n])),
            random_array(&mut rng, Shape::new([m, n])),
        ];
        assert_all_agree(
            Primitive::Ger,
            PrimitiveFlags::default(),
            &operands,
            &format!("ger m={m} n={n}"),
        );
    }
}
