//! Codegen backend: lowers each primitive into loop code specialized to the
//! concrete shapes seen at the first call, then replays the compiled kernel
//! on every later call with matching shapes.
//!
//! The compile cache is keyed by (primitive, flags, operand shapes). Each
//! entry carries its own one-shot slot: the first caller for a key compiles
//! and stores the kernel, concurrent callers for the same uncached key block
//! until the artifact lands, and at most one artifact is ever cached per
//! key. A shape change produces a new key and touches no existing entry.

mod env;
mod lower;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use lru::LruCache;

use lintra::hashing::hash_serializable;
use lintra::{profiling, BackendAdapter, Error, Primitive, PrimitiveFlags, Value};

use lower::{lower_kernel, Kernel};

const BACKEND_NAME: &str = "codegen";

pub struct CodegenBackend {
    cache: Mutex<LruCache<u64, Arc<OnceLock<Arc<Kernel>>>>>,
    compiles: AtomicUsize,
}

impl CodegenBackend {
    pub fn new() -> Self {
        Self::with_capacity(env::cache_capacity())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        CodegenBackend {
            cache: Mutex::new(LruCache::new(capacity)),
            compiles: AtomicUsize::new(0),
        }
    }

    /// Number of kernels compiled by this adapter instance.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    fn kernel_slot(&self, key: u64) -> Arc<OnceLock<Arc<Kernel>>> {
        let mut cache = self.cache.lock().expect("codegen kernel cache poisoned");
        if let Some(slot) = cache.get(&key) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(OnceLock::new());
        cache.put(key, Arc::clone(&slot));
        slot
    }
}

impl Default for CodegenBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendAdapter for CodegenBackend {
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
        let key = kernel_fingerprint(primitive, flags, operands)?;
        let slot = self.kernel_slot(key);

        let mut compiled_here = false;
        let kernel = slot.get_or_init(|| {
            compiled_here = true;
            Arc::new(lower_kernel(primitive, flags, operands))
        });
        if compiled_here {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            profiling::cache_event("codegen.compile");
        } else {
            profiling::cache_event("codegen.kernel_hit");
        }

        (kernel.run)(operands)
    }
}

/// Stable cache key over the primitive, its flags, and the operand shapes.
///
/// Scalars contribute a `None` entry so an operand list that swaps a scalar
/// for an array can never collide with the original key.
fn kernel_fingerprint(
    primitive: Primitive,
    flags: PrimitiveFlags,
    operands: &[Value],
) -> lintra::Result<u64> {
    let shapes: Vec<Option<Vec<usize>>> = operands
        .iter()
        .map(|value| value.as_array().map(|a| a.shape().dims().to_vec()))
        .collect();
    hash_serializable(&(primitive, flags, shapes)).map_err(|e| Error::BackendExecutionFailed {
        backend: BACKEND_NAME,
        primitive: primitive.name(),
        message: format!("kernel key could not be fingerprinted: {e}"),
    })
}

/// Register the codegen backend with the global adapter registry.
///
/// Called automatically via a static initializer; safe to call again.
pub fn register_codegen_backend() {
    lintra::register_adapter(Arc::new(CodegenBackend::new()));
}

#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_CODEGEN_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_codegen_backend();
    }
    register
};

#[cfg(test)]
mod tests {
    use super::*;
    use lintra::{Array, Shape};

    fn gemm_args(n: usize) -> Vec<Value> {
        let ones = || Value::Array(Array::ones(Shape::new([n, n])));
        vec![Value::Scalar(2.0), ones(), ones(), Value::Scalar(1.0), ones()]
    }

    #[test]
    fn matching_shapes_reuse_the_compiled_kernel() {
        let backend = CodegenBackend::new();
        let args = gemm_args(2);

        backend
            .execute(Primitive::Gemm, PrimitiveFlags::default(), &args)
            .unwrap();
        assert_eq!(backend.compile_count(), 1);

        backend
            .execute(Primitive::Gemm, PrimitiveFlags::default(), &args)
            .unwrap();
        assert_eq!(backend.compile_count(), 1);
    }

    #[test]
    fn shape_change_compiles_a_new_kernel_only() {
        let backend = CodegenBackend::new();
        backend
            .execute(Primitive::Gemm, PrimitiveFlags::default(), &gemm_args(2))
            .unwrap();
        backend
            .execute(Primitive::Gemm, PrimitiveFlags::default(), &gemm_args(3))
            .unwrap();
        assert_eq!(backend.compile_count(), 2);

        // The original entry is still cached.
        backend
            .execute(Primitive::Gemm, PrimitiveFlags::default(), &gemm_args(2))
            .unwrap();
        assert_eq!(backend.compile_count(), 2);
    }

    #[test]
    fn transpose_flags_partition_the_cache() {
        let backend = CodegenBackend::new();
        let args = gemm_args(2);
        backend
            .execute(Primitive::Gemm, PrimitiveFlags::default(), &args)
            .unwrap();
        backend
            .execute(Primitive::Gemm, PrimitiveFlags::transpose(true, false), &args)
            .unwrap();
        assert_eq!(backend.compile_count(), 2);
    }

    #[test]
    fn concurrent_first_calls_cache_one_artifact() {
        let backend = Arc::new(CodegenBackend::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let backend = Arc::clone(&backend);
            handles.push(std::thread::spawn(move || {
                backend
                    .execute(Primitive::Gemm, PrimitiveFlags::default(), &gemm_args(4))
                    .unwrap()
            }));
        }
        let results: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(backend.compile_count(), 1);
        for result in &results {
            assert_eq!(result, &results[0]);
        }
    }

    #[test]
    fn gemm_kernel_fuses_alpha_and_beta() {
        let backend = CodegenBackend::new();
        let result = backend
            .execute(Primitive::Gemm, PrimitiveFlags::default(), &gemm_args(2))
            .unwrap();
        let out = result.into_array().unwrap();
        assert!(out.data().iter().all(|&v| v == 5.0));
    }
}
