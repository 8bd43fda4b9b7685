//! Test double wrapping any adapter with an execute-call counter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lintra::{BackendAdapter, Primitive, PrimitiveFlags, Value};

/// Delegating adapter that counts `execute` invocations.
///
/// Registered in place of the wrapped adapter, it makes dispatch decisions
/// observable: a test asserts how many primitive executions actually
/// reached a given backend.
pub struct CountingAdapter {
    inner: Arc<dyn BackendAdapter>,
    executes: AtomicUsize,
}

impl CountingAdapter {
    pub fn new(inner: Arc<dyn BackendAdapter>) -> Self {
        CountingAdapter {
            inner,
            executes: AtomicUsize::new(0),
        }
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }
}

impl BackendAdapter for CountingAdapter {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn supports(&self, primitive: Primitive) -> bool {
        self.inner.supports(primitive)
    }

    fn execute(
        &self,
        primitive: Primitive,
        flags: PrimitiveFlags,
        operands: &[Value],
    ) -> lintra::Result<Value> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(primitive, flags, operands)
    }
}
