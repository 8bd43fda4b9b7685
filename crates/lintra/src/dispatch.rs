//! Backend adapter interface and primitive-to-adapter selection.
//!
//! Backend crates register their adapters here at load time. Selection is
//! deterministic and side-effect-free: an explicit hint names the adapter
//! outright, otherwise the fixed priority order decides.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::catalog::{Primitive, PrimitiveFlags};
use crate::env;
use crate::error::{Error, Result};
use crate::value::Value;

/// A stateless execution strategy for catalog primitives.
///
/// Adapters hold no per-call state; any internal caches (e.g. compiled
/// kernels) are their own concern and must be safe under concurrent
/// `execute` calls.
pub trait BackendAdapter: Send + Sync {
    /// Stable adapter identifier, also used as the hint name.
    fn name(&self) -> &'static str;

    fn supports(&self, primitive: Primitive) -> bool;

    fn execute(
        &self,
        primitive: Primitive,
        flags: PrimitiveFlags,
        operands: &[Value],
    ) -> Result<Value>;
}

/// Fixed priority order consulted when no hint constrains selection.
pub const PRIORITY_ORDER: [&str; 3] = ["native", "codegen", "expr-template"];

struct AdapterRegistry {
    adapters: RwLock<HashMap<&'static str, Arc<dyn BackendAdapter>>>,
}

impl AdapterRegistry {
    fn new() -> Self {
        AdapterRegistry {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, adapter: Arc<dyn BackendAdapter>) {
        self.adapters
            .write()
            .expect("adapter registry poisoned")
            .insert(adapter.name(), adapter);
    }

    fn get(&self, name: &str) -> Option<Arc<dyn BackendAdapter>> {
        self.adapters
            .read()
            .expect("adapter registry poisoned")
            .get(name)
            .cloned()
    }

    fn names(&self) -> Vec<&'static str> {
        self.adapters
            .read()
            .expect("adapter registry poisoned")
            .keys()
            .copied()
            .collect()
    }
}

static GLOBAL_REGISTRY: OnceLock<AdapterRegistry> = OnceLock::new();

fn global_registry() -> &'static AdapterRegistry {
    GLOBAL_REGISTRY.get_or_init(AdapterRegistry::new)
}

/// Registers an adapter under its own name.
///
/// Backend crates call this from a static initializer; registering the
/// same name again replaces the previous instance.
pub fn register_adapter(adapter: Arc<dyn BackendAdapter>) {
    global_registry().register(adapter);
}

/// Looks up a registered adapter by name.
pub fn registered_adapter(name: &str) -> Option<Arc<dyn BackendAdapter>> {
    global_registry().get(name)
}

/// Names of every registered adapter, in no particular order.
pub fn registered_backends() -> Vec<&'static str> {
    global_registry().names()
}

/// Maps primitive nodes to adapters per the dispatch policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher
    }

    /// Selects the adapter handling `primitive`.
    ///
    /// An explicit hint (or the `LINTRA_BACKEND` process default) must name
    /// an adapter that supports the primitive; there is no silent fallback
    /// from a hinted backend. Without a hint the first supporting adapter
    /// in priority order wins.
    pub fn select(
        &self,
        primitive: Primitive,
        hint: Option<&str>,
    ) -> Result<Arc<dyn BackendAdapter>> {
        let effective = hint.or_else(|| env::default_backend());
        if let Some(name) = effective {
            let adapter = registered_adapter(name).ok_or_else(|| {
                Error::BackendUnsupportedPrimitive {
                    backend: name.to_string(),
                    primitive: primitive.name(),
                }
            })?;
            if !adapter.supports(primitive) {
                return Err(Error::BackendUnsupportedPrimitive {
                    backend: name.to_string(),
                    primitive: primitive.name(),
                });
            }
            return Ok(adapter);
        }

        for name in PRIORITY_ORDER {
            if let Some(adapter) = registered_adapter(name) {
                if adapter.supports(primitive) {
                    return Ok(adapter);
                }
            }
        }
        Err(Error::NoBackendAvailable(primitive.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GemmOnly;

    impl BackendAdapter for GemmOnly {
        fn name(&self) -> &'static str {
            "native"
        }

        fn supports(&self, primitive: Primitive) -> bool {
            primitive == Primitive::Gemm
        }

        fn execute(
            &self,
            _primitive: Primitive,
            _flags: PrimitiveFlags,
            _operands: &[Value],
        ) -> Result<Value> {
            Ok(Value::Scalar(0.0))
        }
    }

    #[test]
    fn hinted_backend_must_support_the_primitive() {
        std::env::remove_var("LINTRA_BACKEND");
        register_adapter(Arc::new(GemmOnly));
        let dispatcher = Dispatcher::new();

        assert_eq!(
            dispatcher
                .select(Primitive::Gemm, Some("native"))
                .unwrap()
                .name(),
            "native"
        );
        assert!(matches!(
            dispatcher.select(Primitive::Nrm2, Some("native")),
            Err(Error::BackendUnsupportedPrimitive { .. })
        ));
        assert!(matches!(
            dispatcher.select(Primitive::Gemm, Some("no-such-backend")),
            Err(Error::BackendUnsupportedPrimitive { .. })
        ));
    }

    #[test]
    fn unconstrained_selection_walks_priority_order() {
        std::env::remove_var("LINTRA_BACKEND");
        register_adapter(Arc::new(GemmOnly));
        let dispatcher = Dispatcher::new();

        assert_eq!(
            dispatcher.select(Primitive::Gemm, None).unwrap().name(),
            "native"
        );
        assert!(matches!(
            dispatcher.select(Primitive::Asum, None),
            Err(Error::NoBackendAvailable("asum"))
        ));
    }
}
