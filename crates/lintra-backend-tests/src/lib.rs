//! Shared test suites exercised against every backend adapter.
//!
//! Backend crates instantiate the conformance suite from an integration
//! test with [`define_backend_tests!`]; the cross-backend agreement tests
//! live in this crate's own `tests/` directory.

pub mod counting;
pub mod parity;
pub mod reference;

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $backend_ctor:expr) => {
        mod $module {
            use super::*;

            #[test]
            fn gemm_matches_reference() {
                let backend = ($backend_ctor)();
                $crate::parity::gemm_matches_reference(&backend);
            }

            #[test]
            fn gemm_ones_closed_form() {
                let backend = ($backend_ctor)();
                $crate::parity::gemm_ones_closed_form(&backend);
            }

            #[test]
            fn gemv_matches_reference() {
                let backend = ($backend_ctor)();
                $crate::parity::gemv_matches_reference(&backend);
            }

            #[test]
            fn ger_matches_reference() {
                let backend = ($backend_ctor)();
                $crate::parity::ger_matches_reference(&backend);
            }

            #[test]
            fn level1_matches_reference() {
                let backend = ($backend_ctor)();
                $crate::parity::level1_matches_reference(&backend);
            }

            #[test]
            fn reductions_match_pinned_values() {
                let backend = ($backend_ctor)();
                $crate::parity::reductions_match_pinned_values(&backend);
            }
        }
    };
}
