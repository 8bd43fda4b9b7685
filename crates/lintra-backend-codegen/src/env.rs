use std::env;
use std::sync::OnceLock;

const DEFAULT_CACHE_CAPACITY: usize = 64;

static CACHE_CAPACITY: OnceLock<usize> = OnceLock::new();

/// Compile-cache capacity taken from `LINTRA_CODEGEN_CACHE_CAP`.
pub(crate) fn cache_capacity() -> usize {
    *CACHE_CAPACITY.get_or_init(|| match env::var("LINTRA_CODEGEN_CACHE_CAP") {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|cap| *cap > 0)
            .unwrap_or(DEFAULT_CACHE_CAPACITY),
        _ => DEFAULT_CACHE_CAPACITY,
    })
}
