use std::env;
use std::sync::OnceLock;

static LINTRA_BACKEND: OnceLock<Option<String>> = OnceLock::new();

/// Process-wide default backend hint taken from `LINTRA_BACKEND`.
///
/// Consulted by the dispatcher only when a computation carries no explicit
/// hint of its own.
pub(crate) fn default_backend() -> Option<&'static str> {
    LINTRA_BACKEND
        .get_or_init(|| match env::var("LINTRA_BACKEND") {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            _ => None,
        })
        .as_deref()
}
