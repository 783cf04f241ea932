//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install the global console subscriber.
///
/// Filtering follows `RUST_LOG` when set, defaulting to `info`. Calling
/// this more than once is harmless; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
