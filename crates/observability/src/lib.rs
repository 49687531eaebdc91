//! Logging setup shared by callboard binaries.

use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or unparsable. sqlx logs every statement
/// at `info`, which drowns out session transitions.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Install the JSON subscriber with [`DEFAULT_FILTER`].
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    init_with(DEFAULT_FILTER);
}

/// Install the JSON subscriber, falling back to `default_filter` when
/// `RUST_LOG` is not usable. Returns whether this call installed it.
pub fn init_with(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init();
        assert!(!init_with("debug"));
        tracing::info!("still logging");
    }
}
