//! Tracing setup for binaries and UI shells embedding the client.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "huddle_client=debug,huddle_store=info,warn";

/// Install the global fmt subscriber. Returns `false` when one was already
/// installed.
pub fn init() -> bool {
    init_with_default(DEFAULT_FILTER)
}

pub fn init_with_default(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        init();
        assert!(!init());
    }
}
