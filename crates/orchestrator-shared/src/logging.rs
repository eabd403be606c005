//! Tracing initialization for the composition root.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber exactly once. Level and format
/// are controlled by `RUST_LOG` (falling back to `info` for the orchestrator
/// crates and `warn` for everything else) at this single point; nothing else
/// in the process re-reads it.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,sandbox_orchestrator=info,orchestrator=info"));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
