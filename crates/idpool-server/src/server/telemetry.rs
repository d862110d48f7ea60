//! # Logging
//!
//! Installs a `tracing_subscriber::fmt` layer that writes human-readable
//! events to stderr, leaving stdout to command output (`top`, `has`).
//!
//! The filter comes from `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=idpool=debug idpool start
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        )
        .try_init()?;
    Ok(())
}
