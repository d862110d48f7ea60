//! Command-line front end of the ID pool.
//!
//! ## Structure
//!
//! - [`config`] - CLI arguments and their validated configuration.
//! - [`commands`] - `start`, `import`, `top`, `clear-redis` and `has`.
//! - [`telemetry`] - Log subscriber setup.

pub mod commands;
pub mod config;
pub mod telemetry;
