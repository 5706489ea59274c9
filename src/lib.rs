//! # Photo Orient
//!
//! Fixes the orientation of photos in bulk by asking a face detector which
//! way is up.
//!
//! Every image under a directory is searched at 0, 90, 180 and 270 degrees
//! clockwise. The first orientation at which a face is found wins; images
//! that need turning are saved rotated, either next to the original
//! (`photo-rotated.jpg`) or in place.
//!
//! ## Architecture
//! - `core` - The orientation engine
//! - `events` - Event-driven progress reporting
//! - `error` - Typed error enums

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{OrientError, Result};

/// Initialize tracing for the library
///
/// Logs go to stderr so they never mix with the rewrite lines on stdout.
/// `RUST_LOG` wins when set; otherwise `info` when verbose, `warn` if not.
/// Calling this twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
