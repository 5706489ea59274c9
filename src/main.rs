//! # rotate
//!
//! Command-line entry point for photo-orient.
//!
//! ## Usage
//! ```bash
//! rotate ~/Photos
//! rotate ~/Photos --overwrite --max-workers 4
//! ```

mod cli;

use photo_orient::Result;

fn main() -> Result<()> {
    cli::run()
}
