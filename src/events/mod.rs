//! # Events Module
//!
//! Progress reporting from the core to whatever front end is listening.
//!
//! ## Design
//! The pipeline and its workers emit events through a channel. The CLI
//! subscribes on a separate thread to drive the progress bar and print
//! each rewrite as it happens.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Orient(OrientEvent::Rewritten { path, degrees, .. }) = event {
//!             println!("{} (Rotated {} Degrees)", path.display(), degrees);
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(&sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
