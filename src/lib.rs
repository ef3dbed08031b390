//! Koma (animation preview cache)
//! * Packs rendered animation frames into a square atlas and stores it
//!   inline with the asset record in an `.rdb` library file.
//!
//! * Streams stored atlases back on worker threads and plays them at a
//!   fixed cadence without ever blocking the UI thread.
//! ** Generation runs on the caller's thread since it drives the host scene.
//! ** Playback picks up decoded atlases from a non-blocking queue and drops
//!    results for selections that are no longer current.

pub mod config;
pub mod preview;
pub mod rdb;
mod utils;

pub use config::*;
pub use preview::*;
pub use rdb::*;
pub use utils::*;
