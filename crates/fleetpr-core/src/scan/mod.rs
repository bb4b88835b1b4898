//! Fan-out/fan-in scan coordinator.
//!
//! A [`ScanSession`] launches one worker per repository. Workers fetch the
//! release branches, diff them and publish a [`ScanResult`] onto a bounded
//! channel. A join task closes the channel only after every worker has
//! returned, so a closed stream means no writer is left.

pub mod session;
pub mod state;

pub use session::{ScanOptions, ScanResult, ScanSession};
pub use state::{ScanBoard, ScanState};
