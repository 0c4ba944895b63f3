//! Shared data model for apkpipe.
//!
//! These types describe the dependencies handed to the pipeline: their
//! coordinates, declared packaging type, scope, and the Android ABI a native
//! artifact targets.

pub mod arch;
pub mod coordinate;
pub mod types;

// Re-exports
pub use arch::*;
pub use coordinate::*;
pub use types::*;
