//! Command modules - one file per CLI command

pub mod build;
pub mod clean;
pub mod completions;
pub mod conflicts;
pub mod toolchain;
pub mod unpack;
