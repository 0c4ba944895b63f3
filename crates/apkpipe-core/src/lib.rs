//! Android build pipeline: dependency unpacking, resource conflict
//! detection, external tool invocation and APK assembly.

pub mod archive;
pub mod assemble;
pub mod classify;
pub mod command;
pub mod config;
pub mod conflict;
pub mod context;
pub mod error;
pub mod exec;
pub mod filter;
pub mod merger;
pub mod paths;
pub mod sdk;
pub mod stage;
pub mod symbols;
pub mod transform;
pub mod unpack;

pub mod reporter;

#[cfg(test)]
mod testutil;

pub use config::PipelineConfig;
pub use context::{BuildContext, Toolchain};
pub use error::{PipelineError, Result};
pub use paths::StagingLayout;
pub use reporter::{NullReporter, Reporter, TracingReporter};
pub use stage::{Pipeline, Stage, StageOutcome, StageState};

