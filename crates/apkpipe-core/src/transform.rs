//! Content transformers for conflicting java resources.
//!
//! Transformers are consulted in registration order. The first one accepting
//! a conflicting path receives every contribution to it (in precedence order)
//! and its output becomes the packaged entry.

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Merges several contributions of one path into a single entry.
pub trait ResourceTransformer: std::fmt::Debug {
    /// Whether this transformer handles `path`.
    fn can_transform(&self, path: &str) -> bool;

    /// Produce the merged content from all contributions, first to last.
    ///
    /// # Errors
    ///
    /// Implementations may fail when contributions cannot be combined.
    fn transform(&self, path: &str, contributions: &[Vec<u8>]) -> Result<Vec<u8>>;
}

/// Concatenates every contribution, separated by a newline.
///
/// Suited to line-oriented config files such as `reference.conf`.
#[derive(Debug, Clone)]
pub struct AppendingTransformer {
    patterns: Vec<Pattern>,
}

impl AppendingTransformer {
    /// Handle paths matching any of the glob `patterns`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for an invalid glob.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|e| {
                    PipelineError::config(format!("Invalid pattern '{}': {e}", p.as_ref()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl ResourceTransformer for AppendingTransformer {
    fn can_transform(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    fn transform(&self, _path: &str, contributions: &[Vec<u8>]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for part in contributions {
            out.extend_from_slice(part);
            if !part.ends_with(b"\n") {
                out.push(b'\n');
            }
        }
        Ok(out)
    }
}

/// Declarative transformer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransformerConfig {
    /// [`AppendingTransformer`] over the given glob patterns.
    Append {
        /// Glob patterns of handled paths.
        resources: Vec<String>,
    },
}

impl TransformerConfig {
    /// Instantiate the configured transformer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for invalid patterns.
    pub fn build(&self) -> Result<Box<dyn ResourceTransformer>> {
        match self {
            Self::Append { resources } => Ok(Box::new(AppendingTransformer::new(resources)?)),
        }
    }
}

/// First transformer accepting `path`, if any.
pub fn find_transformer<'t>(
    transformers: &'t [Box<dyn ResourceTransformer>],
    path: &str,
) -> Option<&'t dyn ResourceTransformer> {
    transformers
        .iter()
        .find(|t| t.can_transform(path))
        .map(|t| t.as_ref())
}
