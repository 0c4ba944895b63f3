//! `R.txt` symbol tables written by the resource linker.
//!
//! Each line reads `<type> <class> <name> <value>`, e.g.
//! `int string app_name 0x7f0b0001` or
//! `int[] styleable Widget { 0x7f010000, 0x7f010001 }`.

use std::fs;
use std::path::Path;

use crate::error::{IoResultExt, PipelineError, Result};

/// One resource symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Java type: `int` or `int[]`.
    pub java_type: String,
    /// Resource class: `string`, `drawable`, `styleable`, ...
    pub class: String,
    /// Resource name.
    pub name: String,
    /// Value text as written (`0x7f0b0001`, `{ ... }`).
    pub value: String,
}

/// Parsed symbol table, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Parse the table at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if unreadable, or
    /// [`PipelineError::Archive`] naming the first malformed line.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).io_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).map_err(|line| {
            PipelineError::archive(path, format!("malformed symbol line {line}"))
        })
    }

    /// Parse table text. Returns the 1-based number of the first bad line on error.
    pub fn parse(text: &str) -> std::result::Result<Self, usize> {
        let mut symbols = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(4, ' ');
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(java_type), Some(class), Some(name), Some(value)) => symbols.push(Symbol {
                    java_type: java_type.to_string(),
                    class: class.to_string(),
                    name: name.to_string(),
                    value: value.trim().to_string(),
                }),
                _ => return Err(idx + 1),
            }
        }
        Ok(Self { symbols })
    }

    /// All symbols.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Look up `class`/`name`.
    pub fn get(&self, class: &str, name: &str) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.class == class && s.name == name)
    }
}
