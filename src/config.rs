//! Expansion options.
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! is a valid configuration:
//!
//! ```yaml
//! max_expansion_depth: 64
//! max_nesting_depth: 512
//! keep_comments: false
//! builtin_macros: true
//! include_root: docs/
//! scopes:
//!   scenario: ["*"]
//!   house: [room, person]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::macros::MAX_EXPANSION_DEPTH;
use crate::syntax::MAX_NESTING_DEPTH;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpansionOptions {
    /// How many invocations may be nested inside one another's expansion.
    pub max_expansion_depth: usize,
    /// How deeply lists may be nested in a document as written.
    pub max_nesting_depth: usize,
    pub keep_comments: bool,
    /// Registers `concat` and `unique-name`.
    pub builtin_macros: bool,
    /// Directory that file includes are resolved against. Defaults to the
    /// directory of the document being processed.
    pub include_root: Option<PathBuf>,
    /// Scope heads mapped to the kinds of definition they hold. `*` holds
    /// everything. The document itself always holds everything.
    pub scopes: BTreeMap<String, Vec<String>>,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            max_expansion_depth: MAX_EXPANSION_DEPTH,
            max_nesting_depth: MAX_NESTING_DEPTH,
            keep_comments: true,
            builtin_macros: true,
            include_root: None,
            scopes: BTreeMap::new(),
        }
    }
}

impl ExpansionOptions {
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as null.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_scope(mut self, head: impl Into<String>, kinds: &[&str]) -> Self {
        self.scopes
            .insert(head.into(), kinds.iter().map(|k| k.to_string()).collect());
        self
    }
}
