use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// How far the skip-dependency-to-container option looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerSkipScope {
    /// Only the direct container of the requiring item.
    Direct,
    /// Every container up the ownership chain.
    #[default]
    Ancestors,
}

/// Options of a sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOptions {
    /// Break rank ties by descending full name instead of ascending.
    #[serde(default)]
    pub reverse_name: bool,
    /// Ignore requirements on a container of the requiring item.
    #[serde(default)]
    pub skip_dependency_to_container: bool,
    #[serde(default)]
    pub container_skip_scope: ContainerSkipScope,
    /// Whether a missing non-optional requirement makes the result
    /// structurally invalid. Can be changed later on the result.
    #[serde(default = "default_true")]
    pub missing_required_is_structure_error: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            reverse_name: false,
            skip_dependency_to_container: false,
            container_skip_scope: ContainerSkipScope::default(),
            missing_required_is_structure_error: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OptionsFile {
    #[serde(default)]
    sort: SortOptions,
}

impl SortOptions {
    #[must_use]
    pub const fn with_reverse_name(mut self, reverse_name: bool) -> Self {
        self.reverse_name = reverse_name;
        self
    }

    #[must_use]
    pub const fn with_skip_dependency_to_container(mut self, skip: bool, scope: ContainerSkipScope) -> Self {
        self.skip_dependency_to_container = skip;
        self.container_skip_scope = scope;
        self
    }

    #[must_use]
    pub const fn with_missing_required_is_structure_error(mut self, value: bool) -> Self {
        self.missing_required_is_structure_error = value;
        self
    }

    /// Parse the `[sort]` table of a TOML document. Missing keys take
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not valid TOML or a key has the
    /// wrong type. The message carries [`ErrorCode::ConfigParseError`].
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: OptionsFile = toml::from_str(content).with_context(|| {
            format!("{}: Failed to parse sort options", ErrorCode::ConfigParseError)
        })?;
        Ok(file.sort)
    }
}

/// Load sort options from `path`, falling back to defaults when the file
/// does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_sort_options(path: &Path) -> Result<SortOptions> {
    if !path.exists() {
        return Ok(SortOptions::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    SortOptions::from_toml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_true() -> bool {
    true
}
