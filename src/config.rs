//! Run configuration: interpreter behaviour that is not part of a script.
//!
//! Values come from an optional JSON config file (`--config`) and are then
//! overridden by command line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants::SubstitutionMode;

/// Default limit for `RUN_COMMANDER_SCRIPT` nesting.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Which constants a nested script starts with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NestedConstants {
    /// The nested script reads and writes the parent's store.
    #[default]
    ShareParent,
    /// The nested script starts with an empty store of its own.
    FreshEmpty,
}

/// Interpreter settings shared by the top-level script and every nested one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RunConfig {
    /// Pause after every executed step, not only `wait: true` ones.
    pub stepper: bool,
    /// Log resolved steps without running their side effects.
    pub dry_run: bool,
    /// Treat a non-zero exit from `RUN_SHELL` as a step failure.
    pub strict_shell: bool,
    pub nested_constants: NestedConstants,
    pub substitution: SubstitutionMode,
    /// Maximum `RUN_COMMANDER_SCRIPT` nesting depth.
    pub max_depth: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            stepper: false,
            dry_run: false,
            strict_shell: false,
            nested_constants: NestedConstants::ShareParent,
            substitution: SubstitutionMode::Chained,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RunConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            anyhow::bail!("maxDepth must be at least 1");
        }
        Ok(())
    }
}
