//! Genesis configuration.
//!
//! A chain starts from an ordered list of validator addresses in canonical
//! hex form. The first `DYNASTY_SIZE` entries seed the opening dynasty;
//! every entry becomes a candidate with a self-vote and a self-delegation.

use std::path::Path;

use serde::Deserialize;

/// Errors from loading genesis configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read genesis config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse genesis config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Genesis configuration for the consensus state.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GenesisConfig {
    /// Ordered validator addresses in canonical hex form.
    pub dynasty: Vec<String>,
}

impl GenesisConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
