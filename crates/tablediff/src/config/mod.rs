//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::core::TablePath;
use crate::error::Result;
use crate::normalize::NormalizationRegistry;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Registry with built-in rules plus the configured overrides.
    pub fn registry(&self) -> NormalizationRegistry {
        NormalizationRegistry::with_overrides(&self.type_overrides)
    }
}

impl TableConfig {
    pub fn table_path(&self) -> Result<TablePath> {
        TablePath::parse(&self.table)
    }
}
