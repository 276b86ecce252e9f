//! YAML configuration: target connection, default upsert options and
//! scheduler limits.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::drivers::DialectImpl;
use crate::error::Result;

impl Config {
    /// Read and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Dialect matching `target.type`.
    pub fn dialect(&self) -> Result<DialectImpl> {
        DialectImpl::from_db_type(&self.target.r#type)
    }
}
