use std::fs;
use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::error::ChatError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
    pub jwt_secret: String,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ChatError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ChatError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ChatError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChatError::Config(format!("Failed to serialize to TOML: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| ChatError::Config(format!("Failed to write config file: {}", e)))
    }
}
