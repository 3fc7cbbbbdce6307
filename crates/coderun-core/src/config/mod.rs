//! Configuration module
//!
//! YAML configuration (`serde_yaml`) with defaults for every field, environment
//! overrides and a final validation pass.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::ExecutionError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<CoderunConfig, ExecutionError> {
    ConfigLoader::from_file(path).await
}
