//! CLI command implementations

pub mod run;
pub mod tools;

pub use run::run_command;
pub use tools::tools_command;

use anyhow::Result;
use std::path::PathBuf;
use toolgate_core::Config;

/// Load the configuration from an explicit path, the default location,
/// or built-in defaults when no file exists.
pub async fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(&path).await?),
        None => {
            let default_path = Config::default_path();
            if default_path.exists() {
                Ok(Config::load(&default_path).await?)
            } else {
                tracing::debug!(
                    "no config at {}; using built-in defaults",
                    default_path.display()
                );
                Ok(Config::default())
            }
        }
    }
}
