//! Tool provider configuration forms

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Configuration for one tool provider.
///
/// Two forms exist: a process-launch form (`command` plus optional
/// `args`/`env`/`working_dir`) and a network form (`url`). The forms have
/// disjoint required fields, so an untagged union disambiguates cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Process(ProcessProviderConfig),
    Network(NetworkProviderConfig),
}

/// A provider launched as a child process speaking JSON-RPC over stdio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessProviderConfig {
    /// Executable to launch
    pub command: String,

    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for the child process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// A provider reached over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkProviderConfig {
    /// JSON-RPC endpoint URL
    pub url: String,
}

impl ProcessProviderConfig {
    /// Arguments with relative paths resolved against the working directory.
    ///
    /// Only arguments that name an existing file under the working
    /// directory are rewritten; flags and free-form values pass through.
    pub fn resolved_args(&self) -> Vec<String> {
        let Some(working_dir) = &self.working_dir else {
            return self.args.clone();
        };

        self.args
            .iter()
            .map(|arg| {
                let candidate = Path::new(arg);
                if candidate.is_relative() {
                    let joined = working_dir.join(candidate);
                    if joined.exists() {
                        return joined.to_string_lossy().to_string();
                    }
                }
                arg.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolved_args_rewrites_existing_relative_paths() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("server.py"), "print('hi')").unwrap();

        let config = ProcessProviderConfig {
            command: "python3".to_string(),
            args: vec!["server.py".to_string(), "--port".to_string()],
            env: HashMap::new(),
            working_dir: Some(dir.path().to_path_buf()),
        };

        let args = config.resolved_args();
        assert_eq!(args[0], dir.path().join("server.py").to_string_lossy());
        assert_eq!(args[1], "--port");
    }

    #[test]
    fn resolved_args_without_working_dir_is_passthrough() {
        let config = ProcessProviderConfig {
            command: "node".to_string(),
            args: vec!["server.js".to_string()],
            env: HashMap::new(),
            working_dir: None,
        };

        assert_eq!(config.resolved_args(), vec!["server.js".to_string()]);
    }
}
