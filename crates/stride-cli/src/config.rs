//! `config.toml` for the CLI.
//!
//! ```toml
//! store_path = "/var/lib/stride/tasks.json"
//!
//! [runner]
//! max_concurrent_tasks = 2
//! tick_interval_ms = 10000
//!
//! [executor]
//! program = "my-agent"
//! args = ["--print"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use stride_core::RunnerConfig;
use stride_core::impls::CommandExecutor;
use stride_core::store::JsonFileStore;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub store_path: Option<PathBuf>,
    pub runner: RunnerConfig,
    pub executor: ExecutorConfig,
}

/// The agent command each step is handed to.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "stride-agent".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }
}

impl ExecutorConfig {
    pub fn build(&self) -> CommandExecutor {
        let mut executor = CommandExecutor::new(&self.program).args(&self.args);
        for (key, value) in &self.env {
            executor = executor.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            executor = executor.working_dir(dir);
        }
        executor
    }
}

impl CliConfig {
    /// `--store`, then `store_path`, then the default location.
    pub fn resolve_store_path(&self, flag: Option<PathBuf>) -> Result<PathBuf> {
        flag.or_else(|| self.store_path.clone())
            .or_else(JsonFileStore::default_path)
            .context("no config directory on this platform, pass --store")
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stride").join("config.toml"))
}

/// An explicit path must exist; a missing default file means defaults.
pub fn load(explicit: Option<&Path>) -> Result<CliConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_path() {
            Some(path) => (path, false),
            None => return Ok(CliConfig::default()),
        },
    };

    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound && !required => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(CliConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read config {}", path.display()));
        }
    };

    toml::from_str(&contents).with_context(|| format!("parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_tables() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
            store_path = "/tmp/tasks.json"

            [runner]
            max_concurrent_tasks = 1

            [executor]
            program = "agent"
            args = ["--print", "--json"]
            env = { AGENT_MODE = "batch" }
            "#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();

        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/tasks.json")));
        assert_eq!(config.runner.max_concurrent_tasks, 1);
        assert_eq!(config.runner.max_steps_per_task, 50);
        assert_eq!(config.executor.program, "agent");
        assert_eq!(config.executor.args, vec!["--print", "--json"]);
        assert_eq!(config.executor.env["AGENT_MODE"], "batch");
        assert_eq!(config.executor.build().program(), "agent");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = load(Some(&temp.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("read config"));
    }

    #[test]
    fn store_flag_wins_over_config() {
        let config = CliConfig {
            store_path: Some(PathBuf::from("from-config.json")),
            ..CliConfig::default()
        };

        let flagged = config
            .resolve_store_path(Some(PathBuf::from("flag.json")))
            .unwrap();
        assert_eq!(flagged, PathBuf::from("flag.json"));
        assert_eq!(
            config.resolve_store_path(None).unwrap(),
            PathBuf::from("from-config.json")
        );
    }
}
