//! Engine options layered via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::api::WaitOptions;

use super::ConfigError;

/// Default state file written by [`crate::state::FileStateStore`].
pub const DEFAULT_STATE_FILE: &str = "netforge-state.json";

/// Tuning of the reconciliation engine.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "NETFORGE",
    discovery(
        app_name = "netforge",
        env_var = "NETFORGE_CONFIG_PATH",
        config_file_name = "netforge.toml",
        dotfile_name = ".netforge.toml",
        project_file_name = "netforge.toml"
    )
)]
pub struct EngineOptions {
    /// Delay between polls of an asynchronous remote operation, in
    /// milliseconds.
    #[ortho_config(default = 5000)]
    pub poll_interval_ms: u64,
    /// Upper bound for one remote operation, in seconds.
    #[ortho_config(default = 300)]
    pub operation_timeout_secs: u64,
    /// Timeout of a task that does not declare its own, in seconds.
    #[ortho_config(default = 600)]
    pub task_timeout_secs: u64,
    /// Path of the local state file.
    #[ortho_config(default = DEFAULT_STATE_FILE.to_owned())]
    pub state_file: String,
}

impl EngineOptions {
    /// Loads options without parsing CLI arguments. Values merge defaults,
    /// configuration files and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("netforge")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects zero intervals and timeouts and an empty state path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the offending option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("operation_timeout_secs", self.operation_timeout_secs),
            ("task_timeout_secs", self.task_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidOption {
                    field: field.to_owned(),
                    reason: format!(
                        "must be positive; set NETFORGE_{} or {field} in netforge.toml",
                        field.to_uppercase()
                    ),
                });
            }
        }
        if self.state_file.trim().is_empty() {
            return Err(ConfigError::InvalidOption {
                field: String::from("state_file"),
                reason: String::from("must not be empty"),
            });
        }
        Ok(())
    }

    /// Operation polling parameters.
    #[must_use]
    pub const fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
        }
    }

    /// Default per-task timeout.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// State file path.
    #[must_use]
    pub fn state_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.state_file.trim())
    }
}
