use std::path::Path;

use anyhow::Context;
use figment::providers::{Env, Format, Toml};
use schemars::JsonSchema;
use serde::Deserialize;

/// Builder configuration, read from an optional TOML file and env variables prefixed with `DIB_`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BuilderConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Pull the base image if it doesn't exist locally
    #[serde(default = "default_pull_missing")]
    pub pull_missing: bool,
    /// Shell used to run shell-form commands
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,
    /// Command that keeps the build container idle while steps are executed in it
    #[serde(default = "default_idle_command")]
    pub idle_command: Vec<String>,
    /// Prefix of build container names
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
    /// Seconds to wait for the build container to stop before killing it
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u32,
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_pull_missing() -> bool {
    true
}
fn default_shell() -> Vec<String> {
    vec!["/bin/sh".into(), "-c".into()]
}
fn default_idle_command() -> Vec<String> {
    vec!["sleep".into(), "infinity".into()]
}
fn default_container_prefix() -> String {
    "dib-".to_string()
}
fn default_stop_timeout() -> u32 {
    10
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            pull_missing: default_pull_missing(),
            shell: default_shell(),
            idle_command: default_idle_command(),
            container_prefix: default_container_prefix(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

/// Extract the configuration from the given TOML file (if it exists) and env variables
/// prefixed with `DIB_`. Env variables take precedence.
pub fn extract_config(file: Option<&Path>) -> anyhow::Result<BuilderConfig> {
    let mut figment = figment::Figment::new();
    if let Some(file) = file {
        figment = figment.merge(Toml::file(file));
    }
    let config = figment
        .merge(Env::prefixed("DIB_"))
        .extract::<BuilderConfig>()
        .context("Failed to extract valid configuration")?;

    Ok(config)
}
