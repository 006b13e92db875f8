use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::config::ExportConfig;
use crate::error::ExportError;

pub const ENV_API_HOST_TEST: &str = "API_HOST_TEST";
pub const ENV_API_HOST_PROD: &str = "API_HOST_PROD";
pub const ENV_TOKEN: &str = "OSF_PAT";

fn env_value(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            info!(var = %name, "Found setting in env");
            Some(value.trim().to_string())
        }
        _ => None,
    }
}

/// Loads the optional static YAML config (no secrets) and merges the
/// environment over it: API hosts and the access token.
pub fn load_config(path: Option<&Path>) -> Result<ExportConfig> {
    let mut config = match path {
        Some(path_ref) => {
            info!(config_path = ?path_ref, "Loading configuration from file");

            let config_content = match fs::read_to_string(path_ref) {
                Ok(content) => {
                    info!(config_path = ?path_ref, "Config file read successfully");
                    content
                }
                Err(e) => {
                    error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
                    return Err(anyhow::anyhow!(
                        "Failed to read config file {:?}: {}",
                        path_ref,
                        e
                    ));
                }
            };

            // An empty file is a valid config of defaults.
            if config_content.trim().is_empty() {
                ExportConfig::default()
            } else {
                match serde_yaml::from_str::<ExportConfig>(&config_content) {
                    Ok(conf) => {
                        info!(config_path = ?path_ref, "Parsed config YAML successfully");
                        conf
                    }
                    Err(e) => {
                        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                        return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
                    }
                }
            }
        }
        None => {
            info!("No config file given; using defaults");
            ExportConfig::default()
        }
    };

    if config.page_size == 0 {
        error!("page_size must be positive");
        return Err(ExportError::Config("page_size must be a positive integer".to_string()).into());
    }

    if let Some(host) = env_value(ENV_API_HOST_TEST) {
        config.api_host_test = host;
    }
    if let Some(host) = env_value(ENV_API_HOST_PROD) {
        config.api_host_prod = host;
    }
    config.token = env_value(ENV_TOKEN);

    info!(
        api_host = %config.api_host(),
        page_size = config.page_size,
        "Config loaded and merged successfully"
    );
    Ok(config)
}
