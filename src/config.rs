// osf-export/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::client::{api_host, DEFAULT_API_HOST_PROD, DEFAULT_API_HOST_TEST};

fn default_page_size() -> usize {
    100
}

fn default_api_host_test() -> String {
    DEFAULT_API_HOST_TEST.to_string()
}

fn default_api_host_prod() -> String {
    DEFAULT_API_HOST_PROD.to_string()
}

/// Settings of one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Folder the PDFs are written to; `None` means the working directory.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub use_test_host: bool,
    #[serde(default = "default_api_host_test")]
    pub api_host_test: String,
    #[serde(default = "default_api_host_prod")]
    pub api_host_prod: String,
    /// Read the bundled offline dataset instead of the API.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub keep_going: bool,
    /// Personal access token; only ever taken from the environment or flags.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            page_size: default_page_size(),
            use_test_host: false,
            api_host_test: default_api_host_test(),
            api_host_prod: default_api_host_prod(),
            dry_run: false,
            keep_going: false,
            token: None,
        }
    }
}

impl ExportConfig {
    /// API root selected by `use_test_host`.
    pub fn api_host(&self) -> String {
        api_host(self.use_test_host, &self.api_host_test, &self.api_host_prod)
    }

    pub fn trace_loaded(&self) {
        info!(
            api_host = %self.api_host(),
            output_dir = %self.output_dir.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| ".".to_string()),
            page_size = self.page_size,
            dry_run = self.dry_run,
            keep_going = self.keep_going,
            has_token = self.token.as_deref().is_some_and(|t| !t.is_empty()),
            "Loaded ExportConfig"
        );
        // Keep the token out of the logs.
        debug!(config = ?ExportConfig { token: None, ..self.clone() }, "ExportConfig loaded (full debug)");
    }
}
