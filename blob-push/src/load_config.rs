/// `load_config` module: loads the optional YAML tuning file into a [`CliConfig`] and maps
/// it onto the core [`PipelineConfig`].
///
/// The file carries tuning only. Secrets (store credentials) are read from the environment
/// by the store that needs them, never from YAML.
///
/// # Schema
///
/// ```yaml
/// upload:
///   concurrency: 8          # worker pool size, >= 1
///   chunk_size: 8388608     # bytes per transfer unit
///   stream_parallelism: 4   # sub-transfers per file
///   key_prefix: backups/    # optional
/// listing:
///   page_size: 1000
/// ```
///
/// Every key is optional and falls back to the defaults above.
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use anyhow::Result;
use blob_push_core::contract::{TransferOptions, DEFAULT_CHUNK_SIZE, DEFAULT_STREAM_PARALLELISM};
use blob_push_core::coordinator::{CoordinatorConfig, DEFAULT_POOL_SIZE};
use blob_push_core::listing::DEFAULT_PAGE_SIZE;
use blob_push_core::pipeline::PipelineConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub listing: ListingSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadSection {
    pub concurrency: usize,
    pub chunk_size: usize,
    pub stream_parallelism: usize,
    pub key_prefix: Option<String>,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_POOL_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            stream_parallelism: DEFAULT_STREAM_PARALLELISM,
            key_prefix: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListingSection {
    pub page_size: usize,
}

impl Default for ListingSection {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl CliConfig {
    /// Coordinator settings, with `concurrency` (from `--concurrency`) taking precedence
    /// over the file.
    pub fn coordinator(&self, concurrency: Option<usize>) -> CoordinatorConfig {
        CoordinatorConfig {
            pool_size: concurrency.unwrap_or(self.upload.concurrency),
            transfer: TransferOptions {
                chunk_size: self.upload.chunk_size,
                stream_parallelism: self.upload.stream_parallelism,
            },
        }
    }

    pub fn pipeline_config(
        &self,
        root: impl Into<PathBuf>,
        container: &str,
        concurrency: Option<usize>,
    ) -> PipelineConfig {
        let mut config = PipelineConfig::new(root, container);
        config.key_prefix = self.upload.key_prefix.clone();
        config.coordinator = self.coordinator(concurrency);
        config.page_size = self.listing.page_size;
        config
    }
}

/// Loads the YAML config at `path` and validates its values.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid config with every default applied.
    let config: CliConfig = if config_content.trim().is_empty() {
        CliConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    validate(&config)?;
    Ok(config)
}

/// Loads `path` when given, otherwise returns the defaults.
pub fn load_optional_config(path: Option<&Path>) -> Result<CliConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            info!("No config file given, using defaults");
            Ok(CliConfig::default())
        }
    }
}

fn validate(config: &CliConfig) -> Result<()> {
    if let Err(e) = config.coordinator(None).validate() {
        error!(error = %e, "Config rejected");
        return Err(anyhow::anyhow!("Invalid upload section: {e}"));
    }
    if config.listing.page_size == 0 {
        error!("Config rejected: listing.page_size is zero");
        return Err(anyhow::anyhow!(
            "Invalid listing section: page_size must be at least 1"
        ));
    }
    Ok(())
}
