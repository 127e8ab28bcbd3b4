//! Run configuration, loaded from a JSON file.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use crate::flickr;

/// Contents of the config file passed via `--config`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of the Flickr export: holds the `data-download-N` image
    /// directories and `meta/`, and receives `uploads/` and `wxr/`.
    pub project_dir: PathBuf,
    /// API key for the `flickr.people.getInfo` commenter lookups.
    pub flickr_api_key: String,
    /// Move images into `uploads/` instead of copying them.
    pub move_images: bool,
    /// Byte threshold after which a WXR chunk is closed.
    pub wxr_output_size_limit: usize,
    /// Origin override for the Flickr API, mainly for test stubs.
    #[serde(default)]
    pub flickr_api_base: Option<String>,
}

impl Config {
    /// Loads and validates the config. Any problem here is fatal: the
    /// run must not produce partial output from a half-configured
    /// project.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("parse config file: {}", path.display()))?;

        if !config.project_dir.is_dir() {
            anyhow::bail!(
                "project directory does not seem to be valid: {}",
                config.project_dir.display()
            );
        }

        Ok(config)
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.project_dir.join("meta")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.project_dir.join("uploads")
    }

    pub fn wxr_dir(&self) -> PathBuf {
        self.project_dir.join("wxr")
    }

    pub fn api_base(&self) -> &str {
        self.flickr_api_base
            .as_deref()
            .unwrap_or(flickr::DEFAULT_API_BASE)
    }
}
