//! Configuration loading from TOML files.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// On-disk shape of a downloader configuration file, deserialized from
/// TOML then converted into `imgshard_core::DownloaderConfig`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub downloader: DownloaderSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloaderSection {
    pub thread_count: usize,
    pub save_caption: bool,
    pub extract_exif: bool,
    pub output_folder: PathBuf,
    pub url_column: String,
    pub caption_column: Option<String>,
    pub blurring_bbox_col: Option<String>,
    pub timeout: u64,
    pub samples_per_shard: u64,
    pub shard_count_oom: u32,
    pub compute_hash: Option<String>,
    pub verify_hash_type: Option<String>,
    pub encode_format: String,
    pub retries: u32,
    pub user_agent_token: Option<String>,
    pub disallowed_header_directives: Vec<String>,
}

impl Default for DownloaderSection {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            thread_count: cpus,
            save_caption: false,
            extract_exif: false,
            output_folder: PathBuf::from("./output"),
            url_column: "url".to_string(),
            caption_column: None,
            blurring_bbox_col: None,
            timeout: 10,
            samples_per_shard: 10_000,
            shard_count_oom: 5,
            compute_hash: None,
            verify_hash_type: None,
            encode_format: "jpg".to_string(),
            retries: 0,
            user_agent_token: None,
            disallowed_header_directives: Vec::new(),
        }
    }
}

impl Config {
    /// Search order: `./imgshard.toml`, then the platform config dir
    /// (`directories::ProjectDirs`), then defaults.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("imgshard.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "imgshard") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Convert into `imgshard_core::DownloaderConfig`, resolving the
    /// `column_list` from whichever optional columns are configured.
    pub fn to_downloader_config(&self) -> Result<imgshard_core::DownloaderConfig> {
        let d = &self.downloader;

        let compute_hash = d
            .compute_hash
            .as_deref()
            .map(|name| {
                imgshard_core::HashAlgo::from_name(name)
                    .with_context(|| format!("unknown compute_hash algorithm: {name}"))
            })
            .transpose()?;
        let verify_hash_type = d
            .verify_hash_type
            .as_deref()
            .map(|name| {
                imgshard_core::HashAlgo::from_name(name)
                    .with_context(|| format!("unknown verify_hash_type algorithm: {name}"))
            })
            .transpose()?;

        let mut column_list = vec![d.url_column.clone()];
        if let Some(caption) = &d.caption_column {
            column_list.push(caption.clone());
        }
        let verify_hash_column = verify_hash_type.map(|algo| algo.column_name().to_string());
        if let Some(col) = &verify_hash_column {
            column_list.push(col.clone());
        }
        if let Some(bbox) = &d.blurring_bbox_col {
            column_list.push(bbox.clone());
        }

        Ok(imgshard_core::DownloaderConfig {
            thread_count: d.thread_count,
            save_caption: d.save_caption,
            extract_exif: d.extract_exif,
            output_folder: d.output_folder.clone(),
            column_list,
            url_column: d.url_column.clone(),
            caption_column: d.caption_column.clone(),
            blurring_bbox_col: d.blurring_bbox_col.clone(),
            timeout: d.timeout,
            samples_per_shard: d.samples_per_shard,
            shard_count_oom: d.shard_count_oom,
            compute_hash,
            verify_hash_type,
            verify_hash_column,
            encode_format: d.encode_format.clone(),
            retries: d.retries,
            user_agent_token: d.user_agent_token.clone(),
            disallowed_header_directives: d
                .disallowed_header_directives
                .iter()
                .cloned()
                .collect::<HashSet<_>>(),
        })
    }
}
