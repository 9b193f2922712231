//! Uploader configuration.
//!
//! Configuration is stored as TOML:
//! - `$AUTOTUBE_CONFIG` when set
//! - Linux: `~/.config/autotube/config.toml`
//! - Windows: `%APPDATA%/autotube/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use autotube_host::Privacy;
use autotube_transfer::{ChunkPolicy, DEFAULT_CHUNK_SIZE};
use autotube_uploader::{DEFAULT_DAILY_CAP, DEFAULT_WORKERS, UploadSettings};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location.
const CONFIG_ENV: &str = "AUTOTUBE_CONFIG";

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one sub-folder of captures per game.
    #[serde(default = "default_captures_root")]
    pub captures_root: PathBuf,

    /// File extensions to upload, without the dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Maximum uploads per run.
    #[serde(default = "default_daily_cap")]
    pub daily_cap: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Send files in `chunk_size` pieces; `false` sends each file in one request.
    #[serde(default = "default_true")]
    pub chunked: bool,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_collection_page_size")]
    pub collection_page_size: u32,

    #[serde(default = "default_description")]
    pub description: String,

    #[serde(default = "default_tags")]
    pub tags: Vec<String>,

    /// YouTube category id ("20" = Gaming).
    #[serde(default = "default_category_id")]
    pub category_id: String,

    #[serde(default = "default_privacy")]
    pub privacy: Privacy,

    #[serde(default = "default_collection_privacy")]
    pub collection_privacy: Privacy,

    #[serde(default = "default_client_secret_path")]
    pub client_secret_path: PathBuf,

    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline_secs: Option<u64>,
}

fn default_captures_root() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from("F:\\Captures")
    }

    #[cfg(not(target_os = "windows"))]
    {
        home_dir().join("Videos").join("Captures")
    }
}

fn default_extensions() -> Vec<String> {
    vec!["mp4".into()]
}

fn default_daily_cap() -> usize {
    DEFAULT_DAILY_CAP
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_collection_page_size() -> u32 {
    autotube_catalog::DEFAULT_PAGE_SIZE
}

fn default_description() -> String {
    "Uploaded via YouTube API".into()
}

fn default_tags() -> Vec<String> {
    vec!["gaming".into(), "PC".into()]
}

fn default_category_id() -> String {
    "20".into()
}

fn default_privacy() -> Privacy {
    Privacy::Unlisted
}

fn default_collection_privacy() -> Privacy {
    Privacy::Private
}

fn default_client_secret_path() -> PathBuf {
    PathBuf::from("client_secret.json")
}

fn default_token_path() -> PathBuf {
    config_dir().join("token.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            captures_root: default_captures_root(),
            extensions: default_extensions(),
            daily_cap: default_daily_cap(),
            workers: default_workers(),
            chunked: default_true(),
            chunk_size: default_chunk_size(),
            collection_page_size: default_collection_page_size(),
            description: default_description(),
            tags: default_tags(),
            category_id: default_category_id(),
            privacy: default_privacy(),
            collection_privacy: default_collection_privacy(),
            client_secret_path: default_client_secret_path(),
            token_path: default_token_path(),
            item_timeout_secs: None,
            run_deadline_secs: None,
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::from_settings(self.chunked, self.chunk_size)
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            workers: self.workers.max(1),
            daily_cap: self.daily_cap,
            description: self.description.clone(),
            tags: self.tags.clone(),
            category_id: self.category_id.clone(),
            privacy: self.privacy,
            item_timeout: self.item_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}

/// Returns the configuration file path.
pub fn config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => config_dir().join("config.toml"),
    }
}

fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("autotube")
    }

    #[cfg(not(target_os = "windows"))]
    {
        home_dir().join(".config").join("autotube")
    }
}

#[cfg(not(target_os = "windows"))]
fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.extensions, vec!["mp4"]);
        assert_eq!(config.daily_cap, 30);
        assert_eq!(config.workers, 3);
        assert_eq!(config.chunk_size, 8 * 1024 * 1024);
        assert_eq!(config.collection_page_size, 50);
        assert_eq!(config.category_id, "20");
        assert_eq!(config.privacy, Privacy::Unlisted);
        assert_eq!(config.collection_privacy, Privacy::Private);
        assert!(config.token_path.ends_with("token.json"));
        assert!(config.item_timeout_secs.is_none());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
            captures_root = "/data/captures"
            workers = 5
            privacy = "public"
            chunked = false
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.captures_root, PathBuf::from("/data/captures"));
        assert_eq!(config.workers, 5);
        assert_eq!(config.privacy, Privacy::Public);
        assert_eq!(config.chunk_policy(), ChunkPolicy::Unbounded);
        assert_eq!(config.daily_cap, 30);
        assert_eq!(config.tags, vec!["gaming", "PC"]);
    }

    #[test]
    fn upload_settings_from_config() {
        let config = Config {
            workers: 0,
            item_timeout_secs: Some(600),
            run_deadline_secs: Some(3600),
            ..Config::default()
        };
        let settings = config.upload_settings();
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.item_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.run_deadline(), Some(Duration::from_secs(3600)));
        assert_eq!(config.chunk_policy(), ChunkPolicy::Fixed(8 * 1024 * 1024));
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");

        let config = Config {
            captures_root: PathBuf::from("/srv/captures"),
            daily_cap: 10,
            item_timeout_secs: Some(120),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
