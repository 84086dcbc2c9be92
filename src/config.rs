use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub derivatives: DerivativeConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Directory for rolling log files. When unset, logs go to journald or stderr.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub sqlite_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio")
        .join("folio.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for originals and derivatives.
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,

    /// URL prefix the media root is served under.
    #[serde(default = "default_media_url")]
    pub media_url: String,
}

fn default_media_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio")
        .join("media")
}

fn default_media_url() -> String {
    "/media/".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_root: default_media_root(),
            media_url: default_media_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Public origin (e.g. `https://photos.example.com`) used for absolute URLs.
    /// Falls back to the request's Host header.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Largest accepted upload body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024 // 50MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeConfig {
    #[serde(default = "default_thumb_width")]
    pub thumb_max_width: u32,

    #[serde(default = "default_thumb_quality")]
    pub thumb_quality: u8,

    #[serde(default = "default_preview_width")]
    pub preview_max_width: u32,

    #[serde(default = "default_preview_quality")]
    pub preview_quality: u8,

    #[serde(default = "default_blur_width")]
    pub blur_width: u32,

    #[serde(default = "default_blur_quality")]
    pub blur_quality: u8,

    /// Reject uploads whose derivatives cannot be generated.
    /// When false the photo is kept with empty derivatives.
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_thumb_width() -> u32 {
    800
}

fn default_thumb_quality() -> u8 {
    70
}

fn default_preview_width() -> u32 {
    1600
}

fn default_preview_quality() -> u8 {
    80
}

fn default_blur_width() -> u32 {
    24
}

fn default_blur_quality() -> u8 {
    25
}

fn default_strict() -> bool {
    true
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            thumb_max_width: default_thumb_width(),
            thumb_quality: default_thumb_quality(),
            preview_max_width: default_preview_width(),
            preview_quality: default_preview_quality(),
            blur_width: default_blur_width(),
            blur_quality: default_blur_quality(),
            strict: default_strict(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

fn default_limit() -> u32 {
    50
}

fn default_max_limit() -> u32 {
    200
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Tokens accepted as staff credentials. Empty means every mutation is refused.
    #[serde(default)]
    pub staff_tokens: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            derivatives: DerivativeConfig::default(),
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load from an explicit path, `FOLIO_CONFIG`, or the default location.
    /// A missing file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FOLIO_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("folio")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [derivatives]
            thumb_max_width = 640

            [auth]
            staff_tokens = ["secret"]
            "#,
        )
        .unwrap();

        assert_eq!(config.derivatives.thumb_max_width, 640);
        assert_eq!(config.derivatives.thumb_quality, 70);
        assert_eq!(config.derivatives.preview_max_width, 1600);
        assert!(config.derivatives.strict);
        assert_eq!(config.api.default_limit, 50);
        assert_eq!(config.api.max_limit, 200);
        assert_eq!(config.auth.staff_tokens, vec!["secret".to_string()]);
        assert_eq!(config.storage.media_url, "/media/");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0:9000\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }
}
