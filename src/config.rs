use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Pooled SQLite connections; one connection serializes all writers
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    #[serde(default = "default_deleted_dir")]
    pub deleted_dir: String,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_allow_empty_uploads")]
    pub allow_empty_uploads: bool,
}

// Default values
fn default_db_path() -> String {
    "data/file-board.db".to_string()
}

fn default_max_connections() -> u32 {
    1
}

fn default_uploads_dir() -> String {
    "files/uploads".to_string()
}

fn default_deleted_dir() -> String {
    "files/deleted".to_string()
}

fn default_max_file_size_mb() -> u64 {
    500
}

fn default_allow_empty_uploads() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            deleted_dir: default_deleted_dir(),
            max_file_size_mb: default_max_file_size_mb(),
            allow_empty_uploads: default_allow_empty_uploads(),
        }
    }
}

impl StorageConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn max_file_size_text(&self) -> String {
        format!("{}MB", self.max_file_size_mb)
    }

    /// Directory holding in-flight uploads; shares a filesystem with the uploads dir
    pub fn staging_dir(&self) -> PathBuf {
        Path::new(&self.uploads_dir).join(".staging")
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        tracing::info!(
            "Storage config: uploads_dir={}, deleted_dir={}, max_file_size={}",
            config.storage.uploads_dir,
            config.storage.deleted_dir,
            config.storage.max_file_size_text()
        );
        Ok(config)
    }

    /// Load configuration from config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["config.toml", "conf.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config = Self::from_toml(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    /// Format: FB_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Database overrides
        if let Some(val) = lookup("FB_CONF_DATABASE_PATH") {
            self.database.path = val;
        }
        if let Some(val) = lookup("FB_CONF_DATABASE_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse::<u32>() {
                self.database.max_connections = n.max(1);
            }
        }

        // Storage overrides
        if let Some(val) = lookup("FB_CONF_STORAGE_UPLOADS_DIR") {
            self.storage.uploads_dir = val;
        }
        if let Some(val) = lookup("FB_CONF_STORAGE_DELETED_DIR") {
            self.storage.deleted_dir = val;
        }
        if let Some(val) = lookup("FB_CONF_STORAGE_MAX_FILE_SIZE_MB") {
            if let Ok(mb) = val.parse() {
                self.storage.max_file_size_mb = mb;
            }
        }
        if let Some(val) = lookup("FB_CONF_STORAGE_ALLOW_EMPTY_UPLOADS") {
            if let Ok(v) = val.parse() {
                self.storage.allow_empty_uploads = v;
            }
        }
    }

    /// Ensure required directories exist
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        // Ensure database directory exists
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        fs::create_dir_all(&self.storage.uploads_dir)?;
        fs::create_dir_all(self.storage.staging_dir())?;
        fs::create_dir_all(&self.storage.deleted_dir)?;

        Ok(())
    }
}
