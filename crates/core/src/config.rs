use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::DEFAULT_PAGE_SIZE;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedConnection {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub database: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl SavedConnection {
    #[must_use]
    pub fn new(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            database: database.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub saved_connections: Vec<SavedConnection>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            auth_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            saved_connections: Vec::new(),
        }
    }
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl ClientConfig {
    fn normalize(&mut self) {
        let mut by_name = BTreeMap::new();
        for connection in self.saved_connections.drain(..) {
            by_name.insert(connection.name.clone(), connection);
        }
        self.saved_connections = by_name.into_values().collect();
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidPageSize {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("page_size in {path} must be greater than 0")]
    InvalidPageSize { path: PathBuf },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    config: ClientConfig,
}

impl FileConfigStore {
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                config: ClientConfig::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                config: ClientConfig::default(),
            });
        }

        let mut config: ClientConfig =
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.validate(&path)?;
        config.normalize();

        Ok(Self { path, config })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    #[must_use]
    pub fn into_config(self) -> ClientConfig {
        self.config
    }

    #[must_use]
    pub fn connection(&self, name: &str) -> Option<&SavedConnection> {
        self.config
            .saved_connections
            .iter()
            .find(|connection| connection.name == name)
    }

    pub fn upsert_connection(&mut self, connection: SavedConnection) {
        let connections = &mut self.config.saved_connections;
        if let Some(existing) = connections
            .iter_mut()
            .find(|existing| existing.name == connection.name)
        {
            *existing = connection;
        } else {
            connections.push(connection);
            connections.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        }
    }

    #[must_use]
    pub fn delete_connection(&mut self, name: &str) -> bool {
        let connections = &mut self.config.saved_connections;
        let original_len = connections.len();
        connections.retain(|connection| connection.name != name);
        connections.len() != original_len
    }

    pub fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.config)
            .map_err(|source| ConfigError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base_dir = if let Some(custom) = env::var_os("DBFUSE_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("dbfuse").join("config.toml"))
}
