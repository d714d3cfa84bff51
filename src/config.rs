use postpolicy_core::{GateConfig, UserId, DEFAULT_PAGE_SIZE};
use serde::Deserialize;
use std::path::PathBuf;

/// API key entry in config
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: UserId,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Path to the SQLite database
    pub database_path: PathBuf,
    /// Master switch for policies
    pub policy_enabled: bool,
    /// Only allow policies on posts authored by staff
    pub restrict_to_staff_posts: bool,
    /// Users returned per accepted / not accepted page
    pub page_size: usize,
    /// API keys accepted by the server
    pub api_keys: Vec<ApiKeyEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("postpolicy")
                .join("postpolicy.db"),
            policy_enabled: true,
            restrict_to_staff_posts: false,
            page_size: DEFAULT_PAGE_SIZE,
            api_keys: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`], reading overrides through `env`.
    pub fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| env("POSTPOLICY_CONFIG").map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        config.apply_env(&env)?;

        if config.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "page_size",
                value: "0".to_string(),
            });
        }

        Ok(config)
    }

    fn apply_env<F>(&mut self, env: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = env_parse(env, "POSTPOLICY_PORT")? {
            self.port = port;
        }
        if let Some(db_path) = env("POSTPOLICY_DATABASE_PATH") {
            self.database_path = PathBuf::from(db_path);
        }
        if let Some(enabled) = env_parse(env, "POSTPOLICY_ENABLED")? {
            self.policy_enabled = enabled;
        }
        if let Some(restrict) = env_parse(env, "POSTPOLICY_RESTRICT_TO_STAFF_POSTS")? {
            self.restrict_to_staff_posts = restrict;
        }
        if let Some(page_size) = env_parse(env, "POSTPOLICY_PAGE_SIZE")? {
            self.page_size = page_size;
        }
        Ok(())
    }

    /// Switches handed to the authorization gate.
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            enabled: self.policy_enabled,
            restrict_to_staff_posts: self.restrict_to_staff_posts,
        }
    }

    /// Default config file path: ~/.config/postpolicy/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("postpolicy")
            .join("config.yaml")
    }
}

fn env_parse<T, F>(env: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(_, e) => Some(e),
            ConfigError::ParseError(_, e) => Some(e),
            ConfigError::InvalidValue { .. } => None,
        }
    }
}
