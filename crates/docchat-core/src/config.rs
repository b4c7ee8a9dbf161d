use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use anyhow::{Result, anyhow};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Settings shared by the terminal client and the chat server.
///
/// Every field is optional on disk; the accessors fall back to the
/// environment and then to the built-in defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub ollama_url: Option<String>,
    pub model: Option<String>,
    pub bind_addr: Option<String>,
    pub frontend_origin: Option<String>,
    pub upload_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub history_path: Option<PathBuf>,
}

fn env_or(key: &str, configured: &Option<String>, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| configured.clone())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn api_url(&self) -> String {
        env_or("DOCCHAT_API_URL", &self.api_url, DEFAULT_API_URL)
    }

    pub fn ollama_url(&self) -> String {
        env_or("OLLAMA_URL", &self.ollama_url, DEFAULT_OLLAMA_URL)
    }

    pub fn model(&self) -> String {
        env_or("DOCCHAT_MODEL", &self.model, DEFAULT_MODEL)
    }

    pub fn bind_addr(&self) -> String {
        env_or("DOCCHAT_BIND", &self.bind_addr, DEFAULT_BIND_ADDR)
    }

    pub fn frontend_origin(&self) -> String {
        env_or("DOCCHAT_FRONTEND_ORIGIN", &self.frontend_origin, DEFAULT_FRONTEND_ORIGIN)
    }

    pub fn upload_dir(&self) -> PathBuf {
        std::env::var("DOCCHAT_UPLOAD_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.upload_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR))
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("docchat"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
