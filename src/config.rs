//! Configuration loading.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file
//! (`~/.wagate/config.toml` or `--config <path>`), environment, CLI flags.
//! The bearer credential has no built-in default on purpose; startup fails
//! without one.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable holding the shared bearer secret.
pub const TOKEN_ENV: &str = "WAGATE_TOKEN";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address. The API is meant to be called by other services, so the
    /// default exposes every interface; a warning is logged for public binds.
    pub host: String,
    pub port: u16,
    /// Shared bearer secret. `WAGATE_TOKEN` takes precedence over this.
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// WebDriver endpoint, usually a locally running chromedriver.
    pub webdriver_url: String,
    pub headless: bool,
    /// Chrome profile directory. Holds the linked WhatsApp session between
    /// runs; delete it to force a fresh QR on the next start.
    pub data_dir: String,
    /// Extra Chrome switches passed through `goog:chromeOptions`.
    pub args: Vec<String>,
    /// How often the page is polled for login-state changes.
    pub poll_interval_ms: u64,
    /// Render each fresh QR to the terminal as well.
    pub print_qr: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            headless: true,
            data_dir: "~/.wagate/session".to_string(),
            args: default_chrome_args(),
            poll_interval_ms: 1500,
            print_qr: true,
        }
    }
}

/// Switches WhatsApp Web needs in containers and headless environments.
fn default_chrome_args() -> Vec<String> {
    [
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-accelerated-2d-canvas",
        "--disable-gpu",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Load from `path` when given, otherwise from the default location.
    /// A missing file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("invalid config at {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the bearer credential: environment first, config file second.
    pub fn resolve_token(&self) -> Result<String> {
        resolve_token(std::env::var(TOKEN_ENV).ok(), self.gateway.token.clone())
    }

    /// Browser profile directory with `~` expanded.
    pub fn session_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.browser.data_dir).into_owned())
    }
}

fn resolve_token(env_value: Option<String>, file_value: Option<String>) -> Result<String> {
    env_value
        .into_iter()
        .chain(file_value)
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!("no bearer token configured; set {TOKEN_ENV} or [gateway] token")
        })
}

/// `~/.wagate/config.toml`, falling back to a relative path when the home
/// directory cannot be determined.
pub fn default_config_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".wagate").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".wagate/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_all_interfaces_on_3000() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 3000);
        assert!(config.gateway.token.is_none());
    }

    #[test]
    fn partial_toml_keeps_section_defaults() {
        let config: Config = toml::from_str("[gateway]\nport = 8080\n").unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert!(config.browser.headless);
        assert_eq!(config.browser.poll_interval_ms, 1500);
    }

    #[test]
    fn token_prefers_environment_over_file() {
        let token =
            resolve_token(Some("env-secret".to_string()), Some("file-secret".to_string())).unwrap();
        assert_eq!(token, "env-secret");
    }

    #[test]
    fn blank_environment_token_falls_back_to_file() {
        let token = resolve_token(Some("   ".to_string()), Some("file-secret".to_string())).unwrap();
        assert_eq!(token, "file-secret");
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = resolve_token(None, None).unwrap_err();
        assert!(err.to_string().contains(TOKEN_ENV));
    }

    #[test]
    fn load_reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[browser]\nheadless = false\nwebdriver_url = \"http://localhost:4444\"\n",
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.browser.webdriver_url, "http://localhost:4444");
        // Untouched section keeps its defaults.
        assert_eq!(config.gateway.port, 3000);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/wagate/config.toml"))).unwrap();
        assert_eq!(config.gateway.port, 3000);
        assert!(config.browser.headless);
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[gateway\nport = 8080").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn default_chrome_args_cover_container_quirks() {
        let args = default_chrome_args();
        assert!(args.iter().any(|a| a == "--no-sandbox"));
        assert!(args.iter().any(|a| a == "--disable-dev-shm-usage"));
        assert!(args.iter().any(|a| a == "--disable-gpu"));
    }

    #[test]
    fn session_dir_expands_tilde() {
        let config = Config::default();
        let dir = config.session_dir();
        assert!(dir.ends_with(".wagate/session"));
    }
}
