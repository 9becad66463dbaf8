//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the file named by `PROJCHAT_CONFIG`), then applies `PROJCHAT_API_URL` and
//! `PROJCHAT_LOG_LEVEL` env overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Remote service settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Service root, e.g. `http://127.0.0.1:8000`; `memory://` runs the
    /// in-process service instead.
    pub base_url: String,
}

/// Session token persistence.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether the bearer token is kept on disk between runs.
    pub persist: bool,
    /// Token file location (already expanded, no `~`).
    pub token_file: PathBuf,
}

/// Fully-resolved client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api: ApiConfig,
    pub session: SessionConfig,
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    client: RawClient,
    #[serde(default)]
    api: RawApi,
    #[serde(default)]
    session: RawSession,
}

#[derive(Deserialize)]
struct RawClient {
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawApi {
    #[serde(default = "default_base_url")]
    base_url: String,
}

#[derive(Deserialize)]
struct RawSession {
    /// Defaults to `true`: a login survives a restart until logout or a 401.
    #[serde(default = "default_true")]
    persist: bool,
    #[serde(default = "default_token_file")]
    token_file: String,
}

impl Default for RawClient {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

impl Default for RawApi {
    fn default() -> Self {
        Self { base_url: default_base_url() }
    }
}

impl Default for RawSession {
    fn default() -> Self {
        Self { persist: true, token_file: default_token_file() }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_base_url() -> String { "http://127.0.0.1:8000".to_string() }
fn default_token_file() -> String { "~/.projchat/session.token".to_string() }

fn default_true() -> bool {
    true
}

/// Load config from `PROJCHAT_CONFIG` or `config/default.toml`, then apply
/// env-var overrides.
pub fn load(path_override: Option<&Path>) -> Result<Config, AppError> {
    let env_path = env::var("PROJCHAT_CONFIG").ok().map(PathBuf::from);
    let path = path_override
        .map(Path::to_path_buf)
        .or(env_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let api_url_override = env::var("PROJCHAT_API_URL").ok();
    let log_level_override = env::var("PROJCHAT_LOG_LEVEL").ok();
    load_from(&path, api_url_override.as_deref(), log_level_override.as_deref())
}

/// Internal loader: accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    api_url_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let base_url = api_url_override.unwrap_or(&parsed.api.base_url).trim().to_string();
    if base_url.is_empty() {
        return Err(AppError::Config("api.base_url must not be empty".into()));
    }

    Ok(Config {
        log_level: log_level_override.unwrap_or(&parsed.client.log_level).to_string(),
        api: ApiConfig { base_url },
        session: SessionConfig {
            persist: parsed.session.persist,
            token_file: expand_home(&parsed.session.token_file),
        },
    })
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[client]
log_level = "warn"

[api]
base_url = "http://svc.test:8000"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.log_level, "warn");
        assert_eq!(cfg.api.base_url, "http://svc.test:8000");
        assert!(cfg.session.persist);
        assert!(cfg.session.token_file.ends_with(".projchat/session.token"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let f = write_toml("");
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.api.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn session_section_parses() {
        let f = write_toml("[session]\npersist = false\ntoken_file = \"/tmp/pc/token\"\n");
        let cfg = load_from(f.path(), None, None).unwrap();
        assert!(!cfg.session.persist);
        assert_eq!(cfg.session.token_file, PathBuf::from("/tmp/pc/token"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.projchat");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".projchat"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn malformed_toml_errors() {
        let f = write_toml("[api\nbase_url = ");
        assert!(matches!(load_from(f.path(), None, None), Err(AppError::Config(_))));
    }

    #[test]
    fn env_api_url_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("memory://"), None).unwrap();
        assert_eq!(cfg.api.base_url, "memory://");
    }

    #[test]
    fn blank_api_url_is_rejected() {
        let f = write_toml(MINIMAL_TOML);
        assert!(load_from(f.path(), Some("  "), None).is_err());
    }

    #[test]
    fn env_log_level_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, Some("debug")).unwrap();
        assert_eq!(cfg.log_level, "debug");
    }
}
