use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Where and how the sportsbook is reached.
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Primary host first, then mirrors. Scheme included, no trailing path.
    pub hosts: Vec<String>,
    #[serde(default = "default_site")]
    pub default_site: String,
    /// Sport segment of the collection path, e.g. `baseball/mlb`.
    #[serde(default = "default_sport_path")]
    pub sport_path: String,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra cache-busted passes over the host list after the first.
    #[serde(default)]
    pub retry_passes: u32,
    /// With a group, also try the sport collection path after the group path.
    #[serde(default)]
    pub collection_fallback: bool,
    #[serde(default = "default_accept")]
    pub accept: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_referer")]
    pub referer: String,
}

fn default_site() -> String { "US-NJ".to_string() }
fn default_sport_path() -> String { "baseball/mlb".to_string() }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_accept() -> String { "application/json, text/plain, */*".to_string() }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124 Safari/537.36".to_string()
}
fn default_referer() -> String { "https://sportsbook.draftkings.com/".to_string() }

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            hosts: vec![
                "https://sportsbook.draftkings.com".to_string(),
                "https://sportsbook-us-nj.draftkings.com".to_string(),
            ],
            default_site: default_site(),
            sport_path: default_sport_path(),
            request_timeout_ms: default_timeout_ms(),
            retry_passes: 0,
            collection_fallback: false,
            accept: default_accept(),
            user_agent: default_user_agent(),
            referer: default_referer(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Log to this file instead of stderr.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_filter() -> String {
    "dk_relay=info,tower_http=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the planner and executor cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.hosts.is_empty() {
            anyhow::bail!("upstream.hosts must list at least one host");
        }
        for host in &self.upstream.hosts {
            let parsed = url::Url::parse(host)
                .with_context(|| format!("upstream host is not a valid URL: {}", host))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("upstream host must be http(s): {}", host);
            }
            if parsed.host_str().is_none() {
                anyhow::bail!("upstream host has no hostname: {}", host);
            }
        }
        if self.upstream.request_timeout_ms == 0 {
            anyhow::bail!("upstream.request_timeout_ms must be > 0");
        }
        if self.upstream.default_site.trim().is_empty() {
            anyhow::bail!("upstream.default_site cannot be empty");
        }
        Ok(())
    }

    /// Apply `DK_RELAY_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overrides read through `lookup`; blank values count as unset.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(bind) = value("DK_RELAY_BIND") {
            self.server.bind = bind;
        }
        if let Some(ms) = value("DK_RELAY_TIMEOUT_MS") {
            self.upstream.request_timeout_ms = ms
                .parse()
                .with_context(|| format!("DK_RELAY_TIMEOUT_MS is not a number: {}", ms))?;
        }
        self.validate()
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        Self::load_env_from(Path::new(ENV_FILE));
    }

    pub fn load_env_from(path: &Path) {
        let Ok(content) = std::fs::read_to_string(path) else {
            return;
        };
        for (key, value) in parse_env_lines(&content) {
            if std::env::var(&key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }
}

/// `KEY=VALUE` pairs from a dotenv file, skipping blanks and `#` comments.
fn parse_env_lines(content: &str) -> Vec<(String, String)> {
    // Windows editors like to leave a BOM behind
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| {
            let v = v.trim().trim_matches('"').trim_matches('\'');
            (k.trim().to_string(), v.to_string())
        })
        .collect()
}
