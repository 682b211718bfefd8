//! Server configuration.
//!
//! Each field is resolved in order: command-line flag, then `QUIZ_*`
//! environment variable (a `.env` file is loaded first by `main`), then the
//! JSON config file, then the built-in default.

use crate::scoring::DEFAULT_MAP_SCALE;
use crate::session::request::ProxyPolicy;
use crate::session::DEFAULT_SESSION_TTL_SECS;
use clap::Parser;
use ipnet::IpNet;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_COOKIE_NAME: &str = "quiz_session";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid listen address {0}")]
    InvalidAddr(String),
    #[error("{0}")]
    Invalid(String),
}

/// Live pub quiz server
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "pubquiz", about = "Live pub quiz server")]
pub struct Cli {
    /// JSON config file (optional unless given explicitly)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Question catalog (JSON array)
    #[arg(long)]
    pub questions: Option<PathBuf>,

    /// Directory served under /static and for the HTML pages
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Session lifetime in seconds
    #[arg(long)]
    pub session_ttl: Option<i64>,

    /// Seconds between expired-session sweeps
    #[arg(long)]
    pub sweep_interval: Option<u64>,

    #[arg(long)]
    pub cookie_name: Option<String>,

    /// Many players on one machine: never match bans by address
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub testing_mode: Option<bool>,

    /// Honor X-Forwarded-For / X-Real-IP
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub trust_proxy_headers: Option<bool>,

    /// Only accept forwarding headers from these networks (repeatable)
    #[arg(long = "trusted-proxy")]
    pub trusted_proxies: Vec<IpNet>,

    /// Miles per pixel on geolocation maps
    #[arg(long)]
    pub map_scale: Option<f64>,

    /// State reads a host message stays visible for
    #[arg(long)]
    pub message_ticks: Option<u32>,
}

/// On-disk config; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
struct FileConfig {
    host: Option<String>,
    server_port: Option<u16>,
    questions: Option<PathBuf>,
    static_dir: Option<PathBuf>,
    session_ttl: Option<i64>,
    sweep_interval: Option<u64>,
    cookie_name: Option<String>,
    testing_mode: Option<bool>,
    trust_proxy_headers: Option<bool>,
    trusted_proxies: Option<Vec<IpNet>>,
    map_scale: Option<f64>,
    message_ticks: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub questions_path: PathBuf,
    pub static_dir: PathBuf,
    pub session_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub cookie_name: String,
    pub testing_mode: bool,
    pub trust_proxy_headers: bool,
    pub trusted_proxies: Vec<IpNet>,
    pub map_scale: f64,
    pub message_ticks: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            questions_path: PathBuf::from("questions.json"),
            static_dir: PathBuf::from("static"),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sweep_interval_secs: 300,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            testing_mode: false,
            trust_proxy_headers: false,
            trusted_proxies: Vec::new(),
            map_scale: DEFAULT_MAP_SCALE,
            message_ticks: 5,
        }
    }
}

fn env_flag(value: &str) -> bool {
    value != "0" && value.to_lowercase() != "false"
}

fn env_parse<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
    }
}

fn read_file_config(path: &Path, required: bool) -> Result<FileConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(FileConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

impl Config {
    /// Resolve from flags, the process environment and the config file
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    fn resolve(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let (path, required) = match (&cli.config, env("QUIZ_CONFIG")) {
            (Some(path), _) => (path.clone(), true),
            (None, Some(path)) => (PathBuf::from(path), true),
            (None, None) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        let file = read_file_config(&path, required)?;
        let mut config = Config::default();

        // File
        if let Some(v) = file.host {
            config.host = v;
        }
        if let Some(v) = file.server_port {
            config.port = v;
        }
        if let Some(v) = file.questions {
            config.questions_path = v;
        }
        if let Some(v) = file.static_dir {
            config.static_dir = v;
        }
        if let Some(v) = file.session_ttl {
            config.session_ttl_secs = v;
        }
        if let Some(v) = file.sweep_interval {
            config.sweep_interval_secs = v;
        }
        if let Some(v) = file.cookie_name {
            config.cookie_name = v;
        }
        if let Some(v) = file.testing_mode {
            config.testing_mode = v;
        }
        if let Some(v) = file.trust_proxy_headers {
            config.trust_proxy_headers = v;
        }
        if let Some(v) = file.trusted_proxies {
            config.trusted_proxies = v;
        }
        if let Some(v) = file.map_scale {
            config.map_scale = v;
        }
        if let Some(v) = file.message_ticks {
            config.message_ticks = v;
        }

        // Environment
        if let Some(v) = env("QUIZ_HOST") {
            config.host = v;
        }
        if let Some(v) = env_parse(&env, "QUIZ_PORT")? {
            config.port = v;
        }
        if let Some(v) = env("QUIZ_QUESTIONS") {
            config.questions_path = PathBuf::from(v);
        }
        if let Some(v) = env("QUIZ_STATIC_DIR") {
            config.static_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse(&env, "QUIZ_SESSION_TTL")? {
            config.session_ttl_secs = v;
        }
        if let Some(v) = env_parse(&env, "QUIZ_SWEEP_INTERVAL")? {
            config.sweep_interval_secs = v;
        }
        if let Some(v) = env("QUIZ_COOKIE_NAME") {
            config.cookie_name = v;
        }
        if let Some(v) = env("QUIZ_TESTING_MODE") {
            config.testing_mode = env_flag(&v);
        }
        if let Some(v) = env("QUIZ_TRUST_PROXY_HEADERS") {
            config.trust_proxy_headers = env_flag(&v);
        }
        if let Some(v) = env("QUIZ_TRUSTED_PROXIES") {
            config.trusted_proxies = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse().map_err(|_| ConfigError::InvalidEnv {
                        key: "QUIZ_TRUSTED_PROXIES".to_string(),
                        value: s.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = env_parse(&env, "QUIZ_MAP_SCALE")? {
            config.map_scale = v;
        }
        if let Some(v) = env_parse(&env, "QUIZ_MESSAGE_TICKS")? {
            config.message_ticks = v;
        }

        // Flags
        if let Some(v) = &cli.host {
            config.host = v.clone();
        }
        if let Some(v) = cli.port {
            config.port = v;
        }
        if let Some(v) = &cli.questions {
            config.questions_path = v.clone();
        }
        if let Some(v) = &cli.static_dir {
            config.static_dir = v.clone();
        }
        if let Some(v) = cli.session_ttl {
            config.session_ttl_secs = v;
        }
        if let Some(v) = cli.sweep_interval {
            config.sweep_interval_secs = v;
        }
        if let Some(v) = &cli.cookie_name {
            config.cookie_name = v.clone();
        }
        if let Some(v) = cli.testing_mode {
            config.testing_mode = v;
        }
        if let Some(v) = cli.trust_proxy_headers {
            config.trust_proxy_headers = v;
        }
        if !cli.trusted_proxies.is_empty() {
            config.trusted_proxies = cli.trusted_proxies.clone();
        }
        if let Some(v) = cli.map_scale {
            config.map_scale = v;
        }
        if let Some(v) = cli.message_ticks {
            config.message_ticks = v;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl_secs <= 0 {
            return Err(ConfigError::Invalid("session TTL must be positive".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep interval must be positive".into()));
        }
        if !(self.map_scale.is_finite() && self.map_scale > 0.0) {
            return Err(ConfigError::Invalid("map scale must be a positive number".into()));
        }
        if self.message_ticks == 0 {
            return Err(ConfigError::Invalid("message ticks must be at least 1".into()));
        }
        let cookie_ok = !self.cookie_name.is_empty()
            && self
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !cookie_ok {
            return Err(ConfigError::Invalid(format!(
                "invalid cookie name {:?}",
                self.cookie_name
            )));
        }
        Ok(())
    }

    /// Listen address; the host may be an IP literal or a resolvable name
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let invalid = || ConfigError::InvalidAddr(format!("{}:{}", self.host, self.port));
        let host = self.host.trim();
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        (host, self.port)
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs)
    }

    pub fn proxy_policy(&self) -> ProxyPolicy {
        ProxyPolicy {
            trust_headers: self.trust_proxy_headers,
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}
