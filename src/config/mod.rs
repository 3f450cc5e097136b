//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU64,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "feedgate";
const ENV_PREFIX: &str = "FEEDGATE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8000";
pub(crate) const DEFAULT_CACHE_MAX_TOTAL_BYTES: u64 = 50 * 1024 * 1024;
pub(crate) const DEFAULT_CACHE_MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
pub(crate) const DEFAULT_CACHE_CLEANUP_INTERVAL_SECS: u64 = 30 * 60;
pub(crate) const DEFAULT_CACHE_MEMORY_WARNING_RATIO: f64 = 0.8;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub gateway: GatewaySettings,
    pub cache: CacheSettings,
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Public origin of this gateway, without a trailing slash.
    pub public_base_url: String,
    pub content_csp: bool,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_total_bytes: NonZeroU64,
    pub max_entry_bytes: NonZeroU64,
    pub cleanup_interval: Duration,
    pub memory_warning_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    gateway: RawGatewaySettings,
    cache: RawCacheSettings,
    upstream: RawUpstreamSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.public_base_url.as_ref() {
            self.gateway.public_base_url = Some(url.clone());
        }
        if let Some(enabled) = overrides.content_csp {
            self.gateway.content_csp = Some(enabled);
        }
        if let Some(bytes) = overrides.cache_max_total_bytes {
            self.cache.max_total_bytes = Some(bytes);
        }
        if let Some(bytes) = overrides.cache_max_entry_bytes {
            self.cache.max_entry_bytes = Some(bytes);
        }
        if let Some(seconds) = overrides.cache_cleanup_interval_seconds {
            self.cache.cleanup_interval_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.upstream_timeout_seconds {
            self.upstream.timeout_seconds = Some(seconds);
        }
        if let Some(agent) = overrides.upstream_user_agent.as_ref() {
            self.upstream.user_agent = Some(agent.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            gateway,
            cache,
            upstream,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            gateway: build_gateway_settings(gateway)?,
            cache: build_cache_settings(cache)?,
            upstream: build_upstream_settings(upstream)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_gateway_settings(gateway: RawGatewaySettings) -> Result<GatewaySettings, LoadError> {
    let raw_url = gateway
        .public_base_url
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
    let trimmed = raw_url.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|err| {
        LoadError::invalid("gateway.public_base_url", format!("failed to parse: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "gateway.public_base_url",
            "scheme must be http or https",
        ));
    }

    Ok(GatewaySettings {
        public_base_url: trimmed.to_string(),
        content_csp: gateway.content_csp.unwrap_or(true),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_total_bytes = non_zero_u64(
        cache
            .max_total_bytes
            .unwrap_or(DEFAULT_CACHE_MAX_TOTAL_BYTES),
        "cache.max_total_bytes",
    )?;
    let max_entry_bytes = non_zero_u64(
        cache
            .max_entry_bytes
            .unwrap_or(DEFAULT_CACHE_MAX_ENTRY_BYTES),
        "cache.max_entry_bytes",
    )?;

    let cleanup_secs = cache
        .cleanup_interval_seconds
        .unwrap_or(DEFAULT_CACHE_CLEANUP_INTERVAL_SECS);
    if cleanup_secs == 0 {
        return Err(LoadError::invalid(
            "cache.cleanup_interval_seconds",
            "must be greater than zero",
        ));
    }

    let memory_warning_ratio = cache
        .memory_warning_ratio
        .unwrap_or(DEFAULT_CACHE_MEMORY_WARNING_RATIO);
    if !(memory_warning_ratio > 0.0 && memory_warning_ratio <= 1.0) {
        return Err(LoadError::invalid(
            "cache.memory_warning_ratio",
            "must be within (0, 1]",
        ));
    }

    Ok(CacheSettings {
        max_total_bytes,
        max_entry_bytes,
        cleanup_interval: Duration::from_secs(cleanup_secs),
        memory_warning_ratio,
    })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let timeout_secs = upstream
        .timeout_seconds
        .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "upstream.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let user_agent = match upstream.user_agent {
        Some(agent) if agent.trim().is_empty() => {
            return Err(LoadError::invalid(
                "upstream.user_agent",
                "must not be empty",
            ));
        }
        Some(agent) => agent,
        None => default_user_agent(),
    };

    Ok(UpstreamSettings {
        timeout: Duration::from_secs(timeout_secs),
        user_agent,
    })
}

fn default_user_agent() -> String {
    format!("feedgate/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGatewaySettings {
    public_base_url: Option<String>,
    content_csp: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_total_bytes: Option<u64>,
    max_entry_bytes: Option<u64>,
    cleanup_interval_seconds: Option<u64>,
    memory_warning_ratio: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
