use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the feedgate binary.
#[derive(Debug, Parser)]
#[command(name = "feedgate", version, about = "Caching RSS gateway")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FEEDGATE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the gateway HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the public base URL used in rewritten item links.
    #[arg(long = "public-base-url", value_name = "URL")]
    pub public_base_url: Option<String>,

    /// Toggle the Content-Security-Policy header on proxied HTML.
    #[arg(
        long = "content-csp",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub content_csp: Option<bool>,

    /// Override the total cache size bound in bytes.
    #[arg(long = "cache-max-total-bytes", value_name = "BYTES")]
    pub cache_max_total_bytes: Option<u64>,

    /// Override the single-entry cache size bound in bytes.
    #[arg(long = "cache-max-entry-bytes", value_name = "BYTES")]
    pub cache_max_entry_bytes: Option<u64>,

    /// Override the minimum time between expiry sweeps.
    #[arg(long = "cache-cleanup-interval-seconds", value_name = "SECONDS")]
    pub cache_cleanup_interval_seconds: Option<u64>,

    /// Override the outbound fetch timeout.
    #[arg(long = "upstream-timeout-seconds", value_name = "SECONDS")]
    pub upstream_timeout_seconds: Option<u64>,

    /// Override the outbound User-Agent header.
    #[arg(long = "upstream-user-agent", value_name = "UA")]
    pub upstream_user_agent: Option<String>,
}
