//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::RefreshPolicy;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vetrina";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
const DEFAULT_FFPROBE_PATH: &str = "ffprobe";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROBE_CONCURRENCY: usize = 3;
const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_SHARE_DIR: &str = "cache/share";
const DEFAULT_SHARE_HOMEPAGE_LIMIT: usize = 4;

/// Command-line arguments for the vetrina binary.
#[derive(Debug, Parser)]
#[command(name = "vetrina", version, about = "Vetrina portfolio content server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VETRINA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the vetrina HTTP service.
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

    /// Override the shared secret protecting the admin endpoints.
    #[arg(
        long = "server-admin-secret",
        env = "VETRINA_ADMIN_SECRET",
        value_name = "SECRET"
    )]
    pub server_admin_secret: Option<String>,

    /// Override the origin base URL.
    #[arg(long = "origin-base-url", value_name = "URL")]
    pub origin_base_url: Option<String>,

    /// Override the per-request origin timeout.
    #[arg(long = "origin-request-timeout-seconds", value_name = "SECONDS")]
    pub origin_request_timeout_seconds: Option<u64>,

    /// Override the ffprobe executable used for video dimension probing.
    #[arg(long = "origin-ffprobe-path", value_name = "PATH")]
    pub origin_ffprobe_path: Option<PathBuf>,

    /// Override the video probe timeout.
    #[arg(long = "origin-probe-timeout-seconds", value_name = "SECONDS")]
    pub origin_probe_timeout_seconds: Option<u64>,

    /// Override how many image downloads may be in flight per project.
    #[arg(long = "origin-probe-concurrency", value_name = "COUNT")]
    pub origin_probe_concurrency: Option<usize>,

    /// Override the cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,

    /// Override the refresh policy (interval|always).
    #[arg(long = "cache-refresh-policy", value_name = "POLICY")]
    pub cache_refresh_policy: Option<String>,

    /// Override the snapshot TTL for the interval policy.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Toggle a background refresh at startup.
    #[arg(
        long = "cache-warmup-on-startup",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_warmup_on_startup: Option<bool>,

    /// Override the share card cache directory.
    #[arg(long = "share-directory", value_name = "PATH")]
    pub share_directory: Option<PathBuf>,

    /// Override how many projects feed the homepage share card.
    #[arg(long = "share-homepage-limit", value_name = "COUNT")]
    pub share_homepage_limit: Option<usize>,

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
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub origin: OriginSettings,
    pub cache: CacheSettings,
    pub share: ShareSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Shared secret for the privileged admin endpoints. When unset those
    /// endpoints answer with a server-side configuration error.
    pub admin_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub ffprobe_path: PathBuf,
    pub probe_timeout: Duration,
    pub probe_concurrency: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub policy: RefreshPolicy,
    pub warmup_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct ShareSettings {
    pub directory: PathBuf,
    pub homepage_limit: NonZeroUsize,
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

    builder = builder.add_source(Environment::with_prefix("VETRINA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    origin: RawOriginSettings,
    cache: RawCacheSettings,
    share: RawShareSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(secret) = overrides.server_admin_secret.as_ref() {
            self.server.admin_secret = Some(secret.clone());
        }
        if let Some(url) = overrides.origin_base_url.as_ref() {
            self.origin.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.origin_request_timeout_seconds {
            self.origin.request_timeout_seconds = Some(seconds);
        }
        if let Some(path) = overrides.origin_ffprobe_path.as_ref() {
            self.origin.ffprobe_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.origin_probe_timeout_seconds {
            self.origin.probe_timeout_seconds = Some(seconds);
        }
        if let Some(count) = overrides.origin_probe_concurrency {
            self.origin.probe_concurrency = Some(count);
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(policy) = overrides.cache_refresh_policy.as_ref() {
            self.cache.refresh_policy = Some(policy.clone());
        }
        if let Some(seconds) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(seconds);
        }
        if let Some(warmup) = overrides.cache_warmup_on_startup {
            self.cache.warmup_on_startup = Some(warmup);
        }
        if let Some(directory) = overrides.share_directory.as_ref() {
            self.share.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.share_homepage_limit {
            self.share.homepage_limit = Some(limit);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            origin,
            cache,
            share,
            logging,
        } = raw;

        let server = build_server_settings(server)?;
        let origin = build_origin_settings(origin)?;
        let cache = build_cache_settings(cache)?;
        let share = build_share_settings(share)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            server,
            origin,
            cache,
            share,
            logging,
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

    let admin_secret = server.admin_secret.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(ServerSettings { addr, admin_secret })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let base_url = origin
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("origin.base_url", "must be set"))?;
    let base_url = Url::parse(base_url)
        .map_err(|err| LoadError::invalid("origin.base_url", format!("failed to parse: {err}")))?;

    let request_timeout_secs = origin
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if request_timeout_secs == 0 {
        return Err(LoadError::invalid(
            "origin.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let probe_timeout_secs = origin
        .probe_timeout_seconds
        .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);
    if probe_timeout_secs == 0 {
        return Err(LoadError::invalid(
            "origin.probe_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let ffprobe_path = origin
        .ffprobe_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FFPROBE_PATH));
    if ffprobe_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "origin.ffprobe_path",
            "path must not be empty",
        ));
    }

    let probe_concurrency = origin
        .probe_concurrency
        .unwrap_or(DEFAULT_PROBE_CONCURRENCY);
    let probe_concurrency = NonZeroUsize::new(probe_concurrency).ok_or_else(|| {
        LoadError::invalid("origin.probe_concurrency", "must be greater than zero")
    })?;

    Ok(OriginSettings {
        base_url,
        request_timeout: Duration::from_secs(request_timeout_secs),
        ffprobe_path,
        probe_timeout: Duration::from_secs(probe_timeout_secs),
        probe_concurrency,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    let policy = match cache.refresh_policy.as_deref().unwrap_or("interval") {
        "interval" => {
            if ttl_seconds == 0 {
                return Err(LoadError::invalid(
                    "cache.ttl_seconds",
                    "must be greater than zero for the interval policy",
                ));
            }
            RefreshPolicy::Interval(Duration::from_secs(ttl_seconds))
        }
        "always" => RefreshPolicy::Always,
        other => {
            return Err(LoadError::invalid(
                "cache.refresh_policy",
                format!("unknown policy `{other}`; expected `interval` or `always`"),
            ));
        }
    };

    Ok(CacheSettings {
        directory,
        policy,
        warmup_on_startup: cache.warmup_on_startup.unwrap_or(false),
    })
}

fn build_share_settings(share: RawShareSettings) -> Result<ShareSettings, LoadError> {
    let directory = share
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SHARE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "share.directory",
            "path must not be empty",
        ));
    }

    let homepage_limit = share
        .homepage_limit
        .unwrap_or(DEFAULT_SHARE_HOMEPAGE_LIMIT);
    let homepage_limit = NonZeroUsize::new(homepage_limit)
        .ok_or_else(|| LoadError::invalid("share.homepage_limit", "must be greater than zero"))?;

    Ok(ShareSettings {
        directory,
        homepage_limit,
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

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    admin_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    base_url: Option<String>,
    request_timeout_seconds: Option<u64>,
    ffprobe_path: Option<PathBuf>,
    probe_timeout_seconds: Option<u64>,
    probe_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    directory: Option<PathBuf>,
    refresh_policy: Option<String>,
    ttl_seconds: Option<u64>,
    warmup_on_startup: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawShareSettings {
    directory: Option<PathBuf>,
    homepage_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
