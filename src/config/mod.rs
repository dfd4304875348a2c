//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::auth::BootstrapAdmin;
use crate::cache::{CacheBackendKind, CacheConfig, DEFAULT_CACHE_URL};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "planity";
const ENV_PREFIX: &str = "PLANITY";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8800;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_ADMIN_NAME: &str = "Administrator";
const DEFAULT_ADMIN_EMAIL: &str = "admin@planity.local";

/// Deployment variables honoured when the matching setting is absent.
const REDIS_URL_VAR: &str = "REDIS_URL";
const PORT_VAR: &str = "PORT";

/// Command-line arguments for the Planity binary.
#[derive(Debug, Parser)]
#[command(name = "planity", version, about = "Planity task API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PLANITY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
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

    /// Toggle the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Refuse to start when the cache backend is unreachable.
    #[arg(
        long = "cache-required",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_required: Option<bool>,

    /// Override the cache connection URL.
    #[arg(long = "cache-url", value_name = "URL")]
    pub cache_url: Option<String>,

    /// Override the cache backend (redis|memory).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the default TTL of cached responses.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
    pub auth: AuthSettings,
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
pub struct AuthSettings {
    pub bootstrap_admin: BootstrapAdmin,
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
    load_with_env(cli, |name| std::env::var(name).ok())
}

/// [`load`] with the deployment-variable lookup supplied by the caller.
pub fn load_with_env(
    cli: &CliArgs,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_deployment_env(lookup)?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_deployment_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), LoadError> {
        if self.cache.url.is_none() {
            self.cache.url = lookup(REDIS_URL_VAR).filter(|url| !url.trim().is_empty());
        }
        if self.server.port.is_some() {
            return Ok(());
        }
        if let Some(port) = lookup(PORT_VAR) {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|err| LoadError::invalid("PORT", format!("failed to parse: {err}")))?;
            self.server.port = Some(port);
        }
        Ok(())
    }

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
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(required) = overrides.cache_required {
            self.cache.required = Some(required);
        }
        if let Some(url) = overrides.cache_url.as_ref() {
            self.cache.url = Some(url.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(ttl) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(ttl);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            auth,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let auth = build_auth_settings(auth)?;

        Ok(Self {
            server,
            logging,
            cache,
            auth,
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

    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();

    let backend = match cache.backend {
        Some(value) => CacheBackendKind::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => defaults.backend,
    };

    let url = cache
        .url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_CACHE_URL.to_string());
    if backend == CacheBackendKind::Redis && !url.contains("://") {
        return Err(LoadError::invalid(
            "cache.url",
            format!("expected `<scheme>://<host>:<port>`, got `{url}`"),
        ));
    }

    let default_ttl = seconds(
        cache.default_ttl_seconds,
        defaults.default_ttl,
        "cache.default_ttl_seconds",
    )?;
    let dashboard_ttl = seconds(
        cache.dashboard_ttl_seconds,
        defaults.dashboard_ttl,
        "cache.dashboard_ttl_seconds",
    )?;
    let reconnect_interval = seconds(
        cache.reconnect_interval_seconds,
        defaults.reconnect_interval,
        "cache.reconnect_interval_seconds",
    )?;
    let operation_timeout = millis(
        cache.operation_timeout_ms,
        defaults.operation_timeout,
        "cache.operation_timeout_ms",
    )?;
    let invalidation_timeout = millis(
        cache.invalidation_timeout_ms,
        defaults.invalidation_timeout,
        "cache.invalidation_timeout_ms",
    )?;
    let connect_timeout = millis(
        cache.connect_timeout_ms,
        defaults.connect_timeout,
        "cache.connect_timeout_ms",
    )?;
    let connect_backoff = cache
        .connect_backoff_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.connect_backoff);

    let connect_retries = match cache.connect_retries {
        Some(value) => non_zero_u32(value.into(), "cache.connect_retries")?.get(),
        None => defaults.connect_retries,
    };

    let max_body_bytes = match cache.max_body_bytes {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.max_body_bytes",
                "must be greater than zero",
            ));
        }
        Some(value) => usize::try_from(value).map_err(|_| {
            LoadError::invalid(
                "cache.max_body_bytes",
                "value exceeds supported range for usize",
            )
        })?,
        None => defaults.max_body_bytes,
    };

    let memory_max_entries = match cache.memory_max_entries {
        Some(0) => {
            return Err(LoadError::invalid(
                "cache.memory_max_entries",
                "must be greater than zero",
            ));
        }
        Some(value) => usize::try_from(value).map_err(|_| {
            LoadError::invalid(
                "cache.memory_max_entries",
                "value exceeds supported range for usize",
            )
        })?,
        None => defaults.memory_max_entries,
    };

    Ok(CacheConfig {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        required: cache.required.unwrap_or(defaults.required),
        backend,
        url,
        default_ttl,
        dashboard_ttl,
        operation_timeout,
        invalidation_timeout,
        connect_retries,
        connect_backoff,
        connect_timeout,
        reconnect_interval,
        max_body_bytes,
        memory_max_entries,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let name = auth
        .admin_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string());

    let email = auth
        .admin_email
        .map(|email| email.trim().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string());
    if !email.contains('@') {
        return Err(LoadError::invalid(
            "auth.admin_email",
            "must be an email address",
        ));
    }

    let token = auth
        .admin_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    Ok(AuthSettings {
        bootstrap_admin: BootstrapAdmin { name, email, token },
    })
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
struct RawCacheSettings {
    enabled: Option<bool>,
    required: Option<bool>,
    backend: Option<String>,
    url: Option<String>,
    default_ttl_seconds: Option<u64>,
    dashboard_ttl_seconds: Option<u64>,
    operation_timeout_ms: Option<u64>,
    invalidation_timeout_ms: Option<u64>,
    connect_retries: Option<u32>,
    connect_backoff_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    reconnect_interval_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
    memory_max_entries: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    admin_name: Option<String>,
    admin_email: Option<String>,
    admin_token: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn seconds(value: Option<u64>, default: Duration, key: &'static str) -> Result<Duration, LoadError> {
    match value {
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

fn millis(value: Option<u64>, default: Duration, key: &'static str) -> Result<Duration, LoadError> {
    match value {
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => Ok(default),
    }
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
