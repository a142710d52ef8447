use crate::services::{remote_fetch::FetchLimits, token_codec::SigningSecret};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt::Display, str::FromStr, time::Duration};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Where object payloads and metadata live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite metadata plus payload files under `storage_dir`.
    Disk,
    /// Process-local map; contents vanish on restart.
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disk" => Ok(Backend::Disk),
            "memory" => Ok(Backend::Memory),
            other => bail!("unknown backend `{}` (expected `disk` or `memory`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub backend: Backend,
    pub signing_secret: SigningSecret,
    pub max_signed_ttl_secs: Option<u64>,
    pub remote_fetch_timeout_secs: Option<u64>,
    pub remote_fetch_max_bytes: Option<u64>,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Object gateway with signed temporary access URLs")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides OBJECT_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides OBJECT_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Storage backend (overrides OBJECT_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// HMAC key for temporary access tokens (overrides OBJECT_GATEWAY_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Upper bound in seconds for `expires_in` (overrides OBJECT_GATEWAY_MAX_SIGNED_TTL)
    #[arg(long = "max-signed-ttl")]
    pub max_signed_ttl_secs: Option<u64>,

    /// Timeout in seconds for `/upload-url` fetches (overrides OBJECT_GATEWAY_FETCH_TIMEOUT)
    #[arg(long = "fetch-timeout")]
    pub remote_fetch_timeout_secs: Option<u64>,

    /// Byte cap for `/upload-url` fetches (overrides OBJECT_GATEWAY_FETCH_MAX_BYTES)
    #[arg(long = "fetch-max-bytes")]
    pub remote_fetch_max_bytes: Option<u64>,

    /// Request body limit for uploads (overrides OBJECT_GATEWAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// CLI values win; `env` supplies the fallback for anything not passed.
    fn merge(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_str = |name: &str, default: &str| env(name).unwrap_or_else(|| default.into());

        let signing_secret = args
            .signing_secret
            .or_else(|| env("OBJECT_GATEWAY_SIGNING_SECRET"))
            .map(SigningSecret::new)
            .filter(|s| !s.is_empty())
            .context("a signing secret is required (--signing-secret or OBJECT_GATEWAY_SIGNING_SECRET)")?;

        Ok(Self {
            host: args
                .host
                .unwrap_or_else(|| env_str("OBJECT_GATEWAY_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => parse_env(&env, "OBJECT_GATEWAY_PORT")?.unwrap_or(3000),
            },
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_str("OBJECT_GATEWAY_STORAGE_DIR", "./data/objects")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_str(
                    "OBJECT_GATEWAY_DATABASE_URL",
                    "sqlite://./data/meta/object_gateway.db",
                )
            }),
            backend: match args.backend {
                Some(backend) => backend,
                None => parse_env(&env, "OBJECT_GATEWAY_BACKEND")?.unwrap_or(Backend::Disk),
            },
            signing_secret,
            max_signed_ttl_secs: or_env(
                args.max_signed_ttl_secs,
                &env,
                "OBJECT_GATEWAY_MAX_SIGNED_TTL",
            )?,
            remote_fetch_timeout_secs: or_env(
                args.remote_fetch_timeout_secs,
                &env,
                "OBJECT_GATEWAY_FETCH_TIMEOUT",
            )?,
            remote_fetch_max_bytes: or_env(
                args.remote_fetch_max_bytes,
                &env,
                "OBJECT_GATEWAY_FETCH_MAX_BYTES",
            )?,
            max_upload_bytes: or_env(
                args.max_upload_bytes,
                &env,
                "OBJECT_GATEWAY_MAX_UPLOAD_BYTES",
            )?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            timeout: self.remote_fetch_timeout_secs.map(Duration::from_secs),
            max_bytes: self.remote_fetch_max_bytes,
        }
    }
}

fn or_env<T>(
    cli: Option<T>,
    env: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match cli {
        Some(value) => Ok(Some(value)),
        None => parse_env(env, name),
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(None),
    }
}
