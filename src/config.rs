use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Which object store backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite metadata + payload files on local disk.
    Sqlite,
    /// Process memory; everything is lost on restart.
    Memory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub max_upload_bytes: usize,
    pub cache_capacity: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "WebDAV gateway over a flat object store")]
pub struct Args {
    /// Host to bind to (overrides DAV_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DAV_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides DAV_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory where object payloads are stored (overrides DAV_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides DAV_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Largest accepted request body in bytes (overrides DAV_GATEWAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Number of cached listings kept (overrides DAV_GATEWAY_CACHE_CAPACITY)
    #[arg(long)]
    pub cache_capacity: Option<usize>,

    /// Apply the database schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        Self::from_args(args)
    }

    /// Merge parsed CLI args over environment values and defaults.
    pub fn from_args(args: Args) -> Result<(Self, bool)> {
        let host = match args.host {
            Some(host) => host,
            None => env::var("DAV_GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        };
        let port = match args.port {
            Some(port) => port,
            None => env_parsed("DAV_GATEWAY_PORT", 8080)?,
        };
        let backend = match args.backend {
            Some(backend) => backend,
            None => match env::var("DAV_GATEWAY_BACKEND") {
                Ok(value) => <Backend as ValueEnum>::from_str(&value, true)
                    .map_err(|err| anyhow!("parsing DAV_GATEWAY_BACKEND value `{}`: {}", value, err))?,
                Err(env::VarError::NotPresent) => Backend::Sqlite,
                Err(err) => return Err(err).context("reading DAV_GATEWAY_BACKEND"),
            },
        };
        let storage_dir = match args.storage_dir {
            Some(dir) => dir,
            None => env::var("DAV_GATEWAY_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into()),
        };
        let database_url = match args.database_url {
            Some(url) => url,
            None => env::var("DAV_GATEWAY_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/meta/gateway.db".into()),
        };
        let max_upload_bytes = match args.max_upload_bytes {
            Some(limit) => limit,
            None => env_parsed("DAV_GATEWAY_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        };
        let cache_capacity = match args.cache_capacity {
            Some(capacity) => capacity,
            None => env_parsed("DAV_GATEWAY_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?,
        };

        let cfg = Self {
            host,
            port,
            backend,
            storage_dir,
            database_url,
            max_upload_bytes,
            cache_capacity,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
