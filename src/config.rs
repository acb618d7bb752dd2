use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments. Nothing outside this
/// module reads the environment; constructors receive explicit structs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub store: StoreConfig,
    pub limits: UploadLimits,
}

/// Which object store backend to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// S3-compatible remote store (AWS, R2, MinIO).
    S3,
    /// Process-local store; uploads do not survive a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown store backend `{}` (expected s3 or memory)", other),
        }
    }
}

/// Object store settings handed to the store constructor.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub url_ttl_secs: u64,
}

impl StoreConfig {
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }
}

/// Upload and listing limits enforced by the image service.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_upload_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl UploadLimits {
    pub fn is_content_type_allowed(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            allowed_content_types: vec![
                "image/jpeg".into(),
                "image/png".into(),
                "image/gif".into(),
                "image/webp".into(),
            ],
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Object-storage-backed image API")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides IMAGE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object store backend, s3 or memory (overrides IMAGE_STORE_BACKEND)
    #[arg(long)]
    pub backend: Option<String>,

    /// Bucket holding the image blobs (overrides IMAGE_STORE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3 endpoint override for R2/MinIO (overrides IMAGE_STORE_ENDPOINT_URL)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("IMAGE_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port: u16 = env_parsed("IMAGE_STORE_PORT", 3000)?;
        let env_db = env::var("IMAGE_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/image_store.db".into());
        let env_backend = env::var("IMAGE_STORE_BACKEND").unwrap_or_else(|_| "s3".into());
        let env_bucket = env::var("IMAGE_STORE_BUCKET").unwrap_or_default();

        let backend: StoreBackend = args
            .backend
            .unwrap_or(env_backend)
            .parse()
            .context("parsing store backend")?;
        let bucket = args.bucket.unwrap_or(env_bucket);
        if backend == StoreBackend::S3 && bucket.is_empty() {
            bail!("IMAGE_STORE_BUCKET (or --bucket) is required for the s3 backend");
        }

        let store = StoreConfig {
            backend,
            bucket,
            region: env::var("IMAGE_STORE_REGION").ok(),
            endpoint_url: args
                .endpoint_url
                .or_else(|| env::var("IMAGE_STORE_ENDPOINT_URL").ok()),
            url_ttl_secs: env_parsed("IMAGE_STORE_URL_TTL_SECS", 24 * 60 * 60)?,
        };

        let mut limits = UploadLimits::default();
        limits.max_upload_bytes =
            env_parsed("IMAGE_STORE_MAX_UPLOAD_BYTES", limits.max_upload_bytes)?;
        if let Ok(types) = env::var("IMAGE_STORE_ALLOWED_CONTENT_TYPES") {
            limits.allowed_content_types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            store,
            limits,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read an environment variable and parse it, falling back to `default` when
/// the variable is absent.
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
