use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which backend the storage provider uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

/// S3 connection settings. Only consulted when `storage_backend` is `S3`,
/// or when a manifest carries S3 locators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    /// Custom endpoint for S3-compatible services (SeaweedFS, MinIO).
    pub endpoint: Option<String>,
    /// Endpoint substituted into presigned URLs handed to clients, when the
    /// internal endpoint is not reachable from outside (Docker networks).
    pub public_endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: String,
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "jwst-data".to_string(),
            endpoint: None,
            public_endpoint: None,
            access_key: None,
            secret_key: None,
            region: "us-east-1".to_string(),
            force_path_style: true,
        }
    }
}

/// Service configuration, read from `MASTFETCH_*` environment variables.
///
/// Every field has a documented default so the service starts with no
/// environment at all; invalid numeric values fall back to the default with
/// a warning rather than aborting startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage_backend: StorageBackend,
    /// Root under which all storage keys resolve (local backend).
    pub storage_root: PathBuf,
    /// Root for archive downloads: `<download_root>/<source_id>/<filename>`,
    /// with the job journal at `<download_root>/.download_state/`.
    pub download_root: PathBuf,
    pub s3: S3Config,

    /// Public archive mirror bucket for S3-sourced manifest entries.
    /// Anonymous access; distinct from the storage bucket above.
    pub archive_bucket: String,
    pub archive_region: String,
    /// Upstream archive query service that yields product lists for a
    /// source id. Jobs without an inline product list fail when unset.
    pub archive_api_url: Option<String>,

    /// Streamed chunk size for HTTP transfers and S3 part size.
    pub chunk_size_bytes: u64,
    pub max_concurrent_files: usize,
    pub max_retries: u32,
    pub retry_base_seconds: f64,
    pub connect_timeout_s: u64,
    pub read_timeout_s: u64,

    pub reproj_cache_ttl_s: u64,
    pub reproj_cache_max_entries: usize,
    pub reproj_cache_max_bytes: u64,

    pub temp_cache_max_bytes: u64,
    pub temp_cache_dir: PathBuf,

    pub state_retention_days: u64,
    pub completed_job_in_memory_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Local,
            storage_root: PathBuf::from("./data"),
            download_root: PathBuf::from("./data/mast"),
            s3: S3Config::default(),
            archive_bucket: "stpubdata".to_string(),
            archive_region: "us-east-1".to_string(),
            archive_api_url: None,
            chunk_size_bytes: 5 * 1024 * 1024,
            max_concurrent_files: 3,
            max_retries: 3,
            retry_base_seconds: 1.0,
            connect_timeout_s: 30,
            read_timeout_s: 300,
            reproj_cache_ttl_s: 600,
            reproj_cache_max_entries: 3,
            reproj_cache_max_bytes: 512 * 1024 * 1024,
            temp_cache_max_bytes: 2 * 1024 * 1024 * 1024,
            temp_cache_dir: std::env::temp_dir().join("mastfetch-cache"),
            state_retention_days: 7,
            completed_job_in_memory_minutes: 30,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Config::default();
        let backend = match env_str("MASTFETCH_STORAGE_PROVIDER").as_deref() {
            Some("s3") => StorageBackend::S3,
            Some("local") | None => StorageBackend::Local,
            Some(other) => {
                tracing::warn!(value = other, "unknown storage provider, using local");
                StorageBackend::Local
            }
        };

        Self {
            storage_backend: backend,
            storage_root: env_path("MASTFETCH_STORAGE_ROOT", d.storage_root),
            download_root: env_path("MASTFETCH_DOWNLOAD_ROOT", d.download_root),
            s3: S3Config {
                bucket: env_str("MASTFETCH_S3_BUCKET").unwrap_or(d.s3.bucket),
                endpoint: env_str("MASTFETCH_S3_ENDPOINT"),
                public_endpoint: env_str("MASTFETCH_S3_PUBLIC_ENDPOINT"),
                access_key: env_str("MASTFETCH_S3_ACCESS_KEY"),
                secret_key: env_str("MASTFETCH_S3_SECRET_KEY"),
                region: env_str("MASTFETCH_S3_REGION").unwrap_or(d.s3.region),
                force_path_style: env_parse("MASTFETCH_S3_FORCE_PATH_STYLE", d.s3.force_path_style),
            },
            archive_bucket: env_str("MASTFETCH_ARCHIVE_S3_BUCKET").unwrap_or(d.archive_bucket),
            archive_region: env_str("MASTFETCH_ARCHIVE_S3_REGION").unwrap_or(d.archive_region),
            archive_api_url: env_str("MASTFETCH_ARCHIVE_API_URL"),
            chunk_size_bytes: env_parse("MASTFETCH_CHUNK_SIZE_BYTES", d.chunk_size_bytes),
            max_concurrent_files: env_parse("MASTFETCH_MAX_CONCURRENT_FILES", d.max_concurrent_files),
            max_retries: env_parse("MASTFETCH_MAX_RETRIES", d.max_retries),
            retry_base_seconds: env_parse("MASTFETCH_RETRY_BASE_SECONDS", d.retry_base_seconds),
            connect_timeout_s: env_parse("MASTFETCH_CONNECT_TIMEOUT_S", d.connect_timeout_s),
            read_timeout_s: env_parse("MASTFETCH_READ_TIMEOUT_S", d.read_timeout_s),
            reproj_cache_ttl_s: env_parse("MASTFETCH_REPROJ_CACHE_TTL_S", d.reproj_cache_ttl_s),
            reproj_cache_max_entries: env_parse(
                "MASTFETCH_REPROJ_CACHE_MAX_ENTRIES",
                d.reproj_cache_max_entries,
            ),
            reproj_cache_max_bytes: env_parse(
                "MASTFETCH_REPROJ_CACHE_MAX_BYTES",
                d.reproj_cache_max_bytes,
            ),
            temp_cache_max_bytes: env_parse("MASTFETCH_TEMP_CACHE_MAX_BYTES", d.temp_cache_max_bytes),
            temp_cache_dir: env_path("MASTFETCH_TEMP_CACHE_DIR", d.temp_cache_dir),
            state_retention_days: env_parse("MASTFETCH_STATE_RETENTION_DAYS", d.state_retention_days),
            completed_job_in_memory_minutes: env_parse(
                "MASTFETCH_COMPLETED_JOB_IN_MEMORY_MINUTES",
                d.completed_job_in_memory_minutes,
            ),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_s)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_s)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_base_seconds)
    }

    /// Journal directory for durable job state.
    pub fn state_dir(&self) -> PathBuf {
        self.download_root.join(crate::journal::STATE_DIR_NAME)
    }
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_path(name: &str, default: PathBuf) -> PathBuf {
    env_str(name).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match env_str(name) {
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "invalid value, using default");
                default
            }
        },
        None => default,
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}
