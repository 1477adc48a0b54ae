//! Configuration management.
//!
//! Settings come from command-line arguments or `IMG_`-prefixed environment
//! variables, with defaults for everything optional.
//!
//! # Example
//!
//! ```ignore
//! use tiered_images::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! println!("Listening on {}", config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `IMG_HOST` - Server bind address (default: 0.0.0.0)
//! - `IMG_PORT` - Server port (default: 8000)
//! - `IMG_STORAGE` - Blob backend: local, s3 or memory (default: local)
//! - `IMG_MEDIA_ROOT` - Directory for the local backend (default: ./media)
//! - `IMG_S3_BUCKET` - S3 bucket name (required for the s3 backend)
//! - `IMG_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `IMG_S3_REGION` - AWS region (default: us-east-1)
//! - `IMG_EXPIRE_AFTER_MIN` / `IMG_EXPIRE_AFTER_MAX` - Expiring link bounds in seconds
//! - `IMG_MAX_HEIGHT_CACHE_TTL` - Seconds the largest thumbnail height stays cached
//! - `IMG_ASSET_CACHE_BYTES` - In-memory blob cache size
//! - `IMG_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `IMG_MAX_UPLOAD_BYTES` - Largest accepted upload
//! - `IMG_LINK_PURGE_INTERVAL` - Seconds between expired-link sweeps (0 disables)
//! - `IMG_USER_TIERS` - Comma-separated `user=tier` bindings

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};

use crate::links::{DEFAULT_EXPIRE_AFTER_MAX, DEFAULT_EXPIRE_AFTER_MIN};
use crate::server::DEFAULT_MAX_UPLOAD_BYTES;
use crate::store::DEFAULT_ASSET_CACHE_CAPACITY;
use crate::thumbnail::DEFAULT_MAX_HEIGHT_TTL_SECS;
use crate::tier::UserId;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default root directory for the local blob backend.
pub const DEFAULT_MEDIA_ROOT: &str = "./media";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default interval between expired-link sweeps (1 hour).
pub const DEFAULT_LINK_PURGE_INTERVAL: u64 = 3600;

// =============================================================================
// Value Types
// =============================================================================

/// Where image and thumbnail bytes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Files under `--media-root`
    Local,
    /// An S3 or S3-compatible bucket
    S3,
    /// Process memory; lost on exit
    Memory,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

/// A `user=tier` binding given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTierBinding {
    pub user: UserId,
    pub tier: String,
}

impl FromStr for UserTierBinding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, tier) = s
            .split_once('=')
            .ok_or_else(|| format!("expected user=tier, got '{}'", s))?;
        let (user, tier) = (user.trim(), tier.trim());
        if user.is_empty() || tier.is_empty() {
            return Err(format!("expected user=tier, got '{}'", s));
        }
        Ok(UserTierBinding {
            user: UserId::new(user),
            tier: tier.to_string(),
        })
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tiered image hosting server.
///
/// Stores uploaded images, renders a thumbnail per height of the owner's
/// account tier, and serves originals through self-expiring links.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiered-images")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IMG_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IMG_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Blob storage backend.
    #[arg(long, value_enum, default_value_t = StorageBackend::Local, env = "IMG_STORAGE")]
    pub storage: StorageBackend,

    /// Root directory for the local backend.
    #[arg(long, default_value = DEFAULT_MEDIA_ROOT, env = "IMG_MEDIA_ROOT")]
    pub media_root: PathBuf,

    /// S3 bucket name (required with `--storage s3`).
    #[arg(long, env = "IMG_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "IMG_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "IMG_S3_REGION")]
    pub s3_region: String,

    // =========================================================================
    // Expiring Links
    // =========================================================================
    /// Smallest accepted `expire_after`, in seconds.
    #[arg(long, default_value_t = DEFAULT_EXPIRE_AFTER_MIN, env = "IMG_EXPIRE_AFTER_MIN")]
    pub expire_after_min: u32,

    /// Largest accepted `expire_after`, in seconds.
    #[arg(long, default_value_t = DEFAULT_EXPIRE_AFTER_MAX, env = "IMG_EXPIRE_AFTER_MAX")]
    pub expire_after_max: u32,

    /// Seconds between sweeps deleting expired links (0 disables).
    #[arg(long, default_value_t = DEFAULT_LINK_PURGE_INTERVAL, env = "IMG_LINK_PURGE_INTERVAL")]
    pub link_purge_interval: u64,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Seconds the largest configured thumbnail height stays cached.
    #[arg(long, default_value_t = DEFAULT_MAX_HEIGHT_TTL_SECS, env = "IMG_MAX_HEIGHT_CACHE_TTL")]
    pub max_height_cache_ttl: i64,

    /// Size in bytes of the in-memory blob cache.
    #[arg(long, default_value_t = DEFAULT_ASSET_CACHE_CAPACITY, env = "IMG_ASSET_CACHE_BYTES")]
    pub asset_cache_bytes: usize,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "IMG_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Largest accepted request body in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "IMG_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    // =========================================================================
    // Accounts
    // =========================================================================
    /// Bind a user to an account tier, as `user=tier` (repeatable).
    #[arg(long = "user-tier", env = "IMG_USER_TIERS", value_delimiter = ',')]
    pub user_tiers: Vec<UserTierBinding>,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IMG_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage == StorageBackend::S3 && self.bucket().is_none() {
            return Err(
                "S3 storage needs a bucket. Set --s3-bucket or IMG_S3_BUCKET".to_string(),
            );
        }

        if self.storage == StorageBackend::Local && self.media_root.as_os_str().is_empty() {
            return Err("media_root must not be empty".to_string());
        }

        if self.expire_after_min == 0 {
            return Err("expire_after_min must be greater than 0".to_string());
        }
        if self.expire_after_min >= self.expire_after_max {
            return Err(format!(
                "expire_after_min ({}) must be less than expire_after_max ({})",
                self.expire_after_min, self.expire_after_max
            ));
        }

        if self.max_height_cache_ttl <= 0 {
            return Err("max_height_cache_ttl must be greater than 0".to_string());
        }

        if self.asset_cache_bytes == 0 {
            return Err("asset_cache_bytes must be greater than 0".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured bucket, if non-empty.
    pub fn bucket(&self) -> Option<&str> {
        self.s3_bucket.as_deref().filter(|b| !b.trim().is_empty())
    }
}

// =============================================================================
// Tests
// =============================================================================
