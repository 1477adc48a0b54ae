use thiserror::Error;

/// Errors raised by blob storage backends
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No blob is stored under the key
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Key is malformed or would escape the storage root
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Error from S3 or S3-compatible storage
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(err.to_string())
        } else {
            StoreError::Io(err.to_string())
        }
    }
}

/// Errors from decoding, resizing or encoding an image
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Source bytes are not a readable image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Resized image could not be encoded
    #[error("Failed to encode image: {message}")]
    Encode { message: String },
}

/// Errors raised by the tier catalog
#[derive(Debug, Clone, Error)]
pub enum TierError {
    /// A tier reference points to nothing in the catalog
    #[error("Unknown account tier: {0}")]
    UnknownTier(String),

    /// Built-in tiers and thumbnail specs are read-only once seeded
    #[error("Built-in {0} cannot be modified or deleted")]
    BuiltinImmutable(String),

    /// Tier names are unique
    #[error("Account tier already exists: {0}")]
    DuplicateTier(String),

    /// Thumbnail heights are unique across the system
    #[error("Thumbnail height already configured: {0} px")]
    DuplicateHeight(u32),

    /// No thumbnail spec with this height
    #[error("Unknown thumbnail height: {0} px")]
    UnknownHeight(u32),
}

/// Malformed or out-of-range input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Uploaded image is shorter than the largest configured thumbnail
    #[error("Image height must be at least {required} px, current have {actual} px")]
    ImageTooSmall { required: u32, actual: u32 },

    /// Expiry duration outside the configured bounds
    #[error("expire_after must be between {min} and {max} seconds, got {value}")]
    OutOfRange { value: i64, min: u32, max: u32 },
}

/// Kind of entity a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Image,
    Thumbnail,
    ExpiringLink,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Image => write!(f, "Image"),
            EntityKind::Thumbnail => write!(f, "Thumbnail"),
            EntityKind::ExpiringLink => write!(f, "Expiring link"),
        }
    }
}

/// Errors surfaced by the image and expiring-link services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Capability or ownership denied
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Identity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Resource existed but its lifetime has elapsed
    #[error("{kind} expired at {expired_at}: {id}")]
    Gone {
        kind: EntityKind,
        id: String,
        expired_at: chrono::DateTime<chrono::Utc>,
    },

    /// Uploaded bytes are not a renderable image
    #[error(transparent)]
    Decode(#[from] RenderError),

    /// A user is bound to a tier the catalog does not know
    #[error("Unknown account tier: {0}")]
    UnknownTier(String),

    /// Catalog refused a mutation
    #[error("Catalog error: {0}")]
    Catalog(TierError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        ServiceError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<TierError> for ServiceError {
    fn from(err: TierError) -> Self {
        match err {
            TierError::UnknownTier(name) => ServiceError::UnknownTier(name),
            other => ServiceError::Catalog(other),
        }
    }
}
