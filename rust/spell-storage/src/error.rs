use spell_capability::CapabilityError;
use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpellStorageError {
    /// An error that occurs while encoding a row
    #[error("Failed to encode a row: {0}")]
    EncodeFailed(String),

    /// An error that occurs while decoding a row
    #[error("Failed to decode a row: {0}")]
    DecodeFailed(String),

    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    /// A capability object was referenced by an id the store does not hold
    #[error("No {kind} named '{id}'")]
    NotFound {
        /// Which table was consulted
        kind: &'static str,
        /// The identifier that was looked up
        id: String,
    },

    /// A row that should be new already exists
    #[error("Refusing to overwrite existing row '{0}'")]
    IdCollision(String),

    /// A stored value did not have the expected capability shape
    #[error("Malformed capability data: {0}")]
    Capability(#[from] CapabilityError),
}
