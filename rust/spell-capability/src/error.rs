use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    /// A portable reference could not be decoded
    #[error("Malformed spid: {0}")]
    MalformedSpid(String),

    /// A value tree (or an embedded capability placeholder) was not shaped
    /// as expected
    #[error("Malformed value: {0}")]
    MalformedValue(String),

    /// A wire message was missing fields or carried the wrong shapes
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}
