use spell_capability::{CapabilityError, VatId};
use spell_storage::SpellStorageError;
use thiserror::Error;

/// The common error type of a vat.
///
/// Every variant except [`VatError::Storage`] describes a problem with one
/// message or Turn; the vat logs it, rolls the Turn back and keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VatError {
    /// A referenced urbject, power or memory does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Code reached for authority it was not granted
    #[error("Confinement violation: {0}")]
    ConfinementViolation(String),

    /// A message or its arguments could not be decoded
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A Turn ran past its step or time allowance
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Messages from `peer` are held back waiting for a missing one
    #[error("Sequence gap from {peer}: expected {expected}, holding from {held}")]
    SequenceGap {
        /// The sending vat
        peer: VatId,
        /// The sequence number that never arrived
        expected: u64,
        /// The lowest sequence number being held back
        held: u64,
    },

    /// A command this vat does not implement
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Code failed: it raised, hit a type error or did not parse
    #[error("Script error: {0}")]
    Script(String),

    /// The storage backend failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A frame could not be handed to the network; it stays queued
    #[error("Transport error: {0}")]
    Transport(String),

    /// The vat configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// The vat's event loop has stopped
    #[error("Vat is shut down")]
    Shutdown,
}

impl From<SpellStorageError> for VatError {
    fn from(error: SpellStorageError) -> Self {
        match error {
            SpellStorageError::NotFound { kind, id } => VatError::NotFound(format!("{kind} {id}")),
            SpellStorageError::Capability(error) => error.into(),
            other => VatError::Storage(format!("{other}")),
        }
    }
}

impl From<CapabilityError> for VatError {
    fn from(error: CapabilityError) -> Self {
        VatError::MalformedMessage(format!("{error}"))
    }
}

impl From<serde_json::Error> for VatError {
    fn from(error: serde_json::Error) -> Self {
        VatError::MalformedMessage(format!("{error}"))
    }
}
