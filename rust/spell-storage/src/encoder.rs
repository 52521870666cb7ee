use serde::{Serialize, de::DeserializeOwned};

use crate::SpellStorageError;

mod cbor;
pub use cbor::*;

/// An [Encoder] converts rows to and from the bytes a [`StorageBackend`]
/// holds.
///
/// [`StorageBackend`]: crate::StorageBackend
pub trait Encoder: Clone {
    /// Encode a serializable row.
    fn encode<T>(&self, row: &T) -> Result<Vec<u8>, SpellStorageError>
    where
        T: Serialize + std::fmt::Debug;

    /// Decode bytes into some deserializable row.
    fn decode<T>(&self, bytes: &[u8]) -> Result<T, SpellStorageError>
    where
        T: DeserializeOwned;
}
