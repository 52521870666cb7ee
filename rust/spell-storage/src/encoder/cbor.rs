use serde::{Serialize, de::DeserializeOwned};

use super::Encoder;
use crate::SpellStorageError;

/// A basic [`Encoder`] implementation that encodes rows as IPLD-compatible
/// CBOR
#[derive(Clone, Copy, Debug, Default)]
pub struct CborEncoder;

impl Encoder for CborEncoder {
    fn encode<T>(&self, row: &T) -> Result<Vec<u8>, SpellStorageError>
    where
        T: Serialize + std::fmt::Debug,
    {
        serde_ipld_dagcbor::to_vec(row)
            .map_err(|error| SpellStorageError::EncodeFailed(format!("{error}")))
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, SpellStorageError>
    where
        T: DeserializeOwned,
    {
        serde_ipld_dagcbor::from_slice::<T>(bytes)
            .map_err(|error| SpellStorageError::DecodeFailed(format!("{error}")))
    }
}
