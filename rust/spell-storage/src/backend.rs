use async_trait::async_trait;
use futures_util::Stream;
use spell_common::{ConditionalSend, ConditionalSync};

use crate::SpellStorageError;

mod memory;
pub use memory::*;

#[cfg(not(target_arch = "wasm32"))]
mod fs;
#[cfg(not(target_arch = "wasm32"))]
pub use fs::*;

/// A [StorageBackend] is a facade over some storage substrate that can store,
/// retrieve and remove values by key.
///
/// Only single-row atomicity is expected of an implementation: a `set` is
/// either fully visible or not at all.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait StorageBackend: Clone {
    /// The key type used by this [StorageBackend]
    type Key: ConditionalSync;
    /// The value type able to be stored by this [StorageBackend]
    type Value: ConditionalSend;
    /// The error type produced by this [StorageBackend]
    type Error: Into<SpellStorageError>;

    /// Store the given value against the given key
    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error>;
    /// Retrieve a value (if any) stored against the given key
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error>;
    /// Remove the value (if any) stored against the given key
    async fn delete(&mut self, key: &Self::Key) -> Result<(), Self::Error>;
}

/// A [`StorageBackend`] that can stream its contents in their entirety, used
/// to list tables.
pub trait StorageSource: StorageBackend {
    /// Stream a copy of the contents of the [`StorageBackend`]
    fn read(
        &self,
    ) -> impl Stream<
        Item = Result<
            (
                <Self as StorageBackend>::Key,
                <Self as StorageBackend>::Value,
            ),
            <Self as StorageBackend>::Error,
        >,
    > + ConditionalSend;
}

/// The backend shape a [`CapabilityStore`] runs on: byte keys, byte values
/// and this crate's error type.
///
/// [`CapabilityStore`]: crate::CapabilityStore
pub trait StoreBackend:
    StorageBackend<Key = Vec<u8>, Value = Vec<u8>, Error = SpellStorageError>
    + StorageSource
    + ConditionalSync
    + 'static
{
}

impl<T> StoreBackend for T where
    T: StorageBackend<Key = Vec<u8>, Value = Vec<u8>, Error = SpellStorageError>
        + StorageSource
        + ConditionalSync
        + 'static
{
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use futures_util::TryStreamExt;

    use crate::{MemoryStorageBackend, StorageBackend, StorageSource, make_target_storage};

    #[tokio::test]
    async fn it_writes_and_reads_a_value() -> Result<()> {
        let (mut storage_backend, _tempdir) = make_target_storage().await?;

        storage_backend.set(vec![1, 2, 3], vec![4, 5, 6]).await?;
        let value = storage_backend.get(&vec![1, 2, 3]).await?;

        assert_eq!(value, Some(vec![4, 5, 6]));

        Ok(())
    }

    #[tokio::test]
    async fn it_deletes_a_value() -> Result<()> {
        let (mut storage_backend, _tempdir) = make_target_storage().await?;

        storage_backend.set(vec![1], vec![1]).await?;
        storage_backend.delete(&vec![1]).await?;
        storage_backend.delete(&vec![2]).await?;

        assert_eq!(storage_backend.get(&vec![1]).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn it_lists_every_row_of_a_filesystem_backend() -> Result<()> {
        let (mut storage_backend, _tempdir) = make_target_storage().await?;

        for index in 0..5u8 {
            storage_backend.set(vec![index], vec![index * 2]).await?;
        }
        storage_backend.delete(&vec![3]).await?;

        let mut rows: Vec<(Vec<u8>, Vec<u8>)> = storage_backend.read().try_collect().await?;
        rows.sort();

        assert_eq!(
            rows,
            vec![
                (vec![0], vec![0]),
                (vec![1], vec![2]),
                (vec![2], vec![4]),
                (vec![4], vec![8])
            ]
        );

        Ok(())
    }

    #[tokio::test]
    async fn it_lists_memory_rows_in_key_order() -> Result<()> {
        let mut storage_backend = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();

        storage_backend.set(vec![9], vec![1]).await?;
        storage_backend.set(vec![1], vec![2]).await?;

        let rows: Vec<(Vec<u8>, Vec<u8>)> = storage_backend.read().try_collect().await?;

        assert_eq!(rows, vec![(vec![1], vec![2]), (vec![9], vec![1])]);

        Ok(())
    }
}
