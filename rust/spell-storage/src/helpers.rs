use anyhow::Result;

use crate::{CapabilityStore, FileSystemStorageBackend};

/// A byte-keyed filesystem backend together with the temporary directory
/// that holds it; the directory is removed when the guard drops.
pub type TargetStorage = (FileSystemStorageBackend<Vec<u8>, Vec<u8>>, tempfile::TempDir);

/// Creates a persisted [`StorageBackend`] in a fresh temporary directory,
/// for use in tests
///
/// [`StorageBackend`]: crate::StorageBackend
pub async fn make_target_storage() -> Result<TargetStorage> {
    let root = tempfile::tempdir()?;
    let storage = FileSystemStorageBackend::<Vec<u8>, Vec<u8>>::new(root.path()).await?;
    Ok((storage, root))
}

/// Opens a [`CapabilityStore`] over a fresh temporary directory, for use in
/// tests
pub async fn make_target_store() -> Result<(
    CapabilityStore<FileSystemStorageBackend<Vec<u8>, Vec<u8>>>,
    tempfile::TempDir,
)> {
    let (backend, root) = make_target_storage().await?;
    Ok((CapabilityStore::open(backend).await?, root))
}
