use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use async_stream::try_stream;
use async_trait::async_trait;
use base58::{FromBase58, ToBase58};
use futures_util::Stream;
use spell_common::{ConditionalSend, ConditionalSync};

use super::StorageBackend;
use crate::{SpellStorageError, StorageSource};

const PARTIAL_SUFFIX: &str = ".partial";

/// A basic file-system-based [StorageBackend] implementation. All values are
/// stored inside a root directory as files named after their (base58-encoded)
/// keys.
///
/// A value is first written to a sibling `.partial` file and then renamed
/// into place, so a crash never leaves a half-written row behind.
#[derive(Clone, Debug)]
pub struct FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    root_dir: PathBuf,
    key_type: PhantomData<Key>,
    value_type: PhantomData<Value>,
}

impl<Key, Value> FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    /// Creates a new [`FileSystemStorageBackend`] that stores files in
    /// `root_dir`.
    pub async fn new<Pathlike>(root_dir: Pathlike) -> Result<Self, SpellStorageError>
    where
        Pathlike: AsRef<Path>,
    {
        let root_dir = root_dir.as_ref().to_owned();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|error| SpellStorageError::StorageBackend(format!("{error}")))?;
        Ok(Self {
            root_dir,
            key_type: PhantomData,
            value_type: PhantomData,
        })
    }

    /// The directory rows are kept in.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn make_path(&self, key: &Key) -> PathBuf {
        self.root_dir.join(key.as_ref().to_base58())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> StorageBackend for FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone + ConditionalSync,
    Value: AsRef<[u8]> + Clone + From<Vec<u8>> + ConditionalSync,
{
    type Key = Key;
    type Value = Value;
    type Error = SpellStorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let path = self.make_path(&key);
        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);

        tokio::fs::write(&partial, value)
            .await
            .map_err(|error| SpellStorageError::StorageBackend(format!("{error}")))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|error| SpellStorageError::StorageBackend(format!("{error}")))?;
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        match tokio::fs::read(self.make_path(key)).await {
            Ok(value) => Ok(Some(Value::from(value))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(SpellStorageError::StorageBackend(format!("{error}"))),
        }
    }

    async fn delete(&mut self, key: &Self::Key) -> Result<(), Self::Error> {
        match tokio::fs::remove_file(self.make_path(key)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(SpellStorageError::StorageBackend(format!("{error}"))),
        }
    }
}

impl<Key, Value> StorageSource for FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone + From<Vec<u8>> + ConditionalSync,
    Value: AsRef<[u8]> + Clone + From<Vec<u8>> + ConditionalSync,
{
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
    > + ConditionalSend {
        try_stream! {
            let mut directory = tokio::fs::read_dir(&self.root_dir)
                .await
                .map_err(|error| SpellStorageError::StorageBackend(format!("{error}")))?;

            while let Some(entry) = directory
                .next_entry()
                .await
                .map_err(|error| SpellStorageError::StorageBackend(format!("{error}")))?
            {
                // Leftover partial writes and foreign files do not decode.
                let Some(key) = entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.from_base58().ok())
                else {
                    continue;
                };

                match tokio::fs::read(entry.path()).await {
                    Ok(value) => yield (Key::from(key), Value::from(value)),
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(error) => Err::<(), _>(SpellStorageError::StorageBackend(format!("{error}")))?,
                }
            }
        }
    }
}
