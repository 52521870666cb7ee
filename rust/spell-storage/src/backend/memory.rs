use std::{collections::BTreeMap, sync::Arc};

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use spell_common::{ConditionalSend, ConditionalSync};
use tokio::sync::RwLock;

use crate::{SpellStorageError, StorageSource};

use super::StorageBackend;

/// A trivial implementation of [StorageBackend] - backed by a [BTreeMap] -
/// where all values are kept in memory and never persisted.
///
/// Clones share the same entries, so a clone handed to a restarted store sees
/// everything written before.
#[derive(Clone, Debug)]
pub struct MemoryStorageBackend<Key, Value>
where
    Key: Ord,
    Value: Clone,
{
    entries: Arc<RwLock<BTreeMap<Key, Value>>>,
}

impl<Key, Value> Default for MemoryStorageBackend<Key, Value>
where
    Key: Ord,
    Value: Clone,
{
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Key, Value> StorageBackend for MemoryStorageBackend<Key, Value>
where
    Key: Clone + Ord + ConditionalSync,
    Value: Clone + ConditionalSync,
{
    type Key = Key;
    type Value = Value;
    type Error = SpellStorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let mut entries = self.entries.write().await;
        entries.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn delete(&mut self, key: &Self::Key) -> Result<(), Self::Error> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

impl<Key, Value> StorageSource for MemoryStorageBackend<Key, Value>
where
    Key: Clone + Ord + ConditionalSync,
    Value: Clone + ConditionalSync,
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
            let snapshot: Vec<(Key, Value)> = {
                let entries = self.entries.read().await;
                entries.iter().map(|(key, value)| (key.clone(), value.clone())).collect()
            };
            for (key, value) in snapshot {
                yield (key, value);
            }
        }
    }
}
