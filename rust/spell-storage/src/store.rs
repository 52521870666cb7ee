use futures_util::TryStreamExt;
use serde::{Serialize, de::DeserializeOwned};
use spell_capability::{Grant, Memid, Powid, Power, Urbject, Urbjid, Value, VatId};

use crate::{
    CborEncoder, Change, Changeset, Encoder, SpellStorageError, StoreBackend, Table, inbox_mark_key,
    journal_key, memory_key, outbox_key, outbox_next_key, power_key, urbject_key, vat_id_key,
};

/// The durable home of a vat's capability graph.
///
/// Urbjects, powers and state cells are kept by id, so the graph is an arena
/// of rows rather than a web of pointers. Single operations map to single
/// backend writes; anything spanning several rows goes through
/// [`CapabilityStore::commit`].
#[derive(Clone, Debug)]
pub struct CapabilityStore<Backend> {
    backend: Backend,
    encoder: CborEncoder,
}

impl<Backend> CapabilityStore<Backend>
where
    Backend: StoreBackend,
{
    /// Open a store over `backend`, finishing any commit that was interrupted
    /// the last time the backend was in use.
    pub async fn open(backend: Backend) -> Result<Self, SpellStorageError> {
        let mut store = Self {
            backend,
            encoder: CborEncoder,
        };
        store.recover().await?;
        Ok(store)
    }

    /// Finish a commit that was journaled but not fully applied. Returns
    /// whether there was one.
    pub async fn recover(&mut self) -> Result<bool, SpellStorageError> {
        let Some(changeset) = self.read_row::<Changeset>(&journal_key()).await? else {
            return Ok(false);
        };
        tracing::info!(
            "Replaying an interrupted commit of {} changes",
            changeset.changes().len()
        );
        self.apply(&changeset).await?;
        self.backend.delete(&journal_key()).await?;
        Ok(true)
    }

    /// The backend this store writes to.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Create a state cell holding the empty map.
    pub async fn create_state_cell(&mut self) -> Result<Memid, SpellStorageError> {
        let memid = loop {
            let memid = Memid::generate();
            if !self.contains(&memory_key(&memid)).await? {
                break memid;
            }
        };
        self.write_row(memory_key(&memid), &Value::empty_map())
            .await?;
        Ok(memid)
    }

    /// Create an authority bundle from `grants`.
    pub async fn create_bundle(&mut self, grants: Vec<Grant>) -> Result<Powid, SpellStorageError> {
        let powid = self.fresh_powid().await?;
        self.write_row(power_key(&powid), &Power::new(grants))
            .await?;
        Ok(powid)
    }

    /// Create an urbject running `code` under the bundle `powid`.
    pub async fn create_urbject(
        &mut self,
        code: &str,
        powid: &Powid,
    ) -> Result<Urbjid, SpellStorageError> {
        if !self.contains(&power_key(powid)).await? {
            return Err(not_found("power", powid));
        }
        let urbjid = self.fresh_urbjid().await?;
        self.write_row(urbject_key(&urbjid), &Urbject::new(code, powid.clone()))
            .await?;
        Ok(urbjid)
    }

    /// Create a bundle granting `memory` over `memid`, and `make_urbject`
    /// when asked to.
    pub async fn create_power_for_memid(
        &mut self,
        memid: &Memid,
        grant_make_urbject: bool,
    ) -> Result<Powid, SpellStorageError> {
        if !self.contains(&memory_key(memid)).await? {
            return Err(not_found("memory", memid));
        }
        let powid = self.fresh_powid().await?;
        self.write_row(
            power_key(&powid),
            &Power::for_memory(memid.clone(), grant_make_urbject),
        )
        .await?;
        Ok(powid)
    }

    /// Load the bundle `powid`.
    pub async fn get_bundle(&self, powid: &Powid) -> Result<Power, SpellStorageError> {
        self.read_row(&power_key(powid))
            .await?
            .ok_or_else(|| not_found("power", powid))
    }

    /// Load the urbject `urbjid`.
    pub async fn get_urbject(&self, urbjid: &Urbjid) -> Result<Urbject, SpellStorageError> {
        self.read_row(&urbject_key(urbjid))
            .await?
            .ok_or_else(|| not_found("urbject", urbjid))
    }

    /// Load the contents of the cell `memid`.
    pub async fn read_cell(&self, memid: &Memid) -> Result<Value, SpellStorageError> {
        self.read_row(&memory_key(memid))
            .await?
            .ok_or_else(|| not_found("memory", memid))
    }

    /// Replace the contents of the existing cell `memid`.
    pub async fn write_cell(&mut self, memid: &Memid, data: Value) -> Result<(), SpellStorageError> {
        if !self.contains(&memory_key(memid)).await? {
            return Err(not_found("memory", memid));
        }
        self.write_row(memory_key(memid), &data).await
    }

    /// True if the urbject `urbjid` exists.
    pub async fn has_urbject(&self, urbjid: &Urbjid) -> Result<bool, SpellStorageError> {
        self.contains(&urbject_key(urbjid)).await
    }

    /// True if the cell `memid` exists.
    pub async fn has_cell(&self, memid: &Memid) -> Result<bool, SpellStorageError> {
        self.contains(&memory_key(memid)).await
    }

    /// Draw a bundle id that no row uses yet.
    pub async fn fresh_powid(&self) -> Result<Powid, SpellStorageError> {
        loop {
            let powid = Powid::generate();
            if !self.contains(&power_key(&powid)).await? {
                return Ok(powid);
            }
        }
    }

    /// Draw an urbject id that no row uses yet.
    pub async fn fresh_urbjid(&self) -> Result<Urbjid, SpellStorageError> {
        loop {
            let urbjid = Urbjid::generate();
            if !self.contains(&urbject_key(&urbjid)).await? {
                return Ok(urbjid);
            }
        }
    }

    /// The vat id recorded in this store, if any.
    pub async fn vat_id(&self) -> Result<Option<VatId>, SpellStorageError> {
        self.read_row(&vat_id_key()).await
    }

    /// Record the id of the vat that owns this store.
    pub async fn set_vat_id(&mut self, vat_id: &VatId) -> Result<(), SpellStorageError> {
        self.write_row(vat_id_key(), vat_id).await
    }

    /// Every urbject, ordered by id.
    pub async fn urbjects(&self) -> Result<Vec<(Urbjid, Urbject)>, SpellStorageError> {
        self.table(Table::Urbject).await
    }

    /// Every bundle, ordered by id.
    pub async fn bundles(&self) -> Result<Vec<(Powid, Power)>, SpellStorageError> {
        self.table(Table::Power).await
    }

    /// Every state cell with its contents, ordered by id.
    pub async fn cells(&self) -> Result<Vec<(Memid, Value)>, SpellStorageError> {
        self.table(Table::Memory).await
    }

    /// Apply every change of `changeset`, or none of them.
    ///
    /// The changeset is journaled before any row is touched. Should the
    /// process stop or the backend fail part way, the journaled changeset is
    /// applied again by [`CapabilityStore::recover`], which runs when the
    /// store is opened and before every later commit; every change is
    /// idempotent, so re-application is harmless.
    pub async fn commit(&mut self, changeset: &Changeset) -> Result<(), SpellStorageError> {
        self.recover().await?;
        if changeset.is_empty() {
            return Ok(());
        }

        for change in changeset.changes() {
            let key = match change {
                Change::CreateCell(memid) => memory_key(memid),
                Change::CreatePower(powid, _) => power_key(powid),
                Change::CreateUrbject(urbjid, _) => urbject_key(urbjid),
                _ => continue,
            };
            if self.contains(&key).await? {
                return Err(SpellStorageError::IdCollision(
                    String::from_utf8_lossy(&key).into_owned(),
                ));
            }
        }

        tracing::debug!("Committing {} changes", changeset.changes().len());

        self.write_row(journal_key(), changeset).await?;
        self.apply(changeset).await?;
        self.backend.delete(&journal_key()).await
    }

    async fn apply(&mut self, changeset: &Changeset) -> Result<(), SpellStorageError> {
        for change in changeset.changes() {
            match change {
                Change::WriteCell(memid, data) => self.write_row(memory_key(memid), data).await?,
                Change::CreateCell(memid) => {
                    self.write_row(memory_key(memid), &Value::empty_map())
                        .await?
                }
                Change::CreatePower(powid, power) => {
                    self.write_row(power_key(powid), power).await?
                }
                Change::CreateUrbject(urbjid, urbject) => {
                    self.write_row(urbject_key(urbjid), urbject).await?
                }
                Change::Enqueue(envelope) => {
                    self.write_row(outbox_key(&envelope.to, envelope.seqnum), envelope)
                        .await?;
                    self.write_row(outbox_next_key(&envelope.to), &envelope.seqnum)
                        .await?;
                }
                Change::Dequeue { to, seqnum } => {
                    self.backend.delete(&outbox_key(to, *seqnum)).await?
                }
                Change::MarkInbound { from, seqnum } => {
                    self.write_row(inbox_mark_key(from), seqnum).await?
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn table<Id, Row>(&self, table: Table) -> Result<Vec<(Id, Row)>, SpellStorageError>
    where
        Id: From<String> + Ord,
        Row: DeserializeOwned,
    {
        let mut rows = Vec::new();
        let stream = self.backend.read();
        tokio::pin!(stream);

        while let Some((key, value)) = stream.try_next().await? {
            if let Some(id) = table.strip(&key) {
                rows.push((Id::from(id.to_owned()), self.encoder.decode(&value)?));
            }
        }

        rows.sort_by(|(left, _), (right, _)| left.cmp(right));
        Ok(rows)
    }

    pub(crate) async fn read_row<Row>(&self, key: &Vec<u8>) -> Result<Option<Row>, SpellStorageError>
    where
        Row: DeserializeOwned,
    {
        match self.backend.get(key).await? {
            Some(bytes) => Ok(Some(self.encoder.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_row<Row>(&mut self, key: Vec<u8>, row: &Row) -> Result<(), SpellStorageError>
    where
        Row: Serialize + std::fmt::Debug,
    {
        let bytes = self.encoder.encode(row)?;
        self.backend.set(key, bytes).await
    }

    async fn contains(&self, key: &Vec<u8>) -> Result<bool, SpellStorageError> {
        Ok(self.backend.get(key).await?.is_some())
    }
}

fn not_found(kind: &'static str, id: impl std::fmt::Display) -> SpellStorageError {
    SpellStorageError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use spell_capability::{Authority, Envelope, MAKE_URBJECT, Message, Target};

    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use futures_util::Stream;
    use spell_common::ConditionalSend;

    use super::*;
    use crate::{MemoryStorageBackend, StorageBackend, StorageSource, make_target_store};

    type MemoryStore = CapabilityStore<MemoryStorageBackend<Vec<u8>, Vec<u8>>>;

    /// Shares entries with a [`MemoryStorageBackend`], but fails one write
    /// once a given number of writes have gone through.
    #[derive(Clone, Debug)]
    struct FailingBackend {
        inner: MemoryStorageBackend<Vec<u8>, Vec<u8>>,
        writes_left: Arc<AtomicUsize>,
    }

    impl FailingBackend {
        fn new(inner: MemoryStorageBackend<Vec<u8>, Vec<u8>>) -> Self {
            Self {
                inner,
                writes_left: Arc::new(AtomicUsize::new(usize::MAX)),
            }
        }

        fn fail_after(&self, writes: usize) {
            self.writes_left.store(writes, Ordering::SeqCst);
        }

        fn spend(&self) -> Result<(), SpellStorageError> {
            match self.writes_left.load(Ordering::SeqCst) {
                usize::MAX => Ok(()),
                0 => {
                    self.writes_left.store(usize::MAX, Ordering::SeqCst);
                    Err(SpellStorageError::StorageBackend("disk full".into()))
                }
                left => {
                    self.writes_left.store(left - 1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }
    }

    #[cfg_attr(not(target_arch = "wasm32"), async_trait)]
    #[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
    impl StorageBackend for FailingBackend {
        type Key = Vec<u8>;
        type Value = Vec<u8>;
        type Error = SpellStorageError;

        async fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), SpellStorageError> {
            self.spend()?;
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &Vec<u8>) -> Result<Option<Vec<u8>>, SpellStorageError> {
            self.inner.get(key).await
        }

        async fn delete(&mut self, key: &Vec<u8>) -> Result<(), SpellStorageError> {
            self.spend()?;
            self.inner.delete(key).await
        }
    }

    impl StorageSource for FailingBackend {
        fn read(
            &self,
        ) -> impl Stream<Item = Result<(Vec<u8>, Vec<u8>), SpellStorageError>> + ConditionalSend
        {
            self.inner.read()
        }
    }

    #[tokio::test]
    async fn it_creates_cells_holding_the_empty_map() -> Result<()> {
        let (mut store, _tempdir) = make_target_store().await?;

        let memid = store.create_state_cell().await?;

        assert_eq!(store.read_cell(&memid).await?, Value::empty_map());
        Ok(())
    }

    #[tokio::test]
    async fn it_binds_urbjects_to_existing_bundles_only() -> Result<()> {
        let mut store = MemoryStore::open(MemoryStorageBackend::default()).await?;

        let memid = store.create_state_cell().await?;
        let powid = store.create_power_for_memid(&memid, true).await?;
        let urbjid = store.create_urbject("log(1);", &powid).await?;

        let urbject = store.get_urbject(&urbjid).await?;
        assert_eq!(urbject.get_code_and_bundle(), ("log(1);", &powid));

        let power = store.get_bundle(&powid).await?;
        assert_eq!(
            power.get(MAKE_URBJECT),
            Some(&Authority::Native(MAKE_URBJECT.into()))
        );

        let missing = store.create_urbject("log(1);", &"pow0-missing".into()).await;
        assert!(matches!(
            missing,
            Err(SpellStorageError::NotFound { kind: "power", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_unknown_ids_as_not_found() -> Result<()> {
        let mut store = MemoryStore::open(MemoryStorageBackend::default()).await?;

        assert!(matches!(
            store.read_cell(&"mem0-nope".into()).await,
            Err(SpellStorageError::NotFound { kind: "memory", .. })
        ));
        assert!(matches!(
            store.get_urbject(&"urbj0-nope".into()).await,
            Err(SpellStorageError::NotFound { kind: "urbject", .. })
        ));
        assert!(matches!(
            store.write_cell(&"mem0-nope".into(), Value::Null).await,
            Err(SpellStorageError::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn it_keeps_embedded_authorities_in_cells() -> Result<()> {
        let (mut store, _tempdir) = make_target_store().await?;

        let memid = store.create_state_cell().await?;
        let data = Value::from(std::collections::BTreeMap::from([
            (
                "callback".to_string(),
                Value::Capability(Authority::Reference(Target::Local("urbj0-cb".into()))),
            ),
            ("count".to_string(), Value::Integer(3)),
        ]));
        store.write_cell(&memid, data.clone()).await?;

        assert_eq!(store.read_cell(&memid).await?, data);
        Ok(())
    }

    #[tokio::test]
    async fn it_lists_tables_without_mixing_them() -> Result<()> {
        let mut store = MemoryStore::open(MemoryStorageBackend::default()).await?;

        let first = store.create_state_cell().await?;
        let second = store.create_state_cell().await?;
        let powid = store.create_power_for_memid(&first, false).await?;
        store.create_urbject("log(1);", &powid).await?;
        store.set_vat_id(&"vat0-me".into()).await?;

        let mut expected = vec![first, second];
        expected.sort();

        let cells: Vec<Memid> = store.cells().await?.into_iter().map(|(id, _)| id).collect();
        assert_eq!(cells, expected);
        assert_eq!(store.bundles().await?.len(), 1);
        assert_eq!(store.urbjects().await?.len(), 1);
        assert_eq!(store.vat_id().await?, Some("vat0-me".into()));
        Ok(())
    }

    #[tokio::test]
    async fn it_commits_changesets_as_a_unit() -> Result<()> {
        let mut store = MemoryStore::open(MemoryStorageBackend::default()).await?;
        let memid = store.create_state_cell().await?;
        let powid = Powid::generate();
        let urbjid = Urbjid::generate();

        let mut changeset = Changeset::new();
        changeset
            .write_cell(memid.clone(), Value::from("written"))
            .create_power(powid.clone(), Power::for_memory(memid.clone(), false))
            .create_urbject(urbjid.clone(), Urbject::new("log(2);", powid.clone()));
        store.commit(&changeset).await?;

        assert_eq!(store.read_cell(&memid).await?, Value::from("written"));
        assert_eq!(store.get_urbject(&urbjid).await?.powid(), &powid);
        assert_eq!(store.backend().get(&journal_key()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_to_reuse_an_existing_id() -> Result<()> {
        let mut store = MemoryStore::open(MemoryStorageBackend::default()).await?;
        let memid = store.create_state_cell().await?;
        store.write_cell(&memid, Value::from("kept")).await?;

        let mut changeset = Changeset::new();
        changeset.create_cell(memid.clone());

        assert!(matches!(
            store.commit(&changeset).await,
            Err(SpellStorageError::IdCollision(_))
        ));
        assert_eq!(store.read_cell(&memid).await?, Value::from("kept"));
        Ok(())
    }

    #[tokio::test]
    async fn it_replays_an_interrupted_commit_on_open() -> Result<()> {
        let backend = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();
        let mut store = MemoryStore::open(backend.clone()).await?;
        let memid = store.create_state_cell().await?;
        let to = VatId::from("vat0-peer");

        let mut changeset = Changeset::new();
        changeset.write_cell(memid.clone(), Value::Integer(7)).enqueue(Envelope {
            from: "vat0-me".into(),
            to: to.clone(),
            seqnum: 1,
            message: Message::invoke("urbj0-x".into(), Value::empty_map()),
        });

        // Journal the changeset without applying it, as if the process
        // stopped right after the journal write.
        store.write_row(journal_key(), &changeset).await?;

        let reopened = MemoryStore::open(backend).await?;

        assert_eq!(reopened.read_cell(&memid).await?, Value::Integer(7));
        assert_eq!(reopened.outbox().await?.len(), 1);
        assert_eq!(reopened.backend().get(&journal_key()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn it_finishes_a_failed_commit_before_the_next_one() -> Result<()> {
        let backend = FailingBackend::new(MemoryStorageBackend::default());
        let mut store = CapabilityStore::open(backend.clone()).await?;
        let memid = store.create_state_cell().await?;
        let peer = VatId::from("vat0-peer");

        let mut first = Changeset::new();
        first
            .write_cell(memid.clone(), Value::Integer(7))
            .mark_inbound(peer.clone(), 1);

        // The journal row and the cell write land, the mark does not.
        backend.fail_after(2);
        assert!(store.commit(&first).await.is_err());
        assert_eq!(store.inbound_mark(&peer).await?, 0);
        assert!(store.backend().get(&journal_key()).await?.is_some());

        let mut second = Changeset::new();
        second.write_cell(memid.clone(), Value::Integer(8));
        store.commit(&second).await?;

        assert_eq!(store.read_cell(&memid).await?, Value::Integer(8));
        assert_eq!(store.inbound_mark(&peer).await?, 1);
        assert_eq!(store.backend().get(&journal_key()).await?, None);

        let reopened = CapabilityStore::open(backend).await?;
        assert_eq!(reopened.read_cell(&memid).await?, Value::Integer(8));
        Ok(())
    }
}
