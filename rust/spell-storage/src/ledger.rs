use std::collections::BTreeMap;

use spell_capability::{Envelope, VatId};

use crate::{CapabilityStore, SpellStorageError, StoreBackend, Table, inbox_mark_key};

/// The transport's durable state, as last committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportLedger {
    /// Unacknowledged envelopes, ordered by destination then sequence number
    pub outbox: Vec<Envelope>,
    /// Last sequence number assigned per destination
    pub counters: BTreeMap<VatId, u64>,
    /// Last applied sequence number per source
    pub marks: BTreeMap<VatId, u64>,
}

impl<Backend> CapabilityStore<Backend>
where
    Backend: StoreBackend,
{
    /// Every queued, unacknowledged envelope.
    pub async fn outbox(&self) -> Result<Vec<Envelope>, SpellStorageError> {
        let rows: Vec<(String, Envelope)> = self.table(Table::Outbox).await?;
        Ok(rows.into_iter().map(|(_, envelope)| envelope).collect())
    }

    /// The last applied sequence number from `from`, or 0 if nothing was
    /// applied yet.
    pub async fn inbound_mark(&self, from: &VatId) -> Result<u64, SpellStorageError> {
        Ok(self
            .read_row::<u64>(&inbox_mark_key(from))
            .await?
            .unwrap_or_default())
    }

    /// Load everything the transport needs to resume after a restart.
    pub async fn transport_ledger(&self) -> Result<TransportLedger, SpellStorageError> {
        Ok(TransportLedger {
            outbox: self.outbox().await?,
            counters: self.table(Table::OutboxNext).await?.into_iter().collect(),
            marks: self.table(Table::InboxMark).await?.into_iter().collect(),
        })
    }
}
