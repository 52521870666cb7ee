use serde::{Deserialize, Serialize};
use spell_capability::{Envelope, Memid, Powid, Power, Urbject, Urbjid, Value, VatId};

/// One row-level effect of a [`Changeset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Change {
    /// Replace the contents of a state cell
    WriteCell(Memid, Value),
    /// Create a state cell holding the empty map
    CreateCell(Memid),
    /// Create an authority bundle
    CreatePower(Powid, Power),
    /// Create an urbject
    CreateUrbject(Urbjid, Urbject),
    /// Record an outbound envelope and advance the destination's counter
    Enqueue(Envelope),
    /// Drop an acknowledged outbound envelope
    Dequeue {
        /// The destination of the envelope
        to: VatId,
        /// Its sequence number
        seqnum: u64,
    },
    /// Advance the high-water mark of an inbound channel
    MarkInbound {
        /// The sending vat
        from: VatId,
        /// The last applied sequence number
        seqnum: u64,
    },
}

/// A set of effects that a [`CapabilityStore`] applies all together or not at
/// all.
///
/// A Turn collects its effects into a changeset instead of touching the store
/// directly; the transport adds its ledger rows to the same changeset so that
/// a message is consumed exactly when its effects become visible.
///
/// [`CapabilityStore`]: crate::CapabilityStore
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    changes: Vec<Change>,
}

impl Changeset {
    /// An empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `memid`.
    pub fn write_cell(&mut self, memid: Memid, data: Value) -> &mut Self {
        self.push(Change::WriteCell(memid, data))
    }

    /// Create the cell `memid`.
    pub fn create_cell(&mut self, memid: Memid) -> &mut Self {
        self.push(Change::CreateCell(memid))
    }

    /// Create the bundle `powid`.
    pub fn create_power(&mut self, powid: Powid, power: Power) -> &mut Self {
        self.push(Change::CreatePower(powid, power))
    }

    /// Create the urbject `urbjid`.
    pub fn create_urbject(&mut self, urbjid: Urbjid, urbject: Urbject) -> &mut Self {
        self.push(Change::CreateUrbject(urbjid, urbject))
    }

    /// Durably queue `envelope` for its destination.
    pub fn enqueue(&mut self, envelope: Envelope) -> &mut Self {
        self.push(Change::Enqueue(envelope))
    }

    /// Drop the queued envelope `seqnum` for `to`.
    pub fn dequeue(&mut self, to: VatId, seqnum: u64) -> &mut Self {
        self.push(Change::Dequeue { to, seqnum })
    }

    /// Record that every envelope from `from` up to `seqnum` was applied.
    pub fn mark_inbound(&mut self, from: VatId, seqnum: u64) -> &mut Self {
        self.push(Change::MarkInbound { from, seqnum })
    }

    /// Append all changes of `other`, after the ones already held.
    pub fn extend(&mut self, other: Changeset) -> &mut Self {
        self.changes.extend(other.changes);
        self
    }

    /// The changes, in application order.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// True when applying this changeset would do nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn push(&mut self, change: Change) -> &mut Self {
        self.changes.push(change);
        self
    }
}
