//! Durable, ordered, effectively-once delivery of messages between vats.
//!
//! Every outbound message is stamped with the next sequence number of its
//! destination and written to the outbox in the same commit as the Turn that
//! produced it. Receivers apply a channel strictly in sequence order, drop
//! what they have already applied and acknowledge what they hold, which lets
//! senders retransmit freely.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spell_capability::{Envelope, Message, VatId};
use spell_storage::{Changeset, TransportLedger};
use tokio::time::Instant;

use crate::{Metrics, Network, VatConfig, VatError};

/// A unit of the transport protocol, as carried by a [`Network`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Frame {
    /// A message for the receiving vat
    Deliver {
        /// The sequenced message
        envelope: Envelope,
    },
    /// Everything from `to` up to `seqnum` has been applied by `from`
    Ack {
        /// The acknowledging vat
        from: VatId,
        /// The vat whose messages were applied
        to: VatId,
        /// Highest applied sequence number
        seqnum: u64,
    },
    /// `from` is stuck after `after` and asks `to` to send the rest again
    Resync {
        /// The waiting vat
        from: VatId,
        /// The vat expected to retransmit
        to: VatId,
        /// Highest sequence number `from` has applied
        after: u64,
    },
}

impl Frame {
    /// The vat the frame is addressed to.
    pub fn to(&self) -> &VatId {
        match self {
            Frame::Deliver { envelope } => &envelope.to,
            Frame::Ack { to, .. } | Frame::Resync { to, .. } => to,
        }
    }

    /// The vat that sent the frame.
    pub fn sender(&self) -> &VatId {
        match self {
            Frame::Deliver { envelope } => &envelope.from,
            Frame::Ack { from, .. } | Frame::Resync { from, .. } => from,
        }
    }
}

/// What to do with an inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Next in sequence: apply it now
    Ready(Envelope),
    /// Already applied: drop it
    Duplicate(Envelope),
    /// A predecessor is missing: held back until it arrives
    Held,
}

/// Sequencing state of one vat's channels.
///
/// The transport keeps an in-memory mirror of what the store holds and
/// prepares [`Changeset`]s; it never writes to the store itself. Callers
/// commit and then report back (`committed`, `applied`, `released`), so a
/// failed commit leaves the transport untouched.
pub struct Transport<N> {
    local: VatId,
    network: N,
    metrics: Metrics,
    counters: BTreeMap<VatId, u64>,
    outbox: BTreeMap<VatId, BTreeMap<u64, Envelope>>,
    marks: BTreeMap<VatId, u64>,
    held: BTreeMap<VatId, BTreeMap<u64, Envelope>>,
    gap_since: BTreeMap<VatId, Instant>,
    gaps: BTreeMap<VatId, VatError>,
    loopback: VecDeque<Envelope>,
    max_held: usize,
    gap_timeout: Duration,
    resend_interval: Duration,
    last_resend: Instant,
}

impl<N> Transport<N>
where
    N: Network,
{
    /// Resume from `ledger`. Queued messages to the local vat are put back
    /// on the loopback queue.
    pub fn new(
        local: VatId,
        network: N,
        ledger: TransportLedger,
        config: &VatConfig,
        metrics: Metrics,
    ) -> Self {
        let mut transport = Self {
            local,
            network,
            metrics,
            counters: BTreeMap::new(),
            outbox: BTreeMap::new(),
            marks: BTreeMap::new(),
            held: BTreeMap::new(),
            gap_since: BTreeMap::new(),
            gaps: BTreeMap::new(),
            loopback: VecDeque::new(),
            max_held: config.max_held_messages.max(1),
            gap_timeout: config.gap_timeout(),
            resend_interval: config.resend_interval(),
            last_resend: Instant::now(),
        };
        transport.resume(ledger);
        transport
    }

    /// Mirror `ledger` again, dropping whatever the transport believed
    /// since. Used after the store finished an interrupted commit, or could
    /// not say whether it did.
    pub fn resume(&mut self, ledger: TransportLedger) {
        self.outbox.clear();
        self.loopback.clear();
        for envelope in ledger.outbox {
            if envelope.to == self.local {
                self.loopback.push_back(envelope.clone());
            }
            self.outbox
                .entry(envelope.to.clone())
                .or_default()
                .insert(envelope.seqnum, envelope);
        }
        self.counters = ledger.counters;
        self.marks = ledger.marks;

        for (peer, held) in self.held.iter_mut() {
            let mark = self.marks.get(peer).copied().unwrap_or_default();
            held.retain(|seqnum, _| *seqnum > mark);
        }
    }

    /// The vat this transport sends from.
    pub fn local(&self) -> &VatId {
        &self.local
    }

    /// The underlying network.
    pub fn network(&self) -> &N {
        &self.network
    }

    /// Last applied sequence number from `peer`.
    pub fn mark(&self, peer: &VatId) -> u64 {
        self.marks.get(peer).copied().unwrap_or_default()
    }

    /// How many out of order messages from `peer` are held back.
    pub fn held_back(&self, peer: &VatId) -> usize {
        self.held.get(peer).map(BTreeMap::len).unwrap_or_default()
    }

    /// Every envelope sent and not yet acknowledged.
    pub fn unacknowledged(&self) -> Vec<&Envelope> {
        self.outbox.values().flat_map(|queue| queue.values()).collect()
    }

    /// Stamp `sends` with sequence numbers and add them to `changeset`. The
    /// counters only move once [`Transport::committed`] is called.
    pub fn stage(&self, changeset: &mut Changeset, sends: Vec<(VatId, Message)>) -> Vec<Envelope> {
        let mut next: BTreeMap<VatId, u64> = BTreeMap::new();
        sends
            .into_iter()
            .map(|(to, message)| {
                let seqnum = next
                    .entry(to.clone())
                    .or_insert_with(|| self.counters.get(&to).copied().unwrap_or_default());
                *seqnum += 1;
                let envelope = Envelope {
                    from: self.local.clone(),
                    to,
                    seqnum: *seqnum,
                    message,
                };
                changeset.enqueue(envelope.clone());
                envelope
            })
            .collect()
    }

    /// Record staged envelopes as durable and start delivering them.
    pub async fn committed(&mut self, envelopes: Vec<Envelope>) {
        self.metrics.record_sent(envelopes.len());
        for envelope in envelopes {
            let counter = self.counters.entry(envelope.to.clone()).or_default();
            *counter = (*counter).max(envelope.seqnum);
            self.outbox
                .entry(envelope.to.clone())
                .or_default()
                .insert(envelope.seqnum, envelope.clone());

            if envelope.to == self.local {
                self.loopback.push_back(envelope);
            } else {
                self.transmit(Frame::Deliver { envelope }).await;
            }
        }
    }

    /// The next message this vat sent to itself.
    pub fn next_loopback(&mut self) -> Option<Envelope> {
        self.loopback.pop_front()
    }

    /// Sort an inbound envelope by its sequence number.
    pub fn admit(&mut self, envelope: Envelope) -> Admission {
        let mark = self.mark(&envelope.from);
        if envelope.seqnum <= mark {
            return Admission::Duplicate(envelope);
        }
        if envelope.seqnum == mark + 1 {
            return Admission::Ready(envelope);
        }

        tracing::debug!(
            vat = %self.local,
            from = %envelope.from,
            seqnum = envelope.seqnum,
            mark,
            "Holding back out of order message"
        );
        self.gap_since
            .entry(envelope.from.clone())
            .or_insert_with(Instant::now);
        let from = envelope.from.clone();
        let held = self.held.entry(from.clone()).or_default();
        held.insert(envelope.seqnum, envelope);
        // Keep the messages closest to the mark; the sender still has the
        // rest queued and sends them again.
        if held.len() > self.max_held {
            if let Some((dropped, _)) = held.pop_last() {
                tracing::debug!(
                    vat = %self.local,
                    %from,
                    seqnum = dropped,
                    "Hold-back buffer full, dropping message"
                );
            }
        }
        Admission::Held
    }

    /// The changes that record `envelope` as consumed. They ride along with
    /// the Turn's own changes, or are committed alone if the Turn failed.
    pub fn receipt(&self, envelope: &Envelope) -> Changeset {
        let mut changeset = Changeset::new();
        changeset.mark_inbound(envelope.from.clone(), envelope.seqnum);
        if envelope.from == self.local {
            changeset.dequeue(self.local.clone(), envelope.seqnum);
        }
        changeset
    }

    /// Record a committed receipt.
    pub fn applied(&mut self, envelope: &Envelope) {
        self.marks.insert(envelope.from.clone(), envelope.seqnum);
        if envelope.from == self.local {
            if let Some(queue) = self.outbox.get_mut(&self.local) {
                queue.remove(&envelope.seqnum);
            }
        }

        let next = envelope.seqnum + 1;
        let waiting = self
            .held
            .get(&envelope.from)
            .map(|held| (held.contains_key(&next), held.is_empty()));
        match waiting {
            Some((true, _)) => {}
            Some((false, false)) => {
                self.gap_since.insert(envelope.from.clone(), Instant::now());
            }
            _ => {
                self.held.remove(&envelope.from);
                self.gap_since.remove(&envelope.from);
                self.gaps.remove(&envelope.from);
            }
        }
    }

    /// Take the held message from `peer` that is now next in sequence.
    pub fn next_held(&mut self, peer: &VatId) -> Option<Envelope> {
        let next = self.mark(peer) + 1;
        self.held.get_mut(peer)?.remove(&next)
    }

    /// Tell `peer` how far its messages have been applied.
    pub async fn acknowledge(&self, peer: &VatId) {
        if peer == &self.local {
            return;
        }
        self.transmit(Frame::Ack {
            from: self.local.clone(),
            to: peer.clone(),
            seqnum: self.mark(peer),
        })
        .await;
    }

    /// The changes that drop messages to `peer` up to `seqnum` from the
    /// outbox.
    pub fn release(&self, peer: &VatId, seqnum: u64) -> Changeset {
        let mut changeset = Changeset::new();
        if let Some(queue) = self.outbox.get(peer) {
            for acknowledged in queue.range(..=seqnum).map(|(seqnum, _)| *seqnum) {
                changeset.dequeue(peer.clone(), acknowledged);
            }
        }
        changeset
    }

    /// Record a committed release.
    pub fn released(&mut self, peer: &VatId, seqnum: u64) {
        if let Some(queue) = self.outbox.get_mut(peer) {
            *queue = queue.split_off(&seqnum.saturating_add(1));
            if queue.is_empty() {
                self.outbox.remove(peer);
            }
        }
    }

    /// Send everything still queued for `peer` again.
    pub async fn retransmit(&self, peer: &VatId) {
        let Some(queue) = self.outbox.get(peer) else {
            return;
        };
        if peer == &self.local {
            return;
        }
        for envelope in queue.values() {
            self.transmit(Frame::Deliver {
                envelope: envelope.clone(),
            })
            .await;
        }
    }

    /// Retransmit every unacknowledged message. Messages to the local vat
    /// that are no longer queued for delivery are queued again.
    pub async fn flush(&mut self) {
        self.last_resend = Instant::now();

        if let Some(queue) = self.outbox.get(&self.local) {
            for envelope in queue.values() {
                if !self.loopback.contains(envelope) {
                    self.loopback.push_back(envelope.clone());
                }
            }
        }

        let peers: Vec<VatId> = self
            .outbox
            .keys()
            .filter(|peer| *peer != &self.local)
            .cloned()
            .collect();
        for peer in peers {
            self.retransmit(&peer).await;
        }
    }

    /// Housekeeping: periodic retransmission, and reporting of gaps that
    /// have waited longer than the gap timeout. Returns the gaps reported
    /// by this call.
    pub async fn tick(&mut self, now: Instant) -> Vec<VatError> {
        if now.duration_since(self.last_resend) >= self.resend_interval {
            if !self.outbox.is_empty() {
                tracing::debug!(vat = %self.local, "Retransmitting unacknowledged messages");
                self.flush().await;
            }
            self.last_resend = now;
        }

        let overdue: Vec<VatId> = self
            .gap_since
            .iter()
            .filter(|(_, since)| now.duration_since(**since) >= self.gap_timeout)
            .map(|(peer, _)| peer.clone())
            .collect();

        let mut reported = Vec::with_capacity(overdue.len());
        for peer in overdue {
            let Some(held) = self
                .held
                .get(&peer)
                .and_then(|held| held.keys().next().copied())
            else {
                self.gap_since.remove(&peer);
                continue;
            };
            let mark = self.mark(&peer);
            let gap = VatError::SequenceGap {
                peer: peer.clone(),
                expected: mark + 1,
                held,
            };

            tracing::warn!(vat = %self.local, "{gap}");
            self.metrics.record_gap();
            self.gap_since.insert(peer.clone(), now);
            self.gaps.insert(peer.clone(), gap.clone());
            reported.push(gap);

            self.transmit(Frame::Resync {
                from: self.local.clone(),
                to: peer,
                after: mark,
            })
            .await;
        }
        reported
    }

    /// Channels currently stuck behind a reported gap.
    pub fn gaps(&self) -> Vec<VatError> {
        self.gaps.values().cloned().collect()
    }

    async fn transmit(&self, frame: Frame) {
        if let Err(error) = self.network.transmit(frame).await {
            tracing::warn!(vat = %self.local, "Frame stays queued: {error}");
        }
    }
}
