use spell_capability::{
    Authority, Command, Envelope, Memid, Message, Power, Spid, Target, Urbjid, Value, VatId,
};
use spell_sandbox::Budget;
use spell_storage::{CapabilityStore, Changeset, StoreBackend};
use tokio::time::Instant;

use crate::{
    Admission, Frame, Graph, GraphExporter, Metrics, Network, Transport, Turn, TurnOutcome,
    VatConfig, VatError,
};

/// Runs the Turns of one vat and routes their effects.
///
/// The server is not shared: one caller drives it at a time, which is what
/// makes each Turn run alone. [`crate::Vat`] wraps it in an event loop.
pub struct ExecutionServer<Backend, N> {
    vat_id: VatId,
    store: CapabilityStore<Backend>,
    transport: Transport<N>,
    metrics: Metrics,
    budget: Budget,
    interrupted: bool,
}

impl<Backend, N> ExecutionServer<Backend, N>
where
    Backend: StoreBackend,
    N: Network,
{
    /// Open a vat over `store`.
    ///
    /// The vat id is taken from `config`, else from the store, else drawn
    /// fresh, and is recorded in the store. A store that belongs to a
    /// different vat than the configured one is refused.
    pub async fn new(
        mut store: CapabilityStore<Backend>,
        network: N,
        config: &VatConfig,
        metrics: Metrics,
    ) -> Result<Self, VatError> {
        let stored = store.vat_id().await?;
        let first_start = stored.is_none();
        let vat_id = match (config.vat_id.clone(), stored) {
            (Some(configured), Some(stored)) if configured != stored => {
                return Err(VatError::Config(format!(
                    "store belongs to {stored}, but the vat is configured as {configured}"
                )));
            }
            (Some(vat_id), _) | (None, Some(vat_id)) => vat_id,
            (None, None) => VatId::generate(),
        };
        if first_start {
            store.set_vat_id(&vat_id).await?;
        }

        let ledger = store.transport_ledger().await?;
        tracing::info!(
            vat = %vat_id,
            queued = ledger.outbox.len(),
            "Vat opened"
        );
        let transport = Transport::new(vat_id.clone(), network, ledger, config, metrics.clone());

        Ok(Self {
            vat_id,
            store,
            transport,
            metrics,
            budget: config.budget(),
            interrupted: false,
        })
    }

    /// This vat's id.
    pub fn vat_id(&self) -> &VatId {
        &self.vat_id
    }

    /// The vat's store.
    pub fn store(&self) -> &CapabilityStore<Backend> {
        &self.store
    }

    /// The vat's store, for administrative changes outside of Turns.
    pub fn store_mut(&mut self) -> &mut CapabilityStore<Backend> {
        &mut self.store
    }

    /// The vat's transport.
    pub fn transport(&self) -> &Transport<N> {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut Transport<N> {
        &mut self.transport
    }

    /// The vat's counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run one message as a Turn and commit its effects.
    ///
    /// `from` is where the message came from; it is recorded, never trusted.
    pub async fn process_request(&mut self, message: &Message, from: &VatId) -> Result<(), VatError> {
        self.recover().await?;
        self.process(message, from, Changeset::new()).await
    }

    /// Durably queue `message` for `to` and start delivering it. References
    /// to local urbjects in the arguments are sent as spids.
    pub async fn send_message(&mut self, to: VatId, mut message: Message) -> Result<(), VatError> {
        self.recover().await?;
        message.args = portable(message.args, &self.vat_id);
        tracing::debug!(vat = %self.vat_id, %to, command = message.command.name(), "Sending message");
        let mut changeset = Changeset::new();
        let envelopes = self.transport.stage(&mut changeset, vec![(to, message)]);
        self.commit(&changeset).await?;
        self.transport.committed(envelopes).await;
        Ok(())
    }

    /// Ask `to` to run `code` against its cell `memid`.
    pub async fn send_execute(
        &mut self,
        to: VatId,
        memid: Memid,
        code: impl Into<String>,
        args: Value,
    ) -> Result<(), VatError> {
        self.send_message(to, Message::execute(memid, code, args))
            .await
    }

    /// Ask `to` to invoke its urbject `urbjid`.
    pub async fn send_invoke(&mut self, to: VatId, urbjid: Urbjid, args: Value) -> Result<(), VatError> {
        self.send_message(to, Message::invoke(urbjid, args)).await
    }

    /// Handle a frame that arrived from the network.
    pub async fn handle_frame(&mut self, frame: Frame) -> Result<(), VatError> {
        if frame.to() != &self.vat_id {
            return Err(VatError::Transport(format!(
                "frame for {} delivered to {}",
                frame.to(),
                self.vat_id
            )));
        }
        match frame {
            Frame::Deliver { envelope } => self.process_envelope(envelope).await,
            Frame::Ack { from, seqnum, .. } => self.release(&from, seqnum).await,
            Frame::Resync { from, after, .. } => {
                tracing::debug!(vat = %self.vat_id, peer = %from, after, "Resync requested");
                self.release(&from, after).await?;
                self.transport.retransmit(&from).await;
                Ok(())
            }
        }
    }

    /// Apply an inbound envelope in sequence order.
    ///
    /// A message that fails its Turn is still consumed, so it cannot block
    /// the channel; the first such failure is returned once every message
    /// that became ready has been applied.
    pub async fn process_envelope(&mut self, envelope: Envelope) -> Result<(), VatError> {
        self.recover().await?;
        let envelope = match self.transport.admit(envelope) {
            Admission::Ready(envelope) => envelope,
            Admission::Duplicate(envelope) => {
                tracing::debug!(
                    vat = %self.vat_id,
                    from = %envelope.from,
                    seqnum = envelope.seqnum,
                    "Dropping duplicate message"
                );
                self.metrics.record_duplicate();
                self.transport.acknowledge(&envelope.from).await;
                return Ok(());
            }
            Admission::Held => return Ok(()),
        };

        let peer = envelope.from.clone();
        let mut first_failure = None;
        let mut next = Some(envelope);

        while let Some(envelope) = next {
            match self.apply(&envelope).await {
                Ok(()) => {}
                Err(error @ VatError::Storage(_)) => return Err(error),
                Err(error) => {
                    first_failure.get_or_insert(error);
                }
            }
            next = self.transport.next_held(&peer);
        }

        self.transport.acknowledge(&peer).await;
        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// The next message this vat sent to itself, if any.
    pub fn next_loopback(&mut self) -> Option<Envelope> {
        self.transport.next_loopback()
    }

    /// Periodic housekeeping; returns newly reported sequence gaps.
    pub async fn tick(&mut self, now: Instant) -> Vec<VatError> {
        if let Err(error) = self.recover().await {
            tracing::warn!(vat = %self.vat_id, "Store has not recovered: {error}");
        }
        self.transport.tick(now).await
    }

    /// Export the store as an object graph.
    pub async fn graph(&self) -> Result<Graph, VatError> {
        GraphExporter::new(&self.store, &self.vat_id).export().await
    }

    async fn apply(&mut self, envelope: &Envelope) -> Result<(), VatError> {
        let receipt = self.transport.receipt(envelope);
        let result = self
            .process(&envelope.message, &envelope.from, receipt.clone())
            .await;

        match result {
            Ok(()) => {}
            Err(error @ VatError::Storage(_)) => return Err(error),
            Err(error) => {
                self.commit(&receipt).await?;
                self.transport.applied(envelope);
                return Err(error);
            }
        }
        self.transport.applied(envelope);
        Ok(())
    }

    async fn process(
        &mut self,
        message: &Message,
        from: &VatId,
        receipt: Changeset,
    ) -> Result<(), VatError> {
        let result = self.run_turn(message, from, receipt).await;
        if let Err(error) = &result {
            tracing::error!(
                vat = %self.vat_id,
                %from,
                command = message.command.name(),
                "Turn failed: {error}"
            );
            self.metrics.record_failed();
        }
        result
    }

    async fn run_turn(
        &mut self,
        message: &Message,
        from: &VatId,
        receipt: Changeset,
    ) -> Result<(), VatError> {
        let turn = Turn::new(&self.store, &self.vat_id, &self.budget);

        let TurnOutcome {
            changeset: effects,
            sends,
            ..
        } = match &message.command {
            Command::Execute { memid, code } => {
                if !self.store.has_cell(memid).await? {
                    return Err(VatError::NotFound(format!("memory {memid}")));
                }
                let powid = self.store.fresh_powid().await?;
                let power = Power::for_memory(memid.clone(), false);
                let mut outcome = turn
                    .run(code, &powid, &power, &message.args, from)
                    .await?;

                let mut changeset = Changeset::new();
                changeset
                    .create_power(powid, power)
                    .extend(outcome.changeset);
                outcome.changeset = changeset;
                outcome
            }
            Command::Invoke { urbjid } => {
                let urbject = self.store.get_urbject(urbjid).await?;
                let (code, powid) = urbject.get_code_and_bundle();
                turn.start_turn(code, powid, &message.args, from).await?
            }
            Command::Unrecognized(name) => {
                tracing::warn!(
                    vat = %self.vat_id,
                    %from,
                    "{}, ignoring",
                    VatError::UnknownCommand(name.clone())
                );
                self.metrics.record_ignored();
                self.commit(&receipt).await?;
                return Ok(());
            }
        };

        let mut changeset = effects;
        changeset.extend(receipt);
        let sends = sends
            .into_iter()
            .map(|send| {
                let (vat, urbjid) = send.target.into_parts();
                (vat, Message::invoke(urbjid, send.args))
            })
            .collect();
        let envelopes = self.transport.stage(&mut changeset, sends);

        self.commit(&changeset).await?;
        self.transport.committed(envelopes).await;
        self.metrics.record_processed();

        tracing::debug!(
            vat = %self.vat_id,
            %from,
            command = message.command.name(),
            changes = changeset.changes().len(),
            "Turn committed"
        );
        Ok(())
    }

    async fn release(&mut self, peer: &VatId, seqnum: u64) -> Result<(), VatError> {
        self.recover().await?;
        let changeset = self.transport.release(peer, seqnum);
        if !changeset.is_empty() {
            self.commit(&changeset).await?;
        }
        self.transport.released(peer, seqnum);
        Ok(())
    }

    /// Commit through the store. A failure may leave the commit journaled
    /// but unapplied, so the transport is not trusted until [`Self::recover`]
    /// has run.
    async fn commit(&mut self, changeset: &Changeset) -> Result<(), VatError> {
        if let Err(error) = self.store.commit(changeset).await {
            self.interrupted = true;
            return Err(error.into());
        }
        Ok(())
    }

    /// After a failed commit, let the store finish it if it was journaled and
    /// mirror the store in the transport again.
    async fn recover(&mut self) -> Result<(), VatError> {
        if !self.interrupted {
            return Ok(());
        }
        if self.store.recover().await? {
            tracing::info!(vat = %self.vat_id, "Finished an interrupted commit");
        }
        let ledger = self.store.transport_ledger().await?;
        self.transport.resume(ledger);
        self.interrupted = false;
        Ok(())
    }
}

fn portable(value: Value, local: &VatId) -> Value {
    match value {
        Value::Capability(Authority::Reference(Target::Local(urbjid))) => Value::Capability(
            Authority::Reference(Target::Remote(Spid::new(local.clone(), urbjid))),
        ),
        Value::List(items) => Value::List(
            items
                .into_iter()
                .map(|item| portable(item, local))
                .collect(),
        ),
        Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(key, item)| (key, portable(item, local)))
                .collect(),
        ),
        other => other,
    }
}
