use std::time::Duration;

use spell_capability::{Memid, Message, Powid, Urbjid, Value, VatId};
use spell_storage::StoreBackend;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[cfg(not(target_arch = "wasm32"))]
use spell_storage::{CapabilityStore, FileSystemStorageBackend};

use crate::{ExecutionServer, Frame, Graph, Metrics, MetricsSnapshot, Network, VatConfig, VatError};

type Reply<T> = oneshot::Sender<Result<T, VatError>>;

enum Request {
    Poke(String, Reply<String>),
    Process(Message, VatId, Reply<()>),
    Send(VatId, Message, Reply<()>),
    CreateStateCell(Reply<Memid>),
    CreatePowerForMemid(Memid, bool, Reply<Powid>),
    CreateUrbject(String, Powid, Reply<Urbjid>),
    ReadCell(Memid, Reply<Value>),
    Graph(Reply<Graph>),
    Gaps(Reply<Vec<VatError>>),
}

/// A running vat: an [`ExecutionServer`] driven by a single event loop that
/// takes inbound frames, loopback messages, requests from [`VatHandle`]s
/// and housekeeping ticks one at a time.
pub struct Vat<Backend, N> {
    server: ExecutionServer<Backend, N>,
    inbound: mpsc::UnboundedReceiver<Frame>,
    requests: mpsc::UnboundedReceiver<Request>,
    handle: VatHandle,
    tick: Duration,
}

#[cfg(not(target_arch = "wasm32"))]
impl<N> Vat<FileSystemStorageBackend<Vec<u8>, Vec<u8>>, N>
where
    N: Network + 'static,
{
    /// Open the vat kept in `basedir`: its configuration from
    /// `spellserver.json` and its store under `store/`.
    ///
    /// `connect` is called with the vat id once it is known and returns the
    /// stream of frames addressed to the vat.
    pub async fn open(
        basedir: impl AsRef<std::path::Path>,
        network: N,
        connect: impl FnOnce(&VatId) -> mpsc::UnboundedReceiver<Frame>,
    ) -> Result<Self, VatError> {
        let basedir = basedir.as_ref();
        let config = VatConfig::load(basedir).await?;
        let backend = FileSystemStorageBackend::<Vec<u8>, Vec<u8>>::new(basedir.join("store")).await?;
        let store = CapabilityStore::open(backend).await?;
        let server = ExecutionServer::new(store, network, &config, Metrics::new()).await?;
        let inbound = connect(server.vat_id());
        Ok(Self::new(server, inbound, config.tick()))
    }
}

impl<Backend, N> Vat<Backend, N>
where
    Backend: StoreBackend,
    N: Network + 'static,
{
    /// Drive `server`, taking network frames from `inbound` and running
    /// housekeeping every `tick`.
    pub fn new(
        server: ExecutionServer<Backend, N>,
        inbound: mpsc::UnboundedReceiver<Frame>,
        tick: Duration,
    ) -> Self {
        let (sender, requests) = mpsc::unbounded_channel();
        let handle = VatHandle {
            vat_id: server.vat_id().clone(),
            metrics: server.metrics().clone(),
            requests: sender,
            cancel: CancellationToken::new(),
        };
        Self {
            server,
            inbound,
            requests,
            handle,
            tick,
        }
    }

    /// A handle for talking to the vat once it runs.
    pub fn handle(&self) -> VatHandle {
        self.handle.clone()
    }

    /// Run the event loop until [`VatHandle::shutdown`] is called or every
    /// handle is dropped. Returns the server for inspection.
    pub async fn run(self) -> ExecutionServer<Backend, N> {
        let Self {
            mut server,
            mut inbound,
            mut requests,
            handle,
            tick,
        } = self;
        let cancel = handle.cancel.clone();
        drop(handle);

        let mut ticks = tokio::time::interval(tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbound_open = true;

        tracing::info!(vat = %server.vat_id(), "Vat running");

        loop {
            while let Some(envelope) = server.next_loopback() {
                // Failures are logged and counted by the server.
                let _ = server.process_envelope(envelope).await;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                frame = inbound.recv(), if inbound_open => match frame {
                    Some(frame) => {
                        if let Err(error) = server.handle_frame(frame).await {
                            tracing::debug!(vat = %server.vat_id(), "Frame not applied: {error}");
                        }
                    }
                    None => inbound_open = false,
                },
                request = requests.recv() => match request {
                    Some(request) => serve(&mut server, request).await,
                    None => break,
                },
                _ = ticks.tick() => {
                    server.tick(Instant::now()).await;
                }
            }
        }

        tracing::info!(vat = %server.vat_id(), "Vat stopped");
        server
    }

    /// Run the event loop on the tokio runtime.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn spawn(self) -> (VatHandle, tokio::task::JoinHandle<ExecutionServer<Backend, N>>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }
}

async fn serve<Backend, N>(server: &mut ExecutionServer<Backend, N>, request: Request)
where
    Backend: StoreBackend,
    N: Network,
{
    // A dropped reply receiver only means the caller stopped waiting.
    match request {
        Request::Poke(body, reply) => {
            let _ = reply.send(server.poke(&body).await);
        }
        Request::Process(message, from, reply) => {
            let _ = reply.send(server.process_request(&message, &from).await);
        }
        Request::Send(to, message, reply) => {
            let _ = reply.send(server.send_message(to, message).await);
        }
        Request::CreateStateCell(reply) => {
            let result = server.store_mut().create_state_cell().await;
            let _ = reply.send(result.map_err(VatError::from));
        }
        Request::CreatePowerForMemid(memid, make_urbject, reply) => {
            let result = server
                .store_mut()
                .create_power_for_memid(&memid, make_urbject)
                .await;
            let _ = reply.send(result.map_err(VatError::from));
        }
        Request::CreateUrbject(code, powid, reply) => {
            let result = server.store_mut().create_urbject(&code, &powid).await;
            let _ = reply.send(result.map_err(VatError::from));
        }
        Request::ReadCell(memid, reply) => {
            let result = server.store().read_cell(&memid).await;
            let _ = reply.send(result.map_err(VatError::from));
        }
        Request::Graph(reply) => {
            let _ = reply.send(server.graph().await);
        }
        Request::Gaps(reply) => {
            let _ = reply.send(Ok(server.transport().gaps()));
        }
    }
}

/// Talks to a running [`Vat`]. Cheap to clone.
#[derive(Clone, Debug)]
pub struct VatHandle {
    vat_id: VatId,
    metrics: Metrics,
    requests: mpsc::UnboundedSender<Request>,
    cancel: CancellationToken,
}

impl VatHandle {
    async fn request<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> Result<T, VatError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(request(reply))
            .map_err(|_| VatError::Shutdown)?;
        response.await.map_err(|_| VatError::Shutdown)?
    }

    /// The vat's id.
    pub fn vat_id(&self) -> &VatId {
        &self.vat_id
    }

    /// The vat's counters, as of now.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// See [`ExecutionServer::poke`].
    pub async fn poke(&self, body: impl Into<String>) -> Result<String, VatError> {
        let body = body.into();
        self.request(|reply| Request::Poke(body, reply)).await
    }

    /// See [`ExecutionServer::process_request`].
    pub async fn process_request(&self, message: Message, from: VatId) -> Result<(), VatError> {
        self.request(|reply| Request::Process(message, from, reply))
            .await
    }

    /// See [`ExecutionServer::send_message`].
    pub async fn send_message(&self, to: VatId, message: Message) -> Result<(), VatError> {
        self.request(|reply| Request::Send(to, message, reply)).await
    }

    /// Create an empty state cell.
    pub async fn create_state_cell(&self) -> Result<Memid, VatError> {
        self.request(Request::CreateStateCell).await
    }

    /// Create the bundle scoped to `memid`.
    pub async fn create_power_for_memid(
        &self,
        memid: Memid,
        make_urbject: bool,
    ) -> Result<Powid, VatError> {
        self.request(|reply| Request::CreatePowerForMemid(memid, make_urbject, reply))
            .await
    }

    /// Create an urbject running `code` under `powid`.
    pub async fn create_urbject(
        &self,
        code: impl Into<String>,
        powid: Powid,
    ) -> Result<Urbjid, VatError> {
        let code = code.into();
        self.request(|reply| Request::CreateUrbject(code, powid, reply))
            .await
    }

    /// Read a state cell.
    pub async fn read_cell(&self, memid: Memid) -> Result<Value, VatError> {
        self.request(|reply| Request::ReadCell(memid, reply)).await
    }

    /// Export the vat's object graph.
    pub async fn graph(&self) -> Result<Graph, VatError> {
        self.request(Request::Graph).await
    }

    /// Sequence gaps currently reported.
    pub async fn gaps(&self) -> Result<Vec<VatError>, VatError> {
        self.request(Request::Gaps).await
    }

    /// Stop the event loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
