use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use spell_capability::VatId;
use spell_common::{ConditionalSend, ConditionalSync, SharedCell};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::{Frame, VatError};

/// Carries transport frames between vats.
///
/// Delivery may be lossy and may reorder; the transport copes with both.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Network: ConditionalSend + ConditionalSync {
    /// Hand `frame` to the vat it is addressed to.
    async fn transmit(&self, frame: Frame) -> Result<(), VatError>;
}

/// An in-process [`Network`] that routes frames over tokio channels by
/// destination vat id.
#[derive(Clone, Debug, Default)]
pub struct Switchboard {
    routes: Arc<SharedCell<BTreeMap<VatId, UnboundedSender<Frame>>>>,
}

impl Switchboard {
    /// An empty switchboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `vat_id` and receive every frame addressed to it. Connecting
    /// the same id again replaces the earlier route.
    pub fn connect(&self, vat_id: &VatId) -> UnboundedReceiver<Frame> {
        let (sender, receiver) = unbounded_channel();
        self.routes.write().insert(vat_id.clone(), sender);
        receiver
    }

    /// Stop routing frames to `vat_id`.
    pub fn disconnect(&self, vat_id: &VatId) {
        self.routes.write().remove(vat_id);
    }

    /// Whether frames to `vat_id` currently have somewhere to go.
    pub fn is_connected(&self, vat_id: &VatId) -> bool {
        self.routes
            .read()
            .get(vat_id)
            .is_some_and(|sender| !sender.is_closed())
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Network for Switchboard {
    async fn transmit(&self, frame: Frame) -> Result<(), VatError> {
        let to = frame.to().clone();
        let route = self.routes.read().get(&to).cloned();
        match route {
            Some(sender) => sender
                .send(frame)
                .map_err(|_| VatError::Transport(format!("{to} has gone away"))),
            None => Err(VatError::Transport(format!("no route to {to}"))),
        }
    }
}
