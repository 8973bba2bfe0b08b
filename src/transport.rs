//! Transport boundary.
//!
//! The message bus that actually moves protocol messages between tasks is
//! external. The engine sees it through two seams:
//! - [`Transport`]: synchronous `send` of a rendered tx message.
//! - [`ArrivalSource`]: an async stream of decoded arrivals that the runtime
//!   pumps into its event queue.
//!
//! [`RecordingTransport`] and [`ChannelTransport`] are in-process
//! implementations for tests and for wiring a harness around the player.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::item::ItemUid;
use crate::value::VarValue;

/// A rendered tx message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Scenario sending it.
    pub scenario: String,
    /// Item being played.
    pub uid: ItemUid,
    /// Sending task.
    pub sender: String,
    /// Receiving task.
    pub receiver: String,
    /// Message type name.
    pub identity: String,
    /// Rendered payload.
    pub payload: Vec<u8>,
}

/// A message delivered by the transport, already decoded into named fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sending task.
    pub sender: String,
    /// Receiving task.
    pub receiver: String,
    /// Message type name.
    pub identity: String,
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Decoded fields available for extraction into variables.
    pub fields: BTreeMap<String, VarValue>,
}

impl InboundMessage {
    /// Create an arrival with no payload or fields.
    #[must_use]
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            identity: identity.into(),
            ..Self::default()
        }
    }

    /// Attach a raw payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Attach a decoded field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: VarValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Outgoing half of the message bus.
///
/// `send` must not block on the peer: the engine calls it inline while
/// playing a tx item.
pub trait Transport: Send + Sync {
    /// Deliver `msg`.
    ///
    /// # Errors
    ///
    /// Any [`TransportError`] fails the scenario.
    fn send(&self, msg: &OutboundMessage) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, msg: &OutboundMessage) -> Result<(), TransportError> {
        (**self).send(msg)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, msg: &OutboundMessage) -> Result<(), TransportError> {
        (**self).send(msg)
    }
}

/// Transport that records every send, optionally refusing some identities.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    refused: Mutex<BTreeSet<String>>,
}

impl RecordingTransport {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends of `identity` fail.
    pub fn refuse(&self, identity: impl Into<String>) {
        self.refused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.into());
    }

    /// Messages sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, msg: &OutboundMessage) -> Result<(), TransportError> {
        let refused = self
            .refused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&msg.identity);
        if refused {
            return Err(TransportError::SendFailed(format!(
                "{} refused by transport",
                msg.identity
            )));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg.clone());
        tracing::trace!(identity = %msg.identity, to = %msg.receiver, "RecordingTransport: send");
        Ok(())
    }
}

/// Transport forwarding sends into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelTransport {
    /// Create the transport and the receiver its sends go to.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, msg: &OutboundMessage) -> Result<(), TransportError> {
        self.tx
            .send(msg.clone())
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// Incoming half of the message bus.
#[async_trait]
pub trait ArrivalSource: Send {
    /// Next arrival, or `None` once the source is exhausted.
    async fn next_arrival(&mut self) -> Option<InboundMessage>;
}

#[async_trait]
impl ArrivalSource for mpsc::Receiver<InboundMessage> {
    async fn next_arrival(&mut self) -> Option<InboundMessage> {
        self.recv().await
    }
}

#[async_trait]
impl ArrivalSource for mpsc::UnboundedReceiver<InboundMessage> {
    async fn next_arrival(&mut self) -> Option<InboundMessage> {
        self.recv().await
    }
}

/// Adapter turning any stream of arrivals into an [`ArrivalSource`].
pub struct StreamSource<S>(pub S);

#[async_trait]
impl<S> ArrivalSource for StreamSource<S>
where
    S: Stream<Item = InboundMessage> + Unpin + Send,
{
    async fn next_arrival(&mut self) -> Option<InboundMessage> {
        self.0.next().await
    }
}
