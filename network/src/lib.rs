//! Transport abstraction for the sealbid protocol stack.
//!
//! Protocols are generic over [`Network`] and exchange typed envelopes; the
//! only implementation here is the in-process [`sim::SimNetwork`], which
//! frames every envelope with `bincode` and delivers it into per-party
//! inboxes after a sampled delay, optionally dropping it according to an
//! omission policy.

use async_trait::async_trait;
use thiserror::Error;

pub mod sim;

/// Type to identify a party in a protocol. Party ids are 1-based; `0` is
/// never a valid evaluation point or address.
pub type PartyId = usize;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("party {0} is not connected")]
    PartyNotFound(PartyId),
    #[error("the recipient inbox is closed")]
    SendFailed,
    #[error("error while framing a message: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),
}

/// What the transport needs to know about a message without understanding
/// its payload: who sent it and which wire kind it is (for metrics and
/// type-selective omission).
pub trait Envelope: Clone + Send + Sync + serde::Serialize + 'static {
    fn sender(&self) -> PartyId;
    fn kind(&self) -> &'static str;
}

/// A network delivers envelopes to parties. Delivery is asynchronous with
/// unbounded delay and is never assumed to be FIFO.
#[async_trait]
pub trait Network: Send + Sync {
    type Msg: Envelope;

    /// Enqueues a delivery of `msg` to `to`.
    async fn send(&self, to: PartyId, msg: Self::Msg) -> Result<(), NetworkError>;

    /// Sends `msg` to every party, including the sender itself.
    async fn broadcast(&self, msg: Self::Msg) -> Result<(), NetworkError>;

    fn n_parties(&self) -> usize;
}
