//! Share-opening collectors, one keyed session per reconstruction.
//!
//! `Opens` is the public path: everyone broadcasts `MPC_OPEN` and
//! reconstructs from any `f + 1` shares, so all parties obtain the same
//! scalar. `PrivateReveals` is the private path: every party sends a
//! `MASK_SHARE` to a single target, which is the only one able to
//! reconstruct. Both record a party's own contribution through the
//! transport loopback, so handlers see one uniform path.

use crate::message::{Body, Message, SessionId};
use sealbid_common::poly::interpolate_at_zero;
use sealbid_common::{FieldError, Fq, Share};
use sealbid_network::{Network, NetworkError, PartyId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::debug;

#[derive(Error, Debug)]
pub enum OpenError {
    #[error("there was an error in the network: {0}")]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Field(#[from] FieldError),
}

struct OpenInstance {
    /// Received shares by evaluation point.
    shares: BTreeMap<PartyId, Fq>,
    progress: watch::Sender<u64>,
}

impl OpenInstance {
    fn new() -> Self {
        let (progress, _) = watch::channel(0);
        OpenInstance {
            shares: BTreeMap::new(),
            progress,
        }
    }
}

type Store = Arc<Mutex<HashMap<SessionId, Arc<Mutex<OpenInstance>>>>>;

async fn get_or_create(store: &Store, session_id: &SessionId) -> Arc<Mutex<OpenInstance>> {
    let mut store = store.lock().await;
    store
        .entry(session_id.clone())
        .or_insert_with(|| Arc::new(Mutex::new(OpenInstance::new())))
        .clone()
}

async fn record(store: &Store, session_id: &SessionId, point: PartyId, value: Fq) {
    let instance = get_or_create(store, session_id).await;
    let mut state = instance.lock().await;
    state.shares.entry(point).or_insert(value);
    state.progress.send_modify(|epoch| *epoch += 1);
}

/// Waits until `threshold` shares are present, then interpolates at zero.
async fn reconstruct(
    store: &Store,
    session_id: &SessionId,
    threshold: usize,
) -> Result<Fq, FieldError> {
    let instance = get_or_create(store, session_id).await;
    let mut rx = {
        let state = instance.lock().await;
        state.progress.subscribe()
    };
    loop {
        {
            let state = instance.lock().await;
            if state.shares.len() >= threshold {
                let points: Vec<(Fq, Fq)> = state
                    .shares
                    .iter()
                    .take(threshold)
                    .map(|(p, v)| (Fq::from(*p as u64), *v))
                    .collect();
                return interpolate_at_zero(&points);
            }
        }
        let _ = rx.changed().await;
    }
}

#[derive(Clone)]
pub struct Opens {
    pub id: PartyId,
    pub f: usize,
    store: Store,
}

impl Opens {
    pub fn new(id: PartyId, f: usize) -> Self {
        Opens {
            id,
            f,
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publicly opens a shared value: broadcast our share, reconstruct from
    /// any `f + 1` received shares.
    pub async fn open<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        share: Share,
        net: Arc<N>,
    ) -> Result<Fq, OpenError> {
        net.broadcast(Message::new(
            self.id,
            session_id.clone(),
            Body::MpcOpen { share: share.value },
        ))
        .await?;
        let value = reconstruct(&self.store, &session_id, self.f + 1).await?;
        debug!(id = self.id, session_id = %session_id, "opened value");
        Ok(value)
    }

    pub async fn handle(&self, msg: Message) {
        if let Body::MpcOpen { share } = msg.body {
            record(&self.store, &msg.session_id, msg.sender, share).await;
        }
    }
}

#[derive(Clone)]
pub struct PrivateReveals {
    pub id: PartyId,
    pub f: usize,
    store: Store,
}

impl PrivateReveals {
    pub fn new(id: PartyId, f: usize) -> Self {
        PrivateReveals {
            id,
            f,
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sends our share of the value privately to `target`. The target
    /// reconstructs from `f + 1` shares and gets `Some(value)`; everyone
    /// else returns `None` immediately.
    pub async fn reveal_to<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        target: PartyId,
        share: Share,
        net: Arc<N>,
    ) -> Result<Option<Fq>, OpenError> {
        net.send(
            target,
            Message::new(
                self.id,
                session_id.clone(),
                Body::MaskShare {
                    point: self.id,
                    value: share.value,
                },
            ),
        )
        .await?;
        if self.id != target {
            return Ok(None);
        }
        let value = reconstruct(&self.store, &session_id, self.f + 1).await?;
        debug!(id = self.id, session_id = %session_id, "reconstructed private value");
        Ok(Some(value))
    }

    pub async fn handle(&self, msg: Message) {
        if let Body::MaskShare { point, value } = msg.body {
            record(&self.store, &msg.session_id, point, value).await;
        }
    }
}
