//! Bracha reliable broadcast, one instance per `(origin, tag)` where the tag
//! is baked into the session id. For `n = 4, f = 1` the thresholds are
//! `n - f = 3` echoes for a ready, `f + 1 = 2` readies for amplification and
//! `n - f = 3` readies for the single delivery.
//!
//! Under up-to-`f` omissions: if any honest party delivers, every honest
//! party eventually delivers the same value; an instance whose origin is
//! faulty may simply never deliver.

use crate::message::{Body, Message, SessionId, Vid};
use sealbid_network::{Network, NetworkError, PartyId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RbcError {
    #[error("there was an error in the network: {0}")]
    Network(#[from] NetworkError),
}

/// The broadcast payload: an ACS proposal, `None` standing for `⊥`.
pub type RbcValue = Option<Vid>;

struct RbcInstance {
    echoes: HashMap<RbcValue, HashSet<PartyId>>,
    readies: HashMap<RbcValue, HashSet<PartyId>>,
    sent_echo: bool,
    sent_ready: bool,
    delivered: Option<RbcValue>,
    progress: watch::Sender<u64>,
}

impl RbcInstance {
    fn new() -> Self {
        let (progress, _) = watch::channel(0);
        RbcInstance {
            echoes: HashMap::new(),
            readies: HashMap::new(),
            sent_echo: false,
            sent_ready: false,
            delivered: None,
            progress,
        }
    }

    fn tick(&self) {
        self.progress.send_modify(|epoch| *epoch += 1);
    }
}

#[derive(Clone)]
pub struct Rbc {
    pub id: PartyId,
    pub n: usize,
    pub f: usize,
    store: Arc<Mutex<HashMap<SessionId, Arc<Mutex<RbcInstance>>>>>,
}

impl Rbc {
    pub fn new(id: PartyId, n: usize, f: usize) -> Self {
        Rbc {
            id,
            n,
            f,
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Initiates the broadcast as the origin. The INIT loops back through
    /// the transport, so the origin runs the same handler path as everyone.
    pub async fn broadcast<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        value: RbcValue,
        net: &Arc<N>,
    ) -> Result<(), RbcError> {
        info!(id = self.id, session_id = %session_id, "broadcasting RBC_INIT");
        net.broadcast(Message::new(
            self.id,
            session_id,
            Body::RbcInit {
                origin: self.id,
                proposal: value,
            },
        ))
        .await?;
        Ok(())
    }

    pub async fn process<N: Network<Msg = Message>>(
        &self,
        msg: Message,
        net: Arc<N>,
    ) -> Result<(), RbcError> {
        match msg.body.clone() {
            Body::RbcInit { origin, proposal } => {
                if msg.sender != origin {
                    warn!(id = self.id, sender = msg.sender, origin, "INIT not from origin");
                    return Ok(());
                }
                self.init_handler(msg.session_id, origin, proposal, net).await
            }
            Body::RbcEcho { origin, proposal } => {
                self.echo_handler(msg.session_id, msg.sender, origin, proposal, net)
                    .await
            }
            Body::RbcReady { origin, proposal } => {
                self.ready_handler(msg.session_id, msg.sender, origin, proposal, net)
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn init_handler<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        origin: PartyId,
        proposal: RbcValue,
        net: Arc<N>,
    ) -> Result<(), RbcError> {
        let instance = self.get_or_create(&session_id).await;
        let mut state = instance.lock().await;
        if state.sent_echo {
            return Ok(());
        }
        state.sent_echo = true;
        drop(state);
        debug!(id = self.id, session_id = %session_id, "echoing INIT");
        net.broadcast(Message::new(
            self.id,
            session_id,
            Body::RbcEcho { origin, proposal },
        ))
        .await?;
        Ok(())
    }

    async fn echo_handler<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        echoer: PartyId,
        origin: PartyId,
        proposal: RbcValue,
        net: Arc<N>,
    ) -> Result<(), RbcError> {
        let instance = self.get_or_create(&session_id).await;
        let mut state = instance.lock().await;
        if state.delivered.is_some() {
            return Ok(());
        }
        state.echoes.entry(proposal).or_default().insert(echoer);
        let count = state.echoes[&proposal].len();
        if count >= self.n - self.f && !state.sent_ready {
            state.sent_ready = true;
            drop(state);
            debug!(id = self.id, session_id = %session_id, "echo quorum, sending READY");
            net.broadcast(Message::new(
                self.id,
                session_id,
                Body::RbcReady { origin, proposal },
            ))
            .await?;
        }
        Ok(())
    }

    async fn ready_handler<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        from: PartyId,
        origin: PartyId,
        proposal: RbcValue,
        net: Arc<N>,
    ) -> Result<(), RbcError> {
        let instance = self.get_or_create(&session_id).await;
        let mut state = instance.lock().await;
        if state.delivered.is_some() {
            return Ok(());
        }
        state.readies.entry(proposal).or_default().insert(from);
        let count = state.readies[&proposal].len();

        let mut amplify = false;
        if count >= self.f + 1 && !state.sent_ready {
            state.sent_ready = true;
            amplify = true;
        }
        if count >= self.n - self.f {
            state.delivered = Some(proposal);
            state.tick();
            info!(id = self.id, session_id = %session_id, "RBC delivered");
        }
        drop(state);

        if amplify {
            net.broadcast(Message::new(
                self.id,
                session_id,
                Body::RbcReady { origin, proposal },
            ))
            .await?;
        }
        Ok(())
    }

    /// Suspends until this instance delivers.
    pub async fn wait_deliver(&self, session_id: &SessionId) -> RbcValue {
        let instance = self.get_or_create(session_id).await;
        let mut rx = {
            let state = instance.lock().await;
            state.progress.subscribe()
        };
        loop {
            {
                let state = instance.lock().await;
                if let Some(value) = &state.delivered {
                    return *value;
                }
            }
            let _ = rx.changed().await;
        }
    }

    /// Non-blocking delivery check.
    pub async fn delivered(&self, session_id: &SessionId) -> Option<RbcValue> {
        let store = self.store.lock().await;
        match store.get(session_id) {
            Some(instance) => instance.lock().await.delivered,
            None => None,
        }
    }

    async fn get_or_create(&self, session_id: &SessionId) -> Arc<Mutex<RbcInstance>> {
        let mut store = self.store.lock().await;
        store
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(RbcInstance::new())))
            .clone()
    }
}
