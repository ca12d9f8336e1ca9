//! Complete secret sharing: a degree-`f` Shamir deal hardened by an
//! echo/ready layer that binds every finalization to a value id.
//!
//! The dealer sends `q(j)` privately to each party `j`; receivers broadcast
//! their point as an echo. Once `n - f` echoes agree with a single degree-`f`
//! polynomial (any `f + 1` points pin it, the rest must lie on it) a party
//! broadcasts `CSS_READY(vid)`, and `n - f` matching readies finalize the
//! session. A party whose own share the dealer omitted evaluates the pinned
//! polynomial at its index instead. The vid hashes the canonical evaluations
//! at every party index, so two parties that finalized from different echo
//! subsets still agree on it bit for bit.
//!
//! Sessions dealt for multiplication reshares differ only in the wire kind
//! of the dealer share (`MUL_RESHARE` instead of `CSS_SHARE`).

use crate::message::{Body, Message, SessionId, Vid};
use crate::open::{OpenError, Opens, PrivateReveals};
use sealbid_common::poly::{evaluate_at_party, interpolate_at, random_with_constant};
use sealbid_common::{FieldError, Fq, Share, SharedRng};
use sealbid_network::{Network, NetworkError, PartyId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum CssError {
    #[error("there was an error in the network: {0}")]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error("conflicting echo evidence in session {0}")]
    InvalidShare(SessionId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CssStatus {
    Pending,
    Finalized,
    Invalid,
}

/// Wire kind used for the dealer's private share messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DealKind {
    /// An input sharing (`CSS_SHARE`).
    Input,
    /// A multiplication reshare (`MUL_RESHARE`).
    Reshare,
}

struct CssInstance {
    status: CssStatus,
    /// Share received directly from the dealer.
    direct_share: Option<Fq>,
    /// Echoed points, keyed by the echoing party's index.
    echoes: BTreeMap<PartyId, Fq>,
    ready_votes: HashMap<Vid, HashSet<PartyId>>,
    sent_echo: bool,
    sent_ready: bool,
    /// Canonical evaluations `(j, q'(j))` for `j = 1..=n`, pinned by the
    /// first consistent echo quorum.
    defining_points: Option<Vec<(PartyId, Fq)>>,
    vid: Option<Vid>,
    progress: watch::Sender<u64>,
}

impl CssInstance {
    fn new() -> Self {
        let (progress, _) = watch::channel(0);
        CssInstance {
            status: CssStatus::Pending,
            direct_share: None,
            echoes: BTreeMap::new(),
            ready_votes: HashMap::new(),
            sent_echo: false,
            sent_ready: false,
            defining_points: None,
            vid: None,
            progress,
        }
    }

    fn tick(&self) {
        self.progress.send_modify(|epoch| *epoch += 1);
    }

    /// The share of `own_id`: received directly, read off the pinned
    /// polynomial, or interpolated from any `f + 1` echoes (enough to pin a
    /// degree-`f` polynomial). `None` until some source is available.
    fn share_for(&self, own_id: PartyId, f: usize) -> Result<Option<Fq>, FieldError> {
        if let Some(value) = self.direct_share {
            return Ok(Some(value));
        }
        if let Some(points) = &self.defining_points {
            return Ok(Some(points[own_id - 1].1));
        }
        if self.echoes.len() > f {
            let pinning: Vec<(Fq, Fq)> = self
                .echoes
                .iter()
                .take(f + 1)
                .map(|(p, v)| (Fq::from(*p as u64), *v))
                .collect();
            return Ok(Some(interpolate_at(&pinning, Fq::from(own_id as u64))?));
        }
        Ok(None)
    }
}

#[derive(Clone)]
pub struct Css {
    pub id: PartyId,
    pub n: usize,
    pub f: usize,
    rng: SharedRng,
    store: Arc<Mutex<HashMap<SessionId, Arc<Mutex<CssInstance>>>>>,
}

impl Css {
    pub fn new(id: PartyId, n: usize, f: usize, rng: SharedRng) -> Self {
        Css {
            id,
            n,
            f,
            rng,
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Deals `secret` under `session_id` with a fresh uniform degree-`f`
    /// polynomial. The dealer's own share arrives through its loopback link.
    pub async fn share<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        secret: Fq,
        kind: DealKind,
        net: &Arc<N>,
    ) -> Result<(), CssError> {
        let poly = self
            .rng
            .with(|rng| random_with_constant(self.f, secret, rng));
        info!(id = self.id, session_id = %session_id, ?kind, "dealing CSS session");
        for j in 1..=self.n {
            let value = evaluate_at_party(&poly, j);
            let body = match kind {
                DealKind::Input => Body::CssShare { value },
                DealKind::Reshare => Body::MulReshare { value },
            };
            net.send(j, Message::new(self.id, session_id.clone(), body))
                .await?;
        }
        Ok(())
    }

    pub async fn process<N: Network<Msg = Message>>(
        &self,
        msg: Message,
        net: Arc<N>,
    ) -> Result<(), CssError> {
        match msg.body {
            Body::CssShare { value } | Body::MulReshare { value } => {
                self.share_handler(msg.session_id, value, net).await
            }
            Body::CssEcho { point, value } => {
                self.echo_handler(msg.session_id, point, value, net).await
            }
            Body::CssReady { vid } => {
                self.ready_handler(msg.session_id, msg.sender, vid, net).await
            }
            _ => Ok(()),
        }
    }

    /// Dealer share received: record it and echo our point once.
    async fn share_handler<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        value: Fq,
        net: Arc<N>,
    ) -> Result<(), CssError> {
        let instance = self.get_or_create(&session_id).await;
        let mut state = instance.lock().await;
        state.direct_share = Some(value);
        state.tick();
        if state.sent_echo {
            return Ok(());
        }
        state.sent_echo = true;
        drop(state);
        net.broadcast(Message::new(
            self.id,
            session_id,
            Body::CssEcho {
                point: self.id,
                value,
            },
        ))
        .await?;
        Ok(())
    }

    async fn echo_handler<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        point: PartyId,
        value: Fq,
        net: Arc<N>,
    ) -> Result<(), CssError> {
        if point == 0 || point > self.n {
            return Ok(());
        }
        let instance = self.get_or_create(&session_id).await;
        let mut state = instance.lock().await;
        if state.status == CssStatus::Invalid {
            return Ok(());
        }
        state.echoes.entry(point).or_insert(value);

        // Every echo is checked against the pinned polynomial once one
        // exists; disagreement is evidence of inconsistent dealing.
        if let Some(points) = &state.defining_points {
            if points[point - 1].1 != state.echoes[&point] {
                state.status = CssStatus::Invalid;
                state.tick();
                error!(id = self.id, session_id = %session_id, point, "echo off the pinned polynomial");
                return Err(CssError::InvalidShare(session_id));
            }
        }

        if state.echoes.len() >= self.n - self.f && state.defining_points.is_none() {
            let echoes: Vec<(Fq, Fq)> = state
                .echoes
                .iter()
                .map(|(p, v)| (Fq::from(*p as u64), *v))
                .collect();
            // Any f + 1 echoes pin the polynomial; the remaining ones must
            // lie on it.
            let pinning = &echoes[..self.f + 1];
            for (x, y) in &echoes[self.f + 1..] {
                if interpolate_at(pinning, *x)? != *y {
                    state.status = CssStatus::Invalid;
                    state.tick();
                    error!(id = self.id, session_id = %session_id, "echo quorum is not a degree-f polynomial");
                    return Err(CssError::InvalidShare(session_id));
                }
            }
            let defining: Vec<(PartyId, Fq)> = (1..=self.n)
                .map(|j| Ok((j, interpolate_at(pinning, Fq::from(j as u64))?)))
                .collect::<Result<_, FieldError>>()?;
            let vid = Vid::digest(&session_id, &defining);
            state.defining_points = Some(defining);
            state.tick();

            if !state.sent_ready {
                state.sent_ready = true;
                drop(state);
                debug!(id = self.id, session_id = %session_id, ?vid, "echo quorum consistent, sending READY");
                net.broadcast(Message::new(self.id, session_id, Body::CssReady { vid }))
                    .await?;
            }
        }
        Ok(())
    }

    async fn ready_handler<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        from: PartyId,
        vid: Vid,
        net: Arc<N>,
    ) -> Result<(), CssError> {
        let instance = self.get_or_create(&session_id).await;
        let mut state = instance.lock().await;
        state.ready_votes.entry(vid).or_default().insert(from);
        let count = state.ready_votes[&vid].len();

        // Amplification at f + 1 matching readies keeps finalization
        // complete when a selectively omitting party withholds its echo or
        // ready from part of the network.
        let mut amplify = false;
        if count >= self.f + 1 && !state.sent_ready {
            state.sent_ready = true;
            amplify = true;
        }
        if count >= self.n - self.f && state.status == CssStatus::Pending {
            state.status = CssStatus::Finalized;
            state.vid = Some(vid);
            state.tick();
            info!(id = self.id, session_id = %session_id, ?vid, "CSS finalized");
        }
        drop(state);

        if amplify {
            net.broadcast(Message::new(self.id, session_id, Body::CssReady { vid }))
                .await?;
        }
        Ok(())
    }

    /// Suspends until the session finalizes and this party's share is
    /// available (directly, or derivable from the pinned polynomial).
    pub async fn wait_finalized(&self, session_id: &SessionId) -> Result<(Vid, Share), CssError> {
        let instance = self.get_or_create(session_id).await;
        let mut rx = {
            let state = instance.lock().await;
            state.progress.subscribe()
        };
        loop {
            {
                let state = instance.lock().await;
                match state.status {
                    CssStatus::Invalid => return Err(CssError::InvalidShare(session_id.clone())),
                    CssStatus::Finalized => {
                        if let (Some(vid), Some(value)) =
                            (state.vid, state.share_for(self.id, self.f)?)
                        {
                            return Ok((vid, Share::new(value, self.id, self.f)));
                        }
                    }
                    CssStatus::Pending => {}
                }
            }
            let _ = rx.changed().await;
        }
    }

    pub async fn status(&self, session_id: &SessionId) -> CssStatus {
        let store = self.store.lock().await;
        match store.get(session_id) {
            Some(instance) => instance.lock().await.status,
            None => CssStatus::Pending,
        }
    }

    /// The locally held share, without waiting for finalization evidence
    /// beyond what is needed to know the share itself.
    pub async fn get_share(&self, session_id: &SessionId) -> Option<Share> {
        let store = self.store.lock().await;
        let instance = store.get(session_id)?.clone();
        drop(store);
        let state = instance.lock().await;
        state
            .share_for(self.id, self.f)
            .ok()
            .flatten()
            .map(|value| Share::new(value, self.id, self.f))
    }

    /// Public reconstruction: every party broadcasts its share and rebuilds
    /// the secret from any `f + 1` of them.
    pub async fn recover<N: Network<Msg = Message>>(
        &self,
        session_id: &SessionId,
        opens: &Opens,
        net: Arc<N>,
    ) -> Result<Fq, CssError> {
        let (_, share) = self.wait_finalized(session_id).await?;
        Ok(opens
            .open(session_id.child("recover"), share, net)
            .await?)
    }

    /// Private reconstruction at `target` only: every party sends its share
    /// to the target, nobody else learns anything. Returns `None` at
    /// non-target parties.
    pub async fn recover_to_party<N: Network<Msg = Message>>(
        &self,
        session_id: &SessionId,
        target: PartyId,
        reveals: &PrivateReveals,
        net: Arc<N>,
    ) -> Result<Option<Fq>, CssError> {
        let (_, share) = self.wait_finalized(session_id).await?;
        Ok(reveals
            .reveal_to(session_id.child("reveal"), target, share, net)
            .await?)
    }

    async fn get_or_create(&self, session_id: &SessionId) -> Arc<Mutex<CssInstance>> {
        let mut store = self.store.lock().await;
        store
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CssInstance::new())))
            .clone()
    }
}
