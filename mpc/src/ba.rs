//! Ben-Or binary agreement driven by the common-coin beacon.
//!
//! Each round a party broadcasts its estimate, collects at least `n - f`
//! round votes, and either decides (vote supermajority), adopts the majority
//! value, or falls back to the beacon coin. Deciding is two-step: the
//! supermajority holder broadcasts `BA_DECIDE` and everyone finalizes at
//! `f + 1` matching decides, own included. A party that sees any decide
//! before deciding re-broadcasts one — that amplification is what drags the
//! parties that are still stuck in the vote loop over the decide threshold.
//!
//! Safety holds unconditionally under omissions; termination is with
//! probability one.

use crate::beacon::Beacon;
use crate::message::{Body, Message, SessionId};
use sealbid_common::field::to_u128;
use sealbid_network::{Network, NetworkError, PartyId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BaError {
    #[error("there was an error in the network: {0}")]
    Network(#[from] NetworkError),
}

#[derive(Default)]
struct RoundVotes {
    zeros: HashSet<PartyId>,
    ones: HashSet<PartyId>,
}

impl RoundVotes {
    fn insert(&mut self, voter: PartyId, value: bool) {
        if value {
            self.ones.insert(voter);
        } else {
            self.zeros.insert(voter);
        }
    }

    fn total(&self) -> usize {
        self.zeros.len() + self.ones.len()
    }
}

struct BaInstance {
    votes: HashMap<u32, RoundVotes>,
    decide_votes: HashMap<bool, HashSet<PartyId>>,
    sent_decide: bool,
    running: bool,
    decided: Option<bool>,
    progress: watch::Sender<u64>,
}

impl BaInstance {
    fn new() -> Self {
        let (progress, _) = watch::channel(0);
        BaInstance {
            votes: HashMap::new(),
            decide_votes: HashMap::new(),
            sent_decide: false,
            running: false,
            decided: None,
            progress,
        }
    }

    fn tick(&self) {
        self.progress.send_modify(|epoch| *epoch += 1);
    }
}

#[derive(Clone)]
pub struct BinaryAgreement {
    pub id: PartyId,
    pub n: usize,
    pub f: usize,
    beacon: Arc<Beacon>,
    store: Arc<Mutex<HashMap<SessionId, Arc<Mutex<BaInstance>>>>>,
}

impl BinaryAgreement {
    pub fn new(id: PartyId, n: usize, f: usize, beacon: Arc<Beacon>) -> Self {
        BinaryAgreement {
            id,
            n,
            f,
            beacon,
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs the instance to a decision with the given input estimate.
    /// Messages for the instance may have arrived (and been tallied) long
    /// before the local run starts.
    pub async fn run<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        input: bool,
        net: Arc<N>,
    ) -> Result<bool, BaError> {
        let instance = self.get_or_create(&session_id).await;
        {
            let mut state = instance.lock().await;
            if let Some(decided) = state.decided {
                return Ok(decided);
            }
            if state.running {
                drop(state);
                return Ok(self.wait_decided(&session_id).await);
            }
            state.running = true;
        }

        let mut estimate = input;
        let mut round: u32 = 1;
        loop {
            debug!(id = self.id, session_id = %session_id, round, estimate, "voting");
            net.broadcast(Message::new(
                self.id,
                session_id.clone(),
                Body::BaVote {
                    round,
                    value: estimate,
                },
            ))
            .await?;

            // Collect at least n - f votes for this round, or a decision.
            let (count_zero, count_one) = {
                let mut rx = {
                    let state = instance.lock().await;
                    state.progress.subscribe()
                };
                loop {
                    {
                        let state = instance.lock().await;
                        if state.decided.is_some() {
                            break (0, 0);
                        }
                        if let Some(votes) = state.votes.get(&round) {
                            if votes.total() >= self.n - self.f {
                                break (votes.zeros.len(), votes.ones.len());
                            }
                        }
                    }
                    let _ = rx.changed().await;
                }
            };

            {
                let state = instance.lock().await;
                if let Some(decided) = state.decided {
                    return Ok(decided);
                }
            }

            if count_one >= self.n - self.f || count_zero >= self.n - self.f {
                let value = count_one >= self.n - self.f;
                self.send_decide(&instance, &session_id, value, &net).await?;
                return Ok(self.wait_decided(&session_id).await);
            } else if count_one >= self.f + 1 {
                estimate = true;
            } else if count_zero >= self.f + 1 {
                estimate = false;
            } else {
                // No majority among the collected votes: fall back to the
                // common coin for this (instance, round).
                let coin = self
                    .beacon
                    .request((session_id.clone(), round), self.id)
                    .await;
                estimate = to_u128(coin) % 2 == 1;
                debug!(id = self.id, session_id = %session_id, round, estimate, "adopted coin");
            }
            round += 1;
        }
    }

    pub async fn process<N: Network<Msg = Message>>(
        &self,
        msg: Message,
        net: Arc<N>,
    ) -> Result<(), BaError> {
        match msg.body {
            Body::BaVote { round, value } => {
                let instance = self.get_or_create(&msg.session_id).await;
                let mut state = instance.lock().await;
                state
                    .votes
                    .entry(round)
                    .or_default()
                    .insert(msg.sender, value);
                state.tick();
                Ok(())
            }
            Body::BaDecide { value } => self.decide_handler(msg.session_id, msg.sender, value, net).await,
            _ => Ok(()),
        }
    }

    async fn decide_handler<N: Network<Msg = Message>>(
        &self,
        session_id: SessionId,
        from: PartyId,
        value: bool,
        net: Arc<N>,
    ) -> Result<(), BaError> {
        let instance = self.get_or_create(&session_id).await;
        let mut state = instance.lock().await;
        state
            .decide_votes
            .entry(value)
            .or_default()
            .insert(from);
        let count = state.decide_votes[&value].len();

        let amplify = !state.sent_decide;
        if amplify {
            state.sent_decide = true;
        }
        if count >= self.f + 1 && state.decided.is_none() {
            state.decided = Some(value);
            state.tick();
            info!(id = self.id, session_id = %session_id, value, "BA decided");
        }
        drop(state);

        if amplify {
            net.broadcast(Message::new(self.id, session_id, Body::BaDecide { value }))
                .await?;
        }
        Ok(())
    }

    async fn send_decide<N: Network<Msg = Message>>(
        &self,
        instance: &Arc<Mutex<BaInstance>>,
        session_id: &SessionId,
        value: bool,
        net: &Arc<N>,
    ) -> Result<(), BaError> {
        {
            let mut state = instance.lock().await;
            if state.sent_decide {
                return Ok(());
            }
            state.sent_decide = true;
        }
        debug!(id = self.id, session_id = %session_id, value, "vote supermajority, sending DECIDE");
        net.broadcast(Message::new(
            self.id,
            session_id.clone(),
            Body::BaDecide { value },
        ))
        .await?;
        Ok(())
    }

    /// Suspends until the instance has decided.
    pub async fn wait_decided(&self, session_id: &SessionId) -> bool {
        let instance = self.get_or_create(session_id).await;
        let mut rx = {
            let state = instance.lock().await;
            state.progress.subscribe()
        };
        loop {
            {
                let state = instance.lock().await;
                if let Some(decided) = state.decided {
                    return decided;
                }
            }
            let _ = rx.changed().await;
        }
    }

    async fn get_or_create(&self, session_id: &SessionId) -> Arc<Mutex<BaInstance>> {
        let mut store = self.store.lock().await;
        store
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(BaInstance::new())))
            .clone()
    }
}
