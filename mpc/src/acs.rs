//! Agreement on a common set, composed from RBC proposals and one binary
//! agreement per dealer.
//!
//! Party `j` reliably broadcasts its proposal, feeds `BA_k` input 1 as soon
//! as it RBC-delivers a non-`⊥` proposal for dealer `k`, and inputs 0 to the
//! instances it has not started yet only after `n - f` instances decided 1 —
//! the gate that keeps early zeros from vetoing proposals that are still in
//! flight. Once all `n` instances have decided, the output is the `n - f`
//! smallest indices that decided 1, so every honest party truncates the same
//! decided set the same way.

use crate::ba::{BaError, BinaryAgreement};
use crate::message::{Message, SessionId, Vid};
use crate::rbc::{Rbc, RbcError};
use sealbid_network::{Network, PartyId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AcsError {
    #[error(transparent)]
    Rbc(#[from] RbcError),
    #[error(transparent)]
    Ba(#[from] BaError),
    #[error("only {accepted} dealers were accepted, which needs more than {faults} faults")]
    TooFewAccepted { accepted: usize, faults: usize },
    #[error("the agreement task ended without reporting all decisions")]
    DecisionChannelClosed,
}

#[derive(Clone)]
pub struct CommonSubset {
    pub id: PartyId,
    pub n: usize,
    pub f: usize,
    rbc: Arc<Rbc>,
    ba: Arc<BinaryAgreement>,
}

impl CommonSubset {
    pub fn new(id: PartyId, n: usize, f: usize, rbc: Arc<Rbc>, ba: Arc<BinaryAgreement>) -> Self {
        CommonSubset { id, n, f, rbc, ba }
    }

    /// Runs one ACS instance under `session_id` and returns the agreed set
    /// of exactly `n - f` dealer indices.
    pub async fn run<N: Network<Msg = Message> + 'static>(
        &self,
        session_id: &SessionId,
        proposal: Option<Vid>,
        net: Arc<N>,
    ) -> Result<BTreeSet<PartyId>, AcsError> {
        self.rbc
            .broadcast(
                session_id.child(format!("propose-{}", self.id)),
                proposal,
                &net,
            )
            .await?;

        let started: Arc<Mutex<HashSet<PartyId>>> = Arc::new(Mutex::new(HashSet::new()));
        let (decision_tx, mut decision_rx) = mpsc::unbounded_channel::<(PartyId, bool)>();

        // Watch every dealer's proposal; a delivered non-⊥ proposal starts
        // that dealer's BA with input 1. Watchers for dealers that never
        // deliver just park forever; their BAs are started by the gate below.
        for dealer in 1..=self.n {
            let rbc = Arc::clone(&self.rbc);
            let propose_sid = session_id.child(format!("propose-{dealer}"));
            let this = self.clone();
            let net = Arc::clone(&net);
            let started = Arc::clone(&started);
            let decision_tx = decision_tx.clone();
            let ba_sid = session_id.child(format!("ba-{dealer}"));
            tokio::spawn(async move {
                let delivered = rbc.wait_deliver(&propose_sid).await;
                if delivered.is_some() {
                    this.start_ba(dealer, ba_sid, true, started, decision_tx, net)
                        .await;
                }
            });
        }

        let mut decisions: BTreeMap<PartyId, bool> = BTreeMap::new();
        let mut ones = 0usize;
        let mut gate_opened = false;
        while decisions.len() < self.n {
            let (dealer, value) = decision_rx
                .recv()
                .await
                .ok_or(AcsError::DecisionChannelClosed)?;
            decisions.insert(dealer, value);
            if value {
                ones += 1;
            }
            if ones >= self.n - self.f && !gate_opened {
                gate_opened = true;
                for dealer in 1..=self.n {
                    let this = self.clone();
                    let net = Arc::clone(&net);
                    let started = Arc::clone(&started);
                    let decision_tx = decision_tx.clone();
                    let ba_sid = session_id.child(format!("ba-{dealer}"));
                    tokio::spawn(async move {
                        this.start_ba(dealer, ba_sid, false, started, decision_tx, net)
                            .await;
                    });
                }
            }
        }

        let accepted: BTreeSet<PartyId> = decisions
            .iter()
            .filter_map(|(dealer, value)| value.then_some(*dealer))
            .collect();
        if accepted.len() < self.n - self.f {
            return Err(AcsError::TooFewAccepted {
                accepted: accepted.len(),
                faults: self.f,
            });
        }

        let subset: BTreeSet<PartyId> = accepted.into_iter().take(self.n - self.f).collect();
        info!(id = self.id, session_id = %session_id, subset = ?subset, "ACS output");
        Ok(subset)
    }

    /// Starts `BA_dealer` with the given input unless some input was already
    /// provided; reports the decision exactly once per dealer.
    async fn start_ba<N: Network<Msg = Message> + 'static>(
        &self,
        dealer: PartyId,
        ba_sid: SessionId,
        input: bool,
        started: Arc<Mutex<HashSet<PartyId>>>,
        decision_tx: mpsc::UnboundedSender<(PartyId, bool)>,
        net: Arc<N>,
    ) {
        {
            let mut started = started.lock().await;
            if !started.insert(dealer) {
                return;
            }
        }
        match self.ba.run(ba_sid, input, net).await {
            Ok(decision) => {
                let _ = decision_tx.send((dealer, decision));
            }
            Err(err) => warn!(id = self.id, dealer, error = %err, "BA failed"),
        }
    }
}
