//! Simulation harness: builds the network, the beacon and the four parties
//! from a scenario configuration, runs them to completion and collects the
//! per-party outcomes together with the transport metrics. The CLI and the
//! integration tests both drive auctions through this entry point.

use crate::beacon::Beacon;
use crate::circuit::BID_BITS;
use crate::message::Message;
use crate::party::{AuctionOutcome, Party, PartyError};
use crate::preprocessing;
use sealbid_common::{ShareError, SharedRng};
use sealbid_network::sim::{DelayModel, OmissionPolicy, SimNetwork};
use sealbid_network::PartyId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::error;

pub const N_PARTIES: usize = 4;
pub const FAULT_TOLERANCE: usize = 1;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("invalid scenario: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Share(#[from] ShareError),
}

#[derive(Clone, Debug)]
pub struct AuctionConfig {
    /// One bid per party, each in `[0, 32)`, all distinct.
    pub bids: BTreeMap<PartyId, u32>,
    /// Convenience: a party whose links are fully severed. Ignored when
    /// `omission` is set explicitly.
    pub omitting_party: Option<PartyId>,
    pub omission: Option<OmissionPolicy>,
    pub delay: DelayModel,
    /// `Some` for reproducible runs.
    pub seed: Option<u64>,
    /// Harness guard: parties still running when it expires are torn down.
    pub budget: Duration,
}

impl AuctionConfig {
    pub fn new(bids: [u32; N_PARTIES]) -> Self {
        AuctionConfig {
            bids: bids
                .iter()
                .enumerate()
                .map(|(idx, bid)| (idx + 1, *bid))
                .collect(),
            omitting_party: None,
            omission: None,
            delay: DelayModel::Uniform {
                lo: Duration::ZERO,
                hi: Duration::from_millis(2),
            },
            seed: None,
            budget: Duration::from_secs(30),
        }
    }

    pub fn with_omitter(mut self, party: PartyId) -> Self {
        self.omitting_party = Some(party);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_delay(mut self, delay: DelayModel) -> Self {
        self.delay = delay;
        self
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if self.bids.len() != N_PARTIES
            || self.bids.keys().any(|p| *p == 0 || *p > N_PARTIES)
        {
            return Err(HarnessError::InvalidConfig(format!(
                "need bids for exactly parties 1..={N_PARTIES}"
            )));
        }
        if self.bids.values().any(|b| *b >= 32) {
            return Err(HarnessError::InvalidConfig(
                "bids must lie in [0, 32)".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        if !self.bids.values().all(|b| seen.insert(*b)) {
            return Err(HarnessError::InvalidConfig("bids must be distinct".into()));
        }
        if let Some(party) = self.omitting_party {
            if party == 0 || party > N_PARTIES {
                return Err(HarnessError::InvalidConfig(format!(
                    "omitting party {party} out of range"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct AuctionReport {
    /// Per party: `Some(outcome)` on completion, `None` when the budget ran
    /// out first (the expected fate of a fully severed party).
    pub outcomes: BTreeMap<PartyId, Option<AuctionOutcome>>,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub counts_by_kind: BTreeMap<String, u64>,
    pub beacon_invocations: u64,
    pub multiplication_gates: u64,
    pub elapsed: Duration,
}

impl AuctionReport {
    /// True when every party outside `omitter` produced an outcome.
    pub fn all_honest_completed(&self, omitter: Option<PartyId>) -> bool {
        self.outcomes
            .iter()
            .filter(|(party, _)| Some(**party) != omitter)
            .all(|(_, outcome)| outcome.is_some())
    }
}

/// Cleartext oracle: the winner and second price among `active` bidders.
pub fn reference_auction(
    bids: &BTreeMap<PartyId, u32>,
    active: impl IntoIterator<Item = PartyId>,
) -> Option<(PartyId, u32)> {
    let mut ranked: Vec<(PartyId, u32)> = active
        .into_iter()
        .filter_map(|p| bids.get(&p).map(|b| (p, *b)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    match ranked.as_slice() {
        [(winner, _), (_, second_price), ..] => Some((*winner, *second_price)),
        _ => None,
    }
}

/// Runs one full auction scenario.
pub async fn run_auction(config: AuctionConfig) -> Result<AuctionReport, HarnessError> {
    config.validate()?;
    let rng = SharedRng::from_seed_opt(config.seed);

    let omission = config.omission.clone().or_else(|| {
        config
            .omitting_party
            .map(|party| OmissionPolicy::DropAll { party })
    });
    let (net, inboxes) = SimNetwork::<Message>::new(
        N_PARTIES,
        config.delay.clone(),
        omission,
        rng.clone(),
    );
    let metrics = net.metrics();
    let net = Arc::new(net);

    let beacon = Beacon::new(FAULT_TOLERANCE + 1, rng.clone(), Arc::clone(&metrics));
    let random_bits =
        preprocessing::random_bit_sharings(N_PARTIES, FAULT_TOLERANCE, N_PARTIES * BID_BITS, &rng)?;

    let parties: Vec<Arc<Party>> = random_bits
        .into_iter()
        .enumerate()
        .map(|(idx, bits)| {
            let id = idx + 1;
            Arc::new(Party::new(
                id,
                N_PARTIES,
                FAULT_TOLERANCE,
                self_bid(&config.bids, id),
                Arc::clone(&beacon),
                rng.clone(),
                bits,
            ))
        })
        .collect();

    let started = Instant::now();
    let mut handles = Vec::with_capacity(N_PARTIES);
    for (party, inbox) in parties.iter().zip(inboxes) {
        let party = Arc::clone(party);
        let net = Arc::clone(&net);
        let budget = config.budget;
        handles.push(tokio::spawn(async move {
            (party.id, party.run(net, inbox, budget).await)
        }));
    }

    let mut outcomes = BTreeMap::new();
    for handle in handles {
        match handle.await {
            Ok((id, Ok(outcome))) => {
                outcomes.insert(id, Some(outcome));
            }
            Ok((id, Err(PartyError::BudgetExhausted))) => {
                outcomes.insert(id, None);
            }
            Ok((id, Err(err))) => {
                error!(id, error = %err, "party failed");
                outcomes.insert(id, None);
            }
            Err(join_err) => {
                error!(error = %join_err, "party task panicked");
            }
        }
    }

    let multiplication_gates = parties
        .iter()
        .map(|party| party.gates_evaluated())
        .max()
        .unwrap_or(0);

    Ok(AuctionReport {
        outcomes,
        messages_sent: metrics.messages_sent(),
        messages_dropped: metrics.messages_dropped(),
        counts_by_kind: metrics.counts_by_kind(),
        beacon_invocations: beacon.invocations(),
        multiplication_gates,
        elapsed: started.elapsed(),
    })
}

fn self_bid(bids: &BTreeMap<PartyId, u32>, id: PartyId) -> u32 {
    // Validated above: every party has a bid.
    bids.get(&id).copied().unwrap_or_default()
}
