//! The per-party orchestrator: owns one instance of every protocol, runs a
//! dispatcher task that decodes inbound frames and routes them by wire kind,
//! and drives the auction phases. Protocol instances are passive state
//! records; the dispatcher and the phase logic are the only actors.

use crate::acs::{AcsError, CommonSubset};
use crate::arith::Arithmetic;
use crate::ba::BinaryAgreement;
use crate::beacon::Beacon;
use crate::circuit::auction::SecondPriceAuction;
use crate::circuit::CircuitError;
use crate::css::{Css, CssError, DealKind};
use crate::message::{Body, Message, SessionId};
use crate::open::{Opens, PrivateReveals};
use crate::output::OutputPrivacy;
use crate::rbc::Rbc;
use sealbid_common::field::to_u128;
use sealbid_common::{Fq, Share, SharedRng};
use sealbid_network::{Network, NetworkError, PartyId};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PartyError {
    #[error(transparent)]
    Css(#[from] CssError),
    #[error(transparent)]
    Acs(#[from] AcsError),
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    #[error("there was an error in the network: {0}")]
    Network(#[from] NetworkError),
    #[error("the runtime budget was exhausted")]
    BudgetExhausted,
}

/// What one party knows when it is done.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuctionOutcome {
    /// This party's private output: the second price at the winner, zero
    /// everywhere else.
    pub output: Fq,
    /// The ACS-agreed input set the auction ran over.
    pub active_set: BTreeSet<PartyId>,
}

impl AuctionOutcome {
    pub fn output_as_int(&self) -> u128 {
        to_u128(self.output)
    }
}

pub struct Party {
    pub id: PartyId,
    pub n: usize,
    pub f: usize,
    bid: Fq,
    rbc: Arc<Rbc>,
    ba: Arc<BinaryAgreement>,
    css: Arc<Css>,
    acs: Arc<CommonSubset>,
    opens: Arc<Opens>,
    reveals: Arc<PrivateReveals>,
    arith: Arc<Arithmetic>,
    auction: SecondPriceAuction,
}

impl Party {
    pub fn new(
        id: PartyId,
        n: usize,
        f: usize,
        bid: u32,
        beacon: Arc<Beacon>,
        rng: SharedRng,
        random_bits: Vec<Share>,
    ) -> Self {
        let rbc = Arc::new(Rbc::new(id, n, f));
        let ba = Arc::new(BinaryAgreement::new(id, n, f, beacon));
        let css = Arc::new(Css::new(id, n, f, rng.clone()));
        let acs = Arc::new(CommonSubset::new(
            id,
            n,
            f,
            Arc::clone(&rbc),
            Arc::clone(&ba),
        ));
        let opens = Arc::new(Opens::new(id, f));
        let reveals = Arc::new(PrivateReveals::new(id, f));
        let arith = Arc::new(Arithmetic::new(
            id,
            n,
            f,
            Arc::clone(&css),
            Arc::clone(&acs),
            Arc::clone(&opens),
        ));
        let output = Arc::new(OutputPrivacy::new(
            id,
            n,
            f,
            Arc::clone(&css),
            Arc::clone(&acs),
            Arc::clone(&opens),
            Arc::clone(&reveals),
            rng,
        ));
        let auction = SecondPriceAuction::new(
            id,
            n,
            f,
            Arc::clone(&arith),
            output,
            random_bits,
        );
        Party {
            id,
            n,
            f,
            bid: Fq::from(bid as u64),
            rbc,
            ba,
            css,
            acs,
            opens,
            reveals,
            arith,
            auction,
        }
    }

    pub fn gates_evaluated(&self) -> u64 {
        self.arith.gates_evaluated()
    }

    /// Runs the whole auction for this party. `budget` is a harness guard,
    /// not a protocol timeout: on expiry the party is simply torn down.
    pub async fn run<N: Network<Msg = Message> + 'static>(
        &self,
        net: Arc<N>,
        inbox: UnboundedReceiver<Vec<u8>>,
        budget: Duration,
    ) -> Result<AuctionOutcome, PartyError> {
        let dispatcher = self.spawn_dispatcher(Arc::clone(&net), inbox);
        let result = tokio::time::timeout(budget, self.run_protocol(net)).await;
        dispatcher.abort();
        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(id = self.id, "budget exhausted, tearing the party down");
                Err(PartyError::BudgetExhausted)
            }
        }
    }

    async fn run_protocol<N: Network<Msg = Message> + 'static>(
        &self,
        net: Arc<N>,
    ) -> Result<AuctionOutcome, PartyError> {
        let root = SessionId::root("auction");

        // Phase 1: deal the own bid and wait for its finalization; the vid
        // is this party's ACS proposal.
        let input_sid = root.child(format!("input-{}", self.id));
        self.css
            .share(input_sid.clone(), self.bid, DealKind::Input, &net)
            .await?;
        let (own_vid, _) = self.css.wait_finalized(&input_sid).await?;

        // Phase 2: agree on the active input set.
        let active_set = self
            .acs
            .run(&root.child("acs"), Some(own_vid), Arc::clone(&net))
            .await?;
        info!(id = self.id, active_set = ?active_set, "active set agreed");

        // Phase 3: collect the active bid shares. Inclusion in the set
        // guarantees eventual finalization at every honest party.
        let mut bid_shares = std::collections::BTreeMap::new();
        for dealer in &active_set {
            let sid = root.child(format!("input-{dealer}"));
            let (_, share) = self.css.wait_finalized(&sid).await?;
            bid_shares.insert(*dealer, share);
        }

        // Phase 4: evaluate the circuit and learn the private output.
        let output = self
            .auction
            .run(&bid_shares, &active_set, &root, net)
            .await?;

        Ok(AuctionOutcome {
            output,
            active_set,
        })
    }

    fn spawn_dispatcher<N: Network<Msg = Message> + 'static>(
        &self,
        net: Arc<N>,
        mut inbox: UnboundedReceiver<Vec<u8>>,
    ) -> JoinHandle<()> {
        let id = self.id;
        let rbc = Arc::clone(&self.rbc);
        let ba = Arc::clone(&self.ba);
        let css = Arc::clone(&self.css);
        let opens = Arc::clone(&self.opens);
        let reveals = Arc::clone(&self.reveals);
        tokio::spawn(async move {
            while let Some(frame) = inbox.recv().await {
                let msg: Message = match bincode::deserialize(&frame) {
                    Ok(msg) => msg,
                    Err(_) => {
                        warn!(id, "malformed frame, dropping");
                        continue;
                    }
                };
                let result = match &msg.body {
                    Body::RbcInit { .. } | Body::RbcEcho { .. } | Body::RbcReady { .. } => rbc
                        .process(msg, Arc::clone(&net))
                        .await
                        .map_err(|e| e.to_string()),
                    Body::BaVote { .. } | Body::BaDecide { .. } => ba
                        .process(msg, Arc::clone(&net))
                        .await
                        .map_err(|e| e.to_string()),
                    Body::CssShare { .. }
                    | Body::MulReshare { .. }
                    | Body::CssEcho { .. }
                    | Body::CssReady { .. } => css
                        .process(msg, Arc::clone(&net))
                        .await
                        .map_err(|e| e.to_string()),
                    Body::MpcOpen { .. } => {
                        opens.handle(msg).await;
                        Ok(())
                    }
                    Body::MaskShare { .. } => {
                        reveals.handle(msg).await;
                        Ok(())
                    }
                    // Beacon traffic never crosses the party transport; the
                    // beacon is an in-process functionality.
                    Body::BeaconRequest { .. } | Body::BeaconValue { .. } => Ok(()),
                };
                if let Err(error) = result {
                    warn!(id, %error, "message processing failed");
                }
            }
        })
    }
}
