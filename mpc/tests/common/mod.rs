//! Shared scaffolding for the protocol-level integration tests: per-party
//! protocol stacks wired to the simulated network, with a router task that
//! mirrors the party dispatcher.

#![allow(dead_code)]

use once_cell::sync::Lazy;
use sealbid_common::SharedRng;
use sealbid_mpc::acs::CommonSubset;
use sealbid_mpc::arith::Arithmetic;
use sealbid_mpc::ba::BinaryAgreement;
use sealbid_mpc::beacon::Beacon;
use sealbid_mpc::css::Css;
use sealbid_mpc::message::{Body, Message};
use sealbid_mpc::open::{Opens, PrivateReveals};
use sealbid_mpc::output::OutputPrivacy;
use sealbid_mpc::rbc::Rbc;
use sealbid_network::sim::{DelayModel, OmissionPolicy, SimNetwork};
use sealbid_network::PartyId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub const N: usize = 4;
pub const F: usize = 1;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// One party's full protocol stack, without the auction orchestration.
pub struct Stack {
    pub id: PartyId,
    pub rbc: Arc<Rbc>,
    pub ba: Arc<BinaryAgreement>,
    pub css: Arc<Css>,
    pub acs: Arc<CommonSubset>,
    pub opens: Arc<Opens>,
    pub reveals: Arc<PrivateReveals>,
    pub arith: Arc<Arithmetic>,
    pub output: Arc<OutputPrivacy>,
}

impl Stack {
    pub fn new(id: PartyId, beacon: Arc<Beacon>, rng: SharedRng) -> Self {
        let rbc = Arc::new(Rbc::new(id, N, F));
        let ba = Arc::new(BinaryAgreement::new(id, N, F, beacon));
        let css = Arc::new(Css::new(id, N, F, rng.clone()));
        let acs = Arc::new(CommonSubset::new(
            id,
            N,
            F,
            Arc::clone(&rbc),
            Arc::clone(&ba),
        ));
        let opens = Arc::new(Opens::new(id, F));
        let reveals = Arc::new(PrivateReveals::new(id, F));
        let arith = Arc::new(Arithmetic::new(
            id,
            N,
            F,
            Arc::clone(&css),
            Arc::clone(&acs),
            Arc::clone(&opens),
        ));
        let output = Arc::new(OutputPrivacy::new(
            id,
            N,
            F,
            Arc::clone(&css),
            Arc::clone(&acs),
            Arc::clone(&opens),
            Arc::clone(&reveals),
            rng,
        ));
        Stack {
            id,
            rbc,
            ba,
            css,
            acs,
            opens,
            reveals,
            arith,
            output,
        }
    }
}

pub type Net = SimNetwork<Message>;

/// Builds the network, the beacon and one stack per party.
pub fn setup(
    delay: DelayModel,
    omission: Option<OmissionPolicy>,
    seed: u64,
) -> (
    Arc<Net>,
    Vec<UnboundedReceiver<Vec<u8>>>,
    Arc<Beacon>,
    Vec<Stack>,
    SharedRng,
) {
    init_tracing();
    let rng = SharedRng::seeded(seed);
    let (net, inboxes) = SimNetwork::new(N, delay, omission, rng.clone());
    let metrics = net.metrics();
    let net = Arc::new(net);
    let beacon = Beacon::new(F + 1, rng.clone(), metrics);
    let stacks = (1..=N)
        .map(|id| Stack::new(id, Arc::clone(&beacon), rng.clone()))
        .collect();
    (net, inboxes, beacon, stacks, rng)
}

pub fn quick_delay() -> DelayModel {
    DelayModel::Uniform {
        lo: Duration::ZERO,
        hi: Duration::from_millis(1),
    }
}

/// Routes a party's inbound frames to its protocol handlers, the way the
/// real party dispatcher does.
pub fn spawn_router(stack: &Stack, net: Arc<Net>, mut inbox: UnboundedReceiver<Vec<u8>>) -> JoinHandle<()> {
    let id = stack.id;
    let rbc = Arc::clone(&stack.rbc);
    let ba = Arc::clone(&stack.ba);
    let css = Arc::clone(&stack.css);
    let opens = Arc::clone(&stack.opens);
    let reveals = Arc::clone(&stack.reveals);
    tokio::spawn(async move {
        while let Some(frame) = inbox.recv().await {
            let msg: Message = match bincode::deserialize(&frame) {
                Ok(msg) => msg,
                Err(_) => continue,
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
                Body::BeaconRequest { .. } | Body::BeaconValue { .. } => Ok(()),
            };
            if let Err(error) = result {
                warn!(id, %error, "test router: processing failed");
            }
        }
    })
}

/// Spawns routers for every party.
pub fn spawn_routers(
    stacks: &[Stack],
    net: &Arc<Net>,
    inboxes: Vec<UnboundedReceiver<Vec<u8>>>,
) -> Vec<JoinHandle<()>> {
    stacks
        .iter()
        .zip(inboxes)
        .map(|(stack, inbox)| spawn_router(stack, Arc::clone(net), inbox))
        .collect()
}
