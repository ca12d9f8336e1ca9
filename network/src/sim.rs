//! In-process network simulator. Channels are `tokio` mpsc queues carrying
//! `bincode` frames; each send samples a delay from the configured model and
//! is delivered by a spawned timer task, so two frames on the same link may
//! arrive out of order. Omission faults are applied here, at the transport,
//! never inside party logic.

use crate::{Envelope, Network, NetworkError, PartyId};
use async_trait::async_trait;
use futures::future::try_join_all;
use sealbid_common::SharedRng;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::trace;

/// Message delay distributions.
#[derive(Clone, Debug)]
pub enum DelayModel {
    Uniform { lo: Duration, hi: Duration },
    Exponential { mean: Duration },
    Fixed(Duration),
    /// Designated links are slow, everything else fast.
    Adversarial {
        slow_links: Vec<(PartyId, PartyId)>,
        slow: (Duration, Duration),
        fast: (Duration, Duration),
    },
}

impl DelayModel {
    fn sample(&self, from: PartyId, to: PartyId, rng: &SharedRng) -> Duration {
        match self {
            DelayModel::Uniform { lo, hi } => {
                Duration::from_secs_f64(rng.uniform_f64(lo.as_secs_f64(), hi.as_secs_f64()))
            }
            DelayModel::Exponential { mean } => {
                Duration::from_secs_f64(rng.exponential_f64(mean.as_secs_f64()))
            }
            DelayModel::Fixed(delay) => *delay,
            DelayModel::Adversarial {
                slow_links,
                slow,
                fast,
            } => {
                let (lo, hi) = if slow_links.contains(&(from, to)) {
                    *slow
                } else {
                    *fast
                };
                Duration::from_secs_f64(rng.uniform_f64(lo.as_secs_f64(), hi.as_secs_f64()))
            }
        }
    }
}

/// Omission fault policies applied per (sender, receiver, kind).
///
/// `DropAll` severs the party in both directions, modelling a full crash of
/// its links; the remaining policies drop outbound traffic only.
#[derive(Clone, Debug)]
pub enum OmissionPolicy {
    DropAll {
        party: PartyId,
    },
    DropProbability {
        party: PartyId,
        p: f64,
    },
    DropKinds {
        party: PartyId,
        kinds: Vec<String>,
    },
    /// Drop everything the party sends during the given intervals, measured
    /// from network construction.
    BurstDrop {
        party: PartyId,
        bursts: Vec<(Duration, Duration)>,
    },
}

impl OmissionPolicy {
    fn should_drop(
        &self,
        from: PartyId,
        to: PartyId,
        kind: &str,
        elapsed: Duration,
        rng: &SharedRng,
    ) -> bool {
        match self {
            OmissionPolicy::DropAll { party } => from == *party || to == *party,
            OmissionPolicy::DropProbability { party, p } => {
                from == *party && rng.happens_with_probability(*p)
            }
            OmissionPolicy::DropKinds { party, kinds } => {
                from == *party && kinds.iter().any(|k| k == kind)
            }
            OmissionPolicy::BurstDrop { party, bursts } => {
                from == *party && bursts.iter().any(|(t0, t1)| elapsed >= *t0 && elapsed <= *t1)
            }
        }
    }
}

/// Transport counters, shared with the harness for the final report.
#[derive(Debug, Default)]
pub struct NetMetrics {
    sent: AtomicU64,
    dropped: AtomicU64,
    by_kind: Mutex<HashMap<&'static str, u64>>,
}

impl NetMetrics {
    pub fn record(&self, kind: &'static str) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let mut by_kind = self.by_kind.lock().expect("metrics mutex poisoned");
        *by_kind.entry(kind).or_insert(0) += 1;
    }

    /// Counts an event that is not a party-to-party frame (beacon traffic).
    pub fn record_event(&self, kind: &'static str) {
        let mut by_kind = self.by_kind.lock().expect("metrics mutex poisoned");
        *by_kind.entry(kind).or_insert(0) += 1;
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn counts_by_kind(&self) -> BTreeMap<String, u64> {
        let by_kind = self.by_kind.lock().expect("metrics mutex poisoned");
        by_kind
            .iter()
            .map(|(kind, count)| (kind.to_string(), *count))
            .collect()
    }
}

pub struct SimNetwork<M> {
    inboxes: Vec<UnboundedSender<Vec<u8>>>,
    delay: DelayModel,
    omission: Option<OmissionPolicy>,
    rng: SharedRng,
    metrics: std::sync::Arc<NetMetrics>,
    started: Instant,
    _msg: PhantomData<fn() -> M>,
}

impl<M: Envelope> SimNetwork<M> {
    /// Builds the network and hands back one inbox receiver per party,
    /// indexed `party_id - 1`.
    pub fn new(
        n: usize,
        delay: DelayModel,
        omission: Option<OmissionPolicy>,
        rng: SharedRng,
    ) -> (Self, Vec<UnboundedReceiver<Vec<u8>>>) {
        let mut inboxes = Vec::with_capacity(n);
        let mut receivers = Vec::with_capacity(n);
        for _ in 0..n {
            let (tx, rx) = mpsc::unbounded_channel();
            inboxes.push(tx);
            receivers.push(rx);
        }
        (
            SimNetwork {
                inboxes,
                delay,
                omission,
                rng,
                metrics: std::sync::Arc::new(NetMetrics::default()),
                started: Instant::now(),
                _msg: PhantomData,
            },
            receivers,
        )
    }

    pub fn metrics(&self) -> std::sync::Arc<NetMetrics> {
        std::sync::Arc::clone(&self.metrics)
    }
}

#[async_trait]
impl<M: Envelope> Network for SimNetwork<M> {
    type Msg = M;

    async fn send(&self, to: PartyId, msg: M) -> Result<(), NetworkError> {
        let from = msg.sender();
        let kind = msg.kind();
        let inbox = self
            .inboxes
            .get(to.checked_sub(1).ok_or(NetworkError::PartyNotFound(to))?)
            .ok_or(NetworkError::PartyNotFound(to))?;

        self.metrics.record(kind);
        if let Some(policy) = &self.omission {
            if policy.should_drop(from, to, kind, self.started.elapsed(), &self.rng) {
                self.metrics.record_dropped();
                trace!(from, to, kind, "transport dropped frame");
                return Ok(());
            }
        }

        let frame = bincode::serialize(&msg)?;
        let delay = self.delay.sample(from, to, &self.rng);
        if delay.is_zero() {
            // A closed inbox means the party was torn down; the frame is lost
            // like any other in-flight message.
            let _ = inbox.send(frame);
        } else {
            let inbox = inbox.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = inbox.send(frame);
            });
        }
        Ok(())
    }

    async fn broadcast(&self, msg: M) -> Result<(), NetworkError> {
        try_join_all((1..=self.inboxes.len()).map(|to| self.send(to, msg.clone()))).await?;
        Ok(())
    }

    fn n_parties(&self) -> usize {
        self.inboxes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct TestMsg {
        from: PartyId,
        tag: u8,
    }

    impl Envelope for TestMsg {
        fn sender(&self) -> PartyId {
            self.from
        }

        fn kind(&self) -> &'static str {
            "TEST"
        }
    }

    fn instant_net(
        omission: Option<OmissionPolicy>,
    ) -> (SimNetwork<TestMsg>, Vec<UnboundedReceiver<Vec<u8>>>) {
        SimNetwork::new(
            3,
            DelayModel::Fixed(Duration::ZERO),
            omission,
            SharedRng::seeded(0),
        )
    }

    #[tokio::test]
    async fn send_reaches_only_the_recipient() {
        let (net, mut rxs) = instant_net(None);
        net.send(2, TestMsg { from: 1, tag: 9 }).await.unwrap();

        let frame = rxs[1].recv().await.unwrap();
        let msg: TestMsg = bincode::deserialize(&frame).unwrap();
        assert_eq!(msg, TestMsg { from: 1, tag: 9 });
        assert!(rxs[0].try_recv().is_err());
        assert!(rxs[2].try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_includes_the_sender() {
        let (net, mut rxs) = instant_net(None);
        net.broadcast(TestMsg { from: 1, tag: 3 }).await.unwrap();
        for rx in rxs.iter_mut() {
            assert!(rx.recv().await.is_some());
        }
        assert_eq!(net.metrics().messages_sent(), 3);
    }

    #[tokio::test]
    async fn drop_all_severs_both_directions() {
        let (net, mut rxs) = instant_net(Some(OmissionPolicy::DropAll { party: 2 }));
        net.send(2, TestMsg { from: 1, tag: 0 }).await.unwrap();
        net.send(3, TestMsg { from: 2, tag: 0 }).await.unwrap();
        net.send(3, TestMsg { from: 1, tag: 0 }).await.unwrap();

        assert!(rxs[2].recv().await.is_some());
        assert!(rxs[1].try_recv().is_err());
        assert_eq!(net.metrics().messages_dropped(), 2);
    }

    #[tokio::test]
    async fn drop_kinds_filters_by_wire_kind() {
        let (net, mut rxs) = instant_net(Some(OmissionPolicy::DropKinds {
            party: 1,
            kinds: vec!["TEST".to_string()],
        }));
        net.send(2, TestMsg { from: 1, tag: 0 }).await.unwrap();
        assert!(rxs[1].try_recv().is_err());
    }

    #[tokio::test]
    async fn delayed_frames_still_arrive() {
        let (net, mut rxs) = SimNetwork::new(
            2,
            DelayModel::Uniform {
                lo: Duration::from_millis(1),
                hi: Duration::from_millis(5),
            },
            None,
            SharedRng::seeded(4),
        );
        net.send(2, TestMsg { from: 1, tag: 1 }).await.unwrap();
        assert!(rxs[1].recv().await.is_some());
    }
}
