//! The sealed second-price auction over the ACS-agreed active set of three
//! bids: bit-decompose, compare pairwise, derive the winner and the second
//! price, and reveal each party's output to that party alone. Everything
//! here is additions and multiplications on shares.

use crate::arith::Arithmetic;
use crate::circuit::{bits, compare, CircuitError, BID_BITS};
use crate::message::{Message, SessionId};
use crate::output::OutputPrivacy;
use ark_ff::{One, Zero};
use futures::future::try_join_all;
use itertools::izip;
use sealbid_common::{Fq, Share};
use sealbid_network::{Network, PartyId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

pub struct SecondPriceAuction {
    pub id: PartyId,
    pub n: usize,
    pub f: usize,
    arith: Arc<Arithmetic>,
    output: Arc<OutputPrivacy>,
    /// Preprocessed random bit sharings, `BID_BITS` per active-set slot,
    /// indexed positionally so every party pairs the same sharing with the
    /// same bid and bit.
    random_bits: Vec<Share>,
}

impl SecondPriceAuction {
    pub fn new(
        id: PartyId,
        n: usize,
        f: usize,
        arith: Arc<Arithmetic>,
        output: Arc<OutputPrivacy>,
        random_bits: Vec<Share>,
    ) -> Self {
        SecondPriceAuction {
            id,
            n,
            f,
            arith,
            output,
            random_bits,
        }
    }

    /// Evaluates the auction over the active set. Returns this party's
    /// private output: the second price at the winner, zero elsewhere.
    pub async fn run<N: Network<Msg = Message> + 'static>(
        &self,
        bid_shares: &BTreeMap<PartyId, Share>,
        active_set: &BTreeSet<PartyId>,
        session_id: &SessionId,
        net: Arc<N>,
    ) -> Result<Fq, CircuitError> {
        let parties: Vec<PartyId> = active_set.iter().copied().collect();
        let m = parties.len();
        if self.random_bits.len() < m * BID_BITS {
            return Err(CircuitError::MissingRandomBits);
        }

        // Decompose every active bid; slot `idx` of the preprocessed bits
        // belongs to the `idx`-th active party in index order.
        let decompositions = try_join_all(parties.iter().enumerate().map(|(idx, pid)| {
            let slot = &self.random_bits[idx * BID_BITS..(idx + 1) * BID_BITS];
            let sid = session_id.child(format!("bits-{pid}"));
            let net = Arc::clone(&net);
            async move {
                bits::decompose(&self.arith, bid_shares[pid], slot, sid, net).await
            }
        }))
        .await?;
        // LSB-first from the decomposition; the comparison scans MSB-first.
        let bits_msb: Vec<Vec<Share>> = decompositions
            .into_iter()
            .map(|mut b| {
                b.reverse();
                b
            })
            .collect();

        // Pairwise comparisons; gt[i][j] = [bid_i > bid_j].
        let pair_results = try_join_all(
            (0..m)
                .flat_map(|i| ((i + 1)..m).map(move |j| (i, j)))
                .map(|(i, j)| {
                    let sid = session_id.child(format!("cmp-{}-{}", parties[i], parties[j]));
                    let net = Arc::clone(&net);
                    let a = &bits_msb[i];
                    let b = &bits_msb[j];
                    async move {
                        let gt = compare::greater_than(&self.arith, a, b, sid, net).await?;
                        Ok::<_, CircuitError>((i, j, gt))
                    }
                }),
        )
        .await?;
        // Full matrix; the loop fills every off-diagonal cell and the
        // diagonal is never read.
        let mut matrix: Vec<Vec<Share>> =
            vec![vec![Share::new(Fq::zero(), self.id, self.f); m]; m];
        for (i, j, value) in pair_results {
            matrix[j][i] = Share::from_scalar_sub(Fq::one(), &value);
            matrix[i][j] = value;
        }
        let gt = |i: usize, j: usize| matrix[i][j];

        // The winner beats everyone, the minimum beats no one. For an
        // active set of three the second place is whoever is neither.
        let others = |i: usize| {
            let mut rest = (0..m).filter(move |j| *j != i);
            let first = rest.next();
            let second = rest.next();
            (first.unwrap_or(i), second.unwrap_or(i))
        };
        let is_max = try_join_all((0..m).map(|i| {
            let (j, k) = others(i);
            self.arith.multiply(
                gt(i, j),
                gt(i, k),
                session_id.child(format!("max-{}", parties[i])),
                Arc::clone(&net),
            )
        }))
        .await?;
        let is_min = try_join_all((0..m).map(|i| {
            let (j, k) = others(i);
            self.arith.multiply(
                gt(j, i),
                gt(k, i),
                session_id.child(format!("min-{}", parties[i])),
                Arc::clone(&net),
            )
        }))
        .await?;

        // is_second = 1 - is_max - is_min, local for |active| = 3.
        let is_second: Vec<Share> = izip!(&is_max, &is_min)
            .map(|(max_i, min_i)| (Share::from_scalar_sub(Fq::one(), max_i) - *min_i))
            .collect::<Result<_, _>>()?;

        // [second_price] = sum_i [bid_i] * [is_second_i]
        let price_terms = try_join_all((0..m).map(|i| {
            self.arith.multiply(
                bid_shares[&parties[i]],
                is_second[i],
                session_id.child(format!("price-{}", parties[i])),
                Arc::clone(&net),
            )
        }))
        .await?;
        let mut second_price = Share::new(Fq::zero(), self.id, self.f);
        for term in price_terms {
            second_price = (second_price + term)?;
        }

        // Each active party's output: the second price if it won, else zero.
        let outputs = try_join_all((0..m).map(|i| {
            self.arith.multiply(
                is_max[i],
                second_price,
                session_id.child(format!("out-{}", parties[i])),
                Arc::clone(&net),
            )
        }))
        .await?;

        // Reveal o_i to party i alone; everyone participates in every
        // owner's masking, owners alone unmask.
        let revealed = try_join_all(parties.iter().zip(outputs).map(|(owner, output_share)| {
            self.output.reveal_to_owner(
                output_share,
                *owner,
                session_id.child(format!("output-{owner}")),
                Arc::clone(&net),
            )
        }))
        .await?;

        let mut my_output = Fq::zero();
        for (owner, value) in parties.iter().zip(revealed) {
            if *owner == self.id {
                if let Some(value) = value {
                    my_output = value;
                }
            }
        }
        info!(id = self.id, output = %my_output, "auction circuit finished");
        Ok(my_output)
    }
}
