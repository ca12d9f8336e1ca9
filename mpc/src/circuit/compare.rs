//! Greater-than on secret-shared bit vectors: an MSB-to-LSB prefix scan.
//! At each position, `[gt_i] = a_i AND NOT b_i` wins the comparison if all
//! higher positions were equal; `[eq_i]` extends the equality prefix.
//! Three multiplications per bit.

use crate::arith::Arithmetic;
use crate::circuit::CircuitError;
use crate::message::{Message, SessionId};
use ark_ff::{One, Zero};
use sealbid_common::{Fq, Share};
use sealbid_network::Network;
use std::sync::Arc;

/// Computes `[a > b]` from most-significant-first bit sharings.
pub async fn greater_than<N: Network<Msg = Message> + 'static>(
    arith: &Arithmetic,
    bits_a: &[Share],
    bits_b: &[Share],
    session_id: SessionId,
    net: Arc<N>,
) -> Result<Share, CircuitError> {
    debug_assert_eq!(bits_a.len(), bits_b.len());

    let mut prefix_eq = Share::new(Fq::one(), arith.id, arith.f);
    let mut result = Share::new(Fq::zero(), arith.id, arith.f);

    for (i, (bit_a, bit_b)) in bits_a.iter().zip(bits_b).enumerate() {
        let a_and_b = arith
            .multiply(
                *bit_a,
                *bit_b,
                session_id.child(format!("and-{i}")),
                Arc::clone(&net),
            )
            .await?;

        // [gt_i] = a_i - a_i*b_i = a_i AND NOT b_i
        let gt = (*bit_a - a_and_b)?;
        // [eq_i] = 1 - a_i - b_i + 2*a_i*b_i  (XNOR)
        let eq = ((Share::from_scalar_sub(Fq::one(), bit_a) - *bit_b)?
            + a_and_b * Fq::from(2u64))?;

        // The winning term and the prefix extension both hang off a_and_b,
        // so they share a round.
        let (winning, next_prefix) = futures::try_join!(
            arith.multiply(
                prefix_eq,
                gt,
                session_id.child(format!("win-{i}")),
                Arc::clone(&net),
            ),
            arith.multiply(
                prefix_eq,
                eq,
                session_id.child(format!("eq-{i}")),
                Arc::clone(&net),
            ),
        )?;
        result = (result + winning)?;
        prefix_eq = next_prefix;
    }

    Ok(result)
}
