//! Bit decomposition of a shared value using preprocessed random bit
//! sharings: open `y = x + r` (wrap-free, both well below the modulus),
//! then recover the bits of `x = y - r` with a ripple-borrow subtraction
//! against the shared bits of `r`. Two multiplications per bit.

use crate::arith::Arithmetic;
use crate::circuit::CircuitError;
use crate::message::{Message, SessionId};
use ark_ff::{One, Zero};
use sealbid_common::field::to_u128;
use sealbid_common::{Fq, Share};
use sealbid_network::Network;
use std::sync::Arc;

/// Decomposes `[x]` (with `x < 2^k`, `k = random_bits.len()`) into shared
/// bits `[b_0]..[b_{k-1}]`, least significant first. `random_bits` are the
/// preprocessed shared bits of the mask, consumed positionally so that all
/// parties pair the same sharing with the same bit index.
pub async fn decompose<N: Network<Msg = Message> + 'static>(
    arith: &Arithmetic,
    value_share: Share,
    random_bits: &[Share],
    session_id: SessionId,
    net: Arc<N>,
) -> Result<Vec<Share>, CircuitError> {
    let num_bits = random_bits.len();

    // [r] = sum_i [r_i] * 2^i
    let mut mask_share = Share::new(Fq::zero(), arith.id, arith.f);
    for (i, bit) in random_bits.iter().enumerate() {
        mask_share = (mask_share + *bit * Fq::from(1u64 << i))?;
    }

    // Open y = x + r. With x, r < 2^{k+1} << p there is no field wrap, so
    // the integer bits of y are meaningful.
    let masked = (value_share + mask_share)?;
    let masked_value = arith
        .open(masked, session_id.child("mask"), Arc::clone(&net))
        .await?;
    let masked_int = to_u128(masked_value);
    let public_bits: Vec<u8> = (0..=num_bits)
        .map(|i| ((masked_int >> i) & 1) as u8)
        .collect();

    bit_subtraction(arith, &public_bits, random_bits, session_id, net).await
}

/// Shared bits of `public - shared`, ripple-borrow, least significant first.
/// The public value may carry one extra bit; the borrow out of the top
/// shared bit is discarded, which is exact because the difference fits in
/// `shared_bits.len()` bits.
async fn bit_subtraction<N: Network<Msg = Message> + 'static>(
    arith: &Arithmetic,
    public_bits: &[u8],
    shared_bits: &[Share],
    session_id: SessionId,
    net: Arc<N>,
) -> Result<Vec<Share>, CircuitError> {
    let mut borrow = Share::new(Fq::zero(), arith.id, arith.f);
    let mut result = Vec::with_capacity(shared_bits.len());

    for (i, shared_bit) in shared_bits.iter().enumerate() {
        let public_bit = public_bits[i];

        // XOR with the public bit is local: y ^ r = r when y = 0, 1 - r
        // when y = 1.
        let xored = if public_bit == 0 {
            *shared_bit
        } else {
            Share::from_scalar_sub(Fq::one(), shared_bit)
        };

        // Both multiplications of this bit position depend only on the
        // incoming borrow, so they run as one round.
        let (xored_times_borrow, bit_times_borrow) = futures::try_join!(
            arith.multiply(
                xored,
                borrow,
                session_id.child(format!("xor-{i}")),
                Arc::clone(&net),
            ),
            arith.multiply(
                *shared_bit,
                borrow,
                session_id.child(format!("borrow-{i}")),
                Arc::clone(&net),
            ),
        )?;

        // result bit: xored XOR borrow = xored + borrow - 2*xored*borrow
        let result_bit =
            ((xored + borrow)? - xored_times_borrow * Fq::from(2u64))?;
        result.push(result_bit);

        // next borrow: r_i*borrow + (1 - y_i) * (r_i XOR borrow)
        let bit_xor_borrow =
            ((*shared_bit + borrow)? - bit_times_borrow * Fq::from(2u64))?;
        borrow = (bit_times_borrow + bit_xor_borrow * Fq::from((1 - public_bit) as u64))?;
    }

    Ok(result)
}
