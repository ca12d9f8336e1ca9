//! Offline-phase material. The random bit sharings consumed by bit
//! decomposition are produced here as an ideal functionality: degree-`f`
//! sharings whose constant term is a uniform bit, dealt to all parties. A
//! production deployment would generate these jointly with beacon + CSS.

use ark_ff::{One, Zero};
use sealbid_common::share::compute_shares;
use sealbid_common::{Fq, Share, ShareError, SharedRng};

/// Generates `count` random bit sharings for `n` parties. The result is
/// per-party: `sharings[p - 1][i]` is party `p`'s share of the `i`-th bit.
pub fn random_bit_sharings(
    n: usize,
    degree: usize,
    count: usize,
    rng: &SharedRng,
) -> Result<Vec<Vec<Share>>, ShareError> {
    let mut per_party: Vec<Vec<Share>> = vec![Vec::with_capacity(count); n];
    for _ in 0..count {
        let bit = if rng.bit() { Fq::one() } else { Fq::zero() };
        let shares = rng.with(|r| compute_shares(bit, n, degree, r))?;
        for (slot, share) in per_party.iter_mut().zip(shares) {
            slot.push(share);
        }
    }
    Ok(per_party)
}
