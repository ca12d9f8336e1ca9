//! Degree-tagged Shamir shares. A share is one evaluation of a secret
//! polynomial at a nonzero party index; arithmetic on shares refuses to mix
//! evaluation points or degrees.

use crate::field::{fq_bytes, Fq};
use crate::poly::{evaluate_at_party, interpolate_at_zero, random_with_constant};
use crate::FieldError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::{Add, Mul, Sub};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShareError {
    #[error("not enough shares to reconstruct")]
    InsufficientShares,
    #[error("shares have different degrees")]
    DegreeMismatch,
    #[error("shares belong to different evaluation points")]
    IdMismatch,
    #[error("invalid share input")]
    InvalidInput,
    #[error(transparent)]
    Field(#[from] FieldError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    #[serde(with = "fq_bytes")]
    pub value: Fq,
    /// Evaluation point, equal to the holder's party index.
    pub id: usize,
    pub degree: usize,
}

impl Share {
    pub fn new(value: Fq, id: usize, degree: usize) -> Self {
        Share { value, id, degree }
    }

    /// `scalar - [x]`, used for the NOT gate on shared bits.
    pub fn from_scalar_sub(scalar: Fq, other: &Share) -> Self {
        Share::new(scalar - other.value, other.id, other.degree)
    }

    /// Pointwise product of two sharings held by the same party. The result
    /// lies on a polynomial of summed degree and must be reduced before any
    /// further multiplication.
    pub fn local_mul(&self, other: &Share) -> Result<Share, ShareError> {
        if self.id != other.id {
            return Err(ShareError::IdMismatch);
        }
        Ok(Share::new(
            self.value * other.value,
            self.id,
            self.degree + other.degree,
        ))
    }
}

impl Add for Share {
    type Output = Result<Share, ShareError>;

    fn add(self, other: Share) -> Self::Output {
        if self.degree != other.degree {
            return Err(ShareError::DegreeMismatch);
        }
        if self.id != other.id {
            return Err(ShareError::IdMismatch);
        }
        Ok(Share::new(self.value + other.value, self.id, self.degree))
    }
}

impl Sub for Share {
    type Output = Result<Share, ShareError>;

    fn sub(self, other: Share) -> Self::Output {
        if self.degree != other.degree {
            return Err(ShareError::DegreeMismatch);
        }
        if self.id != other.id {
            return Err(ShareError::IdMismatch);
        }
        Ok(Share::new(self.value - other.value, self.id, self.degree))
    }
}

impl Mul<Fq> for Share {
    type Output = Share;

    fn mul(self, scalar: Fq) -> Share {
        Share::new(self.value * scalar, self.id, self.degree)
    }
}

/// Deals a fresh sharing of `secret` to parties `1..=n`.
pub fn compute_shares(
    secret: Fq,
    n: usize,
    degree: usize,
    rng: &mut impl Rng,
) -> Result<Vec<Share>, ShareError> {
    if n <= degree {
        return Err(ShareError::InvalidInput);
    }
    let poly = random_with_constant(degree, secret, rng);
    Ok((1..=n)
        .map(|id| Share::new(evaluate_at_party(&poly, id), id, degree))
        .collect())
}

/// Reconstructs the secret from any `degree + 1` of the given shares.
pub fn recover_secret(shares: &[Share]) -> Result<Fq, ShareError> {
    let degree = shares.first().ok_or(ShareError::InsufficientShares)?.degree;
    if !shares.iter().all(|s| s.degree == degree) {
        return Err(ShareError::DegreeMismatch);
    }
    if shares.len() < degree + 1 {
        return Err(ShareError::InsufficientShares);
    }
    let mut seen = HashSet::new();
    if !shares.iter().all(|s| s.id != 0 && seen.insert(s.id)) {
        return Err(ShareError::InvalidInput);
    }
    let points: Vec<(Fq, Fq)> = shares[..degree + 1]
        .iter()
        .map(|s| (Fq::from(s.id as u64), s.value))
        .collect();
    Ok(interpolate_at_zero(&points)?)
}
