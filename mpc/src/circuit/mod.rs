//! The auction circuit: a thin client of the MPC primitives that only ever
//! adds and multiplies shares.

pub mod auction;
pub mod bits;
pub mod compare;

use crate::arith::MulError;
use crate::output::OutputError;
use sealbid_common::ShareError;
use thiserror::Error;

/// Bids live in `[0, 32)`.
pub const BID_BITS: usize = 5;

#[derive(Error, Debug)]
pub enum CircuitError {
    #[error(transparent)]
    Mul(#[from] MulError),
    #[error(transparent)]
    Share(#[from] ShareError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("not enough preprocessed random bit sharings")]
    MissingRandomBits,
}
