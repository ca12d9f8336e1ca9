//! Asynchronous MPC evaluation of a sealed second-price auction among four
//! parties, tolerating one crash/omission fault over a network with unbounded
//! message delays.
//!
//! The stack composes, leaves first: reliable broadcast (Bracha), binary
//! agreement (Ben-Or driven by a threshold randomness beacon), agreement on a
//! common set, complete secret sharing with a binding value id, BGW share
//! arithmetic with per-gate degree reduction, and mask-and-open output
//! privacy. The auction circuit itself is a thin client of those primitives.

pub mod acs;
pub mod arith;
pub mod ba;
pub mod beacon;
pub mod circuit;
pub mod css;
pub mod harness;
pub mod message;
pub mod open;
pub mod output;
pub mod party;
pub mod preprocessing;
pub mod rbc;

pub use harness::{run_auction, AuctionConfig, AuctionReport};
pub use message::{Body, Message, SessionId, Vid};
