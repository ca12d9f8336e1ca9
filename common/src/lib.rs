//! Pure kernel shared by every sealbid crate: the auction field, polynomial
//! helpers, Shamir shares and the seedable simulation RNG. Nothing in here
//! performs I/O or holds per-protocol state.

pub mod field;
pub mod poly;
pub mod rng;
pub mod share;

pub use field::{Fq, FieldError};
pub use rng::SharedRng;
pub use share::{Share, ShareError};
