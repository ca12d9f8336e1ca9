//! The auction field `F_p` for the Mersenne prime `p = 2^127 - 1`.
//!
//! The prime only needs to exceed `2 * 32 * 2^5` for the bit-decomposition
//! open to stay wrap-free; the large modulus buys the security margin of the
//! output masks. `43` is a primitive root of `p`.

use ark_ff::fields::{Fp128, MontBackend, MontConfig};
use ark_ff::{Field, PrimeField};
use thiserror::Error;

#[derive(MontConfig)]
#[modulus = "170141183460469231731687303715884105727"]
#[generator = "43"]
pub struct FqConfig;

pub type Fq = Fp128<MontBackend<FqConfig, 2>>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    #[error("attempted to invert the zero element")]
    DivisionByZero,
}

/// Multiplicative inverse, failing on zero instead of panicking.
pub fn inverse(x: Fq) -> Result<Fq, FieldError> {
    x.inverse().ok_or(FieldError::DivisionByZero)
}

/// Interprets a small field element (bids, prices, bits) as an integer.
pub fn to_u128(x: Fq) -> u128 {
    let limbs = x.into_bigint().0;
    ((limbs[1] as u128) << 64) | limbs[0] as u128
}

/// Serde adapter fixing the wire encoding of a field element to the
/// 16-byte compressed `ark-serialize` form.
pub mod fq_bytes {
    use super::Fq;
    use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
    use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(x: &Fq, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = Vec::with_capacity(16);
        x.serialize_compressed(&mut buf)
            .map_err(S::Error::custom)?;
        serializer.serialize_bytes(&buf)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fq, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        Fq::deserialize_compressed(bytes.as_slice()).map_err(D::Error::custom)
    }
}
