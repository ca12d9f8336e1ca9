//! Share arithmetic. Addition, subtraction and scalar multiplication are
//! local; multiplication is BGW with degree reduction: the pointwise product
//! of two degree-`f` sharings lies on a degree-`2f` polynomial, so each party
//! reshares its product point through CSS and the parties agree (per gate,
//! via a dedicated ACS over the reshare vids) on an interpolation set `T` of
//! `n - f = 2f + 1` dealers whose fresh sharings are Lagrange-recombined at
//! zero back into a degree-`f` sharing of the product.

use crate::acs::{AcsError, CommonSubset};
use crate::css::{Css, CssError, DealKind};
use crate::message::{Message, SessionId};
use crate::open::{OpenError, Opens};
use sealbid_common::poly::lagrange_coefficients_at_zero;
use sealbid_common::{FieldError, Fq, Share, ShareError};
use sealbid_network::{Network, PartyId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MulError {
    #[error(transparent)]
    Css(#[from] CssError),
    #[error(transparent)]
    Acs(#[from] AcsError),
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Share(#[from] ShareError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("the agreed interpolation set is empty")]
    EmptyInterpolationSet,
}

pub struct Arithmetic {
    pub id: PartyId,
    pub n: usize,
    pub f: usize,
    css: Arc<Css>,
    acs: Arc<CommonSubset>,
    opens: Arc<Opens>,
    gates: AtomicU64,
}

impl Arithmetic {
    pub fn new(
        id: PartyId,
        n: usize,
        f: usize,
        css: Arc<Css>,
        acs: Arc<CommonSubset>,
        opens: Arc<Opens>,
    ) -> Self {
        Arithmetic {
            id,
            n,
            f,
            css,
            acs,
            opens,
            gates: AtomicU64::new(0),
        }
    }

    pub fn add(a: Share, b: Share) -> Result<Share, ShareError> {
        a + b
    }

    pub fn sub(a: Share, b: Share) -> Result<Share, ShareError> {
        a - b
    }

    pub fn scalar_mul(scalar: Fq, a: Share) -> Share {
        a * scalar
    }

    /// Number of multiplication gates this party has evaluated.
    pub fn gates_evaluated(&self) -> u64 {
        self.gates.load(Ordering::Relaxed)
    }

    /// `[a] × [b] → [c]` under `session_id`. One ACS and `n` CSS reshares
    /// per gate; everything after the reshares finalize is local.
    pub async fn multiply<N: Network<Msg = Message> + 'static>(
        &self,
        a: Share,
        b: Share,
        session_id: SessionId,
        net: Arc<N>,
    ) -> Result<Share, MulError> {
        self.gates.fetch_add(1, Ordering::Relaxed);

        // Local product point; the tuple (d_1..d_n) lies on a degree-2f
        // polynomial with constant term a*b.
        let product = a.local_mul(&b)?;

        let own_reshare = session_id.child(format!("reshare-{}", self.id));
        self.css
            .share(own_reshare.clone(), product.value, DealKind::Reshare, &net)
            .await?;
        let (own_vid, _) = self.css.wait_finalized(&own_reshare).await?;

        let interpolation_set = self
            .acs
            .run(&session_id.child("acs"), Some(own_vid), Arc::clone(&net))
            .await?;
        debug!(id = self.id, session_id = %session_id, set = ?interpolation_set, "interpolation set agreed");

        let x_values: Vec<Fq> = interpolation_set
            .iter()
            .map(|k| Fq::from(*k as u64))
            .collect();
        let lambdas = lagrange_coefficients_at_zero(&x_values)?;

        let mut combined: Option<Share> = None;
        for (dealer, lambda) in interpolation_set.iter().zip(lambdas) {
            let reshare_sid = session_id.child(format!("reshare-{dealer}"));
            let (_, dealer_share) = self.css.wait_finalized(&reshare_sid).await?;
            let term = dealer_share * lambda;
            combined = Some(match combined {
                None => term,
                Some(acc) => (acc + term)?,
            });
        }
        combined.ok_or(MulError::EmptyInterpolationSet)
    }

    /// Publicly opens `[a]`; every party reconstructs the same scalar from
    /// any `f + 1` broadcast shares.
    pub async fn open<N: Network<Msg = Message>>(
        &self,
        share: Share,
        session_id: SessionId,
        net: Arc<N>,
    ) -> Result<Fq, MulError> {
        Ok(self.opens.open(session_id.child("open"), share, net).await?)
    }
}
