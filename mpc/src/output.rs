//! Output privacy by mask-and-open. For an output owner `i`, every party
//! contributes a fresh uniform mask sharing through CSS; a dedicated ACS
//! over the contribution vids fixes the contributor set (with one omitter a
//! contribution can stall, and the mask must be the same sharing at every
//! party), the agreed contributions are summed locally into `[r_i]`, the
//! masked value `y_i = o_i + r_i` is opened publicly, and the mask shares
//! travel privately to the owner, who alone can unmask. The opened `y_i` is
//! uniform, so non-owners learn nothing.

use crate::acs::{AcsError, CommonSubset};
use crate::css::{Css, CssError, DealKind};
use crate::message::{Message, SessionId};
use crate::open::{OpenError, Opens, PrivateReveals};
use sealbid_common::{Fq, Share, ShareError, SharedRng};
use sealbid_network::{Network, PartyId};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum OutputError {
    #[error(transparent)]
    Css(#[from] CssError),
    #[error(transparent)]
    Acs(#[from] AcsError),
    #[error(transparent)]
    Open(#[from] OpenError),
    #[error(transparent)]
    Share(#[from] ShareError),
    #[error("no mask contribution was agreed on")]
    EmptyMaskSet,
}

pub struct OutputPrivacy {
    pub id: PartyId,
    pub n: usize,
    pub f: usize,
    css: Arc<Css>,
    acs: Arc<CommonSubset>,
    opens: Arc<Opens>,
    reveals: Arc<PrivateReveals>,
    rng: SharedRng,
}

impl OutputPrivacy {
    pub fn new(
        id: PartyId,
        n: usize,
        f: usize,
        css: Arc<Css>,
        acs: Arc<CommonSubset>,
        opens: Arc<Opens>,
        reveals: Arc<PrivateReveals>,
        rng: SharedRng,
    ) -> Self {
        OutputPrivacy {
            id,
            n,
            f,
            css,
            acs,
            opens,
            reveals,
            rng,
        }
    }

    /// Reveals `[output]` to `owner` only. Returns `Some(value)` at the
    /// owner, `None` everywhere else.
    pub async fn reveal_to_owner<N: Network<Msg = Message> + 'static>(
        &self,
        output_share: Share,
        owner: PartyId,
        session_id: SessionId,
        net: Arc<N>,
    ) -> Result<Option<Fq>, OutputError> {
        // Every party deals a fresh uniform mask contribution.
        let contribution = self.rng.fq();
        let own_mask_sid = session_id.child(format!("mask-{}", self.id));
        self.css
            .share(own_mask_sid.clone(), contribution, DealKind::Input, &net)
            .await?;
        let (own_vid, _) = self.css.wait_finalized(&own_mask_sid).await?;

        // Agree on which contributions make up the mask.
        let mask_set = self
            .acs
            .run(&session_id.child("acs"), Some(own_vid), Arc::clone(&net))
            .await?;
        debug!(id = self.id, session_id = %session_id, set = ?mask_set, "mask contributors agreed");

        // [r] = sum of the agreed contributions, locally on shares.
        let mut mask_share: Option<Share> = None;
        for contributor in &mask_set {
            let sid = session_id.child(format!("mask-{contributor}"));
            let (_, share) = self.css.wait_finalized(&sid).await?;
            mask_share = Some(match mask_share {
                None => share,
                Some(acc) => (acc + share)?,
            });
        }
        let mask_share = mask_share.ok_or(OutputError::EmptyMaskSet)?;

        // Open y = output + r publicly; y is uniform.
        let masked = (output_share + mask_share)?;
        let masked_value = self
            .opens
            .open(session_id.child("open"), masked, Arc::clone(&net))
            .await?;

        // Hand the mask to the owner, privately.
        let mask = self
            .reveals
            .reveal_to(session_id.child("unmask"), owner, mask_share, net)
            .await?;
        match mask {
            Some(mask) => {
                info!(id = self.id, session_id = %session_id, "unmasked own output");
                Ok(Some(masked_value - mask))
            }
            None => Ok(None),
        }
    }
}
