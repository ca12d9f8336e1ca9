//! Wire vocabulary: hierarchical session ids, the binding value id of a
//! finalized sharing, and the closed message enum shared by every protocol.

use sealbid_common::field::fq_bytes;
use sealbid_common::Fq;
use sealbid_network::{Envelope, PartyId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Wire kind names, used for dispatch, metrics and type-selective omission.
pub mod kinds {
    pub const CSS_SHARE: &str = "CSS_SHARE";
    pub const CSS_ECHO: &str = "CSS_ECHO";
    pub const CSS_READY: &str = "CSS_READY";
    pub const RBC_INIT: &str = "RBC_INIT";
    pub const RBC_ECHO: &str = "RBC_ECHO";
    pub const RBC_READY: &str = "RBC_READY";
    pub const BA_VOTE: &str = "BA_VOTE";
    pub const BA_DECIDE: &str = "BA_DECIDE";
    pub const BEACON_REQUEST: &str = "BEACON_REQUEST";
    pub const BEACON_VALUE: &str = "BEACON_VALUE";
    pub const MPC_OPEN: &str = "MPC_OPEN";
    pub const MUL_RESHARE: &str = "MUL_RESHARE";
    pub const MASK_SHARE: &str = "MASK_SHARE";
}

/// Hierarchical identifier locating one protocol instance within a party,
/// e.g. `auction/mul-17/acs/ba-3`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn root(label: impl Into<String>) -> Self {
        SessionId(label.into())
    }

    pub fn child(&self, segment: impl fmt::Display) -> Self {
        SessionId(format!("{}/{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// 256-bit digest binding a finalized CSS polynomial. Hashing the canonical
/// evaluations at every party index makes the digest independent of which
/// echo subset a party happened to finalize from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vid([u8; 32]);

impl Vid {
    pub fn digest(session_id: &SessionId, defining_points: &[(PartyId, Fq)]) -> Self {
        use ark_ff::PrimeField;
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_str().as_bytes());
        for (point, value) in defining_points {
            hasher.update((*point as u64).to_be_bytes());
            for limb in value.into_bigint().0 {
                hasher.update(limb.to_be_bytes());
            }
        }
        Vid(hasher.finalize().into())
    }
}

impl fmt::Debug for Vid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vid(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// The closed set of protocol messages. Field elements travel in the fixed
/// 16-byte compressed encoding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Body {
    CssShare {
        #[serde(with = "fq_bytes")]
        value: Fq,
    },
    CssEcho {
        point: PartyId,
        #[serde(with = "fq_bytes")]
        value: Fq,
    },
    CssReady {
        vid: Vid,
    },
    RbcInit {
        origin: PartyId,
        proposal: Option<Vid>,
    },
    RbcEcho {
        origin: PartyId,
        proposal: Option<Vid>,
    },
    RbcReady {
        origin: PartyId,
        proposal: Option<Vid>,
    },
    BaVote {
        round: u32,
        value: bool,
    },
    BaDecide {
        value: bool,
    },
    BeaconRequest {
        round: u32,
    },
    BeaconValue {
        round: u32,
        #[serde(with = "fq_bytes")]
        value: Fq,
    },
    MpcOpen {
        #[serde(with = "fq_bytes")]
        share: Fq,
    },
    /// Dealer share of a multiplication reshare session; handled by the same
    /// echo/ready machinery as `CssShare`.
    MulReshare {
        #[serde(with = "fq_bytes")]
        value: Fq,
    },
    MaskShare {
        point: PartyId,
        #[serde(with = "fq_bytes")]
        value: Fq,
    },
}

impl Body {
    pub fn kind(&self) -> &'static str {
        match self {
            Body::CssShare { .. } => kinds::CSS_SHARE,
            Body::CssEcho { .. } => kinds::CSS_ECHO,
            Body::CssReady { .. } => kinds::CSS_READY,
            Body::RbcInit { .. } => kinds::RBC_INIT,
            Body::RbcEcho { .. } => kinds::RBC_ECHO,
            Body::RbcReady { .. } => kinds::RBC_READY,
            Body::BaVote { .. } => kinds::BA_VOTE,
            Body::BaDecide { .. } => kinds::BA_DECIDE,
            Body::BeaconRequest { .. } => kinds::BEACON_REQUEST,
            Body::BeaconValue { .. } => kinds::BEACON_VALUE,
            Body::MpcOpen { .. } => kinds::MPC_OPEN,
            Body::MulReshare { .. } => kinds::MUL_RESHARE,
            Body::MaskShare { .. } => kinds::MASK_SHARE,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub sender: PartyId,
    pub session_id: SessionId,
    pub body: Body,
}

impl Message {
    pub fn new(sender: PartyId, session_id: SessionId, body: Body) -> Self {
        Message {
            sender,
            session_id,
            body,
        }
    }
}

impl Envelope for Message {
    fn sender(&self) -> PartyId {
        self.sender
    }

    fn kind(&self) -> &'static str {
        self.body.kind()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_ids_nest() {
        let sid = SessionId::root("auction").child("mul-17").child("acs");
        assert_eq!(sid.as_str(), "auction/mul-17/acs");
        assert_eq!(sid.child("ba-3").as_str(), "auction/mul-17/acs/ba-3");
    }

    #[test]
    fn vid_depends_on_points_and_session() {
        let sid = SessionId::root("auction").child("input-1");
        let points: Vec<(usize, Fq)> = (1..=4).map(|i| (i, Fq::from(i as u64 * 3))).collect();
        let same = Vid::digest(&sid, &points);
        assert_eq!(Vid::digest(&sid, &points), same);

        let mut other_points = points.clone();
        other_points[2].1 += Fq::from(1u64);
        assert_ne!(Vid::digest(&sid, &other_points), same);
        assert_ne!(Vid::digest(&SessionId::root("auction/input-2"), &points), same);
    }

    #[test]
    fn messages_round_trip_through_the_wire_encoding() {
        let msg = Message::new(
            2,
            SessionId::root("auction").child("input-2"),
            Body::CssEcho {
                point: 2,
                value: Fq::from(77u64),
            },
        );
        let frame = bincode::serialize(&msg).unwrap();
        let back: Message = bincode::deserialize(&frame).unwrap();
        assert_eq!(back.sender, 2);
        assert_eq!(back.session_id, msg.session_id);
        match back.body {
            Body::CssEcho { point, value } => {
                assert_eq!(point, 2);
                assert_eq!(value, Fq::from(77u64));
            }
            other => panic!("unexpected body {other:?}"),
        }
    }
}
