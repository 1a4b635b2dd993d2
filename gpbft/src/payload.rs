use fvm_ipld_encoding::tuple::*;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::Display;

use crate::chain::ECChain;

/// Domain separation tag prefixed to every signature payload.
pub const DOMAIN_SEPARATION_TAG: &str = "GPBFT";

/// Represents the different phases of the GPBFT consensus protocol
#[repr(u8)]
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Phase {
    /// This phase marks the beginning of a new consensus instance, before
    /// the participant has started.
    Initial,
    /// Initial phase for quality assessment
    Quality,
    /// Phase for convergence of opinions
    Converge,
    /// Preparation phase before commitment
    Prepare,
    /// Commitment phase of the consensus
    Commit,
    /// Decision-making phase
    Decide,
    /// Final phase indicating termination of the consensus instance
    Terminated,
}

impl TryFrom<u8> for Phase {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Phase::Initial),
            1 => Ok(Phase::Quality),
            2 => Ok(Phase::Converge),
            3 => Ok(Phase::Prepare),
            4 => Ok(Phase::Commit),
            5 => Ok(Phase::Decide),
            6 => Ok(Phase::Terminated),
            other => Err(other),
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Phase::try_from(value).map_err(|v| D::Error::custom(format!("invalid phase {}", v)))
    }
}

/// Fields of the message that make up the signature payload in the GPBFT
/// consensus protocol
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct Payload {
    /// GPBFT instance (epoch) number
    pub instance: u64,
    /// GPBFT round number
    pub round: u64,
    /// Current phase of the GPBFT protocol
    pub phase: Phase,
    /// The chain voted for in this instance; bottom votes against deciding
    pub value: ECChain,
}

impl Payload {
    pub fn new(instance: u64, round: u64, phase: Phase, value: ECChain) -> Self {
        Payload {
            instance,
            round,
            phase,
            value,
        }
    }

    /// Serializes the payload for signing.
    ///
    /// Format: `GPBFT` ‖ instance (BE) ‖ round (BE) ‖ step name (ASCII),
    /// then for each tipset epoch (BE) ‖ CID bytes ‖ weight (BE). The output
    /// is byte-identical across implementations so that signatures remain
    /// compatible.
    pub fn serialize_for_signing(&self) -> Vec<u8> {
        let step = self.phase.to_string();

        // Pre-calculate buffer size for efficiency
        let mut estimated_size = DOMAIN_SEPARATION_TAG.len() + 8 + 8 + step.len();
        for ts in self.value.iter() {
            estimated_size += 8 + ts.cid.len() + 8;
        }

        let mut buf = Vec::with_capacity(estimated_size);
        buf.extend_from_slice(DOMAIN_SEPARATION_TAG.as_bytes());
        buf.extend_from_slice(&self.instance.to_be_bytes());
        buf.extend_from_slice(&self.round.to_be_bytes());
        buf.extend_from_slice(step.as_bytes());
        for ts in self.value.iter() {
            buf.extend_from_slice(&ts.epoch.to_be_bytes());
            buf.extend_from_slice(&ts.cid);
            buf.extend_from_slice(&ts.weight.to_be_bytes());
        }
        buf
    }
}
