// Copyright 2019-2024 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_bitfield::BitField;
use fvm_ipld_encoding::strict_bytes;
use fvm_ipld_encoding::tuple::*;

use crate::payload::Payload;

/// An aggregate signature from a strong quorum of participants over a single
/// payload.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct QuorumSignature {
    /// Indexes in the base power table of the signers (`bitset`)
    pub signers: BitField,
    /// Aggregate signature of the signers
    #[serde(with = "strict_bytes")]
    pub signature: Vec<u8>,
}

/// Represents a justification for a message in the GPBFT consensus protocol:
/// evidence that a strong quorum of participants signed the vote.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct Justification {
    /// The payload that is signed by the quorum
    pub vote: Payload,
    /// The quorum's aggregate signature over the vote
    pub signature: QuorumSignature,
}
