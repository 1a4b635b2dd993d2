// Copyright 2019-2024 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt::{self, Display};

use fvm_ipld_encoding::strict_bytes;
use fvm_ipld_encoding::tuple::*;

use crate::justification::Justification;
use crate::payload::Payload;
use crate::types::{ActorId, Ticket};

/// A GossiPBFT protocol message.
///
/// Messages are self-attesting: the signature covers the vote payload and
/// binds the sender through their public key, the ticket is a VRF output
/// also bound to the sender's key, and the justification is present exactly
/// for the steps that require one.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct GMessage {
    /// ID of the sender/signer of this message
    pub sender: ActorId,
    /// The payload the sender votes for
    pub vote: Payload,
    /// VRF ticket for CONVERGE messages (otherwise empty)
    #[serde(with = "strict_bytes")]
    pub ticket: Ticket,
    /// Signature by the sender's key over the vote payload
    #[serde(with = "strict_bytes")]
    pub signature: Vec<u8>,
    /// Evidence that a prior strong quorum justifies the vote
    pub justification: Option<Justification>,
}

impl GMessage {
    /// Encodes the message in its canonical wire form.
    pub fn marshal_cbor(&self) -> Result<Vec<u8>, fvm_ipld_encoding::Error> {
        fvm_ipld_encoding::to_vec(self)
    }

    /// Decodes a message from its canonical wire form.
    pub fn unmarshal_cbor(bytes: &[u8]) -> Result<Self, fvm_ipld_encoding::Error> {
        fvm_ipld_encoding::from_slice(bytes)
    }
}

impl Display for GMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{{}}}({} {})",
            self.vote.phase, self.vote.instance, self.vote.round, self.vote.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ECChain, Tipset};
    use crate::justification::QuorumSignature;
    use crate::payload::Phase;
    use fvm_ipld_bitfield::BitField;

    fn test_chain() -> ECChain {
        ECChain::new_unvalidated(vec![
            Tipset {
                epoch: 0,
                cid: b"base".to_vec(),
                weight: 0,
            },
            Tipset {
                epoch: 1,
                cid: b"head".to_vec(),
                weight: 1,
            },
        ])
    }

    fn test_justification() -> Justification {
        let mut signers = BitField::new();
        signers.set(0);
        signers.set(2);
        Justification {
            vote: Payload::new(1, 0, Phase::Prepare, test_chain()),
            signature: QuorumSignature {
                signers,
                signature: vec![9, 9, 9],
            },
        }
    }

    #[test]
    fn test_tipset_roundtrip() {
        let ts = Tipset {
            epoch: -1,
            cid: b"genesis".to_vec(),
            weight: 0,
        };
        let bytes = fvm_ipld_encoding::to_vec(&ts).unwrap();
        // A tipset is a fixed 3-element array on the wire.
        assert_eq!(bytes[0], 0x83);
        let decoded: Tipset = fvm_ipld_encoding::from_slice(&bytes).unwrap();
        assert_eq!(decoded, ts);
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = Payload::new(7, 3, Phase::Converge, test_chain());
        let bytes = fvm_ipld_encoding::to_vec(&payload).unwrap();
        // A payload is a fixed 4-element array on the wire.
        assert_eq!(bytes[0], 0x84);
        let decoded: Payload = fvm_ipld_encoding::from_slice(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_justification_roundtrip() {
        let justification = test_justification();
        let bytes = fvm_ipld_encoding::to_vec(&justification).unwrap();
        // Justification and its quorum signature are fixed 2-element arrays.
        assert_eq!(bytes[0], 0x82);
        let decoded: Justification = fvm_ipld_encoding::from_slice(&bytes).unwrap();
        assert_eq!(decoded, justification);
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = GMessage {
            sender: 3,
            vote: Payload::new(1, 2, Phase::Converge, test_chain()),
            ticket: vec![1, 2, 3],
            signature: vec![4, 5, 6],
            justification: Some(test_justification()),
        };
        let bytes = msg.marshal_cbor().unwrap();
        // A message is a fixed 5-element array on the wire.
        assert_eq!(bytes[0], 0x85);
        let decoded = GMessage::unmarshal_cbor(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_message_roundtrip_without_justification() {
        let msg = GMessage {
            sender: 0,
            vote: Payload::new(1, 0, Phase::Quality, test_chain()),
            ticket: Vec::new(),
            signature: vec![7],
            justification: None,
        };
        let decoded = GMessage::unmarshal_cbor(&msg.marshal_cbor().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_message_display() {
        let msg = GMessage {
            sender: 0,
            vote: Payload::new(4, 1, Phase::Commit, ECChain::bottom()),
            ticket: Vec::new(),
            signature: Vec::new(),
            justification: None,
        };
        assert_eq!(format!("{}", msg), "COMMIT{4}(1 丄)");
    }
}
