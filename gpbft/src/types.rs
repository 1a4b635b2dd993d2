// Copyright 2019-2024 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

/// `ActorId` represents the unique identifier for a protocol participant.
pub type ActorId = u64;

/// `StoragePower` represents the amount of voting power a participant has.
///
/// Power is integer-valued but may exceed 64 bits in the storage-power
/// domain, hence the arbitrary-precision representation.
pub type StoragePower = num_bigint::BigInt;

/// A VRF output used to rank CONVERGE proposals. Tickets are opaque and
/// compared by byte order.
pub type Ticket = Vec<u8>;

/// `PubKey` represents a public key used for message signatures.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PubKey(pub Vec<u8>);

impl PubKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        PubKey(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
