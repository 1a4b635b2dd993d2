// Copyright 2019-2024 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt::Display;

use crate::message::GMessage;
use crate::payload::Phase;
use crate::types::{ActorId, PubKey, Ticket};

/// Endpoint through which a participant reaches its peers.
pub trait Network {
    /// Sends a message to all other participants. The message's sender must
    /// be one the network can attribute to this participant.
    fn broadcast(&self, msg: &GMessage);
}

/// Network time and alarm delivery.
pub trait Clock {
    /// Returns the current network time.
    fn time(&self) -> f64;

    /// Sets an alarm for `sender` to be delivered at the given timestamp.
    fn set_alarm(&self, sender: ActorId, payload: Phase, at: f64);
}

/// Signs payloads on behalf of a participant.
pub trait Signer {
    /// Signs a message for the given sender ID.
    fn sign(&self, sender: ActorId, msg: &[u8]) -> Vec<u8>;
}

/// Verifier trait for signature verification in the GPBFT consensus protocol
pub trait Verifier {
    /// Error type. Once there is a concrete implementation of the `Verifier`
    /// trait, this might just be a concrete error type.
    type Error: Display;

    /// Verifies a signature for the given public key
    ///
    /// This method must be safe for concurrent use.
    ///
    /// # Arguments
    /// * `pub_key` - The public key to verify against
    /// * `msg` - The message that was signed
    /// * `sig` - The signature to verify
    ///
    /// # Returns
    /// A Result indicating success or failure with an error message
    fn verify(&self, pub_key: &PubKey, msg: &[u8], sig: &[u8]) -> Result<(), Self::Error>;

    /// Aggregates signatures from participants
    ///
    /// # Arguments
    /// * `pub_keys` - The public keys of the signers
    /// * `sigs` - The signatures to aggregate
    ///
    /// # Returns
    /// A Result containing the aggregated signature
    fn aggregate(&self, pub_keys: &[PubKey], sigs: &[Vec<u8>]) -> Result<Vec<u8>, Self::Error>;

    /// Verifies an aggregate signature
    ///
    /// This method must be safe for concurrent use.
    ///
    /// # Arguments
    /// * `payload` - The payload that was signed
    /// * `agg_sig` - The aggregate signature to verify
    /// * `signers` - The public keys of the signers
    ///
    /// # Returns
    /// A Result indicating success or failure with an error message
    fn verify_aggregate(
        &self,
        payload: &[u8],
        agg_sig: &[u8],
        signers: &[PubKey],
    ) -> Result<(), Self::Error>;
}

/// Source and verifier of the VRF tickets used to rank CONVERGE proposals.
/// Ticket construction and verification are opaque to the protocol.
pub trait Vrf {
    /// Produces a ticket for this participant in the given round.
    fn make_ticket(&self, beacon: &[u8], instance: u64, round: u64, sender: ActorId) -> Ticket;

    /// Verifies a ticket against the sender's public key.
    fn verify_ticket(
        &self,
        beacon: &[u8],
        instance: u64,
        round: u64,
        pub_key: &PubKey,
        ticket: &Ticket,
    ) -> bool;
}

/// Participant interface to the host system resources.
pub trait Host: Network + Clock + Signer + Verifier {}

impl<T: Network + Clock + Signer + Verifier> Host for T {}
