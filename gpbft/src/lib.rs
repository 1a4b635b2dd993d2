// Copyright 2019-2024 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Granite (GossiPBFT) single-instance consensus core.
//!
//! This crate provides the core structures and logic for one instance of the
//! Granite consensus protocol, including:
//! - Chain and tipset structures for external-chain state representation
//! - Power table management for participant voting power tracking
//! - Consensus phases, payloads, and the canonical wire encoding
//! - Justification synthesis and verification mechanisms
//! - The per-instance protocol state machine
//!
//! Key components:
//! - [`ECChain`]: Represents a chain of tipsets
//! - [`PowerTable`]: Manages participant voting power
//! - [`QuorumTracker`]: Incrementally accumulates weighted votes
//! - [`Justification`]: Holds a strong quorum's aggregate signature
//! - [`Instance`]: Drives one instance to an irrevocable decision
//!
//! The host platform (network, clock, signing, VRF) is consumed through the
//! narrow capability traits in [`api`]; the core itself never blocks, spawns,
//! or persists.

pub mod api;
pub mod chain;
mod converge;
mod error;
mod instance;
mod justification;
mod message;
mod payload;
mod powertable;
mod quorum;
pub mod test_utils;
mod types;

pub use chain::{Cid, ECChain, Tipset};
pub use converge::ConvergeTracker;
pub use error::GraniteError;
pub use instance::{GraniteConfig, Instance};
pub use justification::{Justification, QuorumSignature};
pub use message::GMessage;
pub use payload::{Payload, Phase, DOMAIN_SEPARATION_TAG};
pub use powertable::{PowerEntries, PowerEntry, PowerTable};
pub use quorum::{QuorumEvidence, QuorumTracker};
pub use types::{ActorId, PubKey, StoragePower, Ticket};

// re-exports
pub use fvm_ipld_bitfield::BitField;
pub use num_bigint::{BigInt, Sign};
pub use num_traits::Zero;
