// Copyright 2019-2024 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

use crate::payload::Phase;
use crate::types::ActorId;

#[derive(Error, Debug, PartialEq)]
pub enum GraniteError {
    #[error("chain too long: {len} > {max_len}")]
    ChainTooLong { max_len: usize, len: usize },

    #[error("chain must have increasing epochs {current} <= {last}")]
    Epochs { current: i64, last: i64 },

    #[error("zero-valued chain")]
    ChainEmpty,

    #[error("tipset CID is empty")]
    CidEmpty,

    #[error("tipset CID is too long: {len} > {max_len}")]
    CidTooLong { len: usize, max_len: usize },

    #[error("power entry for participant {id} has non-positive power")]
    NonPositivePower { id: ActorId },

    #[error("duplicate power entry for participant {id}")]
    DuplicatePowerEntry { id: ActorId },

    #[error("input chain must not be empty")]
    EmptyInput,

    #[error("instance already started")]
    AlreadyStarted,

    #[error("message received after termination")]
    ReceivedAfterTermination,

    #[error("message received while the inbox is still draining")]
    InboxNotDrained,

    #[error("unexpected phase {0}")]
    UnexpectedPhase(Phase),

    #[error("no prior-round evidence to justify CONVERGE at round {round}")]
    MissingConvergeEvidence { round: u64 },

    #[error("no proposals with tickets at CONVERGE")]
    NoConvergeValue,

    #[error("no strong quorum of {phase} signatures at round {round}")]
    NoStrongQuorum { phase: Phase, round: u64 },

    #[error("signature aggregation failed: {0}")]
    Aggregation(String),
}
