// Copyright 2019-2024 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Single-instance Granite consensus state machine.
//!
//! An instance drives one run of the protocol to an irrevocable decision on
//! a chain prefix. It is strictly single-threaded: all mutation happens
//! inside the four entry points (`start`, `receive`, `receive_alarm`,
//! `receive_acceptable`), each of which drains an internal message inbox to
//! completion before returning. Self-broadcast messages join the same inbox,
//! so a participant's own votes are counted before the entry point returns.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use num_traits::Zero;
use tracing::{debug, trace, warn};

use crate::api::{Host, Vrf};
use crate::chain::{zero_cid, ECChain};
use crate::converge::ConvergeTracker;
use crate::error::GraniteError;
use crate::justification::{Justification, QuorumSignature};
use crate::message::GMessage;
use crate::payload::{Payload, Phase};
use crate::powertable::PowerTable;
use crate::quorum::QuorumTracker;
use crate::types::{ActorId, StoragePower, Ticket};


/// Tuning parameters for partial synchrony.
#[derive(Clone, Debug)]
pub struct GraniteConfig {
    /// Initial delay allowed for messages to propagate.
    pub delta: f64,
    /// Additional delay granted to each round after the first.
    pub delta_rate: f64,
}

/// Per-round message accumulators.
///
/// State from prior rounds is retained for the life of the instance:
/// justifications for later rounds may reference any earlier round.
struct RoundState {
    converged: ConvergeTracker,
    prepared: QuorumTracker,
    committed: QuorumTracker,
}

impl RoundState {
    fn new(power_table: Arc<PowerTable>) -> Self {
        Self {
            converged: ConvergeTracker::new(),
            prepared: QuorumTracker::new(power_table.clone()),
            committed: QuorumTracker::new(power_table),
        }
    }
}

/// A single Granite consensus instance.
pub struct Instance<H: Host, V: Vrf> {
    config: GraniteConfig,
    host: H,
    vrf: V,
    participant_id: ActorId,
    instance_id: u64,
    /// The EC chain input to this instance.
    input: ECChain,
    /// The power table for the base chain, used for power in this instance.
    power_table: Arc<PowerTable>,
    /// The beacon value from the base chain, used for tickets.
    beacon: Vec<u8>,
    /// Current round number.
    round: u64,
    /// Current phase in the round.
    phase: Phase,
    /// Time at which the current phase can or must end. For QUALITY, PREPARE
    /// and COMMIT this is the latest time (the phase can end sooner on
    /// quorum). For CONVERGE it is the exact time, so that late tickets can
    /// still win the min-ticket contest.
    phase_timeout: f64,
    /// This instance's proposal for the current round. Set after the QUALITY
    /// phase and changed only between rounds.
    proposal: ECChain,
    /// The value to be transmitted at the next phase. May diverge from the
    /// proposal between phases.
    value: ECChain,
    /// Queue of messages to be synchronously processed before returning from
    /// a top-level call.
    inbox: VecDeque<GMessage>,
    /// Quality phase state (round 0 only).
    quality: QuorumTracker,
    /// State for each round of phases.
    rounds: HashMap<u64, RoundState>,
    /// The latest EC chain this participant would accept.
    acceptable: ECChain,
    /// Decision state. Collects DECIDE votes until a decision forms,
    /// independently of protocol rounds.
    decision: QuorumTracker,
}

impl<H: Host, V: Vrf> Instance<H, V> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: GraniteConfig,
        host: H,
        vrf: V,
        participant_id: ActorId,
        instance_id: u64,
        input: ECChain,
        power_table: PowerTable,
        beacon: Vec<u8>,
    ) -> Result<Self, GraniteError> {
        if input.is_bottom() {
            return Err(GraniteError::EmptyInput);
        }
        let power_table = Arc::new(power_table);
        let mut rounds = HashMap::new();
        rounds.insert(0, RoundState::new(power_table.clone()));
        Ok(Self {
            config,
            host,
            vrf,
            participant_id,
            instance_id,
            power_table: power_table.clone(),
            beacon,
            round: 0,
            phase: Phase::Initial,
            phase_timeout: 0.0,
            proposal: input.clone(),
            value: ECChain::bottom(),
            inbox: VecDeque::new(),
            quality: QuorumTracker::new(power_table.clone()),
            rounds,
            acceptable: input.clone(),
            decision: QuorumTracker::new(power_table),
            input,
        })
    }

    /// Starts the instance. Valid exactly once, in the initial phase.
    pub fn start(&mut self) -> Result<(), GraniteError> {
        if self.phase != Phase::Initial {
            return Err(GraniteError::AlreadyStarted);
        }
        self.begin_quality();
        self.drain_inbox()
    }

    /// Receives a new acceptable chain and replaces the current one.
    pub fn receive_acceptable(&mut self, chain: ECChain) {
        self.acceptable = chain;
    }

    /// Receives a message from another participant. The caller promises
    /// single-threaded, drained calls; receiving after termination or while
    /// a previous call is still draining is a contract violation.
    pub fn receive(&mut self, msg: GMessage) -> Result<(), GraniteError> {
        if self.terminated() {
            return Err(GraniteError::ReceivedAfterTermination);
        }
        if !self.inbox.is_empty() {
            return Err(GraniteError::InboxNotDrained);
        }
        self.inbox.push_back(msg);
        self.drain_inbox()
    }

    /// Receives an alarm previously armed through the host clock.
    pub fn receive_alarm(&mut self, _payload: Phase) -> Result<(), GraniteError> {
        self.try_complete_phase()?;
        // A phase may have completed; re-process anything queued for the
        // next phase.
        self.drain_inbox()
    }

    /// Reports the decided value and round once the instance has terminated.
    pub fn finalized(&self) -> Option<(&ECChain, u64)> {
        if self.terminated() {
            Some((&self.value, self.round))
        } else {
            None
        }
    }

    pub fn current_round(&self) -> u64 {
        self.round
    }

    pub fn current_phase(&self) -> Phase {
        self.phase
    }

    pub fn describe(&self) -> String {
        format!(
            "P{}{{{}}}, round {}, phase {}",
            self.participant_id, self.instance_id, self.round, self.phase
        )
    }

    fn drain_inbox(&mut self) -> Result<(), GraniteError> {
        while let Some(msg) = self.inbox.pop_front() {
            self.receive_one(msg)?;
        }
        Ok(())
    }

    /// Processes a single message to completion, including any phase
    /// transitions and self-broadcasts it triggers.
    fn receive_one(&mut self, msg: GMessage) -> Result<(), GraniteError> {
        if self.phase == Phase::Terminated {
            return Ok(());
        }

        // Drop any message that can never become valid.
        if !self.is_valid(&msg) {
            debug!(target: "granite", participant = self.participant_id, %msg, "dropping invalid message");
            return Ok(());
        }

        // No implicit justification: a message that is not justified now
        // never will be, so there is no buffering for later.
        if !self.is_justified(&msg) {
            debug!(target: "granite", participant = self.participant_id, %msg, "dropping unjustified message");
            return Ok(());
        }

        let round = msg.vote.round;
        match msg.vote.phase {
            Phase::Quality => {
                // Receive each non-empty prefix of the value independently.
                for to in 0..msg.vote.value.len() {
                    let prefix = msg.vote.value.prefix(to)?;
                    self.quality.receive(msg.sender, prefix, &msg.signature, None);
                }
            }
            Phase::Converge => {
                self.round_state_mut(round)
                    .converged
                    .receive(msg.vote.value.clone(), msg.ticket.clone());
            }
            Phase::Prepare => {
                self.round_state_mut(round).prepared.receive(
                    msg.sender,
                    msg.vote.value.clone(),
                    &msg.signature,
                    msg.justification.as_ref(),
                );
            }
            Phase::Commit => {
                self.round_state_mut(round).committed.receive(
                    msg.sender,
                    msg.vote.value.clone(),
                    &msg.signature,
                    msg.justification.as_ref(),
                );
            }
            Phase::Decide => {
                self.decision.receive(
                    msg.sender,
                    msg.vote.value.clone(),
                    &msg.signature,
                    msg.justification.as_ref(),
                );
            }
            other => {
                debug!(target: "granite", phase = %other, "unexpected message step");
                return Ok(());
            }
        }

        // COMMIT pools stay open to new messages even after the protocol
        // moves on to a new round: a late-arriving COMMIT can still (must)
        // cause a local decision, in that round.
        if msg.vote.phase == Phase::Commit && self.phase != Phase::Decide {
            self.try_commit(round)
        } else {
            self.try_complete_phase()
        }
    }

    /// Attempts to complete the current phase and round.
    fn try_complete_phase(&mut self) -> Result<(), GraniteError> {
        trace!(target: "granite", state = %self.describe(), "try completing phase");
        match self.phase {
            Phase::Quality => self.try_quality(),
            Phase::Converge => self.try_converge(),
            Phase::Prepare => self.try_prepare(),
            Phase::Commit => self.try_commit(self.round),
            Phase::Decide => self.try_decide(),
            Phase::Terminated => Ok(()),
            Phase::Initial => Err(GraniteError::UnexpectedPhase(self.phase)),
        }
    }

    /// Checks whether a message is valid. An invalid message can never
    /// become valid, so it may be dropped.
    fn is_valid(&self, msg: &GMessage) -> bool {
        let Some(entry) = self.power_table.get(msg.sender) else {
            debug!(target: "granite", sender = msg.sender, "message from unknown sender");
            return false;
        };
        if msg.vote.instance != self.instance_id {
            return false;
        }

        let value = &msg.vote.value;
        let Some(base) = self.input.base() else {
            return false;
        };
        if !(value.is_bottom() || value.has_base(base)) {
            debug!(target: "granite", value = %value, "unexpected base");
            return false;
        }

        match msg.vote.phase {
            Phase::Quality => {
                if msg.vote.round != 0 || value.is_bottom() {
                    return false;
                }
            }
            Phase::Converge => {
                if msg.vote.round == 0 || value.is_bottom() {
                    return false;
                }
                if !self.vrf.verify_ticket(
                    &self.beacon,
                    self.instance_id,
                    msg.vote.round,
                    &entry.pub_key,
                    &msg.ticket,
                ) {
                    return false;
                }
            }
            Phase::Decide => {
                if value.is_bottom() {
                    return false;
                }
            }
            Phase::Prepare | Phase::Commit => {}
            Phase::Initial | Phase::Terminated => return false,
        }

        let payload = msg.vote.serialize_for_signing();
        if self
            .host
            .verify(&entry.pub_key, &payload, &msg.signature)
            .is_err()
        {
            debug!(target: "granite", sender = msg.sender, "invalid message signature");
            return false;
        }
        true
    }

    /// Checks whether a message carries the justification its step requires.
    fn is_justified(&self, msg: &GMessage) -> bool {
        match msg.vote.phase {
            // QUALITY and PREPARE need no justification by prior messages.
            Phase::Quality | Phase::Prepare => true,
            Phase::Converge => {
                // CONVERGE is justified by a previous-round strong quorum of
                // PREPARE for the same value, or of COMMIT for bottom.
                let Some(justification) = msg.justification.as_ref() else {
                    return false;
                };
                if justification.vote.instance != self.instance_id {
                    debug!(target: "granite", %msg, "CONVERGE evidence from wrong instance");
                    return false;
                }
                if justification.vote.round + 1 != msg.vote.round {
                    debug!(target: "granite", %msg, "CONVERGE evidence from wrong round");
                    return false;
                }
                match justification.vote.phase {
                    Phase::Prepare => {
                        if justification.vote.value.head_cid_or_zero()
                            != msg.vote.value.head_cid_or_zero()
                        {
                            debug!(target: "granite", %msg, "CONVERGE with PREPARE evidence for a distinct head");
                            return false;
                        }
                    }
                    Phase::Commit => {
                        if !justification.vote.value.is_bottom() {
                            debug!(target: "granite", %msg, "CONVERGE with COMMIT evidence for a non-bottom value");
                            return false;
                        }
                    }
                    _ => {
                        debug!(target: "granite", %msg, "CONVERGE evidence from wrong step");
                        return false;
                    }
                }
                self.verify_justification(justification)
            }
            Phase::Commit => {
                // COMMIT for bottom is always justified; any other COMMIT is
                // justified by a strong quorum of PREPARE from the same round
                // for the same value.
                if msg.vote.value.is_bottom() {
                    return true;
                }
                let Some(justification) = msg.justification.as_ref() else {
                    return false;
                };
                justification.vote.instance == self.instance_id
                    && justification.vote.round == msg.vote.round
                    && justification.vote.phase == Phase::Prepare
                    && justification.vote.value.head_cid_or_zero()
                        == msg.vote.value.head_cid_or_zero()
                    && self.verify_justification(justification)
            }
            Phase::Decide => {
                // DECIDE is justified by a strong quorum of COMMIT for the
                // same value, from whichever round it formed in.
                let Some(justification) = msg.justification.as_ref() else {
                    return false;
                };
                justification.vote.instance == self.instance_id
                    && justification.vote.phase == Phase::Commit
                    && !justification.vote.value.is_bottom()
                    && justification.vote.value.head_cid_or_zero()
                        == msg.vote.value.head_cid_or_zero()
                    && self.verify_justification(justification)
            }
            _ => false,
        }
    }

    /// Checks that a justification's signers form a strong quorum and that
    /// the aggregate signature verifies over the justified payload. The
    /// aggregate covers every signer in the bitfield, not only the earliest
    /// sufficient prefix.
    fn verify_justification(&self, justification: &Justification) -> bool {
        let mut power = StoragePower::zero();
        let mut pub_keys = Vec::new();
        for index in justification.signature.signers.iter() {
            let Some(entry) = self.power_table.entries.get(index as usize) else {
                debug!(target: "granite", index, "justification signer index out of range");
                return false;
            };
            power += &entry.power;
            pub_keys.push(entry.pub_key.clone());
        }
        if !self.power_table.is_strong_quorum(&power) {
            debug!(target: "granite", "justification signers lack a strong quorum");
            return false;
        }
        let payload = justification.vote.serialize_for_signing();
        match self
            .host
            .verify_aggregate(&payload, &justification.signature.signature, &pub_keys)
        {
            Ok(()) => true,
            Err(err) => {
                debug!(target: "granite", %err, "justification aggregate failed to verify");
                false
            }
        }
    }

    /// Builds a justification for `value` by aggregating the observed
    /// signatures of a strong quorum of its signers.
    fn build_justification(
        &self,
        round: u64,
        phase: Phase,
        value: ECChain,
        tracker: &QuorumTracker,
    ) -> Result<Justification, GraniteError> {
        let evidence = tracker
            .strong_quorum_evidence(&value)
            .ok_or(GraniteError::NoStrongQuorum { phase, round })?;
        let signature = self
            .host
            .aggregate(&evidence.pub_keys, &evidence.signatures)
            .map_err(|err| GraniteError::Aggregation(err.to_string()))?;
        Ok(Justification {
            vote: Payload::new(self.instance_id, round, phase, value),
            signature: QuorumSignature {
                signers: evidence.signers,
                signature,
            },
        })
    }

    /// Sends this node's QUALITY message and begins the QUALITY phase.
    fn begin_quality(&mut self) {
        // Broadcast the input value and wait up to Δ to receive from others.
        self.phase = Phase::Quality;
        self.phase_timeout = self.alarm_after_synchrony(Phase::Quality);
        self.broadcast(self.round, Phase::Quality, self.input.clone(), Vec::new(), None);
    }

    /// Attempts to end the QUALITY phase and begin PREPARE.
    fn try_quality(&mut self) -> Result<(), GraniteError> {
        if self.phase != Phase::Quality {
            return Err(GraniteError::UnexpectedPhase(self.phase));
        }
        // Wait either for a strong quorum that agrees on our proposal, or
        // for the timeout to expire.
        let found_quorum = self
            .quality
            .has_strong_quorum(&self.proposal.head_cid_or_zero());
        let timeout_expired = self.host.time() >= self.phase_timeout;

        if found_quorum {
            // Keep the current proposal.
        } else if timeout_expired {
            let strong_quora = self.quality.list_strong_quorum_values();
            self.proposal = find_first_prefix_of(&strong_quora, &self.proposal)?;
        }

        if found_quorum || timeout_expired {
            self.value = self.proposal.clone();
            debug!(target: "granite", participant = self.participant_id, value = %self.value, "adopting proposal after quality");
            self.begin_prepare();
        }
        Ok(())
    }

    fn begin_converge(&mut self) -> Result<(), GraniteError> {
        self.phase = Phase::Converge;
        let ticket =
            self.vrf
                .make_ticket(&self.beacon, self.instance_id, self.round, self.participant_id);
        self.phase_timeout = self.alarm_after_synchrony(Phase::Converge);

        // The CONVERGE proposal must carry evidence from the previous round:
        // a COMMIT quorum for bottom if one formed, else a PREPARE quorum for
        // the proposal, else a PREPARE justification observed riding on
        // another participant's COMMIT for it.
        let prev_round = self.round - 1;
        self.ensure_round(prev_round);
        let justification = {
            let prev = &self.rounds[&prev_round];
            if prev.committed.has_strong_quorum(&zero_cid()) {
                self.build_justification(
                    prev_round,
                    Phase::Commit,
                    ECChain::bottom(),
                    &prev.committed,
                )?
            } else if prev
                .prepared
                .has_strong_quorum(&self.proposal.head_cid_or_zero())
            {
                self.build_justification(
                    prev_round,
                    Phase::Prepare,
                    self.proposal.clone(),
                    &prev.prepared,
                )?
            } else if let Some(cached) = prev
                .committed
                .prepare_justification(&self.proposal.head_cid_or_zero())
            {
                cached.clone()
            } else {
                return Err(GraniteError::MissingConvergeEvidence { round: self.round });
            }
        };

        self.broadcast(
            self.round,
            Phase::Converge,
            self.proposal.clone(),
            ticket,
            Some(justification),
        );
        Ok(())
    }

    /// Attempts to end the CONVERGE phase and begin PREPARE. CONVERGE always
    /// runs its full timeout so that late tickets can still win.
    fn try_converge(&mut self) -> Result<(), GraniteError> {
        if self.phase != Phase::Converge {
            return Err(GraniteError::UnexpectedPhase(self.phase));
        }
        if self.host.time() < self.phase_timeout {
            return Ok(());
        }

        self.ensure_round(self.round);
        let min_proposal = self.rounds[&self.round]
            .converged
            .min_ticket_proposal()
            .cloned()
            .ok_or(GraniteError::NoConvergeValue)?;
        self.value = min_proposal;
        if self.is_acceptable(&self.value) {
            // Sway to the winning proposal if it is acceptable.
            if self.proposal != self.value {
                self.proposal = self.value.clone();
                debug!(target: "granite", participant = self.participant_id, proposal = %self.proposal, "adopting proposal after converge");
            }
        } else {
            // Vote against deciding in this round.
            self.value = ECChain::bottom();
        }
        self.begin_prepare();
        Ok(())
    }

    /// Sends this node's PREPARE message and begins the PREPARE phase.
    fn begin_prepare(&mut self) {
        // Broadcast preparation of the value and wait for everyone to
        // respond.
        self.phase = Phase::Prepare;
        self.phase_timeout = self.alarm_after_synchrony(Phase::Prepare);
        self.broadcast(self.round, Phase::Prepare, self.value.clone(), Vec::new(), None);
    }

    /// Attempts to end the PREPARE phase and begin COMMIT.
    fn try_prepare(&mut self) -> Result<(), GraniteError> {
        if self.phase != Phase::Prepare {
            return Err(GraniteError::UnexpectedPhase(self.phase));
        }
        self.ensure_round(self.round);
        let found_quorum = self.rounds[&self.round]
            .prepared
            .has_strong_quorum(&self.proposal.head_cid_or_zero());
        let timeout_expired = self.host.time() >= self.phase_timeout;

        if found_quorum {
            self.value = self.proposal.clone();
        } else if timeout_expired {
            self.value = ECChain::bottom();
        }

        if found_quorum || timeout_expired {
            self.begin_commit()?;
        }
        Ok(())
    }

    fn begin_commit(&mut self) -> Result<(), GraniteError> {
        self.phase = Phase::Commit;
        // The COMMIT window spans the same synchrony bound as PREPARE.
        self.phase_timeout = self.alarm_after_synchrony(Phase::Prepare);

        // A non-bottom COMMIT carries the PREPARE quorum that justifies it;
        // a COMMIT for bottom needs no justification.
        let justification = if self.value.is_bottom() {
            None
        } else {
            self.ensure_round(self.round);
            Some(self.build_justification(
                self.round,
                Phase::Prepare,
                self.value.clone(),
                &self.rounds[&self.round].prepared,
            )?)
        };

        self.broadcast(
            self.round,
            Phase::Commit,
            self.value.clone(),
            Vec::new(),
            justification,
        );
        Ok(())
    }

    /// Attempts to complete the COMMIT phase for `round`, which may be a
    /// past round: the COMMIT pool of every round stays open, and a late
    /// quorum still decides in that round.
    fn try_commit(&mut self, round: u64) -> Result<(), GraniteError> {
        self.ensure_round(round);
        let (decide_value, received_quorum, sway_value) = {
            let committed = &self.rounds[&round].committed;
            let quorum_values = committed.list_strong_quorum_values();
            let decide_value = quorum_values.first().filter(|v| !v.is_bottom()).cloned();
            let sway_value = committed
                .list_all_values()
                .into_iter()
                .find(|v| !v.is_bottom());
            (decide_value, committed.received_from_strong_quorum(), sway_value)
        };

        if let Some(value) = decide_value {
            // A participant may be forced to decide a value that's not its
            // preferred chain; it isn't influencing that decision against
            // its own interest, just accepting it.
            self.value = value;
            return self.begin_decide(round);
        }

        let timeout_expired = self.host.time() >= self.phase_timeout;
        if self.round == round
            && self.phase == Phase::Commit
            && timeout_expired
            && received_quorum
        {
            // Adopt any non-bottom value committed by another participant
            // (there can be at most one). This node has observed the strong
            // quorum of PREPAREs that justify it, which means other nodes
            // may decide that value on further COMMITs.
            if let Some(value) = sway_value {
                if !self.is_acceptable(&value) {
                    warn!(target: "granite", participant = self.participant_id, from = %self.input, to = %value, "swaying to a committed value outside the acceptable chain");
                }
                if value != self.proposal {
                    self.proposal = value;
                    debug!(target: "granite", participant = self.participant_id, proposal = %self.proposal, "adopting proposal after commit");
                }
            }
            self.begin_next_round()?;
        }
        Ok(())
    }

    fn begin_decide(&mut self, round: u64) -> Result<(), GraniteError> {
        self.phase = Phase::Decide;
        // A late COMMIT can settle a round prior to the current one; the
        // instance adopts the deciding round.
        self.round = round;
        self.ensure_round(round);
        let justification = self.build_justification(
            round,
            Phase::Commit,
            self.value.clone(),
            &self.rounds[&round].committed,
        )?;
        // DECIDE votes always carry round zero so that every participant's
        // decision lands in a single pool, regardless of the round in which
        // each one decided.
        self.broadcast(0, Phase::Decide, self.value.clone(), Vec::new(), Some(justification));
        Ok(())
    }

    fn try_decide(&mut self) -> Result<(), GraniteError> {
        let quorum_values = self.decision.list_strong_quorum_values();
        if let Some(value) = quorum_values.into_iter().next() {
            self.terminate(value, self.round);
        }
        Ok(())
    }

    fn begin_next_round(&mut self) -> Result<(), GraniteError> {
        self.round += 1;
        debug!(target: "granite", participant = self.participant_id, round = self.round, proposal = %self.proposal, "moving to next round");
        self.begin_converge()
    }

    /// Returns whether a chain is acceptable as a proposal for this instance
    /// to vote for: the current acceptable chain must extend it.
    fn is_acceptable(&self, chain: &ECChain) -> bool {
        self.acceptable.has_prefix(chain)
    }

    fn terminate(&mut self, value: ECChain, round: u64) {
        debug!(target: "granite", participant = self.participant_id, value = %value, round, "terminated");
        self.phase = Phase::Terminated;
        // Round is a parameter since a late COMMIT message can result in a
        // decision for a round prior to the current one.
        self.round = round;
        self.value = value;
    }

    fn terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    /// Signs and broadcasts a message, and queues it into the local inbox so
    /// this participant's own vote is counted by the same drain loop.
    fn broadcast(
        &mut self,
        round: u64,
        phase: Phase,
        value: ECChain,
        ticket: Ticket,
        justification: Option<Justification>,
    ) {
        let vote = Payload::new(self.instance_id, round, phase, value);
        let signature = self.host.sign(self.participant_id, &vote.serialize_for_signing());
        let msg = GMessage {
            sender: self.participant_id,
            vote,
            ticket,
            signature,
            justification,
        };
        self.host.broadcast(&msg);
        self.inbox.push_back(msg);
    }

    /// Arms an alarm one synchrony bound from now; the bound grows with each
    /// round. Returns the absolute time at which the alarm will fire.
    fn alarm_after_synchrony(&self, payload: Phase) -> f64 {
        let timeout =
            self.host.time() + self.config.delta + (self.round as f64) * self.config.delta_rate;
        self.host.set_alarm(self.participant_id, payload, timeout);
        timeout
    }

    fn ensure_round(&mut self, round: u64) {
        let power_table = self.power_table.clone();
        self.rounds
            .entry(round)
            .or_insert_with(|| RoundState::new(power_table));
    }

    fn round_state_mut(&mut self, round: u64) -> &mut RoundState {
        let power_table = self.power_table.clone();
        self.rounds
            .entry(round)
            .or_insert_with(|| RoundState::new(power_table))
    }
}

/// Returns the first candidate that is a prefix of `preferred`, or failing
/// that the single-tipset chain holding only the preferred base.
fn find_first_prefix_of(
    candidates: &[ECChain],
    preferred: &ECChain,
) -> Result<ECChain, GraniteError> {
    for candidate in candidates {
        if preferred.has_prefix(candidate) {
            return Ok(candidate.clone());
        }
    }
    preferred.base_chain().ok_or(GraniteError::ChainEmpty)
}
