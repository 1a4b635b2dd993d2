use std::sync::Arc;

use granite_gpbft::api::{Network, Signer, Verifier, Vrf};
use granite_gpbft::test_utils::TestVrf;
use granite_gpbft::{
    ActorId, ECChain, GMessage, Justification, Payload, Phase, PowerTable, QuorumSignature,
    QuorumTracker, Ticket,
};
use tracing::debug;

use crate::host::SimHost;

/// An adversary that withholds its COMMIT from most of the network.
///
/// It backs one fork honestly through QUALITY, sends its PREPARE only to the
/// participants already preferring that fork, and once it has gathered a
/// genuine PREPARE quorum it reveals the resulting COMMIT to a single victim,
/// steering that victim into deciding while everyone else times out. In the
/// next round it rejoins openly so the rest of the network can follow the
/// victim's decision.
pub struct WitholdCommit {
    id: ActorId,
    host: SimHost,
    instance_id: u64,
    beacon: Vec<u8>,
    /// The fork the adversary drives the network towards.
    value: ECChain,
    /// Participants already preferring the fork; they see the PREPARE.
    victims: Vec<ActorId>,
    /// The single victim that receives the withheld COMMIT.
    target: ActorId,
    prepared_round_zero: QuorumTracker,
    prepared_round_one: QuorumTracker,
    prepare_evidence: Option<Justification>,
    commit_revealed: bool,
    joined_round_one: bool,
    commit_round_one_sent: bool,
}

impl WitholdCommit {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ActorId,
        victims: Vec<ActorId>,
        value: ECChain,
        host: SimHost,
        power_table: Arc<PowerTable>,
        instance_id: u64,
        beacon: Vec<u8>,
    ) -> Self {
        let target = victims[0];
        Self {
            id,
            host,
            prepared_round_zero: QuorumTracker::new(power_table.clone()),
            prepared_round_one: QuorumTracker::new(power_table),
            instance_id,
            beacon,
            value,
            victims,
            target,
            prepare_evidence: None,
            commit_revealed: false,
            joined_round_one: false,
            commit_round_one_sent: false,
        }
    }

    /// Opens the attack: the fork's QUALITY goes to everyone so both sides
    /// count it, the PREPARE only to the fork's own supporters.
    pub fn begin(&mut self) {
        let quality = self.signed(
            Payload::new(self.instance_id, 0, Phase::Quality, self.value.clone()),
            Vec::new(),
            None,
        );
        self.host.broadcast(&quality);

        let prepare = self.signed(
            Payload::new(self.instance_id, 0, Phase::Prepare, self.value.clone()),
            Vec::new(),
            None,
        );
        self.prepared_round_zero
            .receive(self.id, self.value.clone(), &prepare.signature, None);
        for victim in self.victims.clone() {
            self.host.send_to(victim, prepare.clone());
        }
    }

    pub fn receive(&mut self, msg: &GMessage) {
        if msg.vote.instance != self.instance_id {
            return;
        }
        match msg.vote.phase {
            Phase::Prepare if msg.vote.value == self.value => match msg.vote.round {
                0 => {
                    self.prepared_round_zero.receive(
                        msg.sender,
                        msg.vote.value.clone(),
                        &msg.signature,
                        None,
                    );
                    self.try_reveal_commit();
                }
                1 => {
                    self.prepared_round_one.receive(
                        msg.sender,
                        msg.vote.value.clone(),
                        &msg.signature,
                        None,
                    );
                    self.try_commit_round_one();
                }
                _ => {}
            },
            Phase::Converge if msg.vote.round == 1 => self.join_round_one(),
            _ => {}
        }
    }

    /// Once a genuine PREPARE quorum for the fork exists, the COMMIT built
    /// from it goes to a single victim and nobody else.
    fn try_reveal_commit(&mut self) {
        if self.commit_revealed {
            return;
        }
        let Some(justification) = self.prepare_quorum(0, &self.prepared_round_zero) else {
            return;
        };
        debug!(target: "granite_sim", adversary = self.id, victim = self.target, "revealing withheld commit");
        let commit = self.signed(
            Payload::new(self.instance_id, 0, Phase::Commit, self.value.clone()),
            Vec::new(),
            Some(justification.clone()),
        );
        self.host.send_to(self.target, commit);
        self.prepare_evidence = Some(justification);
        self.commit_revealed = true;
    }

    /// On the first sighting of round 1, rejoin openly: the stored PREPARE
    /// quorum justifies a CONVERGE for the fork, and a fresh PREPARE keeps
    /// the fork's power in the round.
    fn join_round_one(&mut self) {
        if self.joined_round_one {
            return;
        }
        let Some(evidence) = self.prepare_evidence.clone() else {
            return;
        };
        self.joined_round_one = true;

        let ticket: Ticket = TestVrf.make_ticket(&self.beacon, self.instance_id, 1, self.id);
        let converge = self.signed(
            Payload::new(self.instance_id, 1, Phase::Converge, self.value.clone()),
            ticket,
            Some(evidence),
        );
        self.host.broadcast(&converge);

        let prepare = self.signed(
            Payload::new(self.instance_id, 1, Phase::Prepare, self.value.clone()),
            Vec::new(),
            None,
        );
        self.prepared_round_one
            .receive(self.id, self.value.clone(), &prepare.signature, None);
        self.host.broadcast(&prepare);
        self.try_commit_round_one();
    }

    fn try_commit_round_one(&mut self) {
        if !self.joined_round_one || self.commit_round_one_sent {
            return;
        }
        let Some(justification) = self.prepare_quorum(1, &self.prepared_round_one) else {
            return;
        };
        let commit = self.signed(
            Payload::new(self.instance_id, 1, Phase::Commit, self.value.clone()),
            Vec::new(),
            Some(justification),
        );
        self.host.broadcast(&commit);
        self.commit_round_one_sent = true;
    }

    fn prepare_quorum(&self, round: u64, tracker: &QuorumTracker) -> Option<Justification> {
        let evidence = tracker.strong_quorum_evidence(&self.value)?;
        let signature = self
            .host
            .aggregate(&evidence.pub_keys, &evidence.signatures)
            .ok()?;
        Some(Justification {
            vote: Payload::new(self.instance_id, round, Phase::Prepare, self.value.clone()),
            signature: QuorumSignature {
                signers: evidence.signers,
                signature,
            },
        })
    }

    fn signed(
        &self,
        vote: Payload,
        ticket: Ticket,
        justification: Option<Justification>,
    ) -> GMessage {
        let signature = self.host.sign(self.id, &vote.serialize_for_signing());
        GMessage {
            sender: self.id,
            vote,
            ticket,
            signature,
            justification,
        }
    }
}
