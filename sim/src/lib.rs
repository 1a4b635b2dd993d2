//! Deterministic, single-threaded simulation harness for whole networks of
//! Granite consensus instances.
//!
//! Participants share one simulated clock and message queue; deliveries and
//! alarms fire in time order with insertion order breaking ties, so every
//! run of a scenario is reproducible. Honest participants run the real
//! [`Instance`] state machine over the same host traits production code
//! would use; adversaries speak raw messages through the same network.

mod adversary;
mod host;

pub use adversary::WitholdCommit;
pub use host::SimHost;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use granite_gpbft::test_utils::{create_test_chain, test_pub_key, TestVrf};
use granite_gpbft::{
    ActorId, ECChain, GraniteConfig, Instance, PowerEntries, PowerEntry, PowerTable, StoragePower,
};
use tracing::debug;

use crate::host::{Event, NetCore};

const BEACON: &[u8] = b"sim-beacon";
const INSTANCE_ID: u64 = 0;

#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Number of honest participants, with IDs `0..honest_count` and one
    /// unit of power each.
    pub honest_count: usize,
    /// One-way message delay between any two actors.
    pub latency: f64,
    pub delta: f64,
    pub delta_rate: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            honest_count: 3,
            latency: 0.01,
            delta: 1.0,
            delta_rate: 0.1,
        }
    }
}

struct AdversarySpec {
    id: ActorId,
    power: u64,
    victims: Vec<ActorId>,
    value: ECChain,
}

/// A network of Granite instances over a shared simulated clock.
pub struct Simulation {
    config: SimConfig,
    core: Rc<RefCell<NetCore>>,
    base: ECChain,
    participants: Vec<Instance<SimHost, TestVrf>>,
    adversary: Option<WitholdCommit>,
    adversary_spec: Option<AdversarySpec>,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        let core = Rc::new(RefCell::new(NetCore::new(config.latency)));
        Self {
            config,
            core,
            base: create_test_chain(&[0]),
            participants: Vec::new(),
            adversary: None,
            adversary_spec: None,
        }
    }

    /// The single-tipset chain every input in this simulation builds on.
    pub fn base_chain(&self) -> ECChain {
        self.base.clone()
    }

    /// Registers a withhold-COMMIT adversary to be wired into the power
    /// table when the chains are received.
    pub fn set_adversary(&mut self, id: ActorId, power: u64, victims: Vec<ActorId>, value: ECChain) {
        self.adversary_spec = Some(AdversarySpec {
            id,
            power,
            victims,
            value,
        });
    }

    /// Assigns input chains to the honest participants, in ID order, and
    /// constructs their instances. `assignments` pairs a participant count
    /// with the chain that many participants receive.
    pub fn receive_chains(&mut self, assignments: &[(usize, ECChain)]) -> anyhow::Result<()> {
        let assigned: usize = assignments.iter().map(|(count, _)| count).sum();
        if assigned != self.config.honest_count {
            return Err(anyhow!(
                "assigned {} chains to {} participants",
                assigned,
                self.config.honest_count
            ));
        }

        let mut entries: PowerEntries = (0..self.config.honest_count as ActorId)
            .map(|id| PowerEntry {
                id,
                power: StoragePower::from(1),
                pub_key: test_pub_key(id),
            })
            .collect();
        let mut actor_ids: Vec<ActorId> = (0..self.config.honest_count as ActorId).collect();
        if let Some(spec) = &self.adversary_spec {
            entries.push(PowerEntry {
                id: spec.id,
                power: StoragePower::from(spec.power),
                pub_key: test_pub_key(spec.id),
            });
            actor_ids.push(spec.id);
        }
        self.core.borrow_mut().actor_ids = actor_ids;

        let granite_config = GraniteConfig {
            delta: self.config.delta,
            delta_rate: self.config.delta_rate,
        };
        let mut inputs = Vec::with_capacity(self.config.honest_count);
        for (count, chain) in assignments {
            for _ in 0..*count {
                inputs.push(chain.clone());
            }
        }
        for (id, input) in inputs.into_iter().enumerate() {
            let instance = Instance::new(
                granite_config.clone(),
                SimHost::new(self.core.clone()),
                TestVrf,
                id as ActorId,
                INSTANCE_ID,
                input,
                PowerTable::new(entries.clone())?,
                BEACON.to_vec(),
            )?;
            self.participants.push(instance);
        }

        if let Some(spec) = self.adversary_spec.take() {
            let power_table = Arc::new(PowerTable::new(entries)?);
            self.adversary = Some(WitholdCommit::new(
                spec.id,
                spec.victims,
                spec.value,
                SimHost::new(self.core.clone()),
                power_table,
                INSTANCE_ID,
                BEACON.to_vec(),
            ));
        }
        Ok(())
    }

    /// Replaces one participant's acceptable chain, as its EC view would.
    pub fn receive_acceptable(&mut self, participant: usize, chain: ECChain) {
        self.participants[participant].receive_acceptable(chain);
    }

    /// Starts every actor and drives the event queue until all honest
    /// participants decide, the queue drains, or the clock passes
    /// `max_time`. Returns whether all honest participants decided.
    pub fn run(&mut self, max_time: f64) -> anyhow::Result<bool> {
        for participant in &mut self.participants {
            participant.start()?;
        }
        if let Some(adversary) = &mut self.adversary {
            adversary.begin();
        }

        loop {
            if self.all_decided() {
                return Ok(true);
            }
            let event = self.core.borrow_mut().pop();
            let Some(event) = event else {
                debug!(target: "granite_sim", "event queue drained");
                return Ok(self.all_decided());
            };
            if self.core.borrow().now > max_time {
                return Ok(self.all_decided());
            }
            match event {
                Event::Deliver { to, msg } => {
                    if let Some(index) = self.participant_index(to) {
                        if self.participants[index].finalized().is_none() {
                            self.participants[index]
                                .receive(msg)
                                .with_context(|| format!("delivering to participant {}", to))?;
                        }
                    } else if let Some(adversary) = &mut self.adversary {
                        adversary.receive(&msg);
                    }
                }
                Event::Alarm { actor, payload } => {
                    if let Some(index) = self.participant_index(actor) {
                        if self.participants[index].finalized().is_none() {
                            self.participants[index]
                                .receive_alarm(payload)
                                .with_context(|| format!("alarm for participant {}", actor))?;
                        }
                    }
                }
            }
        }
    }

    /// The decided chain and round of a participant, once terminated.
    pub fn finalized(&self, participant: usize) -> Option<(ECChain, u64)> {
        self.participants[participant]
            .finalized()
            .map(|(chain, round)| (chain.clone(), round))
    }

    pub fn describe(&self) -> String {
        self.participants
            .iter()
            .map(|p| p.describe())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn participant_index(&self, id: ActorId) -> Option<usize> {
        let index = id as usize;
        (index < self.participants.len()).then_some(index)
    }

    fn all_decided(&self) -> bool {
        !self.participants.is_empty()
            && self.participants.iter().all(|p| p.finalized().is_some())
    }
}
