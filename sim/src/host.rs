use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;

use granite_gpbft::api::{Clock, Network, Signer, Verifier};
use granite_gpbft::test_utils::{
    fake_aggregate, fake_sign, fake_verify, fake_verify_aggregate, test_pub_key,
};
use granite_gpbft::{ActorId, GMessage, Phase, PubKey};

/// A scheduled simulation event.
pub(crate) enum Event {
    Deliver { to: ActorId, msg: GMessage },
    Alarm { actor: ActorId, payload: Phase },
}

struct QueuedEvent {
    at: f64,
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    // Time order, with insertion order breaking ties for determinism.
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Shared clock and message queue for one simulated network.
pub(crate) struct NetCore {
    pub now: f64,
    latency: f64,
    queue: BinaryHeap<Reverse<QueuedEvent>>,
    seq: u64,
    /// Every actor reachable by broadcast, adversaries included.
    pub actor_ids: Vec<ActorId>,
}

impl NetCore {
    pub fn new(latency: f64) -> Self {
        Self {
            now: 0.0,
            latency,
            queue: BinaryHeap::new(),
            seq: 0,
            actor_ids: Vec::new(),
        }
    }

    fn push_at(&mut self, at: f64, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Reverse(QueuedEvent { at, seq, event }));
    }

    pub fn broadcast_from(&mut self, sender: ActorId, msg: &GMessage) {
        let at = self.now + self.latency;
        let recipients: Vec<ActorId> = self
            .actor_ids
            .iter()
            .copied()
            .filter(|id| *id != sender)
            .collect();
        for to in recipients {
            self.push_at(
                at,
                Event::Deliver {
                    to,
                    msg: msg.clone(),
                },
            );
        }
    }

    pub fn send_to(&mut self, to: ActorId, msg: GMessage) {
        let at = self.now + self.latency;
        self.push_at(at, Event::Deliver { to, msg });
    }

    pub fn set_alarm(&mut self, actor: ActorId, payload: Phase, at: f64) {
        self.push_at(at, Event::Alarm { actor, payload });
    }

    /// Pops the next event and advances the clock to it.
    pub fn pop(&mut self) -> Option<Event> {
        let Reverse(next) = self.queue.pop()?;
        if next.at > self.now {
            self.now = next.at;
        }
        Some(next.event)
    }
}

/// The host handle given to each participant. Handles are cheap clones all
/// sharing one [`NetCore`], which keeps the whole simulation single-threaded
/// and deterministic.
#[derive(Clone)]
pub struct SimHost {
    core: Rc<RefCell<NetCore>>,
}

impl SimHost {
    pub(crate) fn new(core: Rc<RefCell<NetCore>>) -> Self {
        Self { core }
    }

    /// Delivers a message to one specific participant, bypassing broadcast.
    /// Honest participants never need this; adversaries do.
    pub fn send_to(&self, to: ActorId, msg: GMessage) {
        self.core.borrow_mut().send_to(to, msg);
    }
}

impl Network for SimHost {
    fn broadcast(&self, msg: &GMessage) {
        self.core.borrow_mut().broadcast_from(msg.sender, msg);
    }
}

impl Clock for SimHost {
    fn time(&self) -> f64 {
        self.core.borrow().now
    }

    fn set_alarm(&self, sender: ActorId, payload: Phase, at: f64) {
        self.core.borrow_mut().set_alarm(sender, payload, at);
    }
}

impl Signer for SimHost {
    fn sign(&self, sender: ActorId, msg: &[u8]) -> Vec<u8> {
        fake_sign(&test_pub_key(sender), msg)
    }
}

impl Verifier for SimHost {
    type Error = anyhow::Error;

    fn verify(&self, pub_key: &PubKey, msg: &[u8], sig: &[u8]) -> anyhow::Result<()> {
        fake_verify(pub_key, msg, sig)
    }

    fn aggregate(&self, _pub_keys: &[PubKey], sigs: &[Vec<u8>]) -> anyhow::Result<Vec<u8>> {
        Ok(fake_aggregate(sigs))
    }

    fn verify_aggregate(
        &self,
        payload: &[u8],
        agg_sig: &[u8],
        signers: &[PubKey],
    ) -> anyhow::Result<()> {
        fake_verify_aggregate(payload, agg_sig, signers)
    }
}
