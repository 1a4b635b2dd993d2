//! Builders and a scripted host for exercising the protocol in tests.
//!
//! The signature scheme here is a deterministic stand-in, not a real one:
//! a signature is the Keccak-256 digest of the signer's public key and the
//! payload, and an aggregate is the digest of the member signatures in
//! signer order. Verification recomputes and compares. This keeps tests
//! fast and reproducible while still catching tampered payloads and
//! mismatched signer sets.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;
use sha3::{Digest, Keccak256};

use crate::api::{Clock, Network, Signer, Verifier, Vrf};
use crate::chain::{ECChain, Tipset};
use crate::message::GMessage;
use crate::payload::Phase;
use crate::powertable::{PowerEntries, PowerEntry};
use crate::types::{ActorId, PubKey, StoragePower, Ticket};

fn keccak(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// The deterministic public key assigned to a participant in tests.
pub fn test_pub_key(id: ActorId) -> PubKey {
    PubKey::new(keccak(&[b"granite-test-key", &id.to_be_bytes()]))
}

pub fn fake_sign(pub_key: &PubKey, msg: &[u8]) -> Vec<u8> {
    keccak(&[b"granite-test-sig", &pub_key.0, msg])
}

pub fn fake_verify(pub_key: &PubKey, msg: &[u8], sig: &[u8]) -> anyhow::Result<()> {
    if fake_sign(pub_key, msg) == sig {
        Ok(())
    } else {
        Err(anyhow!("signature mismatch"))
    }
}

pub fn fake_aggregate(sigs: &[Vec<u8>]) -> Vec<u8> {
    let parts: Vec<&[u8]> = sigs.iter().map(|s| s.as_slice()).collect();
    keccak(&parts)
}

pub fn fake_verify_aggregate(payload: &[u8], agg_sig: &[u8], signers: &[PubKey]) -> anyhow::Result<()> {
    let expected: Vec<Vec<u8>> = signers.iter().map(|pk| fake_sign(pk, payload)).collect();
    if fake_aggregate(&expected) == agg_sig {
        Ok(())
    } else {
        Err(anyhow!("aggregate signature mismatch"))
    }
}

pub fn create_test_tipset(epoch: i64) -> Tipset {
    Tipset {
        epoch,
        cid: keccak(&[b"tipset", &epoch.to_be_bytes()])[..8].to_vec(),
        weight: epoch as u64,
    }
}

/// A validated chain with one tipset per epoch, in the given order.
pub fn create_test_chain(epochs: &[i64]) -> ECChain {
    let tipsets: Vec<Tipset> = epochs.iter().map(|e| create_test_tipset(*e)).collect();
    let chain = ECChain::new_unvalidated(tipsets);
    chain
        .validate()
        .expect("test chain epochs must be increasing");
    chain
}

/// Power entries for participants `0..n`, one unit of power each.
pub fn create_powertable(n: usize) -> PowerEntries {
    (0..n as ActorId)
        .map(|id| PowerEntry {
            id,
            power: StoragePower::from(1),
            pub_key: test_pub_key(id),
        })
        .collect()
}

#[derive(Default)]
struct TestHostInner {
    now: f64,
    broadcasts: Vec<GMessage>,
    alarms: Vec<(Phase, f64)>,
}

/// Scripted host for driving a single instance in unit tests: a manually
/// advanced clock, recorded broadcasts and alarms, and the fake signature
/// scheme above. Handles are cheap clones sharing the same state, so a test
/// can keep one while the instance owns another.
#[derive(Clone, Default)]
pub struct TestHost {
    inner: Rc<RefCell<TestHostInner>>,
}

impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, now: f64) {
        self.inner.borrow_mut().now = now;
    }

    /// Drains and returns everything broadcast since the last call.
    pub fn take_broadcasts(&self) -> Vec<GMessage> {
        std::mem::take(&mut self.inner.borrow_mut().broadcasts)
    }

    /// The alarms armed so far, in order.
    pub fn alarms(&self) -> Vec<(Phase, f64)> {
        self.inner.borrow().alarms.clone()
    }
}

impl Network for TestHost {
    fn broadcast(&self, msg: &GMessage) {
        self.inner.borrow_mut().broadcasts.push(msg.clone());
    }
}

impl Clock for TestHost {
    fn time(&self) -> f64 {
        self.inner.borrow().now
    }

    fn set_alarm(&self, _sender: ActorId, payload: Phase, at: f64) {
        self.inner.borrow_mut().alarms.push((payload, at));
    }
}

impl Signer for TestHost {
    fn sign(&self, sender: ActorId, msg: &[u8]) -> Vec<u8> {
        fake_sign(&test_pub_key(sender), msg)
    }
}

impl Verifier for TestHost {
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

/// Deterministic VRF for tests: the ticket is a digest of the lottery inputs
/// and the sender's test key, so verification can recompute it from the
/// sender's public key.
#[derive(Clone, Copy, Default)]
pub struct TestVrf;

impl Vrf for TestVrf {
    fn make_ticket(&self, beacon: &[u8], instance: u64, round: u64, sender: ActorId) -> Ticket {
        ticket_for(beacon, instance, round, &test_pub_key(sender))
    }

    fn verify_ticket(
        &self,
        beacon: &[u8],
        instance: u64,
        round: u64,
        pub_key: &PubKey,
        ticket: &Ticket,
    ) -> bool {
        ticket_for(beacon, instance, round, pub_key) == *ticket
    }
}

fn ticket_for(beacon: &[u8], instance: u64, round: u64, pub_key: &PubKey) -> Ticket {
    keccak(&[
        b"granite-test-vrf",
        beacon,
        &instance.to_be_bytes(),
        &round.to_be_bytes(),
        &pub_key.0,
    ])
}
