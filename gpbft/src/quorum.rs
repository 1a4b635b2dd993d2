use std::cmp::Ordering;
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use fvm_ipld_bitfield::BitField;
use hashlink::LinkedHashMap;
use num_traits::Zero;

use crate::chain::{Cid, ECChain};
use crate::justification::Justification;
use crate::payload::Phase;
use crate::powertable::PowerTable;
use crate::types::{ActorId, PubKey, StoragePower};

/// The chain heads one sender has voted for, with the signature backing each.
struct SenderSent {
    heads: HashMap<Cid, Vec<u8>>,
}

/// A chain value and the accumulated power supporting it.
struct ChainSupport {
    chain: ECChain,
    power: StoragePower,
    signers: BitField,
    has_strong_quorum: bool,
    has_weak_quorum: bool,
}

/// The signers and signatures backing one value, ready for aggregation.
pub struct QuorumEvidence {
    pub signers: BitField,
    pub pub_keys: Vec<PubKey>,
    pub signatures: Vec<Vec<u8>>,
}

/// Incremental quorum-calculation helper.
///
/// Accumulates weighted votes from a collection of senders and incrementally
/// tracks which chain heads have reached a strong or weak quorum. A sender
/// may vote for multiple distinct heads, so multiple heads can hold a strong
/// quorum at once; the same `(sender, head)` pair never counts twice.
pub struct QuorumTracker {
    /// Heads received so far, by sender. Detects and ignores duplicates.
    received: HashMap<ActorId, SenderSent>,
    /// Support for each head, in the order heads were first observed.
    chain_support: LinkedHashMap<Cid, ChainSupport>,
    /// Total power of all distinct senders heard from so far.
    senders_total_power: StoragePower,
    /// PREPARE justifications observed riding on votes for each head.
    prepare_justifications: HashMap<Cid, Justification>,
    power_table: Arc<PowerTable>,
}

impl QuorumTracker {
    pub fn new(power_table: Arc<PowerTable>) -> Self {
        Self {
            received: HashMap::new(),
            chain_support: LinkedHashMap::new(),
            senders_total_power: StoragePower::zero(),
            prepare_justifications: HashMap::new(),
            power_table,
        }
    }

    /// Receives a vote for `value` from `sender`.
    ///
    /// The signature is copied; the tracker never retains references into the
    /// caller's buffers. A PREPARE justification riding on a non-bottom vote
    /// is cached so it can later seed a CONVERGE for the same head.
    pub fn receive(
        &mut self,
        sender: ActorId,
        value: ECChain,
        signature: &[u8],
        justification: Option<&Justification>,
    ) {
        let Some(index) = self.power_table.index_of(sender) else {
            return;
        };
        let sender_power = &self.power_table.entries[index].power;
        let head = value.head_cid_or_zero();

        match self.received.get_mut(&sender) {
            Some(sent) => {
                // Don't double-count the same chain head for a single sender.
                if sent.heads.contains_key(&head) {
                    return;
                }
                sent.heads.insert(head.clone(), signature.to_vec());
            }
            None => {
                // Add the sender's power to the total the first time a value
                // is received from them.
                self.senders_total_power += sender_power;
                let mut heads = HashMap::new();
                heads.insert(head.clone(), signature.to_vec());
                self.received.insert(sender, SenderSent { heads });
            }
        }

        if !value.is_bottom() {
            if let Some(justification) = justification {
                if justification.vote.phase == Phase::Prepare {
                    self.prepare_justifications
                        .entry(head.clone())
                        .or_insert_with(|| justification.clone());
                }
            }
        }

        let support = self
            .chain_support
            .entry(head)
            .or_insert_with(|| ChainSupport {
                chain: value,
                power: StoragePower::zero(),
                signers: BitField::new(),
                has_strong_quorum: false,
                has_weak_quorum: false,
            });
        support.power += sender_power;
        support.signers.set(index as u64);
        support.has_strong_quorum = self.power_table.is_strong_quorum(&support.power);
        support.has_weak_quorum = self.power_table.is_weak_quorum(&support.power);
    }

    /// Checks whether a value has been received before.
    pub fn has_received(&self, value: &ECChain) -> bool {
        self.chain_support.contains_key(&value.head_cid_or_zero())
    }

    /// Checks whether at most one distinct value has been received.
    pub fn has_agreement(&self) -> bool {
        self.chain_support.len() <= 1
    }

    /// Checks whether at least one vote has been received from a strong
    /// quorum of senders, regardless of the values voted for.
    pub fn received_from_strong_quorum(&self) -> bool {
        self.power_table.is_strong_quorum(&self.senders_total_power)
    }

    /// Checks whether the chain with this head has reached a strong quorum.
    pub fn has_strong_quorum(&self, head: &Cid) -> bool {
        self.chain_support
            .get(head)
            .is_some_and(|cp| cp.has_strong_quorum)
    }

    /// Checks whether the chain with this head has reached a weak quorum.
    pub fn has_weak_quorum(&self, head: &Cid) -> bool {
        self.chain_support
            .get(head)
            .is_some_and(|cp| cp.has_weak_quorum)
    }

    /// Lists all values received from any sender, in observation order.
    pub fn list_all_values(&self) -> Vec<ECChain> {
        self.chain_support
            .values()
            .map(|cp| cp.chain.clone())
            .collect()
    }

    /// Lists the chains that have reached a strong quorum, sorted by head
    /// weight descending with bottom last.
    pub fn list_strong_quorum_values(&self) -> Vec<ECChain> {
        let mut with_quorum: Vec<ECChain> = self
            .chain_support
            .values()
            .filter(|cp| cp.has_strong_quorum)
            .map(|cp| cp.chain.clone())
            .collect();
        sort_by_head_weight(&mut with_quorum);
        with_quorum
    }

    /// A PREPARE justification observed riding on votes for this head.
    pub fn prepare_justification(&self, head: &Cid) -> Option<&Justification> {
        self.prepare_justifications.get(head)
    }

    /// Returns the signers and signatures backing `value`, trimmed in
    /// bit-index order to the smallest leading subset whose power exceeds the
    /// strong quorum threshold. Returns `None` when the observed signers
    /// cannot form a strong quorum.
    pub fn strong_quorum_evidence(&self, value: &ECChain) -> Option<QuorumEvidence> {
        let head = value.head_cid_or_zero();
        let support = self.chain_support.get(&head)?;

        let mut signers = BitField::new();
        let mut pub_keys = Vec::new();
        let mut signatures = Vec::new();
        let mut power = StoragePower::zero();
        for index in support.signers.iter() {
            if self.power_table.is_strong_quorum(&power) {
                break;
            }
            let entry = &self.power_table.entries[index as usize];
            let signature = self.received.get(&entry.id)?.heads.get(&head)?;
            signers.set(index);
            pub_keys.push(entry.pub_key.clone());
            signatures.push(signature.clone());
            power += &entry.power;
        }
        if !self.power_table.is_strong_quorum(&power) {
            return None;
        }
        Some(QuorumEvidence {
            signers,
            pub_keys,
            signatures,
        })
    }
}

/// Sorts chains by the weight of their head, descending; bottom sorts last.
fn sort_by_head_weight(chains: &mut [ECChain]) {
    chains.sort_by(|a, b| match (a.head(), b.head()) {
        (Some(ha), Some(hb)) => hb.compare(ha),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::justification::QuorumSignature;
    use crate::payload::Payload;
    use crate::powertable::PowerEntry;
    use crate::test_utils::{create_powertable, create_test_chain, test_pub_key};

    fn tracker(n: usize) -> QuorumTracker {
        let table = PowerTable::new(create_powertable(n)).unwrap();
        QuorumTracker::new(Arc::new(table))
    }

    #[test]
    fn test_strong_quorum_is_strict() {
        // Three equal senders: two of three is exactly 2/3, not a quorum.
        let chain = create_test_chain(&[0, 1]);
        let head = chain.head_cid_or_zero();
        let mut tracker = tracker(3);

        tracker.receive(0, chain.clone(), b"s0", None);
        tracker.receive(1, chain.clone(), b"s1", None);
        assert!(!tracker.has_strong_quorum(&head));
        assert!(tracker.has_weak_quorum(&head));

        tracker.receive(2, chain.clone(), b"s2", None);
        assert!(tracker.has_strong_quorum(&head));
        assert!(tracker.has_weak_quorum(&head));
    }

    #[test]
    fn test_duplicate_votes_are_ignored() {
        let chain = create_test_chain(&[0, 1]);
        let head = chain.head_cid_or_zero();
        let mut tracker = tracker(4);

        tracker.receive(0, chain.clone(), b"s0", None);
        tracker.receive(0, chain.clone(), b"s0-replayed", None);
        tracker.receive(0, chain.clone(), b"s0-again", None);

        assert!(!tracker.has_weak_quorum(&head));
        assert!(!tracker.received_from_strong_quorum());
        assert_eq!(tracker.list_all_values().len(), 1);
    }

    #[test]
    fn test_sender_may_support_multiple_heads() {
        let base = create_test_chain(&[0]);
        let a = base.extend(&[b"a".to_vec()]).unwrap();
        let b = base.extend(&[b"b".to_vec()]).unwrap();
        let mut tracker = tracker(3);

        // An equivocating sender counts towards both heads, but its power
        // counts only once towards the senders total.
        tracker.receive(0, a.clone(), b"sig-a", None);
        tracker.receive(0, b.clone(), b"sig-b", None);
        tracker.receive(1, a.clone(), b"sig-a1", None);
        tracker.receive(2, a.clone(), b"sig-a2", None);

        assert!(tracker.has_strong_quorum(&a.head_cid_or_zero()));
        assert!(!tracker.has_weak_quorum(&b.head_cid_or_zero()));
        assert!(tracker.received_from_strong_quorum());
        assert!(!tracker.has_agreement());
    }

    #[test]
    fn test_list_strong_quorum_values_sorted_by_weight_bottom_last() {
        let base = create_test_chain(&[0]);
        let long = base
            .extend(&[b"a".to_vec(), b"aa".to_vec()])
            .unwrap();
        let mut tracker = tracker(3);

        for sender in 0..3 {
            tracker.receive(sender, ECChain::bottom(), b"sig", None);
            tracker.receive(sender, base.clone(), b"sig", None);
            tracker.receive(sender, long.clone(), b"sig", None);
        }

        let values = tracker.list_strong_quorum_values();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], long);
        assert_eq!(values[1], base);
        assert!(values[2].is_bottom());
    }

    #[test]
    fn test_received_from_strong_quorum_counts_senders_not_heads() {
        let base = create_test_chain(&[0]);
        let a = base.extend(&[b"a".to_vec()]).unwrap();
        let b = base.extend(&[b"b".to_vec()]).unwrap();
        let mut tracker = tracker(3);

        tracker.receive(0, a.clone(), b"sig", None);
        tracker.receive(1, b.clone(), b"sig", None);
        assert!(!tracker.received_from_strong_quorum());
        tracker.receive(2, ECChain::bottom(), b"sig", None);
        assert!(tracker.received_from_strong_quorum());
    }

    #[test]
    fn test_prepare_justification_is_cached() {
        let chain = create_test_chain(&[0, 1]);
        let head = chain.head_cid_or_zero();
        let justification = Justification {
            vote: Payload::new(0, 0, Phase::Prepare, chain.clone()),
            signature: QuorumSignature {
                signers: BitField::new(),
                signature: vec![1, 2, 3],
            },
        };
        let commit_justification = Justification {
            vote: Payload::new(0, 0, Phase::Commit, chain.clone()),
            signature: QuorumSignature {
                signers: BitField::new(),
                signature: vec![4, 5, 6],
            },
        };

        let mut tracker = tracker(3);
        // COMMIT-phase evidence is not cached, and neither is anything riding
        // on a bottom vote.
        tracker.receive(0, chain.clone(), b"sig", Some(&commit_justification));
        tracker.receive(1, ECChain::bottom(), b"sig", Some(&justification));
        assert!(tracker.prepare_justification(&head).is_none());

        tracker.receive(2, chain.clone(), b"sig", Some(&justification));
        assert_eq!(tracker.prepare_justification(&head), Some(&justification));
    }

    #[test]
    fn test_strong_quorum_evidence_trims_to_lowest_indices() {
        // Power order: id 9 (power 5, index 0), then 0..=2 (power 1 each).
        let mut entries = create_powertable(3);
        entries.push(PowerEntry {
            id: 9,
            power: StoragePower::from(5),
            pub_key: test_pub_key(9),
        });
        let table = Arc::new(PowerTable::new(entries).unwrap());
        let chain = create_test_chain(&[0, 1]);
        let mut tracker = QuorumTracker::new(table.clone());

        tracker.receive(0, chain.clone(), b"sig-0", None);
        tracker.receive(1, chain.clone(), b"sig-1", None);
        assert!(tracker.strong_quorum_evidence(&chain).is_none());

        tracker.receive(9, chain.clone(), b"sig-9", None);
        let evidence = tracker.strong_quorum_evidence(&chain).unwrap();

        // Indices 0 (id 9, power 5) and 1 (id 0, power 1) exceed 2/3 of 8;
        // the remaining signer is trimmed.
        let signers: Vec<u64> = evidence.signers.iter().collect();
        assert_eq!(signers, vec![0, 1]);
        assert_eq!(evidence.pub_keys, vec![test_pub_key(9), test_pub_key(0)]);
        assert_eq!(
            evidence.signatures,
            vec![b"sig-9".to_vec(), b"sig-0".to_vec()]
        );
    }

    #[test]
    fn test_idempotent_receive_leaves_state_unchanged() {
        let chain = create_test_chain(&[0, 1]);
        let head = chain.head_cid_or_zero();
        let mut tracker = tracker(3);

        tracker.receive(0, chain.clone(), b"sig", None);
        tracker.receive(1, chain.clone(), b"sig", None);
        let values_before = tracker.list_all_values();
        let evidence_exists_before = tracker.strong_quorum_evidence(&chain).is_some();

        tracker.receive(1, chain.clone(), b"sig", None);
        assert_eq!(tracker.list_all_values(), values_before);
        assert_eq!(
            tracker.strong_quorum_evidence(&chain).is_some(),
            evidence_exists_before
        );
        assert!(!tracker.has_strong_quorum(&head));
    }

    #[test]
    fn test_unknown_sender_is_ignored() {
        let chain = create_test_chain(&[0, 1]);
        let mut tracker = tracker(3);
        tracker.receive(42, chain.clone(), b"sig", None);
        assert!(!tracker.has_received(&chain));
        assert!(tracker.list_all_values().is_empty());
    }
}
