use hashlink::LinkedHashMap;

use crate::chain::{Cid, ECChain};
use crate::types::Ticket;

struct ConvergeValue {
    chain: ECChain,
    tickets: Vec<Ticket>,
}

/// Collects the CONVERGE proposals of one round and the VRF tickets backing
/// them, and selects the proposal holding the smallest ticket.
///
/// Tickets are not deduplicated: each is an independent random value, so a
/// sender re-proposing the same chain only adds more lottery draws for it.
#[derive(Default)]
pub struct ConvergeTracker {
    proposals: LinkedHashMap<Cid, ConvergeValue>,
}

impl ConvergeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a proposal and its ticket. Bottom is never a CONVERGE value;
    /// callers validate before depositing.
    pub fn receive(&mut self, value: ECChain, ticket: Ticket) {
        debug_assert!(!value.is_bottom());
        if value.is_bottom() {
            return;
        }
        let head = value.head_cid_or_zero();
        let entry = self
            .proposals
            .entry(head)
            .or_insert_with(|| ConvergeValue {
                chain: value,
                tickets: Vec::new(),
            });
        entry.tickets.push(ticket);
    }

    /// Returns the chain whose ticket pool holds the smallest ticket across
    /// all proposed heads. Ties favour the head observed first.
    pub fn min_ticket_proposal(&self) -> Option<&ECChain> {
        let mut min: Option<(&Ticket, &ECChain)> = None;
        for value in self.proposals.values() {
            for ticket in &value.tickets {
                match min {
                    Some((current, _)) if ticket >= current => {}
                    _ => min = Some((ticket, &value.chain)),
                }
            }
        }
        min.map(|(_, chain)| chain)
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}
