use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use ahash::{HashMap, HashMapExt};
use num_bigint::Sign;
use num_traits::Zero;

use crate::error::GraniteError;
use crate::types::{ActorId, PubKey, StoragePower};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PowerEntry {
    pub id: ActorId,
    pub power: StoragePower,
    pub pub_key: PubKey,
}

impl Ord for PowerEntry {
    // Canonical table order: power descending, participant ID ascending.
    fn cmp(&self, other: &Self) -> Ordering {
        match other.power.cmp(&self.power) {
            Ordering::Equal => self.id.cmp(&other.id),
            ord => ord,
        }
    }
}

impl PartialOrd for PowerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PowerEntries(pub Vec<PowerEntry>);

impl Deref for PowerEntries {
    type Target = Vec<PowerEntry>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PowerEntries {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<PowerEntry> for PowerEntries {
    fn from_iter<T: IntoIterator<Item = PowerEntry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An immutable mapping from participant to voting power and public key.
///
/// Entries are kept in canonical order; a participant's position in
/// `entries` is its stable bit position in signer bitfields. The table is
/// immutable for the lifetime of an instance.
pub struct PowerTable {
    pub entries: PowerEntries,
    pub lookup: HashMap<ActorId, usize>,
    pub total: StoragePower,
}

impl PowerTable {
    /// Builds a table from entries, sorting them into canonical order.
    /// Every participant must be unique and hold strictly positive power.
    pub fn new(mut entries: PowerEntries) -> Result<Self, GraniteError> {
        entries.sort();
        let mut lookup = HashMap::with_capacity(entries.len());
        let mut total = StoragePower::zero();
        for (index, entry) in entries.iter().enumerate() {
            if entry.power.sign() != Sign::Plus {
                return Err(GraniteError::NonPositivePower { id: entry.id });
            }
            if lookup.insert(entry.id, index).is_some() {
                return Err(GraniteError::DuplicatePowerEntry { id: entry.id });
            }
            total += &entry.power;
        }
        Ok(Self {
            entries,
            lookup,
            total,
        })
    }

    pub fn get(&self, id: ActorId) -> Option<&PowerEntry> {
        self.lookup.get(&id).map(|index| &self.entries[*index])
    }

    /// The stable bit position of a participant in signer bitfields.
    pub fn index_of(&self, id: ActorId) -> Option<usize> {
        self.lookup.get(&id).copied()
    }

    pub fn has(&self, id: ActorId) -> bool {
        self.lookup.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `power` exceeds two thirds of the table total. The comparison
    /// is `power·3 > total·2` to avoid division rounding.
    pub fn is_strong_quorum(&self, power: &StoragePower) -> bool {
        power * 3u32 > &self.total * 2u32
    }

    /// Whether `power` exceeds one third of the table total.
    pub fn is_weak_quorum(&self, power: &StoragePower) -> bool {
        power * 3u32 > self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_pub_key;

    fn entry(id: ActorId, power: i64) -> PowerEntry {
        PowerEntry {
            id,
            power: StoragePower::from(power),
            pub_key: test_pub_key(id),
        }
    }

    #[test]
    fn test_canonical_order_and_lookup() {
        let table =
            PowerTable::new(PowerEntries(vec![entry(1, 10), entry(2, 30), entry(3, 10)])).unwrap();

        // Power descending, then ID ascending.
        assert_eq!(table.entries[0].id, 2);
        assert_eq!(table.entries[1].id, 1);
        assert_eq!(table.entries[2].id, 3);

        assert_eq!(table.index_of(2), Some(0));
        assert_eq!(table.index_of(1), Some(1));
        assert_eq!(table.index_of(3), Some(2));
        assert_eq!(table.index_of(4), None);
        assert_eq!(table.total, StoragePower::from(50));
        assert_eq!(table.get(2).unwrap().power, StoragePower::from(30));
    }

    #[test]
    fn test_rejects_duplicate_entries() {
        let result = PowerTable::new(PowerEntries(vec![entry(1, 10), entry(1, 20)]));
        assert_eq!(
            result.err(),
            Some(GraniteError::DuplicatePowerEntry { id: 1 })
        );
    }

    #[test]
    fn test_rejects_non_positive_power() {
        let result = PowerTable::new(PowerEntries(vec![entry(1, 0)]));
        assert_eq!(result.err(), Some(GraniteError::NonPositivePower { id: 1 }));

        let result = PowerTable::new(PowerEntries(vec![entry(1, -5)]));
        assert_eq!(result.err(), Some(GraniteError::NonPositivePower { id: 1 }));
    }

    #[test]
    fn test_quorum_thresholds_are_strict() {
        let table = PowerTable::new(PowerEntries(vec![
            entry(1, 1),
            entry(2, 1),
            entry(3, 1),
        ]))
        .unwrap();

        // Exactly two thirds is not a strong quorum.
        assert!(!table.is_strong_quorum(&StoragePower::from(2)));
        assert!(table.is_strong_quorum(&StoragePower::from(3)));

        // Exactly one third is not a weak quorum.
        assert!(!table.is_weak_quorum(&StoragePower::from(1)));
        assert!(table.is_weak_quorum(&StoragePower::from(2)));
    }
}
