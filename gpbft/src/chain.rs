use std::cmp::{self, Ordering};
use std::fmt::{self, Display};

use fvm_ipld_encoding::strict_bytes;
use fvm_ipld_encoding::tuple::*;

use crate::error::GraniteError;

/// CHAIN_MAX_LEN specifies the maximum length of a chain value.
pub const CHAIN_MAX_LEN: usize = 100;

/// CID_MAX_LEN specifies the maximum length of a tipset CID.
pub const CID_MAX_LEN: usize = 38;

/// An opaque tipset identifier. The zero value (empty bytes) stands for the
/// head of the bottom chain.
pub type Cid = Vec<u8>;

/// Returns the sentinel CID used as the head of the bottom chain.
pub fn zero_cid() -> Cid {
    Cid::new()
}

/// A single EC tipset referenced by the protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct Tipset {
    /// The EC epoch (strictly increasing along a chain).
    pub epoch: i64,
    /// The canonical tipset CID.
    #[serde(with = "strict_bytes")]
    pub cid: Cid,
    /// The EC weight of the tipset.
    pub weight: u64,
}

impl Tipset {
    pub fn validate(&self) -> Result<(), GraniteError> {
        if self.cid.is_empty() {
            return Err(GraniteError::CidEmpty);
        }
        if self.cid.len() > CID_MAX_LEN {
            return Err(GraniteError::CidTooLong {
                len: self.cid.len(),
                max_len: CID_MAX_LEN,
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.cid.is_empty()
    }

    /// Total order used to rank chain heads: weight first, then CID bytes.
    pub fn compare(&self, other: &Tipset) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| self.cid.cmp(&other.cid))
    }
}

impl Display for Tipset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enc = base32::encode(base32::Alphabet::Rfc4648 { padding: true }, &self.cid);
        let display_len = cmp::min(16, enc.len());
        write!(f, "{}@{}", &enc[..display_len], self.epoch)
    }
}

/// A chain of tipsets with a common base at position zero.
///
/// The empty chain is a distinguished value, "bottom", used to vote against
/// deciding in a round. Bottom is only ever compared through the
/// [`ECChain::is_bottom`] predicate and the zero-CID sentinel of
/// [`ECChain::head_cid_or_zero`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ECChain(Vec<Tipset>);

impl std::ops::Deref for ECChain {
    type Target = Vec<Tipset>;
    fn deref(&self) -> &Vec<Tipset> {
        &self.0
    }
}

impl std::ops::DerefMut for ECChain {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl ECChain {
    /// Creates a validated chain from a base tipset and a suffix.
    pub fn new(base: Tipset, suffix: Vec<Tipset>) -> Result<Self, GraniteError> {
        let mut tipsets = Vec::with_capacity(1 + suffix.len());
        tipsets.push(base);
        tipsets.extend(suffix);
        let chain = ECChain(tipsets);
        chain.validate()?;
        Ok(chain)
    }

    pub fn new_unvalidated(tipsets: Vec<Tipset>) -> Self {
        ECChain(tipsets)
    }

    /// The bottom chain, voting against a decision this round.
    pub fn bottom() -> Self {
        ECChain(Vec::new())
    }

    pub fn is_bottom(&self) -> bool {
        self.is_empty()
    }

    pub fn validate(&self) -> Result<(), GraniteError> {
        if self.is_empty() {
            return Ok(());
        }
        if self.len() > CHAIN_MAX_LEN {
            return Err(GraniteError::ChainTooLong {
                max_len: CHAIN_MAX_LEN,
                len: self.len(),
            });
        }
        let mut last_epoch: i64 = -1;
        for ts in self.iter() {
            ts.validate()?;
            if ts.epoch <= last_epoch {
                return Err(GraniteError::Epochs {
                    current: ts.epoch,
                    last: last_epoch,
                });
            }
            last_epoch = ts.epoch;
        }
        Ok(())
    }

    pub fn base(&self) -> Option<&Tipset> {
        self.first()
    }

    pub fn suffix(&self) -> &[Tipset] {
        if self.is_empty() {
            &[]
        } else {
            &self[1..]
        }
    }

    pub fn has_suffix(&self) -> bool {
        !self.suffix().is_empty()
    }

    pub fn head(&self) -> Option<&Tipset> {
        self.last()
    }

    /// The head CID, or the zero CID for the bottom chain.
    pub fn head_cid_or_zero(&self) -> Cid {
        self.last().map(|ts| ts.cid.clone()).unwrap_or_default()
    }

    /// The single-tipset chain holding only this chain's base.
    pub fn base_chain(&self) -> Option<ECChain> {
        self.base().map(|ts| ECChain(vec![ts.clone()]))
    }

    /// Extends the chain by one tipset per CID, epoch and weight increasing.
    pub fn extend(&self, cids: &[Cid]) -> Option<ECChain> {
        let mut new_chain = self.clone();
        let head = self.last()?;
        let mut epoch = head.epoch + 1;
        let mut weight = head.weight + 1;
        for cid in cids {
            new_chain.push(Tipset {
                epoch,
                cid: cid.clone(),
                weight,
            });
            epoch += 1;
            weight += 1;
        }
        Some(new_chain)
    }

    /// The prefix ending at (and including) index `to`.
    pub fn prefix(&self, to: usize) -> Result<ECChain, GraniteError> {
        if self.is_empty() {
            return Err(GraniteError::ChainEmpty);
        }
        let length = cmp::min(to + 1, self.len());
        Ok(ECChain(self[..length].to_vec()))
    }

    pub fn same_base(&self, other: &ECChain) -> bool {
        !self.is_empty() && !other.is_empty() && self.base() == other.base()
    }

    pub fn has_base(&self, t: &Tipset) -> bool {
        if t.is_empty() || self.is_empty() {
            return false;
        }
        self.base() == Some(t)
    }

    pub fn has_prefix(&self, other: &ECChain) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if other.len() > self.len() {
            return false;
        }
        self[..other.len()] == other[..]
    }
}

impl Display for ECChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "丄");
        }
        let mut result = String::from("[");
        for (i, ts) in self.iter().enumerate() {
            result.push_str(&ts.to_string());
            if i < self.len() - 1 {
                result.push_str(", ");
            }
            if result.len() > 77 {
                result.push_str("...");
                break;
            }
        }
        result.push(']');
        write!(f, "{}", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_chain, create_test_tipset};

    #[test]
    fn test_bottom_chain() {
        let bottom = ECChain::bottom();
        assert!(bottom.is_bottom());
        assert_eq!(bottom.head_cid_or_zero(), zero_cid());
        assert!(bottom.base().is_none());
        assert!(bottom.head().is_none());
        assert!(bottom.validate().is_ok());
        assert_eq!(format!("{}", bottom), "丄");
    }

    #[test]
    fn test_validate_rejects_decreasing_epochs() {
        let chain = ECChain::new_unvalidated(vec![create_test_tipset(3), create_test_tipset(2)]);
        assert_eq!(
            chain.validate(),
            Err(GraniteError::Epochs {
                current: 2,
                last: 3
            })
        );
    }

    #[test]
    fn test_validate_rejects_empty_cid() {
        let mut ts = create_test_tipset(1);
        ts.cid = Vec::new();
        let chain = ECChain::new_unvalidated(vec![ts]);
        assert_eq!(chain.validate(), Err(GraniteError::CidEmpty));
    }

    #[test]
    fn test_prefix_and_suffix() {
        let chain = create_test_chain(&[0, 1, 2, 3]);
        assert_eq!(chain.len(), 4);

        let base_only = chain.prefix(0).unwrap();
        assert_eq!(base_only.len(), 1);
        assert_eq!(base_only.base(), chain.base());

        let two = chain.prefix(1).unwrap();
        assert_eq!(two.len(), 2);
        assert!(chain.has_prefix(&two));

        // A prefix index beyond the end clamps to the full chain.
        assert_eq!(chain.prefix(10).unwrap(), chain);

        assert_eq!(chain.suffix().len(), 3);
        assert!(chain.has_suffix());
        assert!(!base_only.has_suffix());
    }

    #[test]
    fn test_prefix_of_bottom_fails() {
        assert_eq!(
            ECChain::bottom().prefix(0),
            Err(GraniteError::ChainEmpty)
        );
    }

    #[test]
    fn test_has_base_and_prefix_relations() {
        let chain = create_test_chain(&[0, 1, 2]);
        let other = create_test_chain(&[0, 1]);
        let base = chain.base().unwrap().clone();

        assert!(chain.has_base(&base));
        assert!(chain.same_base(&other));
        assert!(chain.has_prefix(&other));
        assert!(!other.has_prefix(&chain));
        assert!(chain.has_prefix(&chain));
        assert!(!chain.has_prefix(&ECChain::bottom()));
        assert!(!ECChain::bottom().has_prefix(&chain));
    }

    #[test]
    fn test_extend_forks() {
        let base = create_test_chain(&[0]);
        let a = base.extend(&[b"fork-a".to_vec()]).unwrap();
        let b = base.extend(&[b"fork-b".to_vec()]).unwrap();

        assert_eq!(a.len(), 2);
        assert!(a.same_base(&b));
        assert_ne!(a, b);
        assert_eq!(a.head().unwrap().epoch, base.head().unwrap().epoch + 1);
        assert_eq!(a.head().unwrap().weight, base.head().unwrap().weight + 1);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_head_ordering() {
        let light = Tipset {
            epoch: 1,
            cid: b"b".to_vec(),
            weight: 1,
        };
        let heavy = Tipset {
            epoch: 1,
            cid: b"a".to_vec(),
            weight: 2,
        };
        assert_eq!(light.compare(&heavy), Ordering::Less);
        assert_eq!(heavy.compare(&light), Ordering::Greater);

        // Equal weight falls back to CID bytes.
        let tied = Tipset {
            epoch: 1,
            cid: b"c".to_vec(),
            weight: 1,
        };
        assert_eq!(light.compare(&tied), Ordering::Less);
    }
}
