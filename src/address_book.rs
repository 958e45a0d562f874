//! C1: the fixed, weighted set of nodes for an epoch (spec §4.1).
use crate::error::FatalError;

/// A node's position in the address book. Nodes are numbered `[0, N)`.
pub type NodeId = u64;

/// The fixed, ordered set of nodes participating in consensus for an
/// epoch, together with their stakes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressBook {
    stakes: Vec<u64>,
    total_stake: u64,
}

impl AddressBook {
    /// Builds an address book from per-node stakes, indexed by `NodeId`.
    ///
    /// Fails with [`FatalError::InvalidAddressBook`] if there are no nodes.
    /// Stakes are unsigned, so "negative stake" from the spec can only
    /// manifest as a caller passing a value it never should have computed;
    /// callers building stakes from signed sources must reject negatives
    /// before calling this constructor.
    pub fn new(stakes: Vec<u64>) -> Result<Self, FatalError> {
        if stakes.is_empty() {
            return Err(FatalError::InvalidAddressBook("address book is empty"));
        }
        let total_stake = stakes.iter().sum();
        Ok(Self {
            stakes,
            total_stake,
        })
    }

    /// Number of nodes, `N`.
    pub fn size(&self) -> usize {
        self.stakes.len()
    }

    /// The stake of a single node.
    pub fn stake(&self, id: NodeId) -> u64 {
        self.stakes[id as usize]
    }

    /// Sum of all stakes.
    pub fn total_stake(&self) -> u64 {
        self.total_stake
    }

    /// Whether `id` is a valid node in this address book.
    pub fn contains(&self, id: NodeId) -> bool {
        (id as usize) < self.stakes.len()
    }

    /// An iterator over all node ids, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        0..self.stakes.len() as NodeId
    }

    /// Whether `sum_of_stakes` constitutes a supermajority, i.e. strictly
    /// more than 2/3 of total stake: `sum > floor(2*total/3)`.
    pub fn is_supermajority(&self, sum_of_stakes: u64) -> bool {
        sum_of_stakes > 2 * self.total_stake / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_book() {
        assert!(AddressBook::new(vec![]).is_err());
    }

    #[test]
    fn supermajority_boundary_three_equal() {
        let book = AddressBook::new(vec![1, 1, 1]).unwrap();
        assert!(!book.is_supermajority(2));
        assert!(book.is_supermajority(3));
    }

    #[test]
    fn supermajority_boundary_four_equal() {
        let book = AddressBook::new(vec![1, 1, 1, 1]).unwrap();
        assert!(!book.is_supermajority(2));
        assert!(book.is_supermajority(3));
    }

    #[test]
    fn supermajority_boundary_skewed() {
        let book = AddressBook::new(vec![10, 10, 10, 1]).unwrap();
        // total = 31, floor(2*31/3) = 20
        assert!(!book.is_supermajority(20));
        assert!(book.is_supermajority(21));
    }
}
