use super::Transaction;
use crate::hashing::Hasher;
use crate::skipgraph::{Identity, NameId};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Hash of the block this one extends; all zeros for genesis
    pub prev: NameId,
    pub owner: u64,
    pub address: String,
    pub transactions: Vec<Transaction>,
    /// Position in the chain, genesis is 0
    pub index: u64,
    pub hash: NameId,
    pub sigma: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(
        prev: NameId,
        owner: u64,
        address: impl Into<String>,
        transactions: Vec<Transaction>,
        index: u64,
        hasher: &dyn Hasher,
    ) -> Self {
        let hash = hasher.hash_str(
            &Self::material(&prev, owner, &transactions),
            prev.len(),
        );
        Self {
            prev,
            owner,
            address: address.into(),
            transactions,
            index,
            hash,
            sigma: Vec::new(),
        }
    }

    pub fn genesis(owner: u64, address: impl Into<String>, bits: usize, hasher: &dyn Hasher) -> Self {
        Self::new(NameId::zeros(bits), owner, address, Vec::new(), 0, hasher)
    }

    fn material(prev: &NameId, owner: u64, transactions: &[Transaction]) -> String {
        format!("{}{}{}", prev, owner, encode_transactions(transactions))
    }

    pub fn digest(&self, hasher: &dyn Hasher) -> NameId {
        hasher.hash_str(
            &Self::material(&self.prev, self.owner, &self.transactions),
            self.hash.len(),
        )
    }

    pub fn selection_seed(&self) -> String {
        Self::material(&self.prev, self.owner, &self.transactions)
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.address.clone(), self.hash.to_num(), self.prev.clone())
    }
}

/// Contained transactions as the concatenation of their hashes.
pub fn encode_transactions(transactions: &[Transaction]) -> String {
    transactions.iter().map(|t| t.hash.as_str()).collect()
}
