use crate::hashing::Hasher;
use crate::skipgraph::{Identity, NameId};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Hash of the block this transaction points at
    pub prev: NameId,
    /// numID of the issuing peer
    pub owner: u64,
    pub content: String,
    /// Address of the issuing peer
    pub address: String,
    pub hash: NameId,
    /// Owner signature first, then one per validator
    pub sigma: Vec<Vec<u8>>,
}

impl Transaction {
    pub fn new(
        prev: NameId,
        owner: u64,
        content: impl Into<String>,
        address: impl Into<String>,
        hasher: &dyn Hasher,
    ) -> Self {
        let content = content.into();
        let hash = hasher.hash_str(&Self::material(&prev, owner, &content), prev.len());
        Self {
            prev,
            owner,
            content,
            address: address.into(),
            hash,
            sigma: Vec::new(),
        }
    }

    fn material(prev: &NameId, owner: u64, content: &str) -> String {
        format!("{}{}{}", prev, owner, content)
    }

    /// Hash recomputed from the content, to compare against `hash`.
    pub fn digest(&self, hasher: &dyn Hasher) -> NameId {
        hasher.hash_str(
            &Self::material(&self.prev, self.owner, &self.content),
            self.hash.len(),
        )
    }

    /// Input hashed with the attempt counter when picking validators.
    pub fn selection_seed(&self) -> String {
        Self::material(&self.prev, self.owner, &self.content)
    }

    /// Transactions are found by the block they point at.
    pub fn identity(&self) -> Identity {
        Identity::new(self.address.clone(), self.hash.to_num(), self.prev.clone())
    }
}
