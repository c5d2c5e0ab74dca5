//! Ledger records and the local view over them.

mod block;
mod transaction;
mod view;

pub use block::{encode_transactions, Block};
pub use transaction::Transaction;
pub use view::{ViewEntry, ViewTable};

use crate::skipgraph::{Identity, NameId};
use serde::{Deserialize, Serialize};

/// numID of the flag marker pointing at the chain tail.
pub const ZERO_ID: u64 = 0;

/// Anything a node can host in the overlay.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A peer's main identity
    Peer(Identity),
    /// Zero-numID marker whose name is the hash of the chain tail
    Flag(Identity),
    Transaction(Transaction),
    Block(Block),
}

impl Entity {
    pub fn num_id(&self) -> u64 {
        match self {
            Entity::Peer(id) | Entity::Flag(id) => id.num_id,
            Entity::Transaction(tx) => tx.hash.to_num(),
            Entity::Block(block) => block.hash.to_num(),
        }
    }

    pub fn name_id(&self) -> &NameId {
        match self {
            Entity::Peer(id) | Entity::Flag(id) => &id.name_id,
            Entity::Transaction(tx) => &tx.prev,
            Entity::Block(block) => &block.prev,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Entity::Peer(id) | Entity::Flag(id) => &id.address,
            Entity::Transaction(tx) => &tx.address,
            Entity::Block(block) => &block.address,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.address(), self.num_id(), self.name_id().clone())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Peer(_) => "peer",
            Entity::Flag(_) => "flag",
            Entity::Transaction(_) => "transaction",
            Entity::Block(_) => "block",
        }
    }
}

impl From<Transaction> for Entity {
    fn from(tx: Transaction) -> Self {
        Entity::Transaction(tx)
    }
}

impl From<Block> for Entity {
    fn from(block: Block) -> Self {
        Entity::Block(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Keccak;

    #[test]
    fn transaction_is_named_after_its_block() {
        let genesis = Block::genesis(11, "n", 30, &Keccak);
        let tx = Transaction::new(genesis.hash.clone(), 12, "pay", "m", &Keccak);
        let entity = Entity::from(tx.clone());
        assert_eq!(entity.name_id(), &genesis.hash);
        assert_eq!(entity.num_id(), tx.hash.to_num());
        assert_eq!(entity.identity(), tx.identity());
    }

    #[test]
    fn hashes_are_recomputable() {
        let genesis = Block::genesis(11, "n", 30, &Keccak);
        assert_eq!(genesis.digest(&Keccak), genesis.hash);
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.prev, NameId::zeros(30));

        let mut tx = Transaction::new(genesis.hash.clone(), 12, "pay", "m", &Keccak);
        assert_eq!(tx.digest(&Keccak), tx.hash);
        tx.content.push('!');
        assert_ne!(tx.digest(&Keccak), tx.hash);
    }

    #[test]
    fn block_hash_covers_transactions() {
        let genesis = Block::genesis(11, "n", 30, &Keccak);
        let a = Transaction::new(genesis.hash.clone(), 1, "a", "x", &Keccak);
        let b = Transaction::new(genesis.hash.clone(), 2, "b", "y", &Keccak);
        let one = Block::new(genesis.hash.clone(), 11, "n", vec![a.clone()], 1, &Keccak);
        let two = Block::new(genesis.hash.clone(), 11, "n", vec![a, b], 1, &Keccak);
        assert_ne!(one.hash, two.hash);
        assert_eq!(two.hash.len(), 30);
    }
}
