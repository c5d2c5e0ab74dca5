//! Chain tail tracking and extension on top of the overlay.

use crate::ledger::{Block, Entity, Transaction, ZERO_ID};
use crate::node::Node;
use crate::skipgraph::{Direction, Identity, NameId};
use crate::telemetry::Event;
use anyhow::{anyhow, bail};
use log::{debug, error, info, warn};
use std::time::Instant;

/// Result of one attempt at extending the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdateOutcome {
    /// The chain tail could not be located
    NoTail,
    /// Fewer transactions than needed point at the tail
    NotReady { found: usize },
    /// Validators refused the candidate block
    Rejected,
    Extended(Block),
}

impl Node {
    /// Current chain tail, found through the flag marker.
    pub async fn latest_block(&self) -> Option<Block> {
        let flag = self.query().search_by_num_id(ZERO_ID).await?;
        if flag.num_id != ZERO_ID {
            debug!("(chain) no flag in the overlay");
            return None;
        }
        self.block_by_num_id(flag.name_id.to_num()).await
    }

    /// Block stored under `num_id`, if the overlay holds one.
    pub async fn block_by_num_id(&self, num_id: u64) -> Option<Block> {
        let found = self.query().search_by_num_id(num_id).await?;
        if found.num_id != num_id {
            debug!("(chain) no entry {} in the overlay", num_id);
            return None;
        }
        match self.query().fetch(&found).await? {
            Entity::Block(block) => Some(block),
            other => {
                warn!("(chain) entry {} is a {}, not a block", num_id, other.kind());
                None
            }
        }
    }

    /// Every transaction named `name`. Walks both ways from the first match
    /// at the top level, where only entries with identical names are linked.
    pub async fn transactions_with_name_id(&self, name: &NameId) -> Vec<Transaction> {
        let first = match self.query().search_by_name_id(name).await {
            Some(first) if &first.name_id == name => first,
            _ => return Vec::new(),
        };

        let top = self.query().top_level();
        let mut bucket: Vec<Identity> = vec![first.clone()];
        for direction in [Direction::Left, Direction::Right] {
            let mut current = first.clone();
            while let Some(next) = self.query().neighbor(&current, top, direction).await {
                if &next.name_id != name || bucket.contains(&next) {
                    break;
                }
                bucket.push(next.clone());
                current = next;
            }
        }

        let mut transactions = Vec::new();
        for identity in &bucket {
            if let Some(Entity::Transaction(tx)) = self.query().fetch(identity).await {
                transactions.push(tx);
            }
        }
        debug!(
            "(chain) {} entries named {}, {} transactions",
            bucket.len(),
            name,
            transactions.len()
        );
        transactions
    }

    /// Records the tail as the last block of every owner with a transaction
    /// pointing at it.
    pub async fn update_view_table(&self) {
        let tail = match self.latest_block().await {
            Some(tail) => tail,
            None => {
                debug!("(chain) view not refreshed, no tail");
                return;
            }
        };
        let tail_num = tail.hash.to_num();
        let transactions = self.transactions_with_name_id(&tail.hash).await;

        let mut view = self.view();
        for tx in &transactions {
            view.record_last_block(tx.owner, tail_num);
        }
    }

    /// Tries to assemble, validate and publish the block following the tail.
    pub async fn view_update(&self) -> ViewUpdateOutcome {
        let started = Instant::now();
        let outcome = self.extend_chain().await;
        self.telemetry.record(Event::ViewUpdate {
            extended: matches!(outcome, ViewUpdateOutcome::Extended(_)),
            latency: started.elapsed(),
        });
        outcome
    }

    async fn extend_chain(&self) -> ViewUpdateOutcome {
        let tail = match self.latest_block().await {
            Some(tail) => tail,
            None => {
                warn!("(chain) view update without a tail");
                return ViewUpdateOutcome::NoTail;
            }
        };
        let transactions = self.transactions_with_name_id(&tail.hash).await;
        if transactions.len() < self.config.protocol.tx_min {
            debug!(
                "(chain) {} of {} transactions on {}",
                transactions.len(),
                self.config.protocol.tx_min,
                tail.hash
            );
            return ViewUpdateOutcome::NotReady {
                found: transactions.len(),
            };
        }

        let mut block = Block::new(
            tail.hash.clone(),
            self.num_id(),
            self.address(),
            transactions,
            tail.index + 1,
            &*self.hasher,
        );
        if !self.validate_block(&mut block).await {
            return ViewUpdateOutcome::Rejected;
        }
        if !self.overlay.insert(block.clone().into()).await {
            error!("(chain) validated block {} could not be inserted", block.hash);
            return ViewUpdateOutcome::Rejected;
        }

        self.move_flag(&tail, &block).await;
        info!("(chain) extended chain to block {} at index {}", block.hash, block.index);
        ViewUpdateOutcome::Extended(block)
    }

    /// Deletes the flag from whoever hosts it and re-inserts it here, named
    /// after the new tail.
    async fn move_flag(&self, tail: &Block, block: &Block) {
        let host = match self.query().search_by_num_id(ZERO_ID).await {
            Some(flag) if flag.num_id == ZERO_ID => flag.address,
            _ => tail.address.clone(),
        };
        if let Err(e) = self.rpc.peer(&host).delete(ZERO_ID).await {
            warn!("(chain) removing flag from {} failed: {}", host, e);
        }

        let flag = Identity::new(self.address(), ZERO_ID, block.hash.clone());
        if !self.overlay.insert(Entity::Flag(flag)).await {
            error!("(chain) flag for {} could not be inserted", block.hash);
        }
    }

    /// Founds a chain: inserts the genesis block and a flag pointing at it.
    pub async fn insert_genesis(&self) -> anyhow::Result<Block> {
        let genesis = Block::genesis(
            self.num_id(),
            self.address(),
            self.config.protocol.name_bits,
            &*self.hasher,
        );
        let flag = Identity::new(self.address(), ZERO_ID, genesis.hash.clone());
        if !self.overlay.insert(Entity::Flag(flag)).await {
            bail!("flag for genesis {} could not be inserted", genesis.hash);
        }
        if !self.overlay.insert(genesis.clone().into()).await {
            bail!("genesis {} could not be inserted", genesis.hash);
        }
        info!("(chain) inserted genesis {}", genesis.hash);
        Ok(genesis)
    }

    /// Issues a transaction on the current tail. Returns `None` when the
    /// validators rejected it.
    pub async fn create_transaction(&self, content: &str) -> anyhow::Result<Option<Transaction>> {
        let tail = self
            .latest_block()
            .await
            .ok_or_else(|| anyhow!("no chain tail to build on"))?;
        let mut tx = Transaction::new(
            tail.hash.clone(),
            self.num_id(),
            content,
            self.address(),
            &*self.hasher,
        );
        if !self.validate_transaction(&mut tx).await {
            info!("(chain) transaction {} rejected", tx.hash);
            return Ok(None);
        }
        if !self.overlay.insert(tx.clone().into()).await {
            bail!("validated transaction {} could not be inserted", tx.hash);
        }
        info!("(chain) transaction {} accepted", tx.hash);
        Ok(Some(tx))
    }
}
