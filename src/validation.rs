//! Proof-of-Validation: validator selection, the initiator's signature
//! collection and the predicates a validator checks before signing.

use crate::ledger::{Block, Transaction};
use crate::network::Request;
use crate::node::Node;
use crate::skipgraph::{Identity, NameId};
use crate::telemetry::{Event, PredicateTallies};
use crate::wallet::{key_num_id, verify, PublicKey};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

/// A validator's answer to PoV.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    /// Signature over the entity hash, `None` when any predicate failed
    pub signature: Option<Vec<u8>>,
    pub authenticated: bool,
    pub sound: bool,
    pub correct: bool,
    pub balance: bool,
}

impl Attestation {
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

impl PredicateTallies {
    fn count(&mut self, attestation: &Attestation) {
        self.authenticated += attestation.authenticated as usize;
        self.sound += attestation.sound as usize;
        self.correct += attestation.correct as usize;
        self.balance += attestation.balance as usize;
    }
}

/// Ledger records that go through validation.
trait Attestable: Send + Sync {
    fn hash(&self) -> &NameId;
    fn selection_seed(&self) -> String;
    fn sigma_mut(&mut self) -> &mut Vec<Vec<u8>>;
    fn pov_request(&self) -> Request;
}

impl Attestable for Transaction {
    fn hash(&self) -> &NameId {
        &self.hash
    }

    fn selection_seed(&self) -> String {
        Transaction::selection_seed(self)
    }

    fn sigma_mut(&mut self) -> &mut Vec<Vec<u8>> {
        &mut self.sigma
    }

    fn pov_request(&self) -> Request {
        Request::ValidateTransaction(self.clone())
    }
}

impl Attestable for Block {
    fn hash(&self) -> &NameId {
        &self.hash
    }

    fn selection_seed(&self) -> String {
        Block::selection_seed(self)
    }

    fn sigma_mut(&mut self) -> &mut Vec<Vec<u8>> {
        &mut self.sigma
    }

    fn pov_request(&self) -> Request {
        Request::ValidateBlock(self.clone())
    }
}

impl Node {
    /// Picks up to `signatures_threshold` distinct peers for `seed` by
    /// numeric-searching `hash(seed ++ attempt)` for attempts `0..=alpha`.
    /// The node itself never validates its own entities.
    pub async fn get_validators(&self, seed: &str) -> Vec<Identity> {
        let params = &self.config.protocol;
        let mut taken = HashSet::new();
        taken.insert(self.address().to_string());

        let mut validators = Vec::with_capacity(params.signatures_threshold);
        for attempt in 0..=params.alpha {
            if validators.len() >= params.signatures_threshold {
                break;
            }
            let target = self
                .hasher
                .hash_str(&format!("{}{}", seed, attempt), params.name_bits)
                .to_num();
            if let Some(found) = self.query().search_by_num_id(target).await {
                if taken.insert(found.address.clone()) {
                    debug!("(validation) attempt {} picked {}", attempt, found.address);
                    validators.push(found);
                }
            }
        }

        if validators.len() < params.signatures_threshold {
            warn!(
                "(validation) only {} of {} validators found",
                validators.len(),
                params.signatures_threshold
            );
        }
        validators
    }

    /// Collects PoV signatures for `tx`. On success its `sigma` holds the
    /// owner signature followed by one signature per validator.
    pub async fn validate_transaction(&self, tx: &mut Transaction) -> bool {
        let started = Instant::now();
        let mut tallies = PredicateTallies::default();
        let validated = self.collect_signatures(tx, &mut tallies).await;
        self.telemetry.record(Event::TransactionValidation {
            mode: self.mode(),
            validated,
            tallies,
            latency: started.elapsed(),
        });
        validated
    }

    pub async fn validate_block(&self, block: &mut Block) -> bool {
        let started = Instant::now();
        let mut tallies = PredicateTallies::default();
        let validated = self.collect_signatures(block, &mut tallies).await;
        self.telemetry.record(Event::BlockValidation {
            mode: self.mode(),
            validated,
            latency: started.elapsed(),
        });
        validated
    }

    /// Contacts validators one after the other and stops at the first one
    /// that does not sign.
    async fn collect_signatures<T: Attestable>(
        &self,
        entity: &mut T,
        tallies: &mut PredicateTallies,
    ) -> bool {
        self.update_view_table().await;

        let own = match self.wallet.sign(entity.hash()).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!("(validation) signing {} failed: {}", entity.hash(), e);
                return false;
            }
        };
        *entity.sigma_mut() = vec![own];

        let validators = self.get_validators(&entity.selection_seed()).await;
        for validator in &validators {
            let attestation = match self
                .rpc
                .peer(&validator.address)
                .attest(entity.pov_request())
                .await
            {
                Ok(attestation) => attestation,
                Err(e) => {
                    warn!("(validation) validator {} failed: {}", validator.address, e);
                    return false;
                }
            };
            tallies.count(&attestation);
            match attestation.signature {
                Some(signature) => entity.sigma_mut().push(signature),
                None => {
                    info!(
                        "(validation) {} rejected {}: auth={} sound={} correct={} balance={}",
                        validator.address,
                        entity.hash(),
                        attestation.authenticated,
                        attestation.sound,
                        attestation.correct,
                        attestation.balance
                    );
                    return false;
                }
            }
        }
        info!(
            "(validation) {} validated by {} peers",
            entity.hash(),
            validators.len()
        );
        true
    }

    /// Validator side of PoV for a transaction. Every predicate is evaluated
    /// so the returned flags are complete.
    pub async fn pov_transaction(&self, tx: &Transaction) -> Attestation {
        self.update_view_table().await;
        let authenticated = self.is_authenticated_transaction(tx).await;
        let sound = self.is_sound(tx).await;
        let correct = self.is_correct(tx).await;
        let balance = self.has_balance_compliance(tx);

        let signature = if authenticated && sound && correct && balance {
            self.sign_attestation(&tx.hash).await
        } else {
            None
        };
        Attestation {
            signature,
            authenticated,
            sound,
            correct,
            balance,
        }
    }

    /// Validator side of PoV for a block.
    pub async fn pov_block(&self, block: &Block) -> Attestation {
        self.update_view_table().await;
        let mut authenticated = self.is_authenticated_block(block).await;
        let consistent = self.is_consistent(block).await;
        for tx in &block.transactions {
            if !authenticated {
                break;
            }
            authenticated = self.is_authenticated_transaction(tx).await;
        }

        let signature = if authenticated && consistent {
            self.sign_attestation(&block.hash).await
        } else {
            info!(
                "(validation) block {} auth={} consistent={}",
                block.hash, authenticated, consistent
            );
            None
        };
        Attestation {
            signature,
            authenticated,
            sound: true,
            correct: true,
            balance: true,
        }
    }

    async fn sign_attestation(&self, hash: &NameId) -> Option<Vec<u8>> {
        match self.wallet.sign(hash).await {
            Ok(signature) => Some(signature),
            Err(e) => {
                warn!("(validation) signing attestation failed: {}", e);
                None
            }
        }
    }

    pub async fn is_authenticated_transaction(&self, tx: &Transaction) -> bool {
        self.is_authenticated(&tx.hash, tx.digest(&*self.hasher), &tx.sigma, tx.owner)
            .await
    }

    pub async fn is_authenticated_block(&self, block: &Block) -> bool {
        self.is_authenticated(
            &block.hash,
            block.digest(&*self.hasher),
            &block.sigma,
            block.owner,
        )
        .await
    }

    async fn is_authenticated(
        &self,
        hash: &NameId,
        digest: NameId,
        sigma: &[Vec<u8>],
        owner: u64,
    ) -> bool {
        if &digest != hash {
            debug!("(validation) {} does not match its content", hash);
            return false;
        }
        match self.owner_public_key(owner).await {
            Some(key) => sigma.iter().any(|signature| verify(hash, signature, &key)),
            None => false,
        }
    }

    /// Resolves an owner numID to its key and checks the key hashes back to it.
    pub async fn owner_public_key(&self, owner: u64) -> Option<PublicKey> {
        let found = self.query().search_by_num_id(owner).await?;
        if found.num_id != owner {
            debug!("(validation) owner {} not in the overlay", owner);
            return None;
        }
        let key = match self.rpc.peer(&found.address).get_public_key().await {
            Ok(key) => key,
            Err(e) => {
                warn!("(validation) key of {} unavailable: {}", owner, e);
                return None;
            }
        };
        if key_num_id(&*self.hasher, &key, self.config.protocol.name_bits) != owner {
            warn!("(validation) key served by {} is not owner {}", found.address, owner);
            return None;
        }
        Some(key)
    }

    /// The block a transaction points at must come strictly after the last
    /// block its owner was seen on.
    pub async fn is_sound(&self, tx: &Transaction) -> bool {
        let prev = tx.prev.to_num();
        let known = self.view().seed_last_block(tx.owner, prev);
        let last = match known {
            Some(last) => last,
            None => return true,
        };

        let prev = match self.block_by_num_id(prev).await {
            Some(block) => block,
            None => return false,
        };
        let last = match self.block_by_num_id(last).await {
            Some(block) => block,
            None => return false,
        };
        prev.index > last.index
    }

    /// The owner must run in the same mode as this validator.
    pub async fn is_correct(&self, tx: &Transaction) -> bool {
        let cached = self.view().mode(tx.owner);
        let mode = match cached {
            Some(mode) => mode,
            None => match self.rpc.peer(&tx.address).get_mode().await {
                Ok(mode) => {
                    self.view().record_mode(tx.owner, mode);
                    mode
                }
                Err(e) => {
                    warn!("(validation) mode of {} unavailable: {}", tx.address, e);
                    return false;
                }
            },
        };
        mode == self.mode()
    }

    pub fn has_balance_compliance(&self, tx: &Transaction) -> bool {
        let params = &self.config.protocol;
        let balance = self.view().balance_or_seed(tx.owner, params.initial_balance);
        match balance {
            Some(balance) => balance >= params.validation_fee,
            None => true,
        }
    }

    /// A block extends the chain only if it points at the current tail.
    pub async fn is_consistent(&self, block: &Block) -> bool {
        match self.latest_block().await {
            Some(tail) => tail.hash == block.prev,
            None => false,
        }
    }
}
