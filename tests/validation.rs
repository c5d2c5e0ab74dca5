mod common;

use common::{wallet, Cluster};
use lightchain_node::config::HonestyMode;
use lightchain_node::hashing::Keccak;
use lightchain_node::ledger::{Block, Transaction};
use lightchain_node::skipgraph::NameId;
use lightchain_node::telemetry::Event;
use std::collections::HashSet;

#[tokio::test]
async fn validators_are_distinct_and_exclude_the_initiator() {
    let cluster = Cluster::start(8).await;
    let initiator = &cluster.nodes[1];
    let validators = initiator.get_validators("some transaction").await;

    assert!(!validators.is_empty());
    assert!(validators.len() <= initiator.config().protocol.signatures_threshold);
    let addresses: HashSet<_> = validators.iter().map(|v| v.address.clone()).collect();
    assert_eq!(addresses.len(), validators.len());
    assert!(!addresses.contains(initiator.address()));
}

#[tokio::test]
async fn small_overlay_yields_short_validator_set() {
    let cluster = Cluster::start(3).await;
    let validators = cluster.nodes[0].get_validators("seed").await;
    assert!(validators.len() <= 2);
}

#[tokio::test]
async fn authenticity_needs_matching_hash_and_owner_signature() {
    let cluster = Cluster::start(5).await;
    let genesis = cluster.nodes[0].insert_genesis().await.unwrap();
    let owner = &cluster.nodes[1];
    let validator = &cluster.nodes[2];

    let mut tx = Transaction::new(genesis.hash.clone(), owner.num_id(), "pay 3", owner.address(), &Keccak);
    assert!(!validator.is_authenticated_transaction(&tx).await);

    tx.sigma = vec![wallet(4).sign(&tx.hash).await.unwrap()];
    assert!(!validator.is_authenticated_transaction(&tx).await);

    tx.sigma = vec![wallet(1).sign(&tx.hash).await.unwrap()];
    assert!(validator.is_authenticated_transaction(&tx).await);

    let attestation = validator.pov_transaction(&tx).await;
    assert!(attestation.is_signed());
    assert!(attestation.authenticated && attestation.sound && attestation.correct && attestation.balance);

    let mut tampered = tx.clone();
    tampered.content = "pay 300".to_string();
    assert!(!validator.is_authenticated_transaction(&tampered).await);
    let attestation = validator.pov_transaction(&tampered).await;
    assert!(!attestation.is_signed());
    assert!(!attestation.authenticated);
}

#[tokio::test]
async fn owner_key_must_hash_to_owner() {
    let cluster = Cluster::start(3).await;
    let owner = &cluster.nodes[1];
    let key = cluster.nodes[0].owner_public_key(owner.num_id()).await;
    assert_eq!(key, Some(owner.public_key()));
    assert_eq!(cluster.nodes[0].owner_public_key(owner.num_id() ^ 1).await, None);
}

#[tokio::test]
async fn second_transaction_on_the_same_block_is_unsound() {
    let cluster = Cluster::start(8).await;
    cluster.nodes[0].insert_genesis().await.unwrap();
    let owner = &cluster.nodes[1];

    let first = owner.create_transaction("first").await.unwrap();
    assert!(first.is_some());
    let second = owner.create_transaction("second").await.unwrap();
    assert!(second.is_none());

    let events = cluster.telemetry[1].events();
    assert!(matches!(
        events.last(),
        Some(Event::TransactionValidation { validated: false, tallies, .. }) if tallies.sound == 0
    ));
}

#[tokio::test]
async fn first_rejection_stops_validation() {
    let mut modes = vec![HonestyMode::Malicious; 7];
    modes[1] = HonestyMode::Honest;
    let cluster = Cluster::with_modes(&modes).await;
    cluster.nodes[0].insert_genesis().await.unwrap();

    let initiator = &cluster.nodes[1];
    assert!(initiator.create_transaction("pay").await.unwrap().is_none());

    match cluster.telemetry[1].events().last() {
        Some(Event::TransactionValidation {
            validated,
            tallies,
            ..
        }) => {
            assert!(!validated);
            assert_eq!(tallies.authenticated, 1);
            assert_eq!(tallies.correct, 0);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn accepted_transaction_carries_all_signatures() {
    let cluster = Cluster::start(8).await;
    cluster.nodes[0].insert_genesis().await.unwrap();
    let owner = &cluster.nodes[2];
    let tx = owner.create_transaction("pay 1").await.unwrap().unwrap();

    let threshold = owner.config().protocol.signatures_threshold;
    assert!(tx.sigma.len() >= 2 && tx.sigma.len() <= threshold + 1);
    let found = cluster.nodes[5].overlay().search_by_num_id(tx.hash.to_num()).await;
    assert_eq!(found, Some(tx.identity()));
}

#[tokio::test]
async fn block_off_the_tail_is_not_signed() {
    let cluster = Cluster::start(8).await;
    let genesis = cluster.nodes[0].insert_genesis().await.unwrap();
    let owner = &cluster.nodes[1];
    let validator = &cluster.nodes[3];
    let tx = owner.create_transaction("pay").await.unwrap().unwrap();

    let mut stray = Block::new(
        NameId::from_num(12345, 30),
        owner.num_id(),
        owner.address(),
        vec![tx.clone()],
        1,
        &Keccak,
    );
    stray.sigma = vec![wallet(1).sign(&stray.hash).await.unwrap()];
    assert!(!validator.is_consistent(&stray).await);
    let attestation = validator.pov_block(&stray).await;
    assert!(attestation.authenticated);
    assert!(!attestation.is_signed());

    let mut block = Block::new(genesis.hash.clone(), owner.num_id(), owner.address(), vec![tx], 1, &Keccak);
    block.sigma = vec![wallet(1).sign(&block.hash).await.unwrap()];
    assert!(validator.is_consistent(&block).await);
    assert!(validator.pov_block(&block).await.is_signed());
}

#[tokio::test]
async fn block_with_altered_transaction_is_not_authenticated() {
    let cluster = Cluster::start(8).await;
    let genesis = cluster.nodes[0].insert_genesis().await.unwrap();
    let owner = &cluster.nodes[1];
    let validator = &cluster.nodes[3];
    let mut tx = owner.create_transaction("pay 3").await.unwrap().unwrap();
    tx.content = "pay 300".to_string();

    let mut block = Block::new(genesis.hash.clone(), owner.num_id(), owner.address(), vec![tx], 1, &Keccak);
    block.sigma = vec![wallet(1).sign(&block.hash).await.unwrap()];
    assert!(validator.is_authenticated_block(&block).await);
    assert!(validator.is_consistent(&block).await);

    let attestation = validator.pov_block(&block).await;
    assert!(!attestation.authenticated);
    assert!(!attestation.is_signed());
}

#[tokio::test]
async fn validation_outcomes_are_recorded_with_the_initiator_mode() {
    let mut modes = vec![HonestyMode::Honest; 7];
    modes[1] = HonestyMode::Malicious;
    let cluster = Cluster::with_modes(&modes).await;
    cluster.nodes[0].insert_genesis().await.unwrap();

    assert!(cluster.nodes[1].create_transaction("pay").await.unwrap().is_none());
    let events = &cluster.telemetry[1];
    assert_eq!(events.validation_counts(HonestyMode::Malicious), (1, 0));
    assert_eq!(events.validation_counts(HonestyMode::Honest), (0, 0));
}
