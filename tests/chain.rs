mod common;

use common::Cluster;
use lightchain_node::chain::ViewUpdateOutcome;
use lightchain_node::ledger::{Entity, ZERO_ID};
use lightchain_node::skipgraph::NameId;
use lightchain_node::telemetry::Event;

#[tokio::test]
async fn every_node_sees_the_genesis_tail() {
    let cluster = Cluster::start(5).await;
    let genesis = cluster.nodes[0].insert_genesis().await.unwrap();
    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.prev, NameId::zeros(30));

    for node in &cluster.nodes {
        assert_eq!(node.latest_block().await, Some(genesis.clone()));
    }
}

#[tokio::test]
async fn no_tail_without_genesis() {
    let cluster = Cluster::start(3).await;
    assert_eq!(cluster.nodes[1].latest_block().await, None);
    assert_eq!(cluster.nodes[1].view_update().await, ViewUpdateOutcome::NoTail);
    assert!(cluster.nodes[1].create_transaction("early").await.is_err());
}

#[tokio::test]
async fn too_few_transactions_is_not_ready() {
    let cluster = Cluster::start(6).await;
    cluster.nodes[0].insert_genesis().await.unwrap();
    for node in &cluster.nodes[1..3] {
        assert!(node.create_transaction("pay").await.unwrap().is_some());
    }
    assert_eq!(
        cluster.nodes[4].view_update().await,
        ViewUpdateOutcome::NotReady { found: 2 }
    );
}

#[tokio::test]
async fn view_table_tracks_owners_on_the_tail() {
    let cluster = Cluster::start(6).await;
    let genesis = cluster.nodes[0].insert_genesis().await.unwrap();
    let owner = &cluster.nodes[3];
    owner.create_transaction("pay").await.unwrap().unwrap();

    let observer = &cluster.nodes[5];
    assert_eq!(observer.transactions_with_name_id(&genesis.hash).await.len(), 1);
    observer.update_view_table().await;
    let entry = observer.view_entry(owner.num_id()).unwrap();
    assert_eq!(entry.last_block, Some(genesis.hash.to_num()));
}

#[tokio::test]
async fn four_transactions_extend_the_chain() {
    let cluster = Cluster::start(8).await;
    let founder = &cluster.nodes[0];
    let genesis = founder.insert_genesis().await.unwrap();

    for (i, node) in cluster.nodes[1..5].iter().enumerate() {
        let tx = node.create_transaction(&format!("pay {}", i)).await.unwrap();
        assert!(tx.is_some(), "transaction of node {} rejected", i + 1);
    }

    let extender = &cluster.nodes[6];
    let block = match extender.view_update().await {
        ViewUpdateOutcome::Extended(block) => block,
        other => panic!("chain not extended: {:?}", other),
    };
    assert_eq!(block.index, 1);
    assert_eq!(block.prev, genesis.hash);
    assert_eq!(block.transactions.len(), 4);
    assert!(block.sigma.len() >= 2);

    for node in &cluster.nodes {
        assert_eq!(node.latest_block().await.map(|b| b.hash), Some(block.hash.clone()));
    }
    let flag = founder.overlay().search_by_num_id(ZERO_ID).await.unwrap();
    assert_eq!(flag.address, extender.address());
    assert_eq!(flag.name_id, block.hash);
    assert!(!founder.hosted().iter().any(|e| matches!(e, Entity::Flag(_))));

    assert!(cluster.telemetry[6]
        .events()
        .iter()
        .any(|e| matches!(e, Event::ViewUpdate { extended: true, .. })));

    let next = cluster.nodes[1].create_transaction("pay again").await.unwrap().unwrap();
    assert_eq!(next.prev, block.hash);
}

#[tokio::test]
async fn founder_extends_the_chain_with_a_full_quorum() {
    let cluster = Cluster::start(16).await;
    let founder = &cluster.nodes[0];
    let genesis = founder.insert_genesis().await.unwrap();
    for node in &cluster.nodes[1..5] {
        assert!(node.create_transaction("pay").await.unwrap().is_some());
    }

    let block = match founder.view_update().await {
        ViewUpdateOutcome::Extended(block) => block,
        other => panic!("chain not extended: {:?}", other),
    };
    assert_eq!(block.prev, genesis.hash);
    let threshold = founder.config().protocol.signatures_threshold;
    assert_eq!(block.sigma.len(), threshold + 1);

    let flag = cluster.nodes[9].overlay().search_by_num_id(ZERO_ID).await.unwrap();
    assert_eq!(flag.num_id, ZERO_ID);
    assert_eq!(flag.address, founder.address());
    assert_eq!(flag.name_id, block.hash);
}

#[tokio::test]
async fn entries_stay_findable_by_name_over_several_blocks() {
    let cluster = Cluster::start(12).await;
    let founder = &cluster.nodes[0];
    founder.insert_genesis().await.unwrap();

    for round in 0..3 {
        for node in &cluster.nodes[1..=5] {
            let tx = node.create_transaction(&format!("round {}", round)).await.unwrap();
            assert!(tx.is_some(), "round {} transaction rejected", round);
        }
        let outcome = founder.view_update().await;
        assert!(
            matches!(outcome, ViewUpdateOutcome::Extended(_)),
            "round {}: {:?}",
            round,
            outcome
        );
    }

    for from in &cluster.nodes {
        for host in &cluster.nodes {
            for entity in host.hosted() {
                let found = from.overlay().search_by_name_id(entity.name_id()).await;
                assert_eq!(found.map(|f| f.name_id), Some(entity.name_id().clone()));
            }
        }
    }
}
