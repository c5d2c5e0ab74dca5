//! LightChain: a permissionless ledger whose blocks and transactions live in
//! a skip graph overlay and are accepted through Proof-of-Validation.

pub mod chain;
pub mod config;
pub mod error;
pub mod hashing;
pub mod ledger;
pub mod network;
pub mod node;
pub mod skipgraph;
pub mod storage;
pub mod telemetry;
pub mod validation;
pub mod wallet;
