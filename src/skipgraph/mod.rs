//! Skip graph overlay: identities, routing and the query surface the ledger uses.

mod identity;
mod overlay;

pub use identity::{common_bits, Direction, Identity, NameId};
pub use overlay::Overlay;

use crate::ledger::Entity;
use async_trait::async_trait;

/// Narrow read interface over the overlay.
#[async_trait]
pub trait OverlayQuery: Send + Sync {
    async fn search_by_num_id(&self, target: u64) -> Option<Identity>;

    async fn search_by_name_id(&self, target: &NameId) -> Option<Identity>;

    /// Neighbor of the entry `of` at a fixed level, read from the node hosting it.
    async fn neighbor(&self, of: &Identity, level: usize, direction: Direction)
        -> Option<Identity>;

    /// Entity stored behind an identity.
    async fn fetch(&self, identity: &Identity) -> Option<Entity>;

    /// Highest level of the lookup table.
    fn top_level(&self) -> usize;
}
