use super::{common_bits, Direction, Identity, NameId, OverlayQuery};
use crate::ledger::Entity;
use crate::network::{LinkUpdate, Rpc};
use crate::storage::Storage;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;

/// Where [`Overlay::link`] starts looking for a gap.
enum Anchor {
    /// Somewhere right of this entry
    After(Identity),
    /// Left of this entry, which is assumed to head its list
    Before(Identity),
}

/// This process's share of the skip graph: the entries it hosts, their
/// lookup table, and the routing algorithms running over them.
pub struct Overlay {
    address: String,
    introducer: Option<String>,
    max_hops: u32,
    storage: Storage,
    rpc: Arc<Rpc>,
}

impl Overlay {
    /// `levels` is the name length in bits, which is also the highest level.
    pub fn new(
        address: String,
        introducer: Option<String>,
        levels: usize,
        max_hops: u32,
        rpc: Arc<Rpc>,
    ) -> Self {
        Self {
            address,
            introducer,
            max_hops,
            storage: Storage::new(levels),
            rpc,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn top_level(&self) -> usize {
        self.storage.levels()
    }

    /// Links `entity` into every level of the overlay and starts hosting it.
    ///
    /// Returns `false` when no position could be found, e.g. because the
    /// introducer is unreachable; nothing is stored in that case.
    pub async fn insert(&self, entity: Entity) -> bool {
        let node = entity.identity();

        let position = if self.storage.is_empty() {
            match &self.introducer {
                None => {
                    let slot = self.storage.reserve_slot(node.clone());
                    self.storage.activate(slot, entity);
                    info!("(overlay) founded overlay with {}", node);
                    return true;
                }
                Some(introducer) => {
                    match self.rpc.peer(introducer).search_by_num_id(node.num_id).await {
                        Ok(Some(position)) => position,
                        Ok(None) => {
                            warn!(
                                "(overlay) introducer {} hosts nothing, {} not inserted",
                                introducer, node
                            );
                            return false;
                        }
                        Err(e) => {
                            warn!(
                                "(overlay) introducer {} unreachable, {} not inserted: {}",
                                introducer, node, e
                            );
                            return false;
                        }
                    }
                }
            }
        } else {
            match self.search_by_num_id(node.num_id).await {
                Some(position) => position,
                None => return false,
            }
        };
        debug!("(overlay) inserting {} next to {}", node, position);

        let slot = self.storage.reserve_slot(node.clone());
        let (mut left, mut right) = match self.link(&node, 0, Anchor::After(position)).await {
            Some(neighbors) => neighbors,
            None => {
                self.storage.release(slot);
                warn!("(overlay) no level 0 position for {}", node);
                return false;
            }
        };

        for level in 0..self.top_level() {
            let mut anchor = None;
            if let Some(from) = &left {
                anchor = self
                    .level_up(&node, level, Direction::Left, from)
                    .await
                    .map(Anchor::After);
            }
            if anchor.is_none() {
                if let Some(from) = &right {
                    anchor = self
                        .level_up(&node, level, Direction::Right, from)
                        .await
                        .map(Anchor::Before);
                }
            }
            let neighbors = match anchor {
                Some(anchor) => self.link(&node, level + 1, anchor).await,
                None => None,
            };
            match neighbors {
                Some((l, r)) => {
                    left = l;
                    right = r;
                }
                None => break,
            }
        }

        self.storage.activate(slot, entity);
        info!("(overlay) inserted {}", node);
        true
    }

    /// Splices `node` into the list at `level`, starting next to `anchor`,
    /// and returns its (left, right) neighbors there.
    ///
    /// The right link of the left neighbor is only ever changed with a
    /// compare-and-set, so concurrent inserts into the same gap retry instead
    /// of overwriting each other. Left links are then adopted when closer.
    async fn link(
        &self,
        node: &Identity,
        level: usize,
        mut anchor: Anchor,
    ) -> Option<(Option<Identity>, Option<Identity>)> {
        for _ in 0..=self.max_hops {
            match anchor {
                Anchor::After(left) => {
                    if left.num_id > node.num_id {
                        anchor = match self.neighbor_at(&left, level, Direction::Left).await? {
                            Some(further) => Anchor::After(further),
                            None => Anchor::Before(left),
                        };
                        continue;
                    }
                    let right = self.neighbor_at(&left, level, Direction::Right).await?;
                    if let Some(r) = right.as_ref().filter(|r| r.num_id < node.num_id) {
                        anchor = Anchor::After(r.clone());
                        continue;
                    }

                    self.storage
                        .adopt(node.num_id, level, Direction::Left, left.clone());
                    if let Some(r) = &right {
                        self.storage
                            .adopt(node.num_id, level, Direction::Right, r.clone());
                    }
                    match self
                        .rpc
                        .peer(&left.address)
                        .link_neighbor(
                            level,
                            Direction::Right,
                            left.num_id,
                            right.as_ref().map(|r| r.num_id),
                            node,
                        )
                        .await
                    {
                        Ok(LinkUpdate::Linked) => {
                            if let Some(r) = &right {
                                self.adopt_at(r, level, Direction::Left, node).await;
                            }
                            return Some((Some(left), right));
                        }
                        Ok(LinkUpdate::Conflict(actual)) => {
                            debug!(
                                "(overlay) {} level {} moved under {}, now {:?}",
                                left,
                                level,
                                node,
                                actual.map(|a| a.num_id)
                            );
                            anchor = Anchor::After(left);
                        }
                        Err(e) => {
                            warn!("(overlay) linking {} to {} failed: {}", left, node, e);
                            return None;
                        }
                    }
                }
                Anchor::Before(right) => {
                    if right.num_id < node.num_id {
                        anchor = Anchor::After(right);
                        continue;
                    }
                    self.storage
                        .adopt(node.num_id, level, Direction::Right, right.clone());
                    match self
                        .rpc
                        .peer(&right.address)
                        .link_neighbor(level, Direction::Left, right.num_id, None, node)
                        .await
                    {
                        Ok(LinkUpdate::Linked) => return Some((None, Some(right))),
                        Ok(LinkUpdate::Conflict(Some(actual))) => {
                            anchor = Anchor::After(actual);
                        }
                        Ok(LinkUpdate::Conflict(None)) => anchor = Anchor::Before(right),
                        Err(e) => {
                            warn!("(overlay) linking {} to {} failed: {}", right, node, e);
                            return None;
                        }
                    }
                }
            }
        }
        warn!("(overlay) gave up linking {} at level {}", node, level);
        None
    }

    /// Nearest entry on `direction` of `node` that belongs to its list on
    /// `level + 1`, searched from its level-`level` neighbor `from`.
    async fn level_up(
        &self,
        node: &Identity,
        level: usize,
        direction: Direction,
        from: &Identity,
    ) -> Option<Identity> {
        match self
            .rpc
            .peer(&from.address)
            .insert_search(level, direction, from.num_id, &node.name_id, self.max_hops)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    "(overlay) insert search from {} at level {} failed: {}",
                    from, level, e
                );
                None
            }
        }
    }

    async fn neighbor_at(
        &self,
        of: &Identity,
        level: usize,
        direction: Direction,
    ) -> Option<Option<Identity>> {
        match self
            .rpc
            .peer(&of.address)
            .get_neighbor(level, direction, of.num_id)
            .await
        {
            Ok(neighbor) => Some(neighbor),
            Err(e) => {
                warn!("(overlay) reading neighbor of {} failed: {}", of, e);
                None
            }
        }
    }

    async fn adopt_at(&self, owner: &Identity, level: usize, direction: Direction, node: &Identity) {
        if let Err(e) = self
            .rpc
            .peer(&owner.address)
            .adopt_neighbor(level, direction, owner.num_id, node)
            .await
        {
            warn!("(overlay) linking {} to {} failed: {}", owner, node, e);
        }
    }

    /// Walks `direction` at `level` from the entry `owner` until an entry
    /// sharing more than `level` leading bits with `target` turns up.
    pub async fn insert_search(
        &self,
        level: usize,
        direction: Direction,
        owner: u64,
        target: &NameId,
        hops: u32,
    ) -> Option<Identity> {
        let slot = match self.storage.slot_of(owner) {
            Some(slot) => slot,
            None => {
                debug!("(overlay) insert search for unknown entry {}", owner);
                return None;
            }
        };
        let me = self.storage.identity_at(slot)?;
        if common_bits(target, &me.name_id).map_or(false, |bits| bits > level) {
            return Some(me);
        }

        let next = self.storage.neighbor(slot, level, direction)?;
        if hops == 0 {
            warn!("(overlay) hop budget exhausted in insert search at {}", me);
            return None;
        }
        match self
            .rpc
            .peer(&next.address)
            .insert_search(level, direction, next.num_id, target, hops - 1)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!("(overlay) insert search via {} failed: {}", next, e);
                None
            }
        }
    }

    /// Entry point of a numeric search; routes from the local entry closest
    /// to `target`.
    pub async fn search_by_num_id(&self, target: u64) -> Option<Identity> {
        let (slot, best) = self.storage.best_num(target)?;
        if self.storage.neighbor(slot, 0, Direction::Left).is_none()
            && self.storage.neighbor(slot, 0, Direction::Right).is_none()
        {
            return Some(best);
        }
        self.search_num(target, self.top_level(), self.max_hops).await
    }

    /// One hop of the numeric search. Descends from `level` while the
    /// neighbor toward `target` is missing or overshoots, then delegates.
    pub async fn search_num(&self, target: u64, level: usize, hops: u32) -> Option<Identity> {
        debug!("(overlay) search for {} at {}", target, self.address);
        let (slot, best) = self.storage.best_num(target)?;
        if best.num_id == target {
            return Some(best);
        }

        let direction = if best.num_id < target {
            Direction::Right
        } else {
            Direction::Left
        };
        let next = (0..=level.min(self.top_level())).rev().find_map(|l| {
            self.storage
                .neighbor(slot, l, direction)
                .filter(|n| match direction {
                    Direction::Right => n.num_id <= target,
                    Direction::Left => n.num_id >= target,
                })
                .map(|n| (l, n))
        });
        let (level, next) = match next {
            Some(next) => next,
            None => return Some(best),
        };
        if hops == 0 {
            warn!("(overlay) hop budget exhausted searching {} at {}", target, best);
            return Some(best);
        }

        match self
            .rpc
            .peer(&next.address)
            .search_num(target, level, hops - 1)
            .await
        {
            Ok(Some(found)) => Some(found),
            Ok(None) => Some(best),
            Err(e) => {
                warn!("(overlay) search for {} via {} failed: {}", target, next, e);
                Some(best)
            }
        }
    }

    /// Entry point of a prefix search.
    pub async fn search_by_name_id(&self, target: &NameId) -> Option<Identity> {
        let (slot, best) = self.storage.best_name(target)?;
        if &best.name_id == target {
            return Some(best);
        }
        let level = match common_bits(target, &best.name_id) {
            Some(level) => level,
            None => {
                warn!("(overlay) name {} has the wrong length", target);
                return Some(best);
            }
        };
        self.search_both_ways(slot, best, target, level, Direction::Right, self.max_hops)
            .await
    }

    /// One hop of the prefix search, continuing from the entry `owner` along
    /// `direction`. Every entry the search visits shares at least `level`
    /// leading bits with `target`, so `level` never decreases.
    pub async fn search_name(
        &self,
        target: &NameId,
        owner: u64,
        level: usize,
        direction: Direction,
        hops: u32,
    ) -> Option<Identity> {
        let start = match (self.storage.slot_of(owner), self.storage.entity(owner)) {
            (Some(slot), Some(entity)) => Some((slot, entity.identity())),
            _ => None,
        };
        let local = self.storage.best_name(target);
        let (slot, best) = match (start, local) {
            (Some(start), Some(local))
                if common_bits(target, &local.1.name_id) > common_bits(target, &start.1.name_id) =>
            {
                local
            }
            (Some(start), _) => start,
            (None, local) => local?,
        };
        if &best.name_id == target {
            return Some(best);
        }
        let shared = match common_bits(target, &best.name_id) {
            Some(shared) => shared,
            None => return Some(best),
        };
        if hops == 0 {
            warn!("(overlay) hop budget exhausted searching {} at {}", target, best);
            return Some(best);
        }

        if shared <= level {
            return match self.storage.neighbor(slot, level, direction) {
                Some(next) => self
                    .delegate_name(&next, target, level, direction, hops - 1)
                    .await
                    .or(Some(best)),
                None => Some(best),
            };
        }
        self.search_both_ways(slot, best, target, shared, direction, hops - 1)
            .await
    }

    /// Searches `first` then the opposite direction at `level`, returning the
    /// first exact match or else the longest prefix match seen.
    async fn search_both_ways(
        &self,
        slot: usize,
        best: Identity,
        target: &NameId,
        level: usize,
        first: Direction,
        hops: u32,
    ) -> Option<Identity> {
        let mut result = best;
        for direction in [first, first.opposite()] {
            let next = match self.storage.neighbor(slot, level, direction) {
                Some(next) => next,
                None => continue,
            };
            if let Some(found) = self
                .delegate_name(&next, target, level, direction, hops)
                .await
            {
                if &found.name_id == target {
                    return Some(found);
                }
                if common_bits(target, &found.name_id) > common_bits(target, &result.name_id) {
                    result = found;
                }
            }
        }
        Some(result)
    }

    async fn delegate_name(
        &self,
        next: &Identity,
        target: &NameId,
        level: usize,
        direction: Direction,
        hops: u32,
    ) -> Option<Identity> {
        match self
            .rpc
            .peer(&next.address)
            .search_name(target, next.num_id, level, direction, hops)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!("(overlay) name search via {} failed: {}", next, e);
                None
            }
        }
    }

    pub fn neighbor_of(&self, owner: u64, level: usize, direction: Direction) -> Option<Identity> {
        self.storage.neighbor_of(owner, level, direction)
    }

    pub fn set_neighbor_of(
        &self,
        owner: u64,
        level: usize,
        direction: Direction,
        node: Option<Identity>,
    ) -> bool {
        self.storage.set_neighbor_of(owner, level, direction, node)
    }

    pub fn get_node(&self, num_id: u64) -> Option<Entity> {
        self.storage.entity(num_id)
    }

    /// Stops hosting a data entry and closes the gap it leaves on every
    /// level. A peer's main entry cannot be deleted.
    pub async fn delete(&self, num_id: u64) -> bool {
        if let Some(Entity::Peer(_)) = self.storage.entity(num_id) {
            warn!("(overlay) refusing to delete main entry {}", num_id);
            return false;
        }
        let (entity, links) = match self.storage.remove(num_id) {
            Some(removed) => removed,
            None => return false,
        };

        for (level, [left, right]) in links.into_iter().enumerate() {
            if let Some(l) = &left {
                if let Err(e) = self
                    .rpc
                    .peer(&l.address)
                    .set_neighbor(level, Direction::Right, right.clone(), l.num_id)
                    .await
                {
                    warn!("(overlay) relinking {} failed: {}", l, e);
                }
            }
            if let Some(r) = &right {
                if let Err(e) = self
                    .rpc
                    .peer(&r.address)
                    .set_neighbor(level, Direction::Left, left.clone(), r.num_id)
                    .await
                {
                    warn!("(overlay) relinking {} failed: {}", r, e);
                }
            }
        }
        info!("(overlay) deleted {} {}", entity.kind(), num_id);
        true
    }
}

#[async_trait]
impl OverlayQuery for Overlay {
    async fn search_by_num_id(&self, target: u64) -> Option<Identity> {
        Overlay::search_by_num_id(self, target).await
    }

    async fn search_by_name_id(&self, target: &NameId) -> Option<Identity> {
        Overlay::search_by_name_id(self, target).await
    }

    async fn neighbor(
        &self,
        of: &Identity,
        level: usize,
        direction: Direction,
    ) -> Option<Identity> {
        match self
            .rpc
            .peer(&of.address)
            .get_neighbor(level, direction, of.num_id)
            .await
        {
            Ok(neighbor) => neighbor,
            Err(e) => {
                warn!("(overlay) reading neighbor of {} failed: {}", of, e);
                None
            }
        }
    }

    async fn fetch(&self, identity: &Identity) -> Option<Entity> {
        match self.rpc.peer(&identity.address).get_node(identity.num_id).await {
            Ok(entity) => entity,
            Err(e) => {
                warn!("(overlay) fetching {} failed: {}", identity, e);
                None
            }
        }
    }

    fn top_level(&self) -> usize {
        Overlay::top_level(self)
    }
}
