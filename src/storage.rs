use super::ledger::Entity;
use super::skipgraph::{common_bits, Direction, Identity, NameId};
use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

type Links = [Option<Identity>; 2];

struct Slot {
    identity: Identity,
    /// `None` while the insert that reserved the slot is still running,
    /// and again once the entry is deleted.
    entity: Option<Entity>,
    /// One (left, right) pair per level
    links: Vec<Links>,
}

struct Store {
    levels: usize,
    slots: Vec<Slot>,
    /// numID -> slot of the entry carrying it, pending inserts included
    index: HashMap<u64, usize>,
}

impl Store {
    fn links_of(&mut self, owner: u64, level: usize) -> Option<&mut Links> {
        let slot = *self.index.get(&owner)?;
        self.slots.get_mut(slot)?.links.get_mut(level)
    }
}

/// Local entries hosted by this process together with their lookup table.
///
/// Slots are handed out monotonically under the lock, so each entity keeps
/// exactly one local index for its whole life. A reserved slot answers link
/// reads and writes right away but stays out of search results until it is
/// activated.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<Mutex<Store>>,
}

impl Storage {
    /// `levels` is the highest level index; every slot holds levels `0..=levels`.
    pub fn new(levels: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Store {
                levels,
                slots: Vec::new(),
                index: HashMap::new(),
            })),
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn levels(&self) -> usize {
        self.store().levels
    }

    /// Reserves a fresh slot with empty links for the entry being inserted.
    pub fn reserve_slot(&self, identity: Identity) -> usize {
        let mut store = self.store();
        let links = vec![[None, None]; store.levels + 1];
        let num_id = identity.num_id;
        store.slots.push(Slot {
            identity,
            entity: None,
            links,
        });
        let slot = store.slots.len() - 1;
        store.index.insert(num_id, slot);
        slot
    }

    /// Forgets a reserved slot whose insert was abandoned.
    pub fn release(&self, slot: usize) {
        let mut guard = self.store();
        let store = &mut *guard;
        if let Some(s) = store.slots.get(slot) {
            if s.entity.is_none() && store.index.get(&s.identity.num_id) == Some(&slot) {
                store.index.remove(&s.identity.num_id);
            }
        }
    }

    /// Makes the entity in `slot` visible to lookups.
    pub fn activate(&self, slot: usize, entity: Entity) {
        let mut guard = self.store();
        let store = &mut *guard;
        let num_id = entity.num_id();
        if let Some(s) = store.slots.get_mut(slot) {
            s.entity = Some(entity);
            store.index.insert(num_id, slot);
        }
    }

    /// Removes the live entry with `num_id`, returning it with the links it had.
    pub fn remove(&self, num_id: u64) -> Option<(Entity, Vec<Links>)> {
        let mut store = self.store();
        let slot = *store.index.get(&num_id)?;
        let levels = store.levels;
        let s = store.slots.get_mut(slot)?;
        let entity = s.entity.take()?;
        let links = std::mem::replace(&mut s.links, vec![[None, None]; levels + 1]);
        store.index.remove(&num_id);
        Some((entity, links))
    }

    pub fn slot_of(&self, num_id: u64) -> Option<usize> {
        self.store().index.get(&num_id).copied()
    }

    pub fn entity(&self, num_id: u64) -> Option<Entity> {
        let store = self.store();
        let slot = *store.index.get(&num_id)?;
        store.slots.get(slot)?.entity.clone()
    }

    /// Identity of the entry in `slot`, pending or live.
    pub fn identity_at(&self, slot: usize) -> Option<Identity> {
        let store = self.store();
        let s = store.slots.get(slot)?;
        match store.index.get(&s.identity.num_id) {
            Some(&indexed) if indexed == slot => Some(s.identity.clone()),
            _ => None,
        }
    }

    pub fn neighbor(&self, slot: usize, level: usize, direction: Direction) -> Option<Identity> {
        self.store()
            .slots
            .get(slot)?
            .links
            .get(level)?[direction.index()]
        .clone()
    }

    pub fn set_neighbor(
        &self,
        slot: usize,
        level: usize,
        direction: Direction,
        node: Option<Identity>,
    ) -> bool {
        let mut store = self.store();
        match store
            .slots
            .get_mut(slot)
            .and_then(|s| s.links.get_mut(level))
        {
            Some(links) => {
                debug!(
                    "(table) slot {} level {} {:?} set to {:?}",
                    slot,
                    level,
                    direction,
                    node.as_ref().map(|n| n.to_string())
                );
                links[direction.index()] = node;
                true
            }
            None => false,
        }
    }

    /// Neighbor of the entry `owner` at `level`.
    pub fn neighbor_of(&self, owner: u64, level: usize, direction: Direction) -> Option<Identity> {
        let slot = self.slot_of(owner)?;
        self.neighbor(slot, level, direction)
    }

    pub fn set_neighbor_of(
        &self,
        owner: u64,
        level: usize,
        direction: Direction,
        node: Option<Identity>,
    ) -> bool {
        match self.slot_of(owner) {
            Some(slot) => self.set_neighbor(slot, level, direction, node),
            None => false,
        }
    }

    /// Points the `direction` link of `owner` at `node`, but only while that
    /// link still carries `expected`. On a mismatch the current link is
    /// returned. `None` when `owner` is not hosted here.
    pub fn compare_and_link(
        &self,
        owner: u64,
        level: usize,
        direction: Direction,
        expected: Option<u64>,
        node: Identity,
    ) -> Option<Result<(), Option<Identity>>> {
        let mut store = self.store();
        let links = store.links_of(owner, level)?;
        let current = &mut links[direction.index()];
        if current.as_ref().map(|c| c.num_id) != expected {
            return Some(Err(current.clone()));
        }
        debug!(
            "(table) {} level {} {:?} linked to {}",
            owner, level, direction, node
        );
        *current = Some(node);
        Some(Ok(()))
    }

    /// Points the `direction` link of `owner` at `node` unless it already
    /// points at something closer. Returns `false` when `owner` is not hosted.
    pub fn adopt(&self, owner: u64, level: usize, direction: Direction, node: Identity) -> bool {
        let mut store = self.store();
        let links = match store.links_of(owner, level) {
            Some(links) => links,
            None => return false,
        };
        let current = &mut links[direction.index()];
        let closer = match (current.as_ref(), direction) {
            (None, _) => true,
            (Some(c), Direction::Left) => c.num_id < node.num_id,
            (Some(c), Direction::Right) => c.num_id > node.num_id,
        };
        if closer {
            *current = Some(node);
        }
        true
    }

    /// Live entry whose numID is closest to `target`; the earliest slot wins ties.
    pub fn best_num(&self, target: u64) -> Option<(usize, Identity)> {
        let store = self.store();
        let mut best: Option<(usize, &Entity)> = None;
        for (slot, s) in store.slots.iter().enumerate() {
            if let Some(entity) = &s.entity {
                let closer = match best {
                    Some((_, b)) => entity.num_id().abs_diff(target) < b.num_id().abs_diff(target),
                    None => true,
                };
                if closer {
                    best = Some((slot, entity));
                }
            }
        }
        best.map(|(slot, entity)| (slot, entity.identity()))
    }

    /// Live entry sharing the longest prefix with `target`; the earliest slot wins ties.
    pub fn best_name(&self, target: &NameId) -> Option<(usize, Identity)> {
        let store = self.store();
        let mut best: Option<(usize, &Entity, Option<usize>)> = None;
        for (slot, s) in store.slots.iter().enumerate() {
            if let Some(entity) = &s.entity {
                let bits = common_bits(target, entity.name_id());
                let longer = match best {
                    Some((_, _, b)) => bits > b,
                    None => true,
                };
                if longer {
                    best = Some((slot, entity, bits));
                }
            }
        }
        best.map(|(slot, entity, _)| (slot, entity.identity()))
    }

    pub fn is_empty(&self) -> bool {
        self.store().index.is_empty()
    }

    /// Snapshot of every live entry.
    pub fn entries(&self) -> Vec<Entity> {
        self.store()
            .slots
            .iter()
            .filter_map(|s| s.entity.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(num: u64) -> Identity {
        Identity::new(format!("peer-{}", num), num, NameId::from_num(num, 4))
    }

    fn insert(storage: &Storage, num: u64) -> usize {
        let slot = storage.reserve_slot(id(num));
        storage.activate(slot, Entity::Peer(id(num)));
        slot
    }

    #[test]
    fn slots_are_never_reused() {
        let storage = Storage::new(4);
        let a = insert(&storage, 3);
        assert!(storage.remove(3).is_some());
        let b = storage.reserve_slot(id(4));
        assert_ne!(a, b);
        assert!(storage.entity(3).is_none());
    }

    #[test]
    fn reserved_slot_links_but_is_not_found() {
        let storage = Storage::new(4);
        let slot = storage.reserve_slot(id(3));
        assert!(storage.best_num(3).is_none());
        assert!(storage.entity(3).is_none());
        assert_eq!(storage.identity_at(slot), Some(id(3)));
        assert!(storage.set_neighbor_of(3, 0, Direction::Right, Some(id(7))));
        assert_eq!(storage.neighbor_of(3, 0, Direction::Right), Some(id(7)));
        assert!(storage.remove(3).is_none());

        storage.activate(slot, Entity::Peer(id(3)));
        assert_eq!(storage.best_num(0).map(|(s, _)| s), Some(slot));
    }

    #[test]
    fn released_slot_is_forgotten() {
        let storage = Storage::new(4);
        let slot = storage.reserve_slot(id(3));
        storage.release(slot);
        assert!(storage.slot_of(3).is_none());
        assert!(storage.identity_at(slot).is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn best_num_picks_closest() {
        let storage = Storage::new(4);
        for n in [2, 9, 14] {
            insert(&storage, n);
        }
        assert_eq!(storage.best_num(8).unwrap().1.num_id, 9);
        assert_eq!(storage.best_num(0).unwrap().1.num_id, 2);
        assert_eq!(storage.best_num(20).unwrap().1.num_id, 14);
    }

    #[test]
    fn best_name_picks_longest_prefix() {
        let storage = Storage::new(4);
        for n in [0b0001, 0b1100, 0b1010] {
            insert(&storage, n);
        }
        let target = NameId::from_num(0b1011, 4);
        assert_eq!(storage.best_name(&target).unwrap().1.num_id, 0b1010);
    }

    #[test]
    fn compare_and_link_needs_the_expected_link() {
        let storage = Storage::new(2);
        insert(&storage, 5);
        assert_eq!(
            storage.compare_and_link(5, 0, Direction::Right, None, id(9)),
            Some(Ok(()))
        );
        assert_eq!(
            storage.compare_and_link(5, 0, Direction::Right, None, id(7)),
            Some(Err(Some(id(9))))
        );
        assert_eq!(
            storage.compare_and_link(5, 0, Direction::Right, Some(9), id(7)),
            Some(Ok(()))
        );
        assert_eq!(storage.neighbor_of(5, 0, Direction::Right), Some(id(7)));
        assert_eq!(storage.compare_and_link(6, 0, Direction::Right, None, id(7)), None);
    }

    #[test]
    fn adopt_keeps_the_closer_neighbor() {
        let storage = Storage::new(2);
        insert(&storage, 10);
        assert!(storage.adopt(10, 0, Direction::Left, id(4)));
        assert!(storage.adopt(10, 0, Direction::Left, id(8)));
        assert!(storage.adopt(10, 0, Direction::Left, id(6)));
        assert_eq!(storage.neighbor_of(10, 0, Direction::Left), Some(id(8)));
        assert!(storage.adopt(10, 1, Direction::Right, id(14)));
        assert!(storage.adopt(10, 1, Direction::Right, id(12)));
        assert_eq!(storage.neighbor_of(10, 1, Direction::Right), Some(id(12)));
        assert!(!storage.adopt(11, 0, Direction::Left, id(4)));
    }

    #[test]
    fn remove_returns_links() {
        let storage = Storage::new(2);
        insert(&storage, 5);
        let right = id(7);
        assert!(storage.set_neighbor_of(5, 0, Direction::Right, Some(right.clone())));
        let (_, links) = storage.remove(5).unwrap();
        assert_eq!(links[0][Direction::Right.index()], Some(right));
        assert!(!storage.set_neighbor_of(5, 0, Direction::Left, None));
    }
}
