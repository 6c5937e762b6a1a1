//! In-process relation store.
//!
//! [`MemoryStore`] holds the whole relation topology behind a shared lock;
//! [`UnitView`] is a cheap handle that answers [`RelationStore`] calls as one
//! particular unit. Peer lists come back in join order, not sorted, so code
//! written against the trait cannot lean on an ordering the real store does
//! not provide.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokens_types::RelationId;

use crate::error::StoreError;
use crate::RelationStore;

/// One side of a relation instance: an endpoint and the units bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Side {
    endpoint: String,
    units: Vec<String>,
}

impl Side {
    /// Creates a side bound to `endpoint` with the given units, in join order.
    pub fn new<I, S>(endpoint: impl Into<String>, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoint: endpoint.into(),
            units: units.into_iter().map(Into::into).collect(),
        }
    }

    fn contains(&self, unit: &str) -> bool {
        self.units.iter().any(|u| u == unit)
    }
}

#[derive(Debug)]
struct RelationRecord {
    sides: [Side; 2],
    bags: HashMap<String, BTreeMap<String, String>>,
}

impl RelationRecord {
    fn side_of(&self, unit: &str) -> Option<usize> {
        self.sides.iter().position(|side| side.contains(unit))
    }

    fn is_member(&self, unit: &str) -> bool {
        self.side_of(unit).is_some()
    }
}

#[derive(Debug, Default)]
struct Topology {
    // Insertion-ordered so listing does not come back sorted by id.
    relations: Vec<(RelationId, RelationRecord)>,
}

impl Topology {
    fn relation(&self, id: RelationId) -> Option<&RelationRecord> {
        self.relations
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, record)| record)
    }

    fn relation_mut(&mut self, id: RelationId) -> Option<&mut RelationRecord> {
        self.relations
            .iter_mut()
            .find(|(rid, _)| *rid == id)
            .map(|(_, record)| record)
    }
}

/// Shared in-memory relation topology and data bags.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Topology>>,
}

impl MemoryStore {
    /// Creates an empty store with no relation instances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle that reads and writes as `unit`.
    pub fn view(&self, unit: impl Into<String>) -> UnitView {
        UnitView {
            store: self.clone(),
            unit: unit.into(),
        }
    }

    /// Creates relation instance `id` between two sides.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateRelation` if `id` is already in use.
    pub fn relate(&self, id: RelationId, first: Side, second: Side) -> Result<(), StoreError> {
        let mut topology = self.write();
        if topology.relation(id).is_some() {
            return Err(StoreError::DuplicateRelation(id));
        }
        topology.relations.push((
            id,
            RelationRecord {
                sides: [first, second],
                bags: HashMap::new(),
            },
        ));
        tracing::debug!(relation = %id, "relation created");
        Ok(())
    }

    /// Adds `unit` to the side of `relation` bound to `endpoint`.
    ///
    /// When both sides use the same endpoint name the unit joins the first.
    /// Joining twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownRelation` or `StoreError::UnknownEndpoint`.
    pub fn join(&self, relation: RelationId, endpoint: &str, unit: &str) -> Result<(), StoreError> {
        let mut topology = self.write();
        let record = topology
            .relation_mut(relation)
            .ok_or(StoreError::UnknownRelation(relation))?;
        let side = record
            .sides
            .iter_mut()
            .find(|side| side.endpoint == endpoint)
            .ok_or_else(|| StoreError::UnknownEndpoint {
                relation,
                endpoint: endpoint.to_string(),
            })?;
        if !side.contains(unit) {
            side.units.push(unit.to_string());
        }
        Ok(())
    }

    /// Removes `unit` from `relation` and discards its data bag.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownRelation` or `StoreError::NotMember`.
    pub fn depart(&self, relation: RelationId, unit: &str) -> Result<(), StoreError> {
        let mut topology = self.write();
        let record = topology
            .relation_mut(relation)
            .ok_or(StoreError::UnknownRelation(relation))?;
        let side = record.side_of(unit).ok_or_else(|| StoreError::NotMember {
            relation,
            unit: unit.to_string(),
        })?;
        record.sides[side].units.retain(|u| u != unit);
        record.bags.remove(unit);
        Ok(())
    }

    /// Tears down `relation`, dropping every data bag in it.
    ///
    /// Returns `false` if the instance did not exist.
    pub fn break_relation(&self, relation: RelationId) -> bool {
        let mut topology = self.write();
        let before = topology.relations.len();
        topology.relations.retain(|(id, _)| *id != relation);
        let removed = topology.relations.len() != before;
        if removed {
            tracing::debug!(relation = %relation, "relation broken");
        }
        removed
    }

    /// Returns a snapshot of `unit`'s whole data bag in `relation`.
    pub fn bag(&self, relation: RelationId, unit: &str) -> BTreeMap<String, String> {
        self.read()
            .relation(relation)
            .and_then(|record| record.bags.get(unit))
            .cloned()
            .unwrap_or_default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Topology> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Topology> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`MemoryStore`] seen from one unit.
#[derive(Debug, Clone)]
pub struct UnitView {
    store: MemoryStore,
    unit: String,
}

impl UnitView {
    /// Returns the underlying shared store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl RelationStore for UnitView {
    fn local_unit(&self) -> &str {
        &self.unit
    }

    fn get(&self, relation: RelationId, unit: &str, key: &str) -> Option<String> {
        let topology = self.store.read();
        let record = topology.relation(relation)?;
        if !record.is_member(&self.unit) {
            return None;
        }
        record.bags.get(unit)?.get(key).cloned()
    }

    fn set(
        &self,
        relation: RelationId,
        owner: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        if owner != self.unit {
            return Err(StoreError::NotOwner {
                owner: owner.to_string(),
                unit: self.unit.clone(),
            });
        }
        let mut topology = self.store.write();
        let record = topology
            .relation_mut(relation)
            .ok_or(StoreError::UnknownRelation(relation))?;
        if !record.is_member(owner) {
            return Err(StoreError::NotMember {
                relation,
                unit: owner.to_string(),
            });
        }
        record
            .bags
            .entry(owner.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        tracing::trace!(relation = %relation, unit = owner, key, "relation data written");
        Ok(())
    }

    fn list_instances(&self, endpoint: &str) -> Vec<RelationId> {
        self.store
            .read()
            .relations
            .iter()
            .filter(|(_, record)| {
                record
                    .sides
                    .iter()
                    .any(|side| side.endpoint == endpoint && side.contains(&self.unit))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn list_peers(&self, relation: RelationId) -> Vec<String> {
        let topology = self.store.read();
        let Some(record) = topology.relation(relation) else {
            return Vec::new();
        };
        match record.side_of(&self.unit) {
            Some(local) => record.sides[1 - local].units.clone(),
            None => Vec::new(),
        }
    }
}
