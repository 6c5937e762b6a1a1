//! Relation store boundary for the tokens protocol.
//!
//! The relation store is a replicated dictionary with one data bag per
//! `(relation instance, unit)` pair. Each bag has exactly one writer, the
//! unit that owns it, and every unit in the relation can read every bag.
//! Transport and replication are somebody else's problem: this crate only
//! defines the [`RelationStore`] trait the protocol is written against, the
//! [`RelationEvent`] signal used to recognise teardown, and [`MemoryStore`],
//! an in-process implementation used by tests and the simulator.
//!
//! # Consistency
//!
//! Implementations make no cross-key or cross-unit atomicity promises. A
//! value read twice may change between reads because other units write
//! concurrently; callers re-read on every evaluation instead of caching.

mod error;
mod event;
mod memory;

pub use error::StoreError;
pub use event::RelationEvent;
pub use memory::{MemoryStore, Side, UnitView};

use std::sync::Arc;

use tokens_types::RelationId;

/// Unit-scoped access to relation data.
///
/// An implementation answers from the point of view of one local unit:
/// `list_instances` returns the instances that unit is bound to and
/// `list_peers` returns the remote units on the other side of an instance.
pub trait RelationStore {
    /// Name of the unit this view belongs to, e.g. `"vault/0"`.
    fn local_unit(&self) -> &str;

    /// Reads `key` from `unit`'s data bag in `relation`.
    ///
    /// Returns `None` when the instance, the unit, or the key is unknown.
    fn get(&self, relation: RelationId, unit: &str, key: &str) -> Option<String>;

    /// Writes `key` into `owner`'s data bag in `relation`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownRelation` if the instance no longer exists
    /// and `StoreError::NotOwner` / `StoreError::NotMember` if the local unit
    /// may not write that bag.
    fn set(&self, relation: RelationId, owner: &str, key: &str, value: &str)
        -> Result<(), StoreError>;

    /// Lists the relation instances bound to `endpoint` for the local unit.
    ///
    /// No ordering is guaranteed.
    fn list_instances(&self, endpoint: &str) -> Vec<RelationId>;

    /// Lists the remote units participating in `relation`.
    ///
    /// No ordering is guaranteed.
    fn list_peers(&self, relation: RelationId) -> Vec<String>;
}

impl<S: RelationStore + ?Sized> RelationStore for &S {
    fn local_unit(&self) -> &str {
        (**self).local_unit()
    }

    fn get(&self, relation: RelationId, unit: &str, key: &str) -> Option<String> {
        (**self).get(relation, unit, key)
    }

    fn set(
        &self,
        relation: RelationId,
        owner: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        (**self).set(relation, owner, key, value)
    }

    fn list_instances(&self, endpoint: &str) -> Vec<RelationId> {
        (**self).list_instances(endpoint)
    }

    fn list_peers(&self, relation: RelationId) -> Vec<String> {
        (**self).list_peers(relation)
    }
}

impl<S: RelationStore + ?Sized> RelationStore for Arc<S> {
    fn local_unit(&self) -> &str {
        (**self).local_unit()
    }

    fn get(&self, relation: RelationId, unit: &str, key: &str) -> Option<String> {
        (**self).get(relation, unit, key)
    }

    fn set(
        &self,
        relation: RelationId,
        owner: &str,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        (**self).set(relation, owner, key, value)
    }

    fn list_instances(&self, endpoint: &str) -> Vec<RelationId> {
        (**self).list_instances(endpoint)
    }

    fn list_peers(&self, relation: RelationId) -> Vec<String> {
        (**self).list_peers(relation)
    }
}
