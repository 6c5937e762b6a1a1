//! Shared types, wire codec, and protocol configuration for the tokens relation.
//!
//! The tokens relation is a credential exchange between two roles that only
//! talk through a replicated, per-unit key-value store:
//!
//! - a *requirer* unit publishes a `requests` payload mapping each identity it
//!   needs a credential for to the group that identity should be authorised in;
//! - a *provider* unit publishes a `tokens` payload mapping identities to the
//!   opaque tokens it issued.
//!
//! This crate holds everything both sides agree on: the payload keys, the
//! payload shapes, the JSON codec that validates peer-written values, and the
//! [`ProtocolConfig`] a deployment uses to pick its wire format.
//!
//! # Wire payloads
//!
//! | Key | Owner | Shape |
//! |-----|-------|-------|
//! | `requests` | requirer unit | JSON object, identity → group |
//! | `tokens` | provider unit | JSON object, identity → token |
//! | `user` / `group` | requirer unit | flat strings (legacy single-request format) |

mod codec;
mod config;
mod error;

pub use codec::{decode_map, encode_map};
pub use config::{ProtocolConfig, WireFormat, DEFAULT_ENDPOINT};
pub use error::DecodeError;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a principal a credential is requested for.
pub type Identity = String;

/// Authorisation scope requested for an identity.
pub type Group = String;

/// An issued credential. No internal structure is assumed.
pub type Token = String;

/// Identity → group map published by a requirer unit.
pub type RequestMap = BTreeMap<Identity, Group>;

/// Identity → token map published by a provider unit.
pub type TokenMap = BTreeMap<Identity, Token>;

/// Relation data key carrying a requirer's JSON [`RequestMap`].
pub const REQUESTS_KEY: &str = "requests";

/// Relation data key carrying a provider's JSON [`TokenMap`].
pub const TOKENS_KEY: &str = "tokens";

/// Legacy relation data key carrying a single requested identity.
pub const LEGACY_USER_KEY: &str = "user";

/// Legacy relation data key carrying the group for [`LEGACY_USER_KEY`].
pub const LEGACY_GROUP_KEY: &str = "group";

/// Identifier of one relation instance bound to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(pub u64);

impl RelationId {
    /// Returns the raw numeric identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RelationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One outstanding credential request, as seen by the provider.
///
/// Several entries may name the same identity when different peer units ask
/// for it; entries are only unique per `(relation_id, unit, identity)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestEntry {
    /// The relation instance the request was published in.
    pub relation_id: RelationId,
    /// The requirer unit that published the request.
    pub unit: String,
    /// The identity a token is requested for.
    pub identity: Identity,
    /// The group requested for the identity.
    pub group: Group,
}

#[cfg(test)]
mod tests;
