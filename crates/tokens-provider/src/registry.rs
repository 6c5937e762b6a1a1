//! Aggregation of credential requests published by requirer units.

use std::collections::BTreeSet;

use tokens_store::RelationStore;
use tokens_types::{
    decode_map, DecodeError, Identity, ProtocolConfig, RelationId, RequestEntry, WireFormat,
    LEGACY_GROUP_KEY, LEGACY_USER_KEY, REQUESTS_KEY,
};
use tracing::Span;

/// Read-only view over every request published on one endpoint.
///
/// Nothing is cached: each call walks the store as it is at that moment.
#[derive(Debug)]
pub struct RequestRegistry<S> {
    store: S,
    endpoint: String,
    wire_format: WireFormat,
    span: Span,
}

impl<S: RelationStore> RequestRegistry<S> {
    /// Creates a registry reading `config.endpoint` through `store`.
    pub fn new(store: S, config: &ProtocolConfig) -> Self {
        let span = tracing::info_span!(
            "tokens_registry",
            endpoint = %config.endpoint,
            unit = %store.local_unit()
        );
        Self {
            store,
            endpoint: config.endpoint.clone(),
            wire_format: config.wire_format,
            span,
        }
    }

    /// Replaces the span that log events are recorded in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the underlying store handle.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the endpoint this registry reads.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the relation instances bound to the endpoint, ascending.
    pub fn relations(&self) -> Vec<RelationId> {
        let mut relations = self.store.list_instances(&self.endpoint);
        relations.sort_unstable();
        relations.dedup();
        relations
    }

    /// Lists every request on the endpoint.
    ///
    /// Entries are ordered by relation instance, then by peer unit name,
    /// then by identity. Payloads are read lazily as the iterator advances;
    /// call again to restart from a fresh read. A peer whose payload cannot
    /// be decoded is logged and skipped.
    pub fn list_requests(&self) -> impl Iterator<Item = RequestEntry> + '_ {
        self.relations()
            .into_iter()
            .flat_map(move |relation| self.requests_in(relation))
    }

    /// Lists the requests published in a single relation instance.
    pub fn requests_in(&self, relation: RelationId) -> impl Iterator<Item = RequestEntry> + '_ {
        self.peers(relation)
            .into_iter()
            .flat_map(move |unit| self.readable_requests(relation, &unit))
    }

    /// Returns the identities requested by any peer in `relation`.
    ///
    /// Unlike [`requests_in`](Self::requests_in), a peer with an unreadable
    /// payload is not skipped: its requests are unknown, so no answer is
    /// given for the whole instance.
    ///
    /// # Errors
    ///
    /// Returns the `DecodeError` of the first malformed peer by unit name.
    pub fn required_identities(&self, relation: RelationId) -> Result<BTreeSet<Identity>, DecodeError> {
        let _guard = self.span.enter();
        let mut required = BTreeSet::new();
        for unit in self.peers(relation) {
            match self.peer_requests(relation, &unit) {
                Ok(entries) => required.extend(entries.into_iter().map(|entry| entry.identity)),
                Err(e) => {
                    tracing::warn!(
                        relation = %relation,
                        peer = %unit,
                        error = %e,
                        "peer requests are unreadable, required identities unknown"
                    );
                    return Err(e);
                }
            }
        }
        Ok(required)
    }

    fn peers(&self, relation: RelationId) -> Vec<String> {
        let mut peers = self.store.list_peers(relation);
        peers.sort_unstable();
        peers.dedup();
        peers
    }

    fn readable_requests(&self, relation: RelationId, unit: &str) -> Vec<RequestEntry> {
        let _guard = self.span.enter();
        self.peer_requests(relation, unit).unwrap_or_else(|e| {
            tracing::warn!(
                relation = %relation,
                peer = %unit,
                error = %e,
                "skipping peer with unreadable token requests"
            );
            Vec::new()
        })
    }

    fn peer_requests(&self, relation: RelationId, unit: &str) -> Result<Vec<RequestEntry>, DecodeError> {
        match self.wire_format {
            WireFormat::Json => self.json_requests(relation, unit),
            WireFormat::Legacy => Ok(self.legacy_request(relation, unit).into_iter().collect()),
        }
    }

    fn json_requests(&self, relation: RelationId, unit: &str) -> Result<Vec<RequestEntry>, DecodeError> {
        let raw = self.store.get(relation, unit, REQUESTS_KEY);
        let requests = decode_map(raw.as_deref())?;
        tracing::debug!(relation = %relation, peer = %unit, count = requests.len(), "read peer requests");
        Ok(requests
            .into_iter()
            .map(|(identity, group)| RequestEntry {
                relation_id: relation,
                unit: unit.to_string(),
                identity,
                group,
            })
            .collect())
    }

    fn legacy_request(&self, relation: RelationId, unit: &str) -> Option<RequestEntry> {
        let identity = self
            .store
            .get(relation, unit, LEGACY_USER_KEY)
            .filter(|v| !v.is_empty())?;
        let group = self
            .store
            .get(relation, unit, LEGACY_GROUP_KEY)
            .filter(|v| !v.is_empty())?;
        Some(RequestEntry {
            relation_id: relation,
            unit: unit.to_string(),
            identity,
            group,
        })
    }
}
