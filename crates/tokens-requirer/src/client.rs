//! Endpoint-level API for the requirer role.

use std::collections::BTreeSet;

use tokens_store::{RelationEvent, RelationStore, StoreError};
use tokens_types::{
    encode_map, Group, Identity, ProtocolConfig, RelationId, RequestMap, Token, WireFormat,
    LEGACY_GROUP_KEY, LEGACY_USER_KEY, REQUESTS_KEY,
};
use tracing::Span;

use crate::evaluator::ReadinessEvaluator;
use crate::readiness::Readiness;

/// Requirer side of the tokens relation for one endpoint.
#[derive(Debug)]
pub struct TokensRequirer<S> {
    evaluator: ReadinessEvaluator<S>,
}

impl<S: RelationStore> TokensRequirer<S> {
    /// Creates a requirer bound to `config.endpoint`.
    pub fn new(store: S, config: &ProtocolConfig) -> Self {
        Self {
            evaluator: ReadinessEvaluator::new(store, config),
        }
    }

    /// Replaces the span that log events are recorded in.
    pub fn with_span(self, span: Span) -> Self {
        Self {
            evaluator: self.evaluator.with_span(span),
        }
    }

    /// Returns the readiness evaluator.
    pub fn evaluator(&self) -> &ReadinessEvaluator<S> {
        &self.evaluator
    }

    /// Asks the provider for a token for `identity` in `group`.
    ///
    /// A repeated request for the same identity overwrites its group. In the
    /// legacy wire format only one request exists at a time and a new call
    /// replaces it. An unreadable request payload is discarded and replaced
    /// by this request alone. Returns `true` if a new value was written;
    /// nothing is written when no relation is bound.
    pub fn request(&self, identity: &str, group: &str) -> bool {
        let _guard = self.evaluator.span().enter();
        tracing::info!(identity, group, "requesting token");

        let Some(relation) = self.evaluator.relation() else {
            tracing::warn!(identity, "no relation bound, request not sent");
            return false;
        };

        let mut requests = match self.evaluator.local_requests(relation) {
            Ok(requests) => requests,
            Err(e) => {
                tracing::warn!(
                    relation = %relation,
                    error = %e,
                    "own requests are unreadable, replacing them"
                );
                RequestMap::new()
            }
        };

        if requests.get(identity).map(String::as_str) == Some(group) {
            tracing::debug!(relation = %relation, identity, "request already published");
            return false;
        }

        let written = match self.evaluator.wire_format() {
            WireFormat::Json => {
                requests.insert(identity.to_string(), group.to_string());
                self.write(relation, REQUESTS_KEY, &encode_map(&requests))
            }
            WireFormat::Legacy => self.write_legacy(relation, identity, group),
        };

        match written {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(relation = %relation, error = %e, "failed to publish request");
                false
            }
        }
    }

    /// Returns the token issued for `identity`, if provider data is usable
    /// and contains one.
    pub fn get_token(&self, identity: &str) -> Option<Token> {
        let relation = self.evaluator.relation()?;
        self.evaluator
            .provider_tokens(relation)?
            .get(identity)
            .cloned()
    }

    /// Returns the identities this unit requested that have no token yet.
    ///
    /// Empty when no relation is bound or this unit's request payload is
    /// unreadable.
    pub fn in_flight_requests(&self) -> BTreeSet<Identity> {
        let Some(relation) = self.evaluator.relation() else {
            return BTreeSet::new();
        };
        let tokens = self.evaluator.provider_tokens(relation);
        self.evaluator
            .in_flight(relation, tokens.as_ref())
            .unwrap_or_else(|e| {
                let _guard = self.evaluator.span().enter();
                tracing::warn!(relation = %relation, error = %e, "own requests are unreadable");
                BTreeSet::new()
            })
    }

    /// Returns the requests this unit has published.
    ///
    /// Empty when no relation is bound or the payload is unreadable.
    pub fn requests(&self) -> RequestMap {
        self.evaluator
            .relation()
            .and_then(|relation| self.evaluator.local_requests(relation).ok())
            .unwrap_or_default()
    }

    /// Returns the group requested for `identity`, if any.
    pub fn requested_group(&self, identity: &str) -> Option<Group> {
        self.requests().remove(identity)
    }

    /// Evaluates readiness for the event currently being dispatched.
    pub fn readiness(&self, event: &RelationEvent) -> Readiness {
        self.evaluator.evaluate(event)
    }

    /// Returns the operator-facing status, or `None` when ready.
    pub fn evaluate_relation(&self, event: &RelationEvent) -> Option<String> {
        self.evaluator.evaluate_relation(event)
    }

    /// Writes the flat `user`/`group` pair.
    ///
    /// If the group cannot be written the previous user is restored, so the
    /// bag never pairs the new user with the old group.
    fn write_legacy(&self, relation: RelationId, identity: &str, group: &str) -> Result<(), StoreError> {
        let store = self.evaluator.store();
        let previous = store
            .get(relation, store.local_unit(), LEGACY_USER_KEY)
            .unwrap_or_default();

        self.write(relation, LEGACY_USER_KEY, identity)?;
        if let Err(e) = self.write(relation, LEGACY_GROUP_KEY, group) {
            if let Err(restore) = self.write(relation, LEGACY_USER_KEY, &previous) {
                tracing::warn!(
                    relation = %relation,
                    identity,
                    error = %restore,
                    "legacy request left with new user and previous group"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    fn write(&self, relation: RelationId, key: &str, value: &str) -> Result<(), StoreError> {
        let store = self.evaluator.store();
        store.set(relation, store.local_unit(), key, value)
    }
}
