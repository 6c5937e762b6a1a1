//! Endpoint-level API for the provider role.

use std::collections::BTreeMap;

use tokens_store::RelationStore;
use tokens_types::{ProtocolConfig, RelationId, RequestEntry, Token, TokenMap};
use tracing::Span;

use crate::ledger::{LedgerOutcome, PruneReport, TokenLedger};
use crate::registry::RequestRegistry;

/// Provider side of the tokens relation for one endpoint.
#[derive(Debug)]
pub struct TokensProvider<S> {
    ledger: TokenLedger<S>,
}

impl<S: RelationStore> TokensProvider<S> {
    /// Creates a provider bound to `config.endpoint`.
    pub fn new(store: S, config: &ProtocolConfig) -> Self {
        Self {
            ledger: TokenLedger::new(store, config),
        }
    }

    /// Replaces the span that log events are recorded in.
    pub fn with_span(self, span: Span) -> Self {
        Self {
            ledger: self.ledger.with_span(span),
        }
    }

    /// Returns the request registry.
    pub fn registry(&self) -> &RequestRegistry<S> {
        self.ledger.registry()
    }

    /// Returns the token ledger.
    pub fn ledger(&self) -> &TokenLedger<S> {
        &self.ledger
    }

    /// Returns every request currently published on the endpoint.
    pub fn token_requests(&self) -> Vec<RequestEntry> {
        self.registry().list_requests().collect()
    }

    /// Returns the requests whose identity has no token published in its
    /// relation instance yet.
    ///
    /// An instance whose published map cannot be decoded is treated as
    /// having no tokens.
    pub fn outstanding_requests(&self) -> Vec<RequestEntry> {
        let _guard = self.ledger.span().enter();
        let mut published: BTreeMap<RelationId, TokenMap> = BTreeMap::new();
        self.registry()
            .list_requests()
            .filter(|request| {
                let tokens = published.entry(request.relation_id).or_insert_with(|| {
                    self.ledger
                        .published(request.relation_id)
                        .unwrap_or_else(|e| {
                            tracing::warn!(
                                relation = %request.relation_id,
                                error = %e,
                                "published tokens are unreadable"
                            );
                            TokenMap::new()
                        })
                });
                !tokens.contains_key(&request.identity)
            })
            .collect()
    }

    /// Publishes `token` for the identity in `request`.
    pub fn send_token(&self, request: &RequestEntry, token: impl Into<Token>) -> LedgerOutcome {
        self.ledger.issue_for(request, token)
    }

    /// Merges `delta` into the tokens published in `relation`.
    pub fn issue(&self, relation: RelationId, delta: &TokenMap) -> LedgerOutcome {
        self.ledger.issue(relation, delta)
    }

    /// Drops stale tokens in every relation instance.
    pub fn prune(&self) -> Vec<PruneReport> {
        self.ledger.prune()
    }
}
