//! This unit's published token maps.
//!
//! Each relation instance carries one `tokens` map per provider unit. The
//! ledger never trusts its own previous write blindly: the current value is
//! re-read and decoded before every merge, and a value that fails to decode
//! is left untouched rather than reinterpreted as empty.

use tokens_store::{RelationStore, StoreError};
use tokens_types::{
    decode_map, encode_map, DecodeError, Identity, ProtocolConfig, RelationId, RequestEntry,
    Token, TokenMap, TOKENS_KEY,
};
use tracing::Span;

use crate::registry::RequestRegistry;

/// What a ledger write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// A new map was written.
    Published {
        /// Number of identities in the written map.
        entries: usize,
    },
    /// The published map already had the desired contents; nothing was written.
    Unchanged,
    /// The relation instance is not bound to this unit any more.
    NoRelation,
    /// The currently published map, or the peer data it depends on, could
    /// not be decoded; the map was left as is.
    Unreadable,
    /// The store refused the write.
    Rejected(StoreError),
}

impl LedgerOutcome {
    /// Returns `true` if the ledger wrote a new value.
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Result of pruning one relation instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// The relation instance that was pruned.
    pub relation: RelationId,
    /// Identities whose tokens were dropped, ascending.
    pub removed: Vec<Identity>,
    /// What happened to the published map.
    pub outcome: LedgerOutcome,
}

/// Maintains this provider unit's `tokens` map in every relation instance.
#[derive(Debug)]
pub struct TokenLedger<S> {
    registry: RequestRegistry<S>,
    span: Span,
}

impl<S: RelationStore> TokenLedger<S> {
    /// Creates a ledger writing `config.endpoint` through `store`.
    pub fn new(store: S, config: &ProtocolConfig) -> Self {
        let registry = RequestRegistry::new(store, config);
        let span = tracing::info_span!(
            "tokens_ledger",
            endpoint = %config.endpoint,
            unit = %registry.store().local_unit()
        );
        Self { registry, span }
    }

    /// Replaces the span that log events are recorded in.
    ///
    /// The span is shared with the embedded registry.
    pub fn with_span(mut self, span: Span) -> Self {
        self.registry = self.registry.with_span(span.clone());
        self.span = span;
        self
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Returns the registry used to decide which tokens are still required.
    pub fn registry(&self) -> &RequestRegistry<S> {
        &self.registry
    }

    /// Decodes the map this unit currently publishes in `relation`.
    ///
    /// An instance with nothing published yet yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns the `DecodeError` if the stored value is malformed.
    pub fn published(&self, relation: RelationId) -> Result<TokenMap, DecodeError> {
        let store = self.registry.store();
        decode_map(store.get(relation, store.local_unit(), TOKENS_KEY).as_deref())
    }

    /// Merges `delta` into the map published in `relation`.
    ///
    /// Entries in `delta` overwrite existing entries for the same identity.
    /// Issuing the same delta again leaves the published map as it is. If the
    /// instance is no longer bound the call does nothing and reports
    /// [`LedgerOutcome::NoRelation`]; delivery is never guaranteed.
    pub fn issue(&self, relation: RelationId, delta: &TokenMap) -> LedgerOutcome {
        let _guard = self.span.enter();

        if !self.registry.relations().contains(&relation) {
            tracing::warn!(relation = %relation, "relation is gone, tokens not issued");
            return LedgerOutcome::NoRelation;
        }

        let mut tokens = match self.published(relation) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(
                    relation = %relation,
                    error = %e,
                    "published tokens are unreadable, not issuing"
                );
                return LedgerOutcome::Unreadable;
            }
        };

        let changed = delta
            .iter()
            .any(|(identity, token)| tokens.get(identity) != Some(token));
        if !changed {
            tracing::debug!(relation = %relation, "tokens already issued");
            return LedgerOutcome::Unchanged;
        }

        tokens.extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.publish(relation, &tokens)
    }

    /// Issues a single token answering `request`.
    pub fn issue_for(&self, request: &RequestEntry, token: impl Into<Token>) -> LedgerOutcome {
        let delta = TokenMap::from([(request.identity.clone(), token.into())]);
        self.issue(request.relation_id, &delta)
    }

    /// Drops tokens nobody requests any more, in every bound relation instance.
    ///
    /// Reports are returned in ascending relation order.
    pub fn prune(&self) -> Vec<PruneReport> {
        self.registry
            .relations()
            .into_iter()
            .map(|relation| self.prune_relation(relation))
            .collect()
    }

    /// Drops tokens for identities no peer in `relation` requests.
    ///
    /// The instance is skipped with [`LedgerOutcome::Unreadable`] when this
    /// unit's map or any peer's requests cannot be decoded.
    pub fn prune_relation(&self, relation: RelationId) -> PruneReport {
        let _guard = self.span.enter();

        let required = match self.registry.required_identities(relation) {
            Ok(required) => required,
            Err(e) => {
                tracing::warn!(
                    relation = %relation,
                    error = %e,
                    "peer requests are unreadable, skipping prune"
                );
                return PruneReport {
                    relation,
                    removed: Vec::new(),
                    outcome: LedgerOutcome::Unreadable,
                };
            }
        };

        let tokens = match self.published(relation) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(
                    relation = %relation,
                    error = %e,
                    "published tokens are unreadable, skipping prune"
                );
                return PruneReport {
                    relation,
                    removed: Vec::new(),
                    outcome: LedgerOutcome::Unreadable,
                };
            }
        };

        let (kept, stale): (TokenMap, TokenMap) = tokens
            .into_iter()
            .partition(|(identity, _)| required.contains(identity));
        let removed: Vec<Identity> = stale.into_keys().collect();

        let outcome = if removed.is_empty() {
            LedgerOutcome::Unchanged
        } else {
            tracing::info!(relation = %relation, removed = ?removed, "pruning stale tokens");
            self.publish(relation, &kept)
        };

        PruneReport {
            relation,
            removed,
            outcome,
        }
    }

    fn publish(&self, relation: RelationId, tokens: &TokenMap) -> LedgerOutcome {
        let store = self.registry.store();
        match store.set(relation, store.local_unit(), TOKENS_KEY, &encode_map(tokens)) {
            Ok(()) => {
                tracing::info!(relation = %relation, entries = tokens.len(), "published tokens");
                LedgerOutcome::Published {
                    entries: tokens.len(),
                }
            }
            Err(StoreError::UnknownRelation(_)) => {
                tracing::warn!(relation = %relation, "relation vanished before tokens were written");
                LedgerOutcome::NoRelation
            }
            Err(e) => {
                tracing::warn!(relation = %relation, error = %e, "store rejected token write");
                LedgerOutcome::Rejected(e)
            }
        }
    }
}
