//! Readiness evaluation against the current relation data.

use std::collections::BTreeSet;

use tokens_store::{RelationEvent, RelationStore};
use tokens_types::{
    decode_map, DecodeError, Identity, ProtocolConfig, RelationId, RequestMap, TokenMap,
    WireFormat, LEGACY_GROUP_KEY, LEGACY_USER_KEY, REQUESTS_KEY, TOKENS_KEY,
};
use tracing::Span;

use crate::readiness::Readiness;

/// Compares this unit's requests with the tokens its providers published.
#[derive(Debug)]
pub struct ReadinessEvaluator<S> {
    store: S,
    endpoint: String,
    wire_format: WireFormat,
    track_in_flight: bool,
    span: Span,
}

impl<S: RelationStore> ReadinessEvaluator<S> {
    /// Creates an evaluator for `config.endpoint`.
    pub fn new(store: S, config: &ProtocolConfig) -> Self {
        let span = tracing::info_span!(
            "tokens_readiness",
            endpoint = %config.endpoint,
            unit = %store.local_unit()
        );
        Self {
            store,
            endpoint: config.endpoint.clone(),
            wire_format: config.wire_format,
            track_in_flight: config.track_in_flight,
            span,
        }
    }

    /// Replaces the span that log events are recorded in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Returns the underlying store handle.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the endpoint being evaluated.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the request payload layout in use.
    pub fn wire_format(&self) -> WireFormat {
        self.wire_format
    }

    /// Returns the relation instance bound to the endpoint, if any.
    ///
    /// The requirer expects a single instance. When several are bound the
    /// lowest id is used and a warning is logged.
    pub fn relation(&self) -> Option<RelationId> {
        let relations = self.store.list_instances(&self.endpoint);
        let chosen = relations.iter().min().copied();
        if relations.len() > 1 {
            let _guard = self.span.enter();
            tracing::warn!(
                count = relations.len(),
                chosen = ?chosen,
                "multiple relation instances bound, using the lowest id"
            );
        }
        chosen
    }

    /// Aggregates the `tokens` maps published by every provider unit.
    ///
    /// Returns `None` when no provider unit is present, none has published
    /// tokens yet, or any published map fails to decode. Units are merged in
    /// name order; on conflicting identities the later unit wins.
    pub fn provider_tokens(&self, relation: RelationId) -> Option<TokenMap> {
        let _guard = self.span.enter();

        let mut providers = self.store.list_peers(relation);
        providers.sort_unstable();
        providers.dedup();

        let mut merged: Option<TokenMap> = None;
        for unit in &providers {
            let Some(raw) = self.store.get(relation, unit, TOKENS_KEY) else {
                continue;
            };
            match decode_map(Some(raw.as_str())) {
                Ok(tokens) => merged.get_or_insert_with(TokenMap::new).extend(tokens),
                Err(e) => {
                    tracing::warn!(
                        relation = %relation,
                        provider = %unit,
                        error = %e,
                        "token data not usable yet"
                    );
                    return None;
                }
            }
        }

        if merged.is_none() {
            tracing::debug!(
                relation = %relation,
                providers = providers.len(),
                "token data not yet available"
            );
        }
        merged
    }

    /// Decodes the requests this unit published in `relation`.
    ///
    /// # Errors
    ///
    /// Returns the `DecodeError` if the JSON request payload is malformed.
    pub fn local_requests(&self, relation: RelationId) -> Result<RequestMap, DecodeError> {
        let unit = self.store.local_unit();
        match self.wire_format {
            WireFormat::Json => decode_map(self.store.get(relation, unit, REQUESTS_KEY).as_deref()),
            WireFormat::Legacy => {
                let user = self.store.get(relation, unit, LEGACY_USER_KEY);
                let group = self.store.get(relation, unit, LEGACY_GROUP_KEY);
                Ok(match (user, group) {
                    (Some(user), Some(group)) if !user.is_empty() && !group.is_empty() => {
                        RequestMap::from([(user, group)])
                    }
                    _ => RequestMap::new(),
                })
            }
        }
    }

    /// Returns the requested identities without a token in `tokens`.
    ///
    /// With no usable provider data every requested identity is in flight.
    ///
    /// # Errors
    ///
    /// Returns the `DecodeError` if this unit's own request payload is
    /// malformed; which identities are in flight is then unknown.
    pub fn in_flight(
        &self,
        relation: RelationId,
        tokens: Option<&TokenMap>,
    ) -> Result<BTreeSet<Identity>, DecodeError> {
        Ok(self
            .local_requests(relation)?
            .into_keys()
            .filter(|identity| tokens.map_or(true, |t| !t.contains_key(identity)))
            .collect())
    }

    /// Evaluates readiness for the event currently being dispatched.
    ///
    /// With in-flight tracking enabled, an unreadable own request payload is
    /// never ready: it reports `Waiting` with no named identities until the
    /// next request replaces it.
    pub fn evaluate(&self, event: &RelationEvent) -> Readiness {
        let Some(relation) = self.relation() else {
            return Readiness::Missing;
        };
        if event.is_broken(relation) {
            return Readiness::Missing;
        }

        let tokens = self.provider_tokens(relation);
        let in_flight = if self.track_in_flight {
            match self.in_flight(relation, tokens.as_ref()) {
                Ok(in_flight) => in_flight,
                Err(e) => {
                    let _guard = self.span.enter();
                    tracing::warn!(
                        relation = %relation,
                        error = %e,
                        "own requests are unreadable, not ready"
                    );
                    return Readiness::Waiting {
                        in_flight: BTreeSet::new(),
                    };
                }
            }
        } else {
            BTreeSet::new()
        };

        match tokens {
            Some(_) if in_flight.is_empty() => Readiness::Ready,
            _ => Readiness::Waiting { in_flight },
        }
    }

    /// Evaluates readiness and renders it as an operator-facing status.
    ///
    /// Returns `None` when the relation is ready.
    pub fn evaluate_relation(&self, event: &RelationEvent) -> Option<String> {
        self.evaluate(event).status_message(&self.endpoint)
    }
}
