//! Tokens relation simulator.
//!
//! Builds an in-memory relation between one provider unit and a set of
//! requirer units, then plays a full exchange the way an event dispatcher
//! would: requirers publish requests, the provider issues a token for every
//! outstanding request, departed units' tokens are pruned, and finally the
//! relation is torn down. Each requirer's status is captured after every
//! step so the whole run can be inspected as a [`SimReport`].

pub mod config;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tokens_provider::TokensProvider;
use tokens_requirer::TokensRequirer;
use tokens_store::{MemoryStore, RelationEvent, Side, StoreError, UnitView};
use tokens_types::{Identity, RelationId, Token};
use uuid::Uuid;

use crate::config::Config;

/// Relation instance id used for the simulated relation.
pub const SIM_RELATION: RelationId = RelationId(1);

/// Per-unit status messages; `None` means ready.
pub type StatusMap = BTreeMap<String, Option<String>>;

/// Outcome of one simulated exchange.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimReport {
    /// Requirer statuses after requests were published.
    pub requested: StatusMap,
    /// Number of tokens the provider published.
    pub issued: usize,
    /// Requirer statuses after tokens were issued.
    pub issued_status: StatusMap,
    /// Identities whose tokens were pruned after departures.
    pub pruned: Vec<Identity>,
    /// Tokens each remaining requirer can read, by unit then identity.
    pub tokens: BTreeMap<String, BTreeMap<Identity, Token>>,
    /// Requirer statuses while the relation teardown is dispatched.
    pub teardown_status: StatusMap,
}

/// Runs the configured scenario against a fresh in-memory store.
///
/// # Errors
///
/// Returns `StoreError` if the relation topology cannot be built, e.g. a
/// departing unit is not a member.
pub fn run(config: &Config) -> Result<SimReport, StoreError> {
    let scenario = &config.scenario;
    let protocol = &config.protocol;
    let store = MemoryStore::new();

    store.relate(
        SIM_RELATION,
        Side::new(protocol.endpoint.as_str(), [scenario.provider_unit.as_str()]),
        Side::new(protocol.endpoint.as_str(), scenario.requirer_units.iter().cloned()),
    )?;
    tracing::info!(
        relation = %SIM_RELATION,
        provider = %scenario.provider_unit,
        requirers = scenario.requirer_units.len(),
        "relation established"
    );

    let provider = TokensProvider::new(store.view(scenario.provider_unit.as_str()), protocol)
        .with_span(tracing::info_span!("provider", unit = %scenario.provider_unit));
    let requirers: BTreeMap<String, TokensRequirer<UnitView>> = scenario
        .requirer_units
        .iter()
        .map(|unit| {
            let requirer = TokensRequirer::new(store.view(unit.as_str()), protocol)
                .with_span(tracing::info_span!("requirer", unit = %unit));
            (unit.clone(), requirer)
        })
        .collect();

    let mut report = SimReport::default();

    for request in &scenario.requests {
        if let Some(requirer) = requirers.get(&request.unit) {
            requirer.request(&request.identity, &request.group);
        }
    }
    report.requested = statuses(&requirers, RelationEvent::Changed(SIM_RELATION));

    let mut answered = BTreeSet::new();
    for request in provider.outstanding_requests() {
        // Several units may ask for the same identity; one token serves them all.
        if !answered.insert((request.relation_id, request.identity.clone())) {
            continue;
        }
        let token = format!("tok-{}", Uuid::new_v4().simple());
        if provider.send_token(&request, token).is_published() {
            report.issued += 1;
        }
    }
    report.issued_status = statuses(&requirers, RelationEvent::Changed(SIM_RELATION));

    for unit in &scenario.depart {
        store.depart(SIM_RELATION, unit)?;
        tracing::info!(relation = %SIM_RELATION, unit = %unit, "requirer departed");
    }
    report.pruned = provider
        .prune()
        .into_iter()
        .flat_map(|pruned| pruned.removed)
        .collect();

    for (unit, requirer) in &requirers {
        let tokens: BTreeMap<Identity, Token> = requirer
            .requests()
            .into_keys()
            .filter_map(|identity| {
                let token = requirer.get_token(&identity)?;
                Some((identity, token))
            })
            .collect();
        report.tokens.insert(unit.clone(), tokens);
    }

    report.teardown_status = statuses(&requirers, RelationEvent::Broken(SIM_RELATION));
    store.break_relation(SIM_RELATION);
    tracing::info!(relation = %SIM_RELATION, "relation torn down");

    Ok(report)
}

fn statuses(requirers: &BTreeMap<String, TokensRequirer<UnitView>>, event: RelationEvent) -> StatusMap {
    requirers
        .iter()
        .map(|(unit, requirer)| (unit.clone(), requirer.evaluate_relation(&event)))
        .collect()
}
