use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, Mutex};

use tokens_provider::{LedgerOutcome, TokensProvider};
use tokens_store::{MemoryStore, RelationStore, Side, UnitView};
use tokens_types::{ProtocolConfig, RelationId, TokenMap};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

fn setup() -> (MemoryStore, TokensProvider<UnitView>) {
    init_tracing();
    let store = MemoryStore::new();
    store
        .relate(
            RelationId(1),
            Side::new("tokens", ["vault/0"]),
            Side::new("tokens", ["app/0", "app/1"]),
        )
        .expect("relate 1");
    store
        .relate(
            RelationId(2),
            Side::new("tokens", ["vault/0"]),
            Side::new("tokens", ["web/0"]),
        )
        .expect("relate 2");
    let provider = TokensProvider::new(store.view("vault/0"), &ProtocolConfig::default());
    (store, provider)
}

fn request(store: &MemoryStore, relation: u64, unit: &str, payload: &str) {
    store
        .view(unit)
        .set(RelationId(relation), unit, "requests", payload)
        .expect("requirer write");
}

/// Collects formatted log output for inspection.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn identities(map: &TokenMap) -> BTreeSet<String> {
    map.keys().cloned().collect()
}

#[test]
fn outstanding_requests_shrink_as_tokens_are_sent() {
    let (store, provider) = setup();
    request(&store, 1, "app/0", r#"{"alice":"admins"}"#);
    request(&store, 1, "app/1", r#"{"alice":"admins","bob":"readers"}"#);
    request(&store, 2, "web/0", r#"{"alice":"ops"}"#);

    let outstanding = provider.outstanding_requests();
    assert_eq!(outstanding.len(), 4);

    for req in &outstanding {
        let outcome = provider.send_token(req, format!("tok-{}-{}", req.relation_id, req.identity));
        assert_ne!(outcome, LedgerOutcome::NoRelation);
    }

    assert!(provider.outstanding_requests().is_empty());
    assert_eq!(provider.token_requests().len(), 4);
    assert_eq!(
        provider.ledger().published(RelationId(2)).expect("decodes").get("alice"),
        Some(&"tok-2-alice".to_string())
    );
}

#[test]
fn pruning_leaves_only_requested_identities_in_every_relation() {
    let (store, provider) = setup();
    request(&store, 1, "app/0", r#"{"alice":"admins"}"#);
    request(&store, 2, "web/0", r#"{"carol":"ops"}"#);

    let stale: TokenMap = [("alice", "a"), ("bob", "b"), ("carol", "c")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    provider.issue(RelationId(1), &stale);
    provider.issue(RelationId(2), &stale);

    let reports = provider.prune();
    assert_eq!(reports.len(), 2);

    for relation in provider.registry().relations() {
        let required = provider
            .registry()
            .required_identities(relation)
            .expect("peer requests decode");
        let published = provider.ledger().published(relation).expect("decodes");
        assert!(
            identities(&published).is_subset(&required),
            "relation {relation} still publishes {published:?}"
        );
    }
    assert_eq!(
        identities(&provider.ledger().published(RelationId(1)).expect("decodes")),
        BTreeSet::from(["alice".to_string()])
    );
    assert_eq!(
        identities(&provider.ledger().published(RelationId(2)).expect("decodes")),
        BTreeSet::from(["carol".to_string()])
    );
}

#[test]
fn departed_unit_requests_are_pruned() {
    let (store, provider) = setup();
    request(&store, 1, "app/0", r#"{"alice":"admins"}"#);
    request(&store, 1, "app/1", r#"{"bob":"readers"}"#);
    for req in provider.outstanding_requests() {
        provider.send_token(&req, "tok");
    }

    store.depart(RelationId(1), "app/1").expect("depart");
    let reports = provider.prune();
    assert_eq!(reports[0].removed, vec!["bob".to_string()]);
    assert!(reports[0].outcome.is_published());
}

#[test]
fn issuing_after_teardown_is_silently_dropped() {
    let (store, provider) = setup();
    request(&store, 2, "web/0", r#"{"carol":"ops"}"#);
    let pending = provider.outstanding_requests();
    store.break_relation(RelationId(2));

    assert_eq!(provider.send_token(&pending[0], "tok"), LedgerOutcome::NoRelation);
    assert!(store.view("vault/0").list_instances("tokens") == vec![RelationId(1)]);
}

#[test]
fn unreadable_map_warning_is_recorded_in_the_provider_span() {
    let (store, _) = setup();
    request(&store, 1, "app/0", r#"{"alice":"admins"}"#);
    store
        .view("vault/0")
        .set(RelationId(1), "vault/0", "tokens", "[]")
        .expect("provider write");

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let outstanding = tracing::subscriber::with_default(subscriber, || {
        let provider = TokensProvider::new(store.view("vault/0"), &ProtocolConfig::default())
            .with_span(tracing::info_span!("vault_audit"));
        provider.outstanding_requests()
    });

    assert_eq!(outstanding.len(), 1);
    let text = logs.text();
    let line = text
        .lines()
        .find(|line| line.contains("published tokens are unreadable"))
        .expect("warning logged");
    assert!(line.contains("vault_audit"), "warning outside span: {line}");
}
