//! Integration coverage for spec §8's chain-integrity and tenant-isolation
//! scenarios: a session's hash chain must verify end to end, a single
//! tampered field must be detected and localized, and one tenant must
//! never see another tenant's rows through the tenant-scoped store.

use std::sync::Arc;

use agentlens_core::event::{Event, EventType, OrderedObject, Severity};
use agentlens_core::hash::{verify_chain, HashInput};
use agentlens_store::{EventFilter, EventStore, MemoryStore, TenantScopedStore};

fn chained_events(tenant: &str, session: &str, count: usize) -> Vec<Event> {
    let mut events = Vec::with_capacity(count);
    let mut prev_hash: Option<String> = None;
    for i in 0..count {
        let id = format!("{session}-e{i}");
        let timestamp = chrono::Utc::now() + chrono::Duration::milliseconds(i as i64);
        let payload = OrderedObject::new();
        let metadata = OrderedObject::new();
        let hash = HashInput {
            id: &id,
            timestamp: &timestamp,
            session_id: session,
            agent_id: "agent-1",
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload: &payload,
            metadata: &metadata,
            prev_hash: prev_hash.as_deref(),
        }
        .compute_hash();

        events.push(Event {
            id,
            timestamp,
            session_id: session.to_string(),
            agent_id: "agent-1".to_string(),
            tenant_id: tenant.to_string(),
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload,
            metadata,
            prev_hash: prev_hash.clone(),
            hash: hash.clone(),
        });
        prev_hash = Some(hash);
    }
    events
}

#[tokio::test]
async fn a_valid_session_chain_verifies() {
    let events = chained_events("tenant_a", "session_1", 5);
    let result = verify_chain(&events);
    assert!(result.valid);
    assert!(result.failed_at_index.is_none());
}

#[tokio::test]
async fn tampering_with_a_payload_is_detected_and_localized() {
    let mut events = chained_events("tenant_a", "session_1", 5);
    events[2].payload.0.insert("injected".to_string(), serde_json::json!("attacker-controlled"));

    let result = verify_chain(&events);
    assert!(!result.valid);
    assert_eq!(result.failed_at_index, Some(2));
}

#[tokio::test]
async fn tenant_scoped_store_never_returns_another_tenants_rows() {
    let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
    store.insert_events("tenant_a", chained_events("tenant_a", "session_1", 3)).await.unwrap();
    store.insert_events("tenant_b", chained_events("tenant_b", "session_2", 3)).await.unwrap();

    let scoped_a = TenantScopedStore::new(store.clone(), "tenant_a");
    let (events, total) = scoped_a.query_events(&EventFilter::new()).await.unwrap();
    assert_eq!(total, 3);
    assert!(events.iter().all(|e| e.tenant_id == "tenant_a"));

    assert!(scoped_a.get_session("session_2").await.unwrap().is_none());
}

#[tokio::test]
async fn full_tenant_timeline_round_trips_through_the_store() {
    let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
    let events = chained_events("tenant_a", "session_1", 4);
    store.insert_events("tenant_a", events.clone()).await.unwrap();

    let timeline = store.get_session_timeline("tenant_a", "session_1").await.unwrap();
    assert_eq!(timeline.len(), 4);
    let result = verify_chain(&timeline);
    assert!(result.valid);
}
