//! The in-process event bus (spec §4.5), grounded conceptually on the
//! `stream::unfold` + SSE pattern of `vex-api::routes::get_job_stream`
//! but generalized from single-job polling to a broadcast pub/sub:
//! ingestion publishes once per batch and every live-stream connection
//! subscribes independently. `tokio::sync::broadcast` gives the
//! "drop-oldest per slow subscriber" policy the spec allows for a
//! non-blocking fan-out without the ingestion path ever waiting on a
//! subscriber.

use agentlens_core::event::Event;
use agentlens_core::session::Session;
use agentlens_store::AlertHistory;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum BusMessage {
    EventIngested {
        tenant_id: String,
        event: Event,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SessionUpdated {
        tenant_id: String,
        session: Session,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    AlertTriggered {
        tenant_id: String,
        rule_id: String,
        history: AlertHistory,
    },
}

impl BusMessage {
    pub fn tenant_id(&self) -> &str {
        match self {
            BusMessage::EventIngested { tenant_id, .. } => tenant_id,
            BusMessage::SessionUpdated { tenant_id, .. } => tenant_id,
            BusMessage::AlertTriggered { tenant_id, .. } => tenant_id,
        }
    }
}

/// Process-local pub/sub. Publishing is synchronous with respect to the
/// caller but never blocks on a subscriber: a subscriber that falls
/// behind by more than `CHANNEL_CAPACITY` messages silently misses the
/// oldest ones (`broadcast::Receiver::recv` surfaces this as `Lagged`,
/// which callers treat as "skip and keep listening").
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusMessage>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    /// Non-blocking: `send` only fails if there are zero subscribers,
    /// which is not an error for the publisher.
    pub fn publish(&self, message: BusMessage) {
        let _ = self.sender.send(message);
    }
}

/// The live-stream request's match filters (spec §4.5): tenant is
/// mandatory and never relaxed; the rest narrow further.
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    pub tenant_id: String,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_types: Option<Vec<agentlens_core::event::EventType>>,
}

impl StreamFilter {
    /// Cross-tenant leakage is forbidden regardless of any other filter.
    pub fn matches(&self, message: &BusMessage) -> bool {
        if message.tenant_id() != self.tenant_id {
            return false;
        }
        match message {
            BusMessage::EventIngested { event, .. } => {
                if let Some(sid) = &self.session_id {
                    if &event.session_id != sid {
                        return false;
                    }
                }
                if let Some(aid) = &self.agent_id {
                    if &event.agent_id != aid {
                        return false;
                    }
                }
                if let Some(types) = &self.event_types {
                    if !types.contains(&event.event_type) {
                        return false;
                    }
                }
                true
            }
            BusMessage::SessionUpdated { session, .. } => {
                if let Some(aid) = &self.agent_id {
                    if &session.agent_id != aid {
                        return false;
                    }
                }
                true
            }
            BusMessage::AlertTriggered { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_core::event::{EventType, OrderedObject, Severity};
    use agentlens_core::hash::HashInput;

    fn sample_event(tenant: &str, session: &str) -> Event {
        let ts = chrono::Utc::now();
        let payload = OrderedObject::new();
        let metadata = OrderedObject::new();
        let hash = HashInput {
            id: "e1",
            timestamp: &ts,
            session_id: session,
            agent_id: "a1",
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload: &payload,
            metadata: &metadata,
            prev_hash: None,
        }
        .compute_hash();
        Event {
            id: "e1".into(),
            timestamp: ts,
            session_id: session.into(),
            agent_id: "a1".into(),
            tenant_id: tenant.into(),
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload,
            metadata,
            prev_hash: None,
            hash,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(BusMessage::EventIngested {
            tenant_id: "t_a".into(),
            event: sample_event("t_a", "s1"),
            timestamp: chrono::Utc::now(),
        });
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.tenant_id(), "t_a");
    }

    #[test]
    fn filter_rejects_cross_tenant_messages_regardless_of_other_filters() {
        let filter = StreamFilter {
            tenant_id: "t_a".into(),
            ..Default::default()
        };
        let msg = BusMessage::EventIngested {
            tenant_id: "t_b".into(),
            event: sample_event("t_b", "s1"),
            timestamp: chrono::Utc::now(),
        };
        assert!(!filter.matches(&msg));
    }

    #[test]
    fn filter_narrows_by_session_id() {
        let filter = StreamFilter {
            tenant_id: "t_a".into(),
            session_id: Some("s1".into()),
            ..Default::default()
        };
        assert!(filter.matches(&BusMessage::EventIngested {
            tenant_id: "t_a".into(),
            event: sample_event("t_a", "s1"),
            timestamp: chrono::Utc::now(),
        }));
        assert!(!filter.matches(&BusMessage::EventIngested {
            tenant_id: "t_a".into(),
            event: sample_event("t_a", "s2"),
            timestamp: chrono::Utc::now(),
        }));
    }
}
