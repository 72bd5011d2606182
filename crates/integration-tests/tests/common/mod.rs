// Shared test wiring: the engine over in-memory ports.
#![allow(dead_code)]

use conthesis_core::application::{ActionService, Manager, Session};
use conthesis_core::domain::{ActionSource, ActionTrigger, Meta};
use conthesis_core::port::entity_store::mocks::MockEntityStore;
use conthesis_core::port::kv_store::mocks::MemoryKvStore;
use conthesis_core::port::kv_store::FIELD_STATE;
use conthesis_core::port::message_bus::mocks::MockBus;
use conthesis_core::port::time_provider::mocks::MockTimeProvider;
use conthesis_core::port::{EntityStore, KvStore, MessageBus, TimeProvider};
use serde_json::json;
use std::sync::Arc;

pub struct Engine {
    pub store: Arc<MemoryKvStore>,
    pub bus: Arc<MockBus>,
    pub entities: Arc<MockEntityStore>,
    pub time: Arc<MockTimeProvider>,
    pub service: Arc<ActionService>,
    pub manager: Arc<Manager>,
}

impl Engine {
    pub fn new() -> Self {
        let store = Arc::new(MemoryKvStore::new());
        let bus = Arc::new(MockBus::new());
        let entities = Arc::new(MockEntityStore::new());
        let time = Arc::new(MockTimeProvider::new(1_000));

        let service = Arc::new(ActionService::new(
            Arc::clone(&bus) as Arc<dyn MessageBus>,
            Arc::clone(&entities) as Arc<dyn EntityStore>,
        ));
        let manager = Arc::new(Manager::new(
            Arc::clone(&service),
            Arc::clone(&store) as Arc<dyn KvStore>,
            Arc::clone(&time) as Arc<dyn TimeProvider>,
        ));

        Self {
            store,
            bus,
            entities,
            time,
            service,
            manager,
        }
    }

    /// Raw `state` field as stored, for assertions.
    pub async fn state_of(&self, jid: &str) -> Option<String> {
        self.store
            .get(jid, FIELD_STATE)
            .await
            .unwrap()
            .map(|v| String::from_utf8(v).unwrap())
    }

    /// Internal-caller session, the way the manager opens one.
    pub async fn open_session(&self, jid: &str) -> Session {
        Session::open(
            Arc::clone(&self.service),
            Arc::clone(&self.store) as Arc<dyn KvStore>,
            Arc::clone(&self.time) as Arc<dyn TimeProvider>,
            jid,
            true,
            None,
        )
        .await
        .unwrap()
    }
}

/// Trigger for an inline identity action with one literal property.
pub fn identity_trigger(jid: &str) -> ActionTrigger {
    ActionTrigger {
        jid: jid.to_string(),
        meta: Meta::new(),
        action_source: ActionSource::Literal,
        action: json!({
            "kind": "identity",
            "properties": [{"name": "x", "kind": "LITERAL", "value": "hello"}],
        }),
    }
}
