//! Integration tests for the configuration synchronization protocol:
//! events published on the ordered topic flow through the engine into the
//! store and the live trigger registry.

use std::sync::Arc;
use std::time::Duration;

use tokio_test::assert_ok;

use tempo_core::config::SchedulerConfig;
use tempo_core::models::{Namespace, Schedule, Workflow, WorkflowTrigger, WorkflowTriggerId};
use tempo_core::queue::{MemoryQueue, QueueProducer};
use tempo_core::service::SchedulerService;
use tempo_core::store::{MemoryStore, StoreProvider};
use tempo_core::sync::{ConfigAction, ConfigEntity, ConfigUpdate};

fn fixture() -> (
    Arc<SchedulerService>,
    Arc<MemoryQueue>,
    Arc<MemoryStore>,
    tokio::sync::mpsc::UnboundedReceiver<tempo_core::sync::ApplyFailure>,
) {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let store_handle: Arc<dyn StoreProvider> = store.clone();
    let (service, failures) = SchedulerService::new(
        SchedulerConfig {
            poll_interval_ms: 10,
            ..SchedulerConfig::default()
        },
        store_handle,
        queue.clone(),
    );
    (service, queue, store, failures)
}

fn namespace_event(action: ConfigAction, name: &str, description: Option<&str>) -> ConfigUpdate {
    ConfigUpdate::new(
        action,
        ConfigEntity::Namespace(Namespace::new(name, description.map(String::from))),
    )
}

fn workflow_event(action: ConfigAction, namespace: &str, name: &str) -> ConfigUpdate {
    let mut workflow = Workflow::new(name, namespace);
    workflow.tasks = serde_json::json!([{"name": "step-one"}]);
    ConfigUpdate::new(action, ConfigEntity::Workflow(workflow))
}

fn trigger_event(action: ConfigAction, trigger: WorkflowTrigger) -> ConfigUpdate {
    ConfigUpdate::new(action, ConfigEntity::WorkflowTrigger(trigger))
}

fn slow_trigger(namespace: &str, workflow: &str, name: &str) -> WorkflowTrigger {
    WorkflowTrigger::new(
        namespace,
        workflow,
        name,
        Schedule::Fixed {
            interval_ms: 3_600_000,
        },
    )
}

async fn publish(queue: &MemoryQueue, topic: &str, update: &ConfigUpdate) {
    let payload = assert_ok!(update.to_json());
    queue
        .send_in_order(topic, payload, update.ordering_key())
        .await
        .expect("enqueue");
}

/// Poll until the topic is drained and give the engine a beat to apply
async fn settle(queue: &MemoryQueue, topic: &str) {
    for _ in 0..200 {
        if queue.depth(topic) == 0 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("configuration topic never drained");
}

#[tokio::test]
async fn full_entity_lifecycle_flows_from_queue_to_registry() {
    let (service, queue, store, _failures) = fixture();
    service.start();
    let topic = SchedulerConfig::default().config_updates_topic;

    publish(&queue, &topic, &namespace_event(ConfigAction::Create, "prod", None)).await;
    publish(&queue, &topic, &workflow_event(ConfigAction::Create, "prod", "etl")).await;
    publish(
        &queue,
        &topic,
        &trigger_event(ConfigAction::Create, slow_trigger("prod", "etl", "hourly")),
    )
    .await;
    settle(&queue, &topic).await;

    let trigger_id = WorkflowTriggerId::new("prod", "etl", "hourly");
    assert!(store
        .trigger_store()
        .load(&trigger_id)
        .await
        .unwrap()
        .is_some());
    assert!(service.registry().contains(&trigger_id));

    // delete walks the other way: registry first, then store
    publish(
        &queue,
        &topic,
        &trigger_event(ConfigAction::Delete, slow_trigger("prod", "etl", "hourly")),
    )
    .await;
    settle(&queue, &topic).await;

    assert!(!service.registry().contains(&trigger_id));
    assert!(store
        .trigger_store()
        .load(&trigger_id)
        .await
        .unwrap()
        .is_none());
    service.shutdown();
}

#[tokio::test]
async fn duplicate_create_is_idempotent() {
    let (service, queue, store, _failures) = fixture();
    service.start();
    let topic = SchedulerConfig::default().config_updates_topic;

    let create = trigger_event(ConfigAction::Create, slow_trigger("prod", "etl", "hourly"));
    publish(&queue, &topic, &namespace_event(ConfigAction::Create, "prod", None)).await;
    publish(&queue, &topic, &create).await;
    publish(&queue, &topic, &create).await;
    settle(&queue, &topic).await;

    assert_eq!(service.registry().len(), 1);
    assert_eq!(
        store.trigger_store().load_by_namespace("prod").await.unwrap().len(),
        1
    );
    service.shutdown();
}

#[tokio::test]
async fn later_update_wins_within_an_ordering_key() {
    let (service, queue, store, _failures) = fixture();
    service.start();
    let topic = SchedulerConfig::default().config_updates_topic;

    publish(
        &queue,
        &topic,
        &namespace_event(ConfigAction::Create, "prod", Some("v0")),
    )
    .await;
    publish(
        &queue,
        &topic,
        &namespace_event(ConfigAction::Update, "prod", Some("v1")),
    )
    .await;
    publish(
        &queue,
        &topic,
        &namespace_event(ConfigAction::Update, "prod", Some("v2")),
    )
    .await;
    settle(&queue, &topic).await;

    let ns = store
        .namespace_store()
        .load(&Namespace::new("prod", None).id())
        .await
        .unwrap()
        .expect("namespace exists");
    assert_eq!(ns.description.as_deref(), Some("v2"));
    service.shutdown();
}

#[tokio::test]
async fn trigger_update_reschedules_the_live_entry() {
    let (service, queue, _store, _failures) = fixture();
    service.start();
    let topic = SchedulerConfig::default().config_updates_topic;

    publish(
        &queue,
        &topic,
        &trigger_event(ConfigAction::Create, slow_trigger("prod", "etl", "hourly")),
    )
    .await;
    settle(&queue, &topic).await;

    let id = WorkflowTriggerId::new("prod", "etl", "hourly");
    let before = service.registry().live_trigger(&id).expect("registered");

    let mut updated = slow_trigger("prod", "etl", "hourly");
    updated.schedule = Schedule::Fixed {
        interval_ms: 7_200_000,
    };
    publish(&queue, &topic, &trigger_event(ConfigAction::Update, updated.clone())).await;
    settle(&queue, &topic).await;

    let after = service.registry().live_trigger(&id).expect("still registered");
    assert_ne!(before.schedule, after.schedule);
    assert_eq!(after.schedule, updated.schedule);
    service.shutdown();
}

#[tokio::test]
async fn disabling_a_trigger_removes_it_from_the_registry_only() {
    let (service, queue, store, _failures) = fixture();
    service.start();
    let topic = SchedulerConfig::default().config_updates_topic;

    publish(
        &queue,
        &topic,
        &trigger_event(ConfigAction::Create, slow_trigger("prod", "etl", "hourly")),
    )
    .await;
    settle(&queue, &topic).await;
    let id = WorkflowTriggerId::new("prod", "etl", "hourly");
    assert!(service.registry().contains(&id));

    let mut disabled = slow_trigger("prod", "etl", "hourly");
    disabled.enabled = false;
    publish(&queue, &topic, &trigger_event(ConfigAction::Update, disabled)).await;
    settle(&queue, &topic).await;

    assert!(!service.registry().contains(&id));
    let stored = store.trigger_store().load(&id).await.unwrap().expect("record kept");
    assert!(!stored.enabled);
    service.shutdown();
}

#[tokio::test]
async fn namespace_delete_cascades_over_workflows_and_triggers() {
    let (service, queue, store, _failures) = fixture();
    service.start();
    let topic = SchedulerConfig::default().config_updates_topic;

    publish(&queue, &topic, &namespace_event(ConfigAction::Create, "prod", None)).await;
    publish(&queue, &topic, &workflow_event(ConfigAction::Create, "prod", "etl")).await;
    publish(&queue, &topic, &workflow_event(ConfigAction::Create, "prod", "reports")).await;
    publish(
        &queue,
        &topic,
        &trigger_event(ConfigAction::Create, slow_trigger("prod", "etl", "hourly")),
    )
    .await;
    publish(
        &queue,
        &topic,
        &trigger_event(ConfigAction::Create, slow_trigger("prod", "reports", "daily")),
    )
    .await;
    // unrelated namespace survives the cascade
    publish(&queue, &topic, &namespace_event(ConfigAction::Create, "staging", None)).await;
    publish(
        &queue,
        &topic,
        &trigger_event(ConfigAction::Create, slow_trigger("staging", "etl", "hourly")),
    )
    .await;
    settle(&queue, &topic).await;
    assert_eq!(service.registry().len(), 3);

    publish(&queue, &topic, &namespace_event(ConfigAction::Delete, "prod", None)).await;
    settle(&queue, &topic).await;

    assert_eq!(service.registry().len(), 1);
    assert!(service
        .registry()
        .contains(&WorkflowTriggerId::new("staging", "etl", "hourly")));
    assert!(store.trigger_store().load_by_namespace("prod").await.unwrap().is_empty());
    assert!(store.workflow_store().load_by_namespace("prod").await.unwrap().is_empty());
    assert!(store
        .namespace_store()
        .load(&Namespace::new("prod", None).id())
        .await
        .unwrap()
        .is_none());
    service.shutdown();
}

#[tokio::test]
async fn invalid_schedules_are_rejected_before_persisting() {
    let (service, queue, store, mut failures) = fixture();
    service.start();
    let topic = SchedulerConfig::default().config_updates_topic;

    let bad = WorkflowTrigger::new(
        "prod",
        "etl",
        "broken",
        Schedule::Cron {
            cron_expression: "not a cron expression".to_string(),
            timezone: None,
            misfire_instruction: Default::default(),
        },
    );
    publish(&queue, &topic, &trigger_event(ConfigAction::Create, bad)).await;
    settle(&queue, &topic).await;

    let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
        .await
        .expect("failure reported")
        .expect("channel open");
    assert!(failure.error.contains("invalid schedule"));

    let id = WorkflowTriggerId::new("prod", "etl", "broken");
    assert!(store.trigger_store().load(&id).await.unwrap().is_none());
    assert!(!service.registry().contains(&id));
    service.shutdown();
}

#[tokio::test]
async fn malformed_payloads_reach_the_failure_channel_without_stalling() {
    let (service, queue, store, mut failures) = fixture();
    service.start();
    let topic = SchedulerConfig::default().config_updates_topic;

    queue
        .send_in_order(&topic, "{not json".to_string(), "prod")
        .await
        .unwrap();
    publish(&queue, &topic, &namespace_event(ConfigAction::Create, "prod", None)).await;
    settle(&queue, &topic).await;

    let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
        .await
        .expect("failure reported")
        .expect("channel open");
    assert_eq!(failure.payload, "{not json");

    // the stream keeps flowing past the poison message
    assert!(store
        .namespace_store()
        .load(&Namespace::new("prod", None).id())
        .await
        .unwrap()
        .is_some());
    service.shutdown();
}
