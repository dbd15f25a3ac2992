//! MQTT integration with Home Assistant.
//!
//! The sink is modeled as an explicit component rather than ambient global
//! state: constructed at process start, it tries to connect once and exposes
//! its connected status. Every publish path checks that status first, so an
//! unconfigured or disconnected integration degrades to a silent no-op.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::json;
use shared::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::aggregate::{ChildStateAttributes, TaskAggregate};
use crate::publish::PublishHandle;
use crate::storage::{ChildRepository, TaskRepository};

/// Home Assistant's default discovery prefix.
const DISCOVERY_PREFIX: &str = "homeassistant";
/// Prefix for this application's state topics.
const STATE_PREFIX: &str = "choreboard";

/// Broker settings, read from the environment. A missing `MQTT_HOST` means
/// the integration is disabled.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MqttConfig {
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("MQTT_HOST").ok()?;
        let port = std::env::var("MQTT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(1883);

        Some(Self {
            host,
            port,
            username: std::env::var("MQTT_USERNAME").ok(),
            password: std::env::var("MQTT_PASSWORD").ok(),
        })
    }
}

/// Transport seam for the publish/subscribe integration.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()>;

    /// False while disconnected or disabled; callers treat that as "skip".
    fn is_connected(&self) -> bool;
}

/// Sink used when no broker is configured.
pub struct NoopSink;

#[async_trait]
impl PublishSink for NoopSink {
    async fn publish(&self, _topic: &str, _payload: &str, _retain: bool) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// MQTT-backed sink. Owns the client and a background event loop that tracks
/// connection state and requests a full resync whenever the broker accepts a
/// (re)connection.
pub struct MqttSink {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttSink {
    pub fn connect(config: &MqttConfig, publish: PublishHandle) -> Self {
        let client_id = format!("choreboard_{}", std::process::id());
        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.as_deref().unwrap_or(""));
        }

        info!("MQTT: Connecting to {}:{}", config.host, config.port);

        let (client, mut eventloop) = AsyncClient::new(options, 32);
        let connected = Arc::new(AtomicBool::new(false));

        let flag = connected.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT: Connected");
                        flag.store(true, Ordering::SeqCst);
                        // Discovery configs and states may be stale or missing
                        // on the broker after a reconnect
                        publish.resync_all();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if flag.swap(false, Ordering::SeqCst) {
                            warn!("MQTT: Connection lost: {}", e);
                        } else {
                            debug!("MQTT: Connection attempt failed: {}", e);
                        }
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Self { client, connected }
    }
}

#[async_trait]
impl PublishSink for MqttSink {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Formats and publishes per-child discovery configs and aggregate state.
///
/// Each child is presented to Home Assistant as four logical channels: a
/// "done/total" sensor, an all-done binary sensor, an in-progress count and
/// a todo count.
#[derive(Clone)]
pub struct HomeAssistantPublisher {
    children: ChildRepository,
    tasks: TaskRepository,
    sink: Arc<dyn PublishSink>,
}

impl HomeAssistantPublisher {
    pub fn new(children: ChildRepository, tasks: TaskRepository, sink: Arc<dyn PublishSink>) -> Self {
        Self { children, tasks, sink }
    }

    pub fn sink_connected(&self) -> bool {
        self.sink.is_connected()
    }

    /// Register the four discovery channels for a child. Retained, and
    /// idempotent on re-registration (rename republishes the same topics).
    pub async fn publish_discovery(&self, child: &Child) -> Result<()> {
        if !self.sink.is_connected() {
            return Ok(());
        }

        let unique_id = unique_id(child.id);
        let device = json!({
            "identifiers": [unique_id],
            "name": format!("ChoreBoard - {}", child.name),
            "manufacturer": "ChoreBoard",
            "model": "Child Tasks",
        });

        let tasks_config = json!({
            "name": format!("{} Tasks", child.name),
            "unique_id": format!("{}_tasks", unique_id),
            "state_topic": state_topic(child.id, "tasks"),
            "json_attributes_topic": format!("{}/{}/tasks/attributes", STATE_PREFIX, child.id),
            "icon": "mdi:clipboard-check-outline",
            "device": device.clone(),
        });
        let all_done_config = json!({
            "name": format!("{} All Tasks Done", child.name),
            "unique_id": format!("{}_all_done", unique_id),
            "state_topic": state_topic(child.id, "all_done"),
            "payload_on": "ON",
            "payload_off": "OFF",
            "device_class": "running",
            "icon": "mdi:check-circle",
            "device": device.clone(),
        });
        let in_progress_config = json!({
            "name": format!("{} Tasks In Progress", child.name),
            "unique_id": format!("{}_in_progress", unique_id),
            "state_topic": state_topic(child.id, "in_progress"),
            "icon": "mdi:progress-clock",
            "device": device.clone(),
        });
        let todo_config = json!({
            "name": format!("{} Tasks Todo", child.name),
            "unique_id": format!("{}_todo", unique_id),
            "state_topic": state_topic(child.id, "todo"),
            "icon": "mdi:clipboard-list-outline",
            "device": device,
        });

        for (topic, config) in [
            (discovery_topic("sensor", child.id, "tasks"), tasks_config),
            (discovery_topic("binary_sensor", child.id, "all_done"), all_done_config),
            (discovery_topic("sensor", child.id, "in_progress"), in_progress_config),
            (discovery_topic("sensor", child.id, "todo"), todo_config),
        ] {
            self.sink.publish(&topic, &config.to_string(), true).await?;
        }

        info!("MQTT: Published discovery config for {}", child.name);
        Ok(())
    }

    /// Deregister a child's discovery channels by publishing retained empty
    /// payloads on the same config topics.
    pub async fn retract_discovery(&self, child_id: i64) -> Result<()> {
        if !self.sink.is_connected() {
            return Ok(());
        }

        for topic in [
            discovery_topic("sensor", child_id, "tasks"),
            discovery_topic("binary_sensor", child_id, "all_done"),
            discovery_topic("sensor", child_id, "in_progress"),
            discovery_topic("sensor", child_id, "todo"),
        ] {
            self.sink.publish(&topic, "", true).await?;
        }

        info!("MQTT: Removed discovery config for child {}", child_id);
        Ok(())
    }

    /// Recompute and publish one child's aggregate state.
    ///
    /// One repository read feeds the whole publication, so the counts, the
    /// attributes payload and the detail list always describe the same task
    /// set.
    pub async fn publish_child_state(&self, child_id: i64) -> Result<()> {
        if !self.sink.is_connected() {
            return Ok(());
        }

        if self.children.get_child(child_id).await?.is_none() {
            // A queued state event can outlive its child
            debug!("MQTT: Skipping state publish for deleted child {}", child_id);
            return Ok(());
        }

        let tasks = self.tasks.list_tasks_for_child(child_id).await?;
        let aggregate = TaskAggregate::from_tasks(&tasks);

        self.sink
            .publish(
                &state_topic(child_id, "tasks"),
                &format!("{}/{}", aggregate.done, aggregate.total),
                false,
            )
            .await?;
        self.sink
            .publish(
                &state_topic(child_id, "all_done"),
                if aggregate.all_done { "ON" } else { "OFF" },
                false,
            )
            .await?;
        self.sink
            .publish(&state_topic(child_id, "in_progress"), &aggregate.in_progress.to_string(), false)
            .await?;
        self.sink
            .publish(&state_topic(child_id, "todo"), &aggregate.todo.to_string(), false)
            .await?;

        let attributes = ChildStateAttributes::new(&aggregate, &tasks, Utc::now());
        self.sink
            .publish(
                &format!("{}/{}/tasks/attributes", STATE_PREFIX, child_id),
                &serde_json::to_string(&attributes)?,
                false,
            )
            .await?;

        debug!(
            "MQTT: Published state for child {}: {}/{} tasks",
            child_id, aggregate.done, aggregate.total
        );
        Ok(())
    }

    /// Register discovery and publish state for every child. One child's
    /// transport failure is logged and never blocks the rest of the resync.
    pub async fn publish_all(&self) -> Result<()> {
        if !self.sink.is_connected() {
            return Ok(());
        }

        for child in self.children.list_children().await? {
            let result = async {
                self.publish_discovery(&child).await?;
                self.publish_child_state(child.id).await
            }
            .await;
            if let Err(e) = result {
                warn!("MQTT: Resync failed for child {}: {:#}", child.id, e);
            }
        }
        Ok(())
    }
}

fn unique_id(child_id: i64) -> String {
    format!("choreboard_{}", child_id)
}

fn discovery_topic(component: &str, child_id: i64, suffix: &str) -> String {
    format!("{}/{}/{}_{}/config", DISCOVERY_PREFIX, component, unique_id(child_id), suffix)
}

fn state_topic(child_id: i64, channel: &str) -> String {
    format!("{}/{}/{}/state", STATE_PREFIX, child_id, channel)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every publish for assertions.
    pub struct RecordingSink {
        connected: bool,
        published: Mutex<Vec<(String, String, bool)>>,
    }

    impl RecordingSink {
        pub fn connected() -> Self {
            Self { connected: true, published: Mutex::new(Vec::new()) }
        }

        pub fn disconnected() -> Self {
            Self { connected: false, published: Mutex::new(Vec::new()) }
        }

        pub fn published(&self) -> Vec<(String, String, bool)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PublishSink for RecordingSink {
        async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string(), retain));
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;
    use crate::db::DbConnection;
    use crate::storage::NewTask;
    use shared::{RecurrenceType, TaskStatus};

    async fn setup_test(sink: Arc<RecordingSink>) -> (ChildRepository, TaskRepository, HomeAssistantPublisher) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let children = ChildRepository::new(db.clone());
        let tasks = TaskRepository::new(db);
        let publisher = HomeAssistantPublisher::new(children.clone(), tasks.clone(), sink);
        (children, tasks, publisher)
    }

    fn new_task(child_id: i64, title: &str) -> NewTask {
        NewTask {
            child_id,
            title: title.to_string(),
            description: None,
            recurrence_type: RecurrenceType::Daily,
            recurrence_date: None,
            scheduled_time: None,
        }
    }

    #[tokio::test]
    async fn test_discovery_publishes_four_retained_configs() {
        let sink = Arc::new(RecordingSink::connected());
        let (children, _tasks, publisher) = setup_test(sink.clone()).await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();

        publisher.publish_discovery(&child).await.unwrap();

        let published = sink.published();
        assert_eq!(published.len(), 4);
        assert!(published.iter().all(|(_, _, retain)| *retain));

        let (topic, payload, _) = &published[0];
        assert_eq!(topic, &format!("homeassistant/sensor/choreboard_{}_tasks/config", child.id));
        let config: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(config["name"], "Emma Tasks");
        assert_eq!(config["state_topic"], format!("choreboard/{}/tasks/state", child.id));
    }

    #[tokio::test]
    async fn test_state_payloads() {
        let sink = Arc::new(RecordingSink::connected());
        let (children, tasks, publisher) = setup_test(sink.clone()).await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();

        let done = tasks.store_task(&new_task(child.id, "Make bed"), Utc::now()).await.unwrap();
        let done2 = tasks.store_task(&new_task(child.id, "Brush teeth"), Utc::now()).await.unwrap();
        tasks.store_task(&new_task(child.id, "Homework"), Utc::now()).await.unwrap();
        tasks.update_status(done.id, TaskStatus::Done, Utc::now()).await.unwrap();
        tasks.update_status(done2.id, TaskStatus::Done, Utc::now()).await.unwrap();

        publisher.publish_child_state(child.id).await.unwrap();

        let published = sink.published();
        assert_eq!(published.len(), 5);
        assert_eq!(published[0].1, "2/3");
        assert_eq!(published[1].1, "OFF");
        assert_eq!(published[2].1, "0"); // in progress
        assert_eq!(published[3].1, "1"); // todo

        let attributes: serde_json::Value = serde_json::from_str(&published[4].1).unwrap();
        assert_eq!(attributes["completion_percentage"], 67);
        assert_eq!(attributes["task_list"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_disconnected_sink_is_a_silent_noop() {
        let sink = Arc::new(RecordingSink::disconnected());
        let (children, _tasks, publisher) = setup_test(sink.clone()).await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();

        publisher.publish_discovery(&child).await.unwrap();
        publisher.publish_child_state(child.id).await.unwrap();
        publisher.retract_discovery(child.id).await.unwrap();
        publisher.publish_all().await.unwrap();

        assert!(sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_state_publish_for_deleted_child_is_skipped() {
        let sink = Arc::new(RecordingSink::connected());
        let (children, _tasks, publisher) = setup_test(sink.clone()).await;
        let child = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();
        children.delete_child(child.id).await.unwrap();

        publisher.publish_child_state(child.id).await.unwrap();

        assert!(sink.published().is_empty());
    }

    /// Sink that rejects publishes whose topic contains a marker string.
    struct DenyingSink {
        deny: String,
        inner: RecordingSink,
    }

    #[async_trait]
    impl PublishSink for DenyingSink {
        async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
            if topic.contains(&self.deny) {
                anyhow::bail!("broker rejected publish on {}", topic);
            }
            self.inner.publish(topic, payload, retain).await
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_publish_all_continues_past_a_failing_child() {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let children = ChildRepository::new(db.clone());
        let tasks = TaskRepository::new(db);
        let first = children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();
        let second = children.store_child("Noah", "#2196F3", Utc::now()).await.unwrap();

        let sink = Arc::new(DenyingSink {
            deny: format!("choreboard_{}_", first.id),
            inner: RecordingSink::connected(),
        });
        let publisher = HomeAssistantPublisher::new(children, tasks, sink.clone());

        publisher.publish_all().await.unwrap();

        // The first child's discovery is rejected, the second still gets its
        // full set of messages
        let published = sink.inner.published();
        assert_eq!(published.len(), 9);
        assert!(published
            .iter()
            .any(|(topic, _, _)| topic == &format!("choreboard/{}/tasks/state", second.id)));
        assert!(!published
            .iter()
            .any(|(topic, _, _)| topic.contains(&format!("choreboard/{}/", first.id))));
    }

    #[tokio::test]
    async fn test_publish_all_covers_every_child() {
        let sink = Arc::new(RecordingSink::connected());
        let (children, _tasks, publisher) = setup_test(sink.clone()).await;
        children.store_child("Emma", "#4CAF50", Utc::now()).await.unwrap();
        children.store_child("Noah", "#2196F3", Utc::now()).await.unwrap();

        publisher.publish_all().await.unwrap();

        // Per child: 4 discovery configs + 4 state topics + 1 attributes
        assert_eq!(sink.published().len(), 18);
    }
}
