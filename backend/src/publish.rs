//! Mutation-to-publish glue.
//!
//! Mutations never publish inline: they enqueue an event here and return.
//! A single background worker drains the queue, which keeps publication
//! fire-and-forget for the HTTP path while preserving per-child ordering
//! (the store write has completed before the event is enqueued, and events
//! are processed one at a time).

use shared::Child;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::mqtt::HomeAssistantPublisher;

/// A publication requested by a mutation or by the reset sweep.
#[derive(Debug, Clone)]
pub enum PublishEvent {
    /// Recompute and publish one child's aggregate state.
    ChildState(i64),
    /// (Re-)register a child's discovery channels, then publish its state.
    /// Sent on child create and rename; re-registration is idempotent.
    ChildDiscovery(Child),
    /// Deregister a deleted child's discovery channels. No state publish
    /// follows; the child no longer exists.
    RetractDiscovery(i64),
    /// Re-register discovery and republish state for every child. Sent when
    /// the sink (re)connects.
    ResyncAll,
}

/// Cheap cloneable handle for enqueueing publish events.
#[derive(Clone)]
pub struct PublishHandle {
    tx: UnboundedSender<PublishEvent>,
}

impl PublishHandle {
    /// Create a handle and the receiver end for the worker.
    pub fn channel() -> (Self, UnboundedReceiver<PublishEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn child_state(&self, child_id: i64) {
        self.send(PublishEvent::ChildState(child_id));
    }

    pub fn discovery(&self, child: Child) {
        self.send(PublishEvent::ChildDiscovery(child));
    }

    pub fn retract_discovery(&self, child_id: i64) {
        self.send(PublishEvent::RetractDiscovery(child_id));
    }

    pub fn resync_all(&self) {
        self.send(PublishEvent::ResyncAll);
    }

    fn send(&self, event: PublishEvent) {
        debug!("Enqueueing publish event: {:?}", event);
        if self.tx.send(event).is_err() {
            // Worker gone during shutdown; publication is best-effort anyway
            warn!("Publish worker is not running, dropping event");
        }
    }
}

/// Spawn the background worker that applies publish events in order.
/// Failures are logged and never propagate to the mutation that queued them.
pub fn spawn_publish_worker(
    publisher: HomeAssistantPublisher,
    mut rx: UnboundedReceiver<PublishEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = apply_event(&publisher, &event).await {
                warn!("Publish event {:?} failed: {:#}", event, e);
            }
        }
        debug!("Publish worker stopped");
    })
}

async fn apply_event(publisher: &HomeAssistantPublisher, event: &PublishEvent) -> anyhow::Result<()> {
    match event {
        PublishEvent::ChildState(child_id) => publisher.publish_child_state(*child_id).await,
        PublishEvent::ChildDiscovery(child) => {
            publisher.publish_discovery(child).await?;
            publisher.publish_child_state(child.id).await
        }
        PublishEvent::RetractDiscovery(child_id) => publisher.retract_discovery(*child_id).await,
        PublishEvent::ResyncAll => publisher.publish_all().await,
    }
}
