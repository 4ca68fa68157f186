//! Post-commit notifications.
//!
//! The service publishes a [`ChamaEvent`] for every committed transition.
//! Delivery happens on a background task: notifiers never run under a group
//! lock, and a failing notifier is logged and skipped. It cannot undo the
//! state change that produced the event.

pub mod mock;

pub use mock::MockNotifier;

use crate::group::{
    Amount, GroupId, GroupStatus, InvitationId, MemberId, MemberStatus, PayoutRequestId,
    PayoutStatus,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// A committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChamaEvent {
    GroupCreated {
        group: GroupId,
        name: String,
    },
    InvitationIssued {
        group: GroupId,
        invitation: InvitationId,
        email: String,
    },
    MemberJoined {
        group: GroupId,
        member: MemberId,
    },
    MembershipDecided {
        group: GroupId,
        member: MemberId,
        status: MemberStatus,
    },
    AdminPromoted {
        group: GroupId,
        member: MemberId,
    },
    GroupStatusChanged {
        group: GroupId,
        status: GroupStatus,
    },
    ContributionRecorded {
        group: GroupId,
        member: MemberId,
        round: u32,
        amount: Amount,
    },
    RoundReady {
        group: GroupId,
        round: u32,
        total: Amount,
    },
    RoundOpened {
        group: GroupId,
        round: u32,
    },
    PayoutRequested {
        group: GroupId,
        request: PayoutRequestId,
        recipient: MemberId,
        round: u32,
        amount: Amount,
    },
    PayoutDecided {
        group: GroupId,
        request: PayoutRequestId,
        status: PayoutStatus,
    },
    PayoutCompleted {
        group: GroupId,
        request: PayoutRequestId,
        round: u32,
    },
}

impl ChamaEvent {
    pub fn group(&self) -> GroupId {
        match self {
            ChamaEvent::GroupCreated { group, .. }
            | ChamaEvent::InvitationIssued { group, .. }
            | ChamaEvent::MemberJoined { group, .. }
            | ChamaEvent::MembershipDecided { group, .. }
            | ChamaEvent::AdminPromoted { group, .. }
            | ChamaEvent::GroupStatusChanged { group, .. }
            | ChamaEvent::ContributionRecorded { group, .. }
            | ChamaEvent::RoundReady { group, .. }
            | ChamaEvent::RoundOpened { group, .. }
            | ChamaEvent::PayoutRequested { group, .. }
            | ChamaEvent::PayoutDecided { group, .. }
            | ChamaEvent::PayoutCompleted { group, .. } => *group,
        }
    }
}

/// Notification delivery errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Downstream consumer of events (push, email, ledger triggers).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &ChamaEvent) -> Result<(), NotifyError>;
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &ChamaEvent) -> Result<(), NotifyError> {
        info!(group = %event.group(), ?event, "event");
        Ok(())
    }
}

/// Fans committed events out to notifiers and stream subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    queue: mpsc::UnboundedSender<ChamaEvent>,
    events_tx: broadcast::Sender<ChamaEvent>,
}

impl EventDispatcher {
    /// Start the delivery task. Must be called inside a tokio runtime.
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<ChamaEvent>();
        let (events_tx, _) = broadcast::channel(256);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for notifier in &notifiers {
                    if let Err(e) = notifier.notify(&event).await {
                        warn!(group = %event.group(), error = %e, "notifier failed");
                    }
                }
            }
        });

        Self { queue, events_tx }
    }

    /// Queue events for delivery. Never blocks and never fails the caller.
    pub fn publish(&self, events: Vec<ChamaEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events_tx.send(event.clone());
            if self.queue.send(event).is_err() {
                warn!("notification task has stopped");
            }
        }
    }

    /// Stream of events, optionally limited to one group.
    pub fn subscribe(
        &self,
        group: Option<GroupId>,
    ) -> Box<dyn futures::Stream<Item = ChamaEvent> + Send + Unpin> {
        let mut rx = self.events_tx.subscribe();
        let (tx, rx_filtered) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if group.map_or(true, |g| g == event.group()) && tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Box::new(tokio_stream::wrappers::UnboundedReceiverStream::new(
            rx_filtered,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn opened(group: GroupId, round: u32) -> ChamaEvent {
        ChamaEvent::RoundOpened { group, round }
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_block_others() {
        let failing = MockNotifier::new();
        failing.set_failing(true);
        let healthy = MockNotifier::new();
        let dispatcher = EventDispatcher::new(vec![
            Arc::new(failing.clone()),
            Arc::new(healthy.clone()),
        ]);

        let group = GroupId::new();
        dispatcher.publish(vec![opened(group, 1), opened(group, 2)]);

        let received = healthy.wait_for(2, Duration::from_secs(2)).await;
        assert_eq!(received, vec![opened(group, 1), opened(group, 2)]);
        assert!(failing.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_subscription_filters_by_group() {
        let dispatcher = EventDispatcher::new(Vec::new());
        let (mine, other) = (GroupId::new(), GroupId::new());
        let mut stream = dispatcher.subscribe(Some(mine));
        // Let the forwarding task start listening.
        tokio::task::yield_now().await;

        dispatcher.publish(vec![opened(other, 1), opened(mine, 1)]);

        let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, opened(mine, 1));
    }

    #[test]
    fn test_event_json_shape() {
        let group = GroupId::new();
        let json = serde_json::to_value(opened(group, 3)).unwrap();
        assert_eq!(json["event"], "round_opened");
        assert_eq!(json["round"], 3);
        assert_eq!(json["group"], group.to_string());
    }
}
