use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::domain::{ApprovalStatus, DonorId, RecordRef, RequestId, RequestStatus, UserId};

/// Status edge taken by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusChange {
    DonorProfile {
        id: DonorId,
        from: ApprovalStatus,
        to: ApprovalStatus,
    },
    RecipientRequest {
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },
}

impl StatusChange {
    pub fn record(&self) -> RecordRef {
        match self {
            StatusChange::DonorProfile { id, .. } => RecordRef::Donor(*id),
            StatusChange::RecipientRequest { id, .. } => RecordRef::Request(*id),
        }
    }

    pub fn labels(&self) -> (&'static str, &'static str) {
        match self {
            StatusChange::DonorProfile { from, to, .. } => (from.label(), to.label()),
            StatusChange::RecipientRequest { from, to, .. } => (from.label(), to.label()),
        }
    }
}

/// Emitted after a committed lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChangeEvent {
    pub change: StatusChange,
    pub actor: UserId,
    pub at: DateTime<Utc>,
}

/// Outbound hook for UI refresh, audit logging and statistics collaborators.
///
/// Implementations must not block; the lifecycle manager ignores (and logs) failures.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: StatusChangeEvent) -> Result<(), EventError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

/// Fan-out publisher backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<StatusChangeEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChangeEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: StatusChangeEvent) -> Result<(), EventError> {
        // No subscribers is not a failure.
        let _ = self.sender.send(event);
        Ok(())
    }
}
