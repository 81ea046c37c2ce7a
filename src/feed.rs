//! Change notifications for attendance rows.
//!
//! Stores publish an [`AttendanceChange`] after every committed insert or
//! update. Observers hold an [`AttendanceSubscription`] scoped to a single
//! session; dropping the subscription releases its channel receiver.

use rocket::tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::AttendanceRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "record", rename_all = "snake_case")]
pub enum AttendanceChange {
    Inserted(AttendanceRecord),
    Updated(AttendanceRecord),
}

impl AttendanceChange {
    pub fn record(&self) -> &AttendanceRecord {
        match self {
            AttendanceChange::Inserted(record) | AttendanceChange::Updated(record) => record,
        }
    }

    pub fn session_id(&self) -> i64 {
        self.record().session_id
    }
}

/// What a subscriber sees: either a change for its session, or a notice that
/// it fell behind and must rebuild from a fresh snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Change(AttendanceChange),
    Resync,
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<AttendanceChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers the change was delivered to.
    pub fn publish(&self, change: AttendanceChange) -> usize {
        // Err only means nobody is listening right now.
        self.sender.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self, session_id: i64) -> AttendanceSubscription {
        debug!(session_id, "Attendance subscription opened");
        AttendanceSubscription {
            session_id,
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct AttendanceSubscription {
    session_id: i64,
    receiver: Option<broadcast::Receiver<AttendanceChange>>,
}

impl AttendanceSubscription {
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Waits for the next change in this session. Returns `None` once the
    /// subscription has been released or the feed is gone.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(change) if change.session_id() == self.session_id => {
                    return Some(FeedEvent::Change(change));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = self.session_id, skipped, "Attendance subscriber lagged");
                    return Some(FeedEvent::Resync);
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&mut self) -> Option<FeedEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.try_recv() {
                Ok(change) if change.session_id() == self.session_id => {
                    return Some(FeedEvent::Change(change));
                }
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(session_id = self.session_id, skipped, "Attendance subscriber lagged");
                    return Some(FeedEvent::Resync);
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            debug!(session_id = self.session_id, "Attendance subscription released");
        }
    }
}

impl Drop for AttendanceSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
