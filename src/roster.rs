//! Ordered attendance views kept current by the change feed.

use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::feed::{AttendanceChange, AttendanceSubscription, FeedEvent};
use crate::models::AttendanceRecord;
use crate::store::SharedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "snake_case")]
pub enum RosterView {
    /// Most recent arrival first.
    #[default]
    #[field(value = "panel")]
    Panel,
    /// Points descending, earlier arrival first on ties.
    #[field(value = "leaderboard")]
    Leaderboard,
}

/// What applying one feed event did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Prepended,
    Reloaded,
    Unchanged,
}

pub struct LiveRoster {
    store: SharedStore,
    session_id: i64,
    view: RosterView,
    records: Vec<AttendanceRecord>,
    subscription: AttendanceSubscription,
}

impl LiveRoster {
    /// Subscribes first and then loads the snapshot, so a change committed in
    /// between is seen twice rather than missed.
    #[instrument(skip(store))]
    pub async fn open(
        store: SharedStore,
        session_id: i64,
        view: RosterView,
    ) -> Result<Self, AppError> {
        let subscription = store.subscribe_attendance(session_id);
        let records = store.list_attendance(session_id, view).await?;
        debug!(count = records.len(), "Roster snapshot loaded");

        Ok(Self {
            store,
            session_id,
            view,
            records,
            subscription,
        })
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn view(&self) -> RosterView {
        self.view
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Waits for the next change to this session and applies it. Returns
    /// `None` once the feed has closed.
    pub async fn next_change(&mut self) -> Result<Option<Refresh>, AppError> {
        match self.subscription.next().await {
            Some(event) => self.apply(event).await.map(Some),
            None => Ok(None),
        }
    }

    /// Applies every change already queued without waiting.
    pub async fn try_sync(&mut self) -> Result<usize, AppError> {
        let mut applied = 0;
        while let Some(event) = self.subscription.try_next() {
            self.apply(event).await?;
            applied += 1;
        }
        Ok(applied)
    }

    pub async fn reload(&mut self) -> Result<(), AppError> {
        self.records = self
            .store
            .list_attendance(self.session_id, self.view)
            .await?;
        Ok(())
    }

    async fn apply(&mut self, event: FeedEvent) -> Result<Refresh, AppError> {
        match (event, self.view) {
            (FeedEvent::Change(AttendanceChange::Inserted(record)), RosterView::Panel) => {
                if self.records.iter().any(|r| r.id == record.id) {
                    return Ok(Refresh::Unchanged);
                }
                self.records.insert(0, record);
                Ok(Refresh::Prepended)
            }
            // Rank order can't be patched in place, and updates may move any row.
            _ => {
                self.reload().await?;
                Ok(Refresh::Reloaded)
            }
        }
    }

    pub fn close(mut self) {
        self.subscription.unsubscribe();
    }
}

pub fn rank_label(rank: usize) -> String {
    match rank {
        1 => "1st".to_string(),
        2 => "2nd".to_string(),
        3 => "3rd".to_string(),
        n => n.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedEntry {
    pub rank: usize,
    pub label: String,
    #[serde(flatten)]
    pub record: AttendanceRecord,
}

/// Numbers records in the order given, starting at 1.
pub fn ranked(records: &[AttendanceRecord]) -> Vec<RankedEntry> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| RankedEntry {
            rank: i + 1,
            label: rank_label(i + 1),
            record: record.clone(),
        })
        .collect()
}
