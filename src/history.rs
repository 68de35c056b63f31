//! Per-user conversation history.
//!
//! The outer map is guarded by a parking_lot mutex held only long enough to
//! find a user's slot. Each user's turns sit behind their own tokio mutex,
//! taken for the full span of a run: two requests for the same user
//! serialize, requests for different users never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::Turn;

type Slot = Arc<tokio::sync::Mutex<Vec<Turn>>>;

pub struct HistoryStore {
    users: parking_lot::Mutex<HashMap<String, Slot>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            users: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, user_id: &str) -> Slot {
        self.users
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Exclusive access to one user's turns for the span of a run. The
    /// guard owns its slot, so it outlives the store borrow.
    pub async fn lock(&self, user_id: &str) -> tokio::sync::OwnedMutexGuard<Vec<Turn>> {
        self.slot(user_id).lock_owned().await
    }

    /// Snapshot of a user's turns.
    pub async fn turns(&self, user_id: &str) -> Vec<Turn> {
        self.slot(user_id).lock().await.clone()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}
