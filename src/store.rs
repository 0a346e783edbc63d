//! Repository boundary - roster, snapshots, and round history live in an
//! external persistent store; this core never embeds storage logic.

use crate::error::{MatchError, Result};
use crate::state::MatchSnapshot;
use crate::types::{Player, RoundHistoryEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn load_roster(&self, match_id: &str) -> Result<Vec<Player>>;
    async fn save_snapshot(&self, match_id: &str, snapshot: &MatchSnapshot) -> Result<()>;
    async fn load_snapshot(&self, match_id: &str) -> Result<Option<MatchSnapshot>>;
    async fn append_history(&self, match_id: &str, entry: &RoundHistoryEntry) -> Result<()>;
}

/// In-process [`Repository`]. Reference implementation and test backing.
#[derive(Default)]
pub struct MemoryRepository {
    rosters: RwLock<HashMap<String, Vec<Player>>>,
    snapshots: RwLock<HashMap<String, MatchSnapshot>>,
    history: RwLock<HashMap<String, Vec<RoundHistoryEntry>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_roster(&self, match_id: &str, roster: Vec<Player>) {
        self.rosters
            .write()
            .await
            .insert(match_id.to_string(), roster);
    }

    pub async fn history_of(&self, match_id: &str) -> Vec<RoundHistoryEntry> {
        self.history
            .read()
            .await
            .get(match_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn load_roster(&self, match_id: &str) -> Result<Vec<Player>> {
        self.rosters
            .read()
            .await
            .get(match_id)
            .cloned()
            .ok_or_else(|| MatchError::SessionNotFound(match_id.to_string()))
    }

    async fn save_snapshot(&self, match_id: &str, snapshot: &MatchSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(match_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, match_id: &str) -> Result<Option<MatchSnapshot>> {
        Ok(self.snapshots.read().await.get(match_id).cloned())
    }

    async fn append_history(&self, match_id: &str, entry: &RoundHistoryEntry) -> Result<()> {
        self.history
            .write()
            .await
            .entry(match_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }
}
