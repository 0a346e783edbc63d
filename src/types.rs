//! Type definitions for pitchside

use crate::error::{MatchError, Result};
use serde::{Deserialize, Serialize};

/// Team colors. The palette is fixed at exactly four entries; rotation walks
/// it in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamColor {
    Red,
    Blue,
    Green,
    Yellow,
}

impl TeamColor {
    pub const PALETTE: [TeamColor; 4] = [
        TeamColor::Red,
        TeamColor::Blue,
        TeamColor::Green,
        TeamColor::Yellow,
    ];
}

/// Match session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Live,
    Paused,
    /// Terminal; no transition leaves this state.
    Ended,
}

/// A rostered player. The substitute flag is owned by the team assignment and
/// only changes through [`Team::swap_substitute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    /// Star rating, 0-5
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default)]
    pub substitute: bool,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>, rating: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rating: rating.min(5),
            position: None,
            substitute: false,
        }
    }
}

/// One drawn team: a color and an ordered player list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub color: TeamColor,
    pub players: Vec<Player>,
}

impl Team {
    pub fn new(color: TeamColor) -> Self {
        Self {
            color,
            players: Vec::new(),
        }
    }

    /// Players currently eligible to score.
    pub fn starters(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.substitute)
    }

    pub fn substitutes(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.substitute)
    }

    pub fn total_rating(&self) -> u32 {
        self.players.iter().map(|p| p.rating as u32).sum()
    }

    /// Swap a substitute into the active lineup, benching a starter.
    pub fn swap_substitute(&mut self, sub_id: &str, starter_id: &str) -> Result<()> {
        let sub_pos = self
            .players
            .iter()
            .position(|p| p.id == sub_id && p.substitute)
            .ok_or_else(|| MatchError::PlayerNotFound(sub_id.to_string()))?;
        let starter_pos = self
            .players
            .iter()
            .position(|p| p.id == starter_id && !p.substitute)
            .ok_or_else(|| MatchError::PlayerNotFound(starter_id.to_string()))?;

        self.players[sub_pos].substitute = false;
        self.players[starter_pos].substitute = true;
        Ok(())
    }
}

/// A scored goal. Ids are random so replicated applies can deduplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalEvent {
    pub id: String,
    pub team: TeamColor,
    pub scorer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assist: Option<String>,
    pub at: u64,
}

/// Field replacements for an existing goal event. `None` leaves a field
/// untouched; `assist: Some(None)` clears the assist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scorer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assist: Option<Option<String>>,
}

/// The scoring period currently in play. Scores are derived from `events`;
/// [`Round::recompute_scores`] is the canonical repair path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub number: u32,
    pub left: TeamColor,
    pub right: TeamColor,
    pub left_score: u32,
    pub right_score: u32,
    #[serde(default)]
    pub events: Vec<GoalEvent>,
    pub running: bool,
}

impl Round {
    pub fn new(number: u32, left: TeamColor, right: TeamColor) -> Self {
        Self {
            number,
            left,
            right,
            left_score: 0,
            right_score: 0,
            events: Vec::new(),
            running: false,
        }
    }

    pub fn in_play(&self, color: TeamColor) -> bool {
        color == self.left || color == self.right
    }

    pub fn score_of(&self, color: TeamColor) -> Option<u32> {
        if color == self.left {
            Some(self.left_score)
        } else if color == self.right {
            Some(self.right_score)
        } else {
            None
        }
    }

    /// Re-derive both scores from the event log.
    pub fn recompute_scores(&mut self) {
        self.left_score = self.events.iter().filter(|e| e.team == self.left).count() as u32;
        self.right_score = self.events.iter().filter(|e| e.team == self.right).count() as u32;
    }
}

/// Summary of a completed round. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundHistoryEntry {
    pub number: u32,
    pub left: TeamColor,
    pub right: TeamColor,
    pub left_score: u32,
    pub right_score: u32,
    /// `None` marks a draw.
    pub winner: Option<TeamColor>,
    pub ended_at: u64,
}

/// A pending state-changing request awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub created_at: u64,
    pub retries: u32,
    pub max_retries: u32,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Identifier of the match session being run or viewed
    pub match_id: String,
    /// Starters per team (default: 5)
    pub team_size: usize,
    /// Configured round duration in seconds (default: 600)
    pub round_duration_secs: u32,
    /// Local clock refresh interval in ms (default: 250)
    pub refresh_interval_ms: u64,
    /// Delay before the single reconnect attempt in ms (default: 3000)
    pub reconnect_delay_ms: u64,
    /// Canonical status republish interval in ms (default: 30000)
    pub status_interval_ms: u64,
    /// Time box for a single publish in ms (default: 5000)
    pub publish_timeout_ms: u64,
    /// Retry budget for queued offline actions (default: 3)
    pub max_retries: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_id: String::new(),
            team_size: 5,
            round_duration_secs: 600,
            refresh_interval_ms: 250,
            reconnect_delay_ms: 3000,
            status_interval_ms: 30000,
            publish_timeout_ms: 5000,
            max_retries: 3,
        }
    }
}

impl MatchConfig {
    pub fn new(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            ..Default::default()
        }
    }

    pub fn team_size(mut self, n: usize) -> Self {
        self.team_size = n;
        self
    }

    pub fn round_duration_secs(mut self, secs: u32) -> Self {
        self.round_duration_secs = secs;
        self
    }

    pub fn refresh_interval_ms(mut self, ms: u64) -> Self {
        self.refresh_interval_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    pub fn status_interval_ms(mut self, ms: u64) -> Self {
        self.status_interval_ms = ms;
        self
    }

    pub fn publish_timeout_ms(mut self, ms: u64) -> Self {
        self.publish_timeout_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }
}

// Wire message shapes. The transport itself is external; only these shapes
// and their delivery semantics are defined here.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchMessage {
    MatchEvent(MatchEventContent),
    MatchStatus(MatchStatusContent),
}

/// Lifecycle and goal mutations, fanned out to every subscribed client.
/// Lifecycle kinds carry the canonical `(started_at, paused_ms)` pair so a
/// receipt is authoritative over any locally accumulated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchEventContent {
    Start {
        at: u64,
        started_at: u64,
        paused_ms: u64,
    },
    Pause {
        at: u64,
        started_at: u64,
        paused_ms: u64,
    },
    Reset {
        at: u64,
    },
    End {
        at: u64,
    },
    GoalAdded {
        event: GoalEvent,
    },
    GoalEdited {
        event: GoalEvent,
    },
    GoalDeleted {
        id: String,
        team: TeamColor,
    },
    RoundEnded {
        entry: RoundHistoryEntry,
        next_round: Round,
    },
}

/// Canonical status triple, for clients joining mid-match. The event stream
/// never backfills; late joiners converge from the latest one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStatusContent {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    pub paused_ms: u64,
}

/// Topic a session's messages are published under
pub fn match_topic(match_id: &str) -> String {
    format!("match-{match_id}")
}

/// Generate a random draw seed
pub fn generate_seed() -> u64 {
    use rand::Rng;
    rand::thread_rng().r#gen()
}

/// Generate a unique short id (8 chars)
pub fn generate_id() -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// Current time in milliseconds
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
