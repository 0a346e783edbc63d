//! Match state machine - round lifecycle, goal log, winner-stays rotation
//!
//! One `MatchState` per match id, owned by its session handle. Concurrent
//! sessions never share state.

use crate::balance::Draw;
use crate::error::{MatchError, Result};
use crate::types::{
    GoalEvent, GoalPatch, MatchEventContent, MatchStatusContent, Round, RoundHistoryEntry,
    SessionStatus, Team, TeamColor, generate_id,
};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Versioned persistence form of [`MatchState`]. `restore` rejects unknown
/// versions instead of guessing at a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub version: u32,
    pub match_id: String,
    pub status: SessionStatus,
    pub round_duration_secs: u32,
    pub started_at: Option<u64>,
    pub paused_ms: u64,
    pub paused_at: Option<u64>,
    pub teams: Vec<Team>,
    pub round: Round,
    pub history: Vec<RoundHistoryEntry>,
    pub prev_evicted: Option<TeamColor>,
}

#[derive(Debug, Clone)]
pub struct MatchState {
    pub match_id: String,
    pub status: SessionStatus,
    pub round_duration_secs: u32,
    /// Authoritative first-kickoff timestamp. Cleared only by `reset`.
    pub started_at: Option<u64>,
    /// Accumulated paused duration; folded in when a pause is resumed.
    pub paused_ms: u64,
    paused_at: Option<u64>,
    pub teams: Vec<Team>,
    pub round: Round,
    pub history: Vec<RoundHistoryEntry>,
    /// Loser of the previous round, excluded from the next rotation pick.
    prev_evicted: Option<TeamColor>,
    ticks: u64,
}

impl MatchState {
    pub fn new(match_id: impl Into<String>, draw: &Draw, round_duration_secs: u32) -> Self {
        // draw_teams guarantees at least two teams
        let round = Round::new(1, draw.teams[0].color, draw.teams[1].color);
        Self {
            match_id: match_id.into(),
            status: SessionStatus::Scheduled,
            round_duration_secs,
            started_at: None,
            paused_ms: 0,
            paused_at: None,
            teams: draw.teams.clone(),
            round,
            history: Vec::new(),
            prev_evicted: None,
            ticks: 0,
        }
    }

    pub fn team(&self, color: TeamColor) -> Option<&Team> {
        self.teams.iter().find(|t| t.color == color)
    }

    pub fn team_mut(&mut self, color: TeamColor) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.color == color)
    }

    /// Canonical status triple, published for late joiners.
    pub fn status_content(&self) -> MatchStatusContent {
        MatchStatusContent {
            status: self.status,
            started_at: self.started_at,
            paused_ms: self.paused_ms,
        }
    }

    /// Replace the team assignment with a fresh draw. Only before kickoff;
    /// the current round keeps its number but is re-seated with the new
    /// draw's first two colors.
    pub fn replace_draw(&mut self, draw: &Draw) -> Result<()> {
        if self.status != SessionStatus::Scheduled {
            return Err(MatchError::InvalidState {
                action: "redraw",
                status: self.status,
            });
        }
        self.teams = draw.teams.clone();
        self.round = Round::new(self.round.number, draw.teams[0].color, draw.teams[1].color);
        self.prev_evicted = None;
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Scheduled/Paused -> Live. Resuming folds the finished pause into the
    /// accumulator so `now - started_at - paused_ms` stays the play time.
    pub fn start(&mut self, now: u64) -> Result<MatchEventContent> {
        match self.status {
            SessionStatus::Scheduled => {}
            SessionStatus::Paused => {
                if let Some(paused_at) = self.paused_at.take() {
                    self.paused_ms += now.saturating_sub(paused_at);
                }
            }
            status => {
                return Err(MatchError::InvalidState {
                    action: "start",
                    status,
                });
            }
        }

        let started_at = *self.started_at.get_or_insert(now);
        self.status = SessionStatus::Live;
        self.round.running = true;

        Ok(MatchEventContent::Start {
            at: now,
            started_at,
            paused_ms: self.paused_ms,
        })
    }

    /// Live -> Paused.
    pub fn pause(&mut self, now: u64) -> Result<MatchEventContent> {
        if self.status != SessionStatus::Live {
            return Err(MatchError::InvalidState {
                action: "pause",
                status: self.status,
            });
        }

        self.status = SessionStatus::Paused;
        self.paused_at = Some(now);
        self.round.running = false;

        Ok(MatchEventContent::Pause {
            at: now,
            started_at: self.started_at.unwrap_or(now),
            paused_ms: self.paused_ms,
        })
    }

    /// Zero the current round's scores and event log and stop the clock.
    /// Round number and in-play pair are untouched.
    pub fn reset(&mut self, now: u64) -> Result<MatchEventContent> {
        if self.status == SessionStatus::Ended {
            return Err(MatchError::InvalidState {
                action: "reset",
                status: self.status,
            });
        }

        self.round.events.clear();
        self.round.recompute_scores();
        self.round.running = false;
        self.status = SessionStatus::Scheduled;
        self.started_at = None;
        self.paused_ms = 0;
        self.paused_at = None;
        self.ticks = 0;

        Ok(MatchEventContent::Reset { at: now })
    }

    /// Terminal transition; nothing leaves Ended.
    pub fn end(&mut self, now: u64) -> Result<MatchEventContent> {
        if self.status == SessionStatus::Ended {
            return Err(MatchError::InvalidState {
                action: "end",
                status: self.status,
            });
        }

        self.status = SessionStatus::Ended;
        self.round.running = false;

        Ok(MatchEventContent::End { at: now })
    }

    /// Advisory UI counter. Never the source of truth for elapsed time;
    /// missed or delayed ticks cannot desynchronize the match.
    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // =========================================================================
    // Goals
    // =========================================================================

    pub fn add_goal(
        &mut self,
        team: TeamColor,
        scorer: impl Into<String>,
        assist: Option<String>,
        now: u64,
    ) -> Result<GoalEvent> {
        if self.status != SessionStatus::Live {
            return Err(MatchError::InvalidState {
                action: "add_goal",
                status: self.status,
            });
        }
        if !self.round.in_play(team) {
            return Err(MatchError::TeamNotInPlay(team));
        }

        let event = GoalEvent {
            id: generate_id(),
            team,
            scorer: scorer.into(),
            assist,
            at: now,
        };
        self.round.events.push(event.clone());
        if team == self.round.left {
            self.round.left_score += 1;
        } else {
            self.round.right_score += 1;
        }

        Ok(event)
    }

    /// Replace fields on an existing event, then recompute both scores from
    /// the log so score never drifts from it.
    pub fn edit_goal(&mut self, id: &str, patch: GoalPatch) -> Result<GoalEvent> {
        if let Some(team) = patch.team {
            if !self.round.in_play(team) {
                return Err(MatchError::TeamNotInPlay(team));
            }
        }

        let event = self
            .round
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| MatchError::EventNotFound(id.to_string()))?;

        if let Some(team) = patch.team {
            event.team = team;
        }
        if let Some(scorer) = patch.scorer {
            event.scorer = scorer;
        }
        if let Some(assist) = patch.assist {
            event.assist = assist;
        }
        let updated = event.clone();

        self.round.recompute_scores();
        Ok(updated)
    }

    pub fn delete_goal(&mut self, id: &str) -> Result<GoalEvent> {
        let pos = self
            .round
            .events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| MatchError::EventNotFound(id.to_string()))?;

        let removed = self.round.events.remove(pos);
        self.round.recompute_scores();
        Ok(removed)
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// Close the current round and rotate in the next challenger.
    ///
    /// Higher score wins; the winner (or, on a draw, the left-hand team)
    /// stays in play. The challenger is the explicit color if given,
    /// otherwise the first palette color with a drawn team outside the
    /// continuing team and the two most recently evicted; a 3-team game
    /// relaxes to re-admit the previous loser, and a 2-team game re-challenges
    /// the side just evicted.
    pub fn end_round_choose_next(
        &mut self,
        explicit_next: Option<TeamColor>,
        now: u64,
    ) -> Result<(RoundHistoryEntry, Round)> {
        if self.status == SessionStatus::Ended {
            return Err(MatchError::InvalidState {
                action: "end_round",
                status: self.status,
            });
        }

        let Round {
            number,
            left,
            right,
            left_score,
            right_score,
            ..
        } = self.round;

        let winner = if left_score > right_score {
            Some(left)
        } else if right_score > left_score {
            Some(right)
        } else {
            None
        };
        let continuing = winner.unwrap_or(left);
        let evicted = if continuing == left { right } else { left };

        let challenger = match explicit_next {
            Some(color) => {
                if self.team(color).is_none() {
                    return Err(MatchError::NoSuchTeam(color));
                }
                if color == continuing {
                    return Err(MatchError::SelfChallenge(color));
                }
                color
            }
            None => self.choose_challenger(continuing, evicted),
        };

        let entry = RoundHistoryEntry {
            number,
            left,
            right,
            left_score,
            right_score,
            winner,
            ended_at: now,
        };
        self.history.push(entry.clone());
        self.prev_evicted = Some(evicted);

        let mut next = Round::new(number + 1, continuing, challenger);
        next.running = self.status == SessionStatus::Live;
        self.round = next.clone();

        Ok((entry, next))
    }

    fn choose_challenger(&self, continuing: TeamColor, evicted: TeamColor) -> TeamColor {
        let drawn = |c: TeamColor| self.team(c).is_some();

        for &color in &TeamColor::PALETTE {
            if drawn(color)
                && color != continuing
                && color != evicted
                && Some(color) != self.prev_evicted
            {
                return color;
            }
        }
        // 3-team game: the previous loser re-enters
        for &color in &TeamColor::PALETTE {
            if drawn(color) && color != continuing && color != evicted {
                return color;
            }
        }
        // 2-team game: re-challenge the side just evicted
        evicted
    }

    // =========================================================================
    // Replication
    // =========================================================================

    /// Apply a canonical status triple. Authoritative for projections that
    /// joined after the lifecycle broadcasts went out.
    pub fn apply_status(&mut self, content: &MatchStatusContent) {
        self.status = content.status;
        self.started_at = content.started_at;
        self.paused_ms = content.paused_ms;
        self.paused_at = None;
        self.round.running = content.status == SessionStatus::Live;
    }

    /// Apply a remotely originated mutation. Tolerant of at-least-once
    /// delivery: goal ids and round numbers deduplicate redundant applies.
    pub fn apply_remote(&mut self, event: &MatchEventContent) {
        match event {
            MatchEventContent::Start {
                started_at,
                paused_ms,
                ..
            } => {
                if self.status != SessionStatus::Ended {
                    self.status = SessionStatus::Live;
                    self.started_at = Some(*started_at);
                    self.paused_ms = *paused_ms;
                    self.paused_at = None;
                    self.round.running = true;
                }
            }
            MatchEventContent::Pause {
                at,
                started_at,
                paused_ms,
            } => {
                if self.status != SessionStatus::Ended {
                    self.status = SessionStatus::Paused;
                    self.started_at = Some(*started_at);
                    self.paused_ms = *paused_ms;
                    self.paused_at = Some(*at);
                    self.round.running = false;
                }
            }
            MatchEventContent::Reset { at } => {
                let _ = self.reset(*at);
            }
            MatchEventContent::End { .. } => {
                self.status = SessionStatus::Ended;
                self.round.running = false;
            }
            MatchEventContent::GoalAdded { event } => {
                if self.round.in_play(event.team)
                    && !self.round.events.iter().any(|e| e.id == event.id)
                {
                    self.round.events.push(event.clone());
                    self.round.recompute_scores();
                }
            }
            MatchEventContent::GoalEdited { event } => {
                if let Some(existing) = self.round.events.iter_mut().find(|e| e.id == event.id) {
                    *existing = event.clone();
                    self.round.recompute_scores();
                }
            }
            MatchEventContent::GoalDeleted { id, .. } => {
                let before = self.round.events.len();
                self.round.events.retain(|e| e.id != *id);
                if self.round.events.len() != before {
                    self.round.recompute_scores();
                }
            }
            MatchEventContent::RoundEnded { entry, next_round } => {
                if self.history.iter().all(|h| h.number != entry.number) {
                    self.history.push(entry.clone());
                }
                if next_round.number > self.round.number {
                    let continuing = entry.winner.unwrap_or(entry.left);
                    self.prev_evicted = Some(if continuing == entry.left {
                        entry.right
                    } else {
                        entry.left
                    });
                    self.round = next_round.clone();
                }
            }
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            version: SNAPSHOT_VERSION,
            match_id: self.match_id.clone(),
            status: self.status,
            round_duration_secs: self.round_duration_secs,
            started_at: self.started_at,
            paused_ms: self.paused_ms,
            paused_at: self.paused_at,
            teams: self.teams.clone(),
            round: self.round.clone(),
            history: self.history.clone(),
            prev_evicted: self.prev_evicted,
        }
    }

    pub fn restore(snapshot: MatchSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MatchError::SnapshotVersion(snapshot.version));
        }

        Ok(Self {
            match_id: snapshot.match_id,
            status: snapshot.status,
            round_duration_secs: snapshot.round_duration_secs,
            started_at: snapshot.started_at,
            paused_ms: snapshot.paused_ms,
            paused_at: snapshot.paused_at,
            teams: snapshot.teams,
            round: snapshot.round,
            history: snapshot.history,
            prev_evicted: snapshot.prev_evicted,
            ticks: 0,
        })
    }
}
