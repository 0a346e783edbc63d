//! Elapsed-time derivation from authoritative timestamps
//!
//! Elapsed time is never an accumulated client-side total. It is re-derived
//! from the `(started_at, paused_ms)` pair on every refresh, so all viewers
//! converge after any lifecycle change regardless of local drift or missed
//! ticks.

use crate::types::{MatchEventContent, MatchStatusContent, SessionStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockSync {
    pub status: SessionStatus,
    pub started_at: Option<u64>,
    pub paused_ms: u64,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max(0, (now - started_at - paused_ms) / 1000)` while Live, 0 otherwise.
    pub fn elapsed_secs(&self, now_ms: u64) -> u64 {
        match (self.status, self.started_at) {
            (SessionStatus::Live, Some(started_at)) => {
                now_ms.saturating_sub(started_at + self.paused_ms) / 1000
            }
            _ => 0,
        }
    }

    /// Apply a lifecycle broadcast. Authoritative: the carried pair replaces
    /// local values outright. Goal mutations do not touch the clock.
    pub fn apply_event(&mut self, event: &MatchEventContent) {
        match event {
            MatchEventContent::Start {
                started_at,
                paused_ms,
                ..
            } => {
                self.status = SessionStatus::Live;
                self.started_at = Some(*started_at);
                self.paused_ms = *paused_ms;
            }
            MatchEventContent::Pause {
                started_at,
                paused_ms,
                ..
            } => {
                self.status = SessionStatus::Paused;
                self.started_at = Some(*started_at);
                self.paused_ms = *paused_ms;
            }
            MatchEventContent::Reset { .. } => {
                self.status = SessionStatus::Scheduled;
                self.started_at = None;
                self.paused_ms = 0;
            }
            MatchEventContent::End { .. } => {
                self.status = SessionStatus::Ended;
            }
            _ => {}
        }
    }

    /// Apply a canonical status triple (late join, periodic republish).
    pub fn apply_status(&mut self, status: &MatchStatusContent) {
        self.status = status.status;
        self.started_at = status.started_at;
        self.paused_ms = status.paused_ms;
    }
}
