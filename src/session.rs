//! Match session - session-scoped coordinator for one live match
//!
//! One handle per match id, in one of two roles: the session owner (drew the
//! teams, drives the lifecycle, publishes canonical status) or a read-only
//! projection that applies broadcasts and never originates lifecycle
//! mutations. Every user action is validated on the state machine first,
//! then replicated; a transport failure lands the action on the offline
//! queue instead of blocking anything.

use crate::balance::{BalanceStats, Draw, draw_teams};
use crate::clock::ClockSync;
use crate::error::{MatchError, Result};
use crate::queue::{ActionSender, FlushReport, OfflineActionQueue, QueueStore};
use crate::replicate::{Envelope, MessageHandler, PubSub, Replicator};
use crate::state::MatchState;
use crate::store::Repository;
use crate::types::{
    GoalEvent, GoalPatch, MatchConfig, MatchEventContent, MatchMessage, MatchStatusContent,
    QueueItem, Round, RoundHistoryEntry, SessionStatus, Team, TeamColor, generate_seed, now_ms,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, info, warn};

/// Session events emitted to the embedding application
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Match went live (first kickoff or resume)
    Started { at: u64 },
    /// Match paused
    Paused { at: u64 },
    /// Current round's scores and events were zeroed, clock stopped
    Reset,
    /// Match ended (terminal)
    Ended { at: u64 },
    /// Goal appended
    GoalAdded(GoalEvent),
    /// Goal fields replaced
    GoalEdited(GoalEvent),
    /// Goal removed, scores recomputed
    GoalDeleted { id: String, team: TeamColor },
    /// Round closed; the next one is already seated
    RoundEnded {
        entry: RoundHistoryEntry,
        next_round: Round,
    },
    /// Canonical status received (late join, periodic republish)
    StatusRefreshed(MatchStatusContent),
    /// Re-derived elapsed seconds changed
    Elapsed(u64),
    /// An action could not reach the network and was queued
    SyncPending { queued: usize },
    /// A queued action exhausted its retry budget and was dropped
    SyncFailed { action: String, retries: u32 },
}

fn session_event_for(event: &MatchEventContent) -> SessionEvent {
    match event {
        MatchEventContent::Start { at, .. } => SessionEvent::Started { at: *at },
        MatchEventContent::Pause { at, .. } => SessionEvent::Paused { at: *at },
        MatchEventContent::Reset { .. } => SessionEvent::Reset,
        MatchEventContent::End { at } => SessionEvent::Ended { at: *at },
        MatchEventContent::GoalAdded { event } => SessionEvent::GoalAdded(event.clone()),
        MatchEventContent::GoalEdited { event } => SessionEvent::GoalEdited(event.clone()),
        MatchEventContent::GoalDeleted { id, team } => SessionEvent::GoalDeleted {
            id: id.clone(),
            team: *team,
        },
        MatchEventContent::RoundEnded { entry, next_round } => SessionEvent::RoundEnded {
            entry: entry.clone(),
            next_round: next_round.clone(),
        },
    }
}

/// MatchSession - one live match, kept consistent across clients
pub struct MatchSession {
    config: MatchConfig,
    is_owner: bool,
    state: Arc<RwLock<MatchState>>,
    clock: Arc<RwLock<ClockSync>>,
    replicator: Arc<Replicator>,
    queue: Arc<OfflineActionQueue>,
    repository: Arc<dyn Repository>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: Arc<RwLock<mpsc::Receiver<SessionEvent>>>,
    tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
}

impl MatchSession {
    /// Open a session as its owner: load the roster, draw balanced teams,
    /// persist the initial snapshot, subscribe, and start publishing.
    pub async fn open(
        config: MatchConfig,
        transport: Arc<dyn PubSub>,
        queue_store: Arc<dyn QueueStore>,
        repository: Arc<dyn Repository>,
    ) -> Result<Self> {
        let roster = repository.load_roster(&config.match_id).await?;
        let draw = draw_teams(&roster, config.team_size, generate_seed())?;
        Self::open_with_draw(config, draw, transport, queue_store, repository).await
    }

    /// Open as owner with a pre-made draw (e.g. one already shown to and
    /// confirmed by the organizer).
    pub async fn open_with_draw(
        config: MatchConfig,
        draw: Draw,
        transport: Arc<dyn PubSub>,
        queue_store: Arc<dyn QueueStore>,
        repository: Arc<dyn Repository>,
    ) -> Result<Self> {
        let state = MatchState::new(&config.match_id, &draw, config.round_duration_secs);
        repository
            .save_snapshot(&config.match_id, &state.snapshot())
            .await?;

        let session = Self::assemble(config, state, transport, queue_store, repository, true);
        session.attach().await?;
        info!("Opened match session {}", session.config.match_id);
        Ok(session)
    }

    /// Join an existing session as a read-only projection, restored from the
    /// last saved snapshot. The event stream does not backfill; the clock
    /// converges as soon as the owner's next status or lifecycle broadcast
    /// arrives.
    pub async fn join(
        config: MatchConfig,
        transport: Arc<dyn PubSub>,
        queue_store: Arc<dyn QueueStore>,
        repository: Arc<dyn Repository>,
    ) -> Result<Self> {
        let snapshot = repository
            .load_snapshot(&config.match_id)
            .await?
            .ok_or_else(|| MatchError::SessionNotFound(config.match_id.clone()))?;
        let state = MatchState::restore(snapshot)?;

        let session = Self::assemble(config, state, transport, queue_store, repository, false);
        session.attach().await?;
        info!("Joined match session {}", session.config.match_id);
        Ok(session)
    }

    fn assemble(
        config: MatchConfig,
        state: MatchState,
        transport: Arc<dyn PubSub>,
        queue_store: Arc<dyn QueueStore>,
        repository: Arc<dyn Repository>,
        is_owner: bool,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(100);

        let mut clock = ClockSync::new();
        clock.apply_status(&state.status_content());

        let replicator = Replicator::new(
            transport,
            Duration::from_millis(config.reconnect_delay_ms),
            Duration::from_millis(config.publish_timeout_ms),
        );
        let queue = OfflineActionQueue::new(queue_store, config.max_retries);

        Self {
            config,
            is_owner,
            state: Arc::new(RwLock::new(state)),
            clock: Arc::new(RwLock::new(clock)),
            replicator: Arc::new(replicator),
            queue: Arc::new(queue),
            repository,
            event_tx,
            event_rx: Arc::new(RwLock::new(event_rx)),
            tasks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Subscribe and start the background tickers.
    async fn attach(&self) -> Result<()> {
        let handler = self.incoming_handler();
        self.replicator
            .subscribe_session(&self.config.match_id, handler)
            .await?;

        self.spawn_clock_refresh().await;
        if self.is_owner {
            self.spawn_status_republish().await;
            self.publish_status().await;
        }
        Ok(())
    }

    /// Tear down the subscription and cancel the tickers. Always close (or
    /// drop the whole process) before opening another session on the same
    /// client - no two timers or listeners run concurrently.
    pub async fn close(&self) {
        for handle in self.tasks.write().await.drain(..) {
            handle.abort();
        }
        self.replicator.unsubscribe_session().await;
        debug!("Closed match session {}", self.config.match_id);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn match_id(&self) -> &str {
        &self.config.match_id
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn client_id(&self) -> String {
        self.replicator.client_id()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    pub async fn round(&self) -> Round {
        self.state.read().await.round.clone()
    }

    pub async fn teams(&self) -> Vec<Team> {
        self.state.read().await.teams.clone()
    }

    pub async fn balance_stats(&self) -> BalanceStats {
        BalanceStats::of(&self.state.read().await.teams)
    }

    pub async fn history(&self) -> Vec<RoundHistoryEntry> {
        self.state.read().await.history.clone()
    }

    pub async fn elapsed_secs(&self) -> u64 {
        self.clock.read().await.elapsed_secs(now_ms())
    }

    pub async fn pending_actions(&self) -> usize {
        self.queue.pending().await.unwrap_or(0)
    }

    /// Receive next event (blocking)
    pub async fn recv(&self) -> Option<SessionEvent> {
        self.event_rx.write().await.recv().await
    }

    /// Receive next event (non-blocking)
    pub async fn try_recv(&self) -> Option<SessionEvent> {
        self.event_rx.write().await.try_recv().ok()
    }

    // =========================================================================
    // Lifecycle actions (owner only - single writer per session)
    // =========================================================================

    pub async fn start(&self) -> Result<()> {
        self.require_owner("start")?;
        let event = self.state.write().await.start(now_ms())?;
        self.accept_local(&event).await;
        self.replicate(event).await?;
        self.publish_status().await;
        self.persist_snapshot().await;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.require_owner("pause")?;
        let event = self.state.write().await.pause(now_ms())?;
        self.accept_local(&event).await;
        self.replicate(event).await?;
        self.publish_status().await;
        self.persist_snapshot().await;
        Ok(())
    }

    pub async fn reset(&self) -> Result<()> {
        self.require_owner("reset")?;
        let event = self.state.write().await.reset(now_ms())?;
        self.accept_local(&event).await;
        self.replicate(event).await?;
        self.publish_status().await;
        self.persist_snapshot().await;
        Ok(())
    }

    pub async fn end(&self) -> Result<()> {
        self.require_owner("end")?;
        let event = self.state.write().await.end(now_ms())?;
        self.accept_local(&event).await;
        self.replicate(event).await?;
        self.publish_status().await;
        self.persist_snapshot().await;
        Ok(())
    }

    /// Close the current round, record it, and rotate in the next challenger.
    pub async fn end_round_choose_next(&self, explicit_next: Option<TeamColor>) -> Result<()> {
        self.require_owner("end_round")?;
        let (entry, next_round) = self
            .state
            .write()
            .await
            .end_round_choose_next(explicit_next, now_ms())?;

        if let Err(e) = self
            .repository
            .append_history(&self.config.match_id, &entry)
            .await
        {
            warn!("Failed to append round history: {}", e);
        }
        self.persist_snapshot().await;

        let event = MatchEventContent::RoundEnded { entry, next_round };
        self.accept_local(&event).await;
        self.replicate(event).await?;
        Ok(())
    }

    /// Draw a fresh assignment for the same roster (different seed, different
    /// split). Only before kickoff.
    pub async fn redraw(&self, seed: u64) -> Result<Draw> {
        self.require_owner("redraw")?;
        let roster = self.repository.load_roster(&self.config.match_id).await?;
        let draw = draw_teams(&roster, self.config.team_size, seed)?;
        self.state.write().await.replace_draw(&draw)?;
        self.persist_snapshot().await;
        Ok(draw)
    }

    /// Swap a substitute into the active lineup.
    pub async fn swap_substitute(
        &self,
        team: TeamColor,
        sub_id: &str,
        starter_id: &str,
    ) -> Result<()> {
        self.require_owner("swap_substitute")?;
        {
            let mut state = self.state.write().await;
            let team = state
                .team_mut(team)
                .ok_or(MatchError::NoSuchTeam(team))?;
            team.swap_substitute(sub_id, starter_id)?;
        }
        self.persist_snapshot().await;
        Ok(())
    }

    // =========================================================================
    // Goal actions
    // =========================================================================

    pub async fn add_goal(
        &self,
        team: TeamColor,
        scorer: &str,
        assist: Option<String>,
    ) -> Result<GoalEvent> {
        let goal = self
            .state
            .write()
            .await
            .add_goal(team, scorer, assist, now_ms())?;

        let event = MatchEventContent::GoalAdded {
            event: goal.clone(),
        };
        self.accept_local(&event).await;
        self.replicate(event).await?;
        self.persist_snapshot().await;
        Ok(goal)
    }

    pub async fn edit_goal(&self, id: &str, patch: GoalPatch) -> Result<GoalEvent> {
        let updated = self.state.write().await.edit_goal(id, patch)?;

        let event = MatchEventContent::GoalEdited {
            event: updated.clone(),
        };
        self.accept_local(&event).await;
        self.replicate(event).await?;
        self.persist_snapshot().await;
        Ok(updated)
    }

    pub async fn delete_goal(&self, id: &str) -> Result<()> {
        let removed = self.state.write().await.delete_goal(id)?;

        let event = MatchEventContent::GoalDeleted {
            id: removed.id,
            team: removed.team,
        };
        self.accept_local(&event).await;
        self.replicate(event).await?;
        self.persist_snapshot().await;
        Ok(())
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Re-send everything queued while offline. Items that exhaust their
    /// budget are dropped and surfaced as [`SessionEvent::SyncFailed`].
    pub async fn flush_pending(&self) -> Result<FlushReport> {
        let sender = ReplicatorSender {
            replicator: self.replicator.clone(),
            match_id: self.config.match_id.clone(),
        };
        let report = self.queue.flush(&sender).await?;

        for item in &report.dropped {
            let _ = self
                .event_tx
                .send(SessionEvent::SyncFailed {
                    action: item.action.clone(),
                    retries: item.retries,
                })
                .await;
        }
        if report.delivered > 0 {
            debug!("Flushed {} queued actions", report.delivered);
        }
        Ok(report)
    }

    // =========================================================================
    // Private
    // =========================================================================

    fn require_owner(&self, action: &'static str) -> Result<()> {
        if !self.is_owner {
            return Err(MatchError::NotSessionOwner(action));
        }
        Ok(())
    }

    /// Apply a locally originated event to the clock and notify the app.
    async fn accept_local(&self, event: &MatchEventContent) {
        self.clock.write().await.apply_event(event);
        let _ = self.event_tx.send(session_event_for(event)).await;
    }

    /// Fan the event out; on a retryable failure, park it on the offline
    /// queue instead of surfacing an error - the state machine never blocks
    /// on the network.
    async fn replicate(&self, event: MatchEventContent) -> Result<()> {
        let message = MatchMessage::MatchEvent(event);
        match self.replicator.publish(&self.config.match_id, &message).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_retryable() => {
                self.queue
                    .enqueue("match_event", serde_json::to_value(&message)?, now_ms())
                    .await?;
                let queued = self.queue.pending().await.unwrap_or(0);
                let _ = self
                    .event_tx
                    .send(SessionEvent::SyncPending { queued })
                    .await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Publish the canonical status triple for late joiners. Best-effort;
    /// the periodic republish ticker catches up after failures.
    async fn publish_status(&self) {
        let content = self.state.read().await.status_content();
        let message = MatchMessage::MatchStatus(content);
        let _ = self.replicator.publish(&self.config.match_id, &message).await;
    }

    async fn persist_snapshot(&self) {
        let snapshot = self.state.read().await.snapshot();
        if let Err(e) = self
            .repository
            .save_snapshot(&self.config.match_id, &snapshot)
            .await
        {
            warn!("Failed to save snapshot: {}", e);
        }
    }

    fn incoming_handler(&self) -> MessageHandler {
        let state = self.state.clone();
        let clock = self.clock.clone();
        let event_tx = self.event_tx.clone();

        Arc::new(move |envelope: Envelope| {
            let message = match serde_json::from_str::<MatchMessage>(&envelope.payload) {
                Ok(m) => m,
                Err(e) => {
                    debug!("Ignoring malformed payload from {}: {}", envelope.sender, e);
                    return;
                }
            };

            let state = state.clone();
            let clock = clock.clone();
            let event_tx = event_tx.clone();

            tokio::spawn(async move {
                match message {
                    MatchMessage::MatchEvent(event) => {
                        // A lifecycle receipt is authoritative over anything
                        // accumulated locally
                        clock.write().await.apply_event(&event);
                        state.write().await.apply_remote(&event);
                        let _ = event_tx.send(session_event_for(&event)).await;
                    }
                    MatchMessage::MatchStatus(status) => {
                        clock.write().await.apply_status(&status);
                        state.write().await.apply_status(&status);
                        let _ = event_tx.send(SessionEvent::StatusRefreshed(status)).await;
                    }
                }
            });
        })
    }

    async fn spawn_clock_refresh(&self) {
        let state = self.state.clone();
        let clock = self.clock.clone();
        let event_tx = self.event_tx.clone();
        let period = Duration::from_millis(self.config.refresh_interval_ms);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut last = u64::MAX;

            loop {
                ticker.tick().await;
                state.write().await.tick();

                let elapsed = clock.read().await.elapsed_secs(now_ms());
                if elapsed != last {
                    last = elapsed;
                    // Dropped if the app isn't draining; the next refresh
                    // re-derives it anyway
                    let _ = event_tx.try_send(SessionEvent::Elapsed(elapsed));
                }
            }
        });
        self.tasks.write().await.push(handle);
    }

    async fn spawn_status_republish(&self) {
        let state = self.state.clone();
        let replicator = self.replicator.clone();
        let match_id = self.config.match_id.clone();
        let period = Duration::from_millis(self.config.status_interval_ms);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            // interval fires immediately; the initial status is published by
            // attach already
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let content = state.read().await.status_content();
                let message = MatchMessage::MatchStatus(content);
                let _ = replicator.publish(&match_id, &message).await;
            }
        });
        self.tasks.write().await.push(handle);
    }
}

struct ReplicatorSender {
    replicator: Arc<Replicator>,
    match_id: String,
}

#[async_trait]
impl ActionSender for ReplicatorSender {
    async fn send(&self, item: &QueueItem) -> Result<()> {
        let message: MatchMessage = serde_json::from_value(item.payload.clone())?;
        self.replicator.publish(&self.match_id, &message).await
    }
}
