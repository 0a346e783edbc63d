//! # pitchside
//!
//! Live match session core: snake-draft team balancing, winner-stays rounds,
//! real-time multi-client sync.
//!
//! ## Features
//!
//! - **Team Balancing**: seeded snake draft over 0-5 star ratings
//! - **Round Lifecycle**: scoring, rotation, and history over a fixed 4-color palette
//! - **Clock Sync**: elapsed time derived from authoritative timestamps, never ticks
//! - **Replication**: lifecycle/goal fan-out to every subscribed viewer
//! - **Offline Queue**: durable at-least-once delivery across connectivity gaps
//!
//! The wire transport, the queue's backing store, and the record store are
//! consumed through the [`PubSub`], [`QueueStore`], and [`Repository`]
//! traits; this crate defines message shapes and delivery semantics only.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pitchside::{MatchConfig, MatchSession, MemoryQueueStore, MemoryRepository, TeamColor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MyPubSub::connect().await?);
//!     let queue = Arc::new(MemoryQueueStore::new());
//!     let repo = Arc::new(MemoryRepository::new());
//!
//!     let config = MatchConfig::new("tuesday-night").team_size(5);
//!     let session = MatchSession::open(config, transport, queue, repo).await?;
//!
//!     session.start().await?;
//!     session.add_goal(TeamColor::Red, "p7", None).await?;
//!
//!     while let Some(event) = session.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod balance;
pub mod clock;
pub mod error;
pub mod queue;
pub mod replicate;
pub mod session;
pub mod state;
pub mod store;
pub mod types;


pub use balance::{BalanceStats, Draw, draw_teams, team_count_for};
pub use clock::ClockSync;
pub use error::{MatchError, Result};
pub use queue::{ActionSender, FlushReport, MemoryQueueStore, OfflineActionQueue, QueueStore};
pub use replicate::{Envelope, MessageHandler, PubSub, Replicator, SubscriptionId};
pub use session::{MatchSession, SessionEvent};
pub use state::{MatchSnapshot, MatchState, SNAPSHOT_VERSION};
pub use store::{MemoryRepository, Repository};
pub use types::*;
