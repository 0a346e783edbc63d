//! Team balancing - seeded snake draft over player star ratings

use crate::error::{MatchError, Result};
use crate::types::{Player, Team, TeamColor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A complete team assignment plus its balance statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    pub seed: u64,
    pub teams: Vec<Team>,
    pub stats: BalanceStats,
}

/// Summary statistics over per-team total rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceStats {
    pub average: f64,
    pub min: u32,
    pub max: u32,
    pub variance: f64,
}

/// Number of teams for a roster: `ceil(N / team_size)`, clamped to the 2-4
/// range the color palette supports.
pub fn team_count_for(roster_len: usize, team_size: usize) -> usize {
    roster_len.div_ceil(team_size).clamp(2, 4)
}

/// Draw balanced teams from a roster.
///
/// Players are shuffled with the given seed, then stable-sorted by rating
/// descending, so equal-rated players land in a different order per seed
/// (re-draws on the same roster produce different valid assignments).
/// Distribution is alternating-direction round-robin: team 1..k, then k..1,
/// repeating, so high and low ratings interleave and per-team sums converge.
/// Rows past `team_size` are flagged as substitutes of their assigned team.
pub fn draw_teams(roster: &[Player], team_size: usize, seed: u64) -> Result<Draw> {
    if team_size == 0 {
        return Err(MatchError::InvalidTeamSize);
    }
    if roster.len() < 2 {
        return Err(MatchError::InsufficientPlayers(roster.len()));
    }

    let team_count = team_count_for(roster.len(), team_size);

    let mut pool: Vec<Player> = roster.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    pool.shuffle(&mut rng);
    pool.sort_by(|a, b| b.rating.cmp(&a.rating));

    let mut teams: Vec<Team> = TeamColor::PALETTE[..team_count]
        .iter()
        .map(|&color| Team::new(color))
        .collect();

    for (i, mut player) in pool.into_iter().enumerate() {
        let row = i / team_count;
        let pos = i % team_count;
        let idx = if row % 2 == 0 {
            pos
        } else {
            team_count - 1 - pos
        };
        player.substitute = row >= team_size;
        teams[idx].players.push(player);
    }

    let stats = BalanceStats::of(&teams);
    debug!(
        "Drew {} teams from {} players (seed {}): avg {:.1}, spread {}-{}",
        teams.len(),
        roster.len(),
        seed,
        stats.average,
        stats.min,
        stats.max
    );

    Ok(Draw { seed, teams, stats })
}

impl BalanceStats {
    pub fn of(teams: &[Team]) -> Self {
        let sums: Vec<u32> = teams.iter().map(|t| t.total_rating()).collect();
        let n = sums.len().max(1) as f64;
        let average = sums.iter().sum::<u32>() as f64 / n;
        let variance = sums
            .iter()
            .map(|&s| {
                let d = s as f64 - average;
                d * d
            })
            .sum::<f64>()
            / n;

        Self {
            average,
            min: sums.iter().copied().min().unwrap_or(0),
            max: sums.iter().copied().max().unwrap_or(0),
            variance,
        }
    }
}

impl Draw {
    pub fn team(&self, color: TeamColor) -> Option<&Team> {
        self.teams.iter().find(|t| t.color == color)
    }

    pub fn colors(&self) -> Vec<TeamColor> {
        self.teams.iter().map(|t| t.color).collect()
    }
}
