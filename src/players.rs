// Player directory and per-player profile.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Database, Player, RatingSnapshot};
use crate::elo::{STARTING_DYNAMIC_POINTS, STARTING_STRENGTH};
use crate::error::LadderError;
use crate::metrics;
use crate::reports::name_lookup;

pub const PROFILE_RECENT_MATCHES: i64 = 10;

/// Create a player from a display name. Names are trimmed and compared
/// without regard to case.
pub async fn create_player(db: &Database, name: &str) -> Result<Player, LadderError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LadderError::Validation("Player name cannot be empty".into()));
    }

    match db.create_player(trimmed).await {
        Ok(player) => {
            metrics::PLAYERS_CREATED_TOTAL.inc();
            tracing::info!(player_id = player.id, name = %player.name, "Created player");
            Ok(player)
        }
        Err(e) if is_unique_violation(&e) => Err(LadderError::Conflict(
            "A player with this name already exists".into(),
        )),
        Err(e) => Err(e.into()),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

pub async fn get_player(db: &Database, id: i64) -> Result<Player, LadderError> {
    db.get_player(id)
        .await?
        .ok_or_else(|| LadderError::NotFound(format!("Player {id} not found")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileMatch {
    pub match_id: i64,
    pub opponent_id: i64,
    pub opponent: String,
    pub games_won: i32,
    pub games_lost: i32,
    pub played_at: DateTime<Utc>,
    pub won: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerProfile {
    pub player: Player,
    pub strength: f64,
    pub dynamic_points: f64,
    pub matches_played: usize,
    pub wins: usize,
    pub losses: usize,
    /// Oldest first.
    pub rating_history: Vec<RatingSnapshot>,
    /// Newest first.
    pub recent_matches: Vec<ProfileMatch>,
}

pub async fn player_profile(db: &Database, id: i64) -> Result<PlayerProfile, LadderError> {
    let player = get_player(db, id).await?;
    let history = db.rating_history(id).await?;
    let matches = db.matches_for_player(id, None).await?;
    let names = name_lookup(&db.list_players().await?);

    let wins = matches.iter().filter(|m| m.winner_id() == id).count();
    let (strength, dynamic_points) = history
        .last()
        .map(|r| (r.strength, r.dynamic_points))
        .unwrap_or((STARTING_STRENGTH, STARTING_DYNAMIC_POINTS));

    let recent_matches = matches
        .iter()
        .take(PROFILE_RECENT_MATCHES as usize)
        .filter_map(|m| {
            let (games_won, games_lost) = m.games_for(id)?;
            let opponent_id = m.opponent_of(id)?;
            Some(ProfileMatch {
                match_id: m.id,
                opponent_id,
                opponent: names.get(&opponent_id).cloned().unwrap_or_default(),
                games_won,
                games_lost,
                played_at: m.played_at,
                won: games_won > games_lost,
            })
        })
        .collect();

    Ok(PlayerProfile {
        player,
        strength,
        dynamic_points,
        matches_played: matches.len(),
        wins,
        losses: matches.len() - wins,
        rating_history: history,
        recent_matches,
    })
}
