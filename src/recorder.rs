// Match recording: validate, rate, and persist in one transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::calendar::CalendarWindow;
use crate::db::{Database, Match, NewMatch, NewRating};
use crate::elo::{RatingPolicy, STARTING_DYNAMIC_POINTS, STARTING_STRENGTH};
use crate::error::LadderError;
use crate::metrics;

/// Reject results that can never be recorded, before touching storage.
pub fn validate_match(
    player_a_id: i64,
    player_b_id: i64,
    games_a: i32,
    games_b: i32,
) -> Result<(), LadderError> {
    if games_a == games_b {
        return Err(LadderError::Validation(
            "Games cannot be equal (no ties allowed)".into(),
        ));
    }
    if games_a < 0 || games_b < 0 {
        return Err(LadderError::Validation("Games must be non-negative".into()));
    }
    if player_a_id == player_b_id {
        return Err(LadderError::Validation("Players must be different".into()));
    }
    Ok(())
}

pub struct MatchRecorder {
    db: Arc<Database>,
    policy: Arc<dyn RatingPolicy>,
    calendar: CalendarWindow,
}

impl MatchRecorder {
    pub fn new(db: Arc<Database>, policy: Arc<dyn RatingPolicy>, calendar: CalendarWindow) -> Self {
        Self {
            db,
            policy,
            calendar,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Record one match and the two rating snapshots it produces.
    ///
    /// Either the match, both snapshots and the month's championship marker
    /// are committed together, or nothing is written.
    pub async fn record_match(
        &self,
        player_a_id: i64,
        player_b_id: i64,
        games_a: i32,
        games_b: i32,
        played_at: DateTime<Utc>,
    ) -> Result<Match, LadderError> {
        let result = self
            .try_record(player_a_id, player_b_id, games_a, games_b, played_at)
            .await;

        match &result {
            Ok(m) => {
                metrics::MATCHES_RECORDED_TOTAL.inc();
                tracing::info!(
                    match_id = m.id,
                    player_a_id,
                    player_b_id,
                    games_a,
                    games_b,
                    "Recorded match"
                );
            }
            Err(e) => {
                metrics::MATCH_RECORD_FAILURES_TOTAL
                    .with_label_values(&[e.kind()])
                    .inc();
                if let LadderError::Storage(source) = e {
                    tracing::error!("Failed to record match: {source}");
                }
            }
        }
        result
    }

    async fn try_record(
        &self,
        player_a_id: i64,
        player_b_id: i64,
        games_a: i32,
        games_b: i32,
        played_at: DateTime<Utc>,
    ) -> Result<Match, LadderError> {
        validate_match(player_a_id, player_b_id, games_a, games_b)?;

        let mut tx = self.db.begin().await?;

        for id in [player_a_id, player_b_id] {
            if tx.get_player(id).await?.is_none() {
                return Err(LadderError::NotFound(format!("Player {id} not found")));
            }
        }

        let (strength_a, points_a) = current_standing(tx.latest_rating(player_a_id).await?);
        let (strength_b, points_b) = current_standing(tx.latest_rating(player_b_id).await?);

        let update = self.policy.update(strength_a, strength_b, games_a, games_b);

        let m = tx
            .insert_match(&NewMatch {
                player_a_id,
                player_b_id,
                games_a,
                games_b,
                played_at,
            })
            .await?;

        tx.insert_ratings(&[
            NewRating {
                player_id: player_a_id,
                strength: update.strength_a,
                dynamic_points: points_a + update.points_a,
                at_time: played_at,
                wins: games_a,
                losses: games_b,
            },
            NewRating {
                player_id: player_b_id,
                strength: update.strength_b,
                dynamic_points: points_b + update.points_b,
                at_time: played_at,
                wins: games_b,
                losses: games_a,
            },
        ])
        .await?;

        let (year, month) = self.calendar.year_month(played_at);
        if tx.ensure_championship(year, month).await? {
            tracing::info!(year, month, "Opened championship month");
        }

        tx.commit().await?;
        Ok(m)
    }
}

fn current_standing(snapshot: Option<crate::db::RatingSnapshot>) -> (f64, f64) {
    snapshot
        .map(|s| (s.strength, s.dynamic_points))
        .unwrap_or((STARTING_STRENGTH, STARTING_DYNAMIC_POINTS))
}
