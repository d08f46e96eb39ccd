// Windowed leaderboards.
//
// Wins and losses count games inside the window; strength and dynamic points
// are each player's current all-time standing.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Database, Match, MatchQuery, Player, RatingSnapshot};
use crate::elo::{STARTING_DYNAMIC_POINTS, STARTING_STRENGTH};

/// Minimum matches in the window to appear on a weekly board.
pub const WEEKLY_MIN_MATCHES: i64 = 2;
/// Minimum matches in the window to appear on a monthly board.
pub const MONTHLY_MIN_MATCHES: i64 = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStat {
    pub id: i64,
    pub name: String,
    /// Games won in the window.
    pub wins: i64,
    /// Games lost in the window.
    pub losses: i64,
    /// Matches played in the window.
    pub matches: i64,
    pub strength: f64,
    pub dynamic_points: f64,
}

impl PlayerStat {
    pub fn win_rate(&self) -> f64 {
        let games = self.wins + self.losses;
        if games > 0 {
            self.wins as f64 / games as f64
        } else {
            0.0
        }
    }

    pub fn record(&self) -> String {
        format!("{}-{}", self.wins, self.losses)
    }
}

/// Leaderboard order: dynamic points, then strength, then game win rate,
/// all descending. Player id breaks any remaining tie.
pub fn compare_stats(a: &PlayerStat, b: &PlayerStat) -> Ordering {
    b.dynamic_points
        .total_cmp(&a.dynamic_points)
        .then_with(|| b.strength.total_cmp(&a.strength))
        .then_with(|| b.win_rate().total_cmp(&a.win_rate()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Build the sorted, unfiltered board for `[start, end]`.
///
/// `players` is the candidate set; matches outside the window are ignored
/// even if the caller passes them in.
pub fn aggregate(
    players: &[Player],
    matches: &[Match],
    latest: &[RatingSnapshot],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<PlayerStat> {
    let standing: HashMap<i64, &RatingSnapshot> =
        latest.iter().map(|r| (r.player_id, r)).collect();

    let mut stats: Vec<PlayerStat> = players
        .iter()
        .map(|p| {
            let (strength, dynamic_points) = standing
                .get(&p.id)
                .map(|r| (r.strength, r.dynamic_points))
                .unwrap_or((STARTING_STRENGTH, STARTING_DYNAMIC_POINTS));
            PlayerStat {
                id: p.id,
                name: p.name.clone(),
                wins: 0,
                losses: 0,
                matches: 0,
                strength,
                dynamic_points,
            }
        })
        .collect();

    let index: HashMap<i64, usize> = stats.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

    for m in matches
        .iter()
        .filter(|m| m.played_at >= start && m.played_at <= end)
    {
        for player_id in [m.player_a_id, m.player_b_id] {
            let (Some(&i), Some((won, lost))) = (index.get(&player_id), m.games_for(player_id))
            else {
                continue;
            };
            let stat = &mut stats[i];
            stat.wins += i64::from(won);
            stat.losses += i64::from(lost);
            stat.matches += 1;
        }
    }

    stats.sort_by(compare_stats);
    stats
}

/// Keep players with at least `min_matches` in the window. Order is kept.
pub fn qualified(stats: Vec<PlayerStat>, min_matches: i64) -> Vec<PlayerStat> {
    stats.into_iter().filter(|s| s.matches >= min_matches).collect()
}

pub async fn try_leaderboard(
    db: &Database,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<PlayerStat>, sqlx::Error> {
    let players = db.players_with_matches().await?;
    let matches = db.list_matches(MatchQuery::between(start, end)).await?;
    let latest = db.latest_ratings().await?;
    Ok(aggregate(&players, &matches, &latest, start, end))
}

/// Sorted board for `[start, end]`. Read failures yield an empty board.
pub async fn leaderboard(db: &Database, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<PlayerStat> {
    match try_leaderboard(db, start, end).await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(%start, %end, "Leaderboard query failed: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
    }

    fn player(id: i64, name: &str) -> Player {
        Player {
            id,
            name: name.to_string(),
            created_at: at(1),
        }
    }

    fn game(id: i64, a: i64, b: i64, ga: i32, gb: i32, day: u32) -> Match {
        Match {
            id,
            player_a_id: a,
            player_b_id: b,
            games_a: ga,
            games_b: gb,
            played_at: at(day),
            created_at: at(day),
        }
    }

    fn snapshot(player_id: i64, strength: f64, dynamic_points: f64) -> RatingSnapshot {
        RatingSnapshot {
            id: player_id,
            player_id,
            strength,
            dynamic_points,
            at_time: at(1),
            wins: 0,
            losses: 0,
            scope: crate::db::ALL_TIME_SCOPE.to_string(),
        }
    }

    fn stat(id: i64, wins: i64, losses: i64, strength: f64, dynamic_points: f64) -> PlayerStat {
        PlayerStat {
            id,
            name: format!("P{id}"),
            wins,
            losses,
            matches: 1,
            strength,
            dynamic_points,
        }
    }

    #[test]
    fn test_counts_games_not_matches() {
        let players = vec![player(1, "X"), player(2, "Y")];
        let matches = vec![game(1, 1, 2, 3, 1, 10), game(2, 2, 1, 3, 2, 11)];
        let board = aggregate(&players, &matches, &[], at(1), at(30));

        let x = board.iter().find(|s| s.id == 1).unwrap();
        assert_eq!((x.wins, x.losses, x.matches), (5, 4, 2));
        let y = board.iter().find(|s| s.id == 2).unwrap();
        assert_eq!((y.wins, y.losses, y.matches), (4, 5, 2));
    }

    #[test]
    fn test_matches_outside_window_do_not_count() {
        let players = vec![player(1, "X"), player(2, "Y"), player(3, "Z")];
        let matches = vec![
            game(1, 1, 2, 3, 0, 3),
            game(2, 1, 3, 3, 1, 10),
            game(3, 2, 3, 0, 2, 25),
        ];
        let latest = vec![snapshot(2, 1040.0, 6.0)];
        let board = aggregate(&players, &matches, &latest, at(8), at(14));

        assert_eq!(board.len(), 3);
        let y = board.iter().find(|s| s.id == 2).unwrap();
        assert_eq!((y.wins, y.losses, y.matches), (0, 0, 0));
        // Still carries the all-time standing
        assert_eq!(y.strength, 1040.0);
        assert_eq!(board[0].id, 2);

        let x = board.iter().find(|s| s.id == 1).unwrap();
        assert_eq!((x.wins, x.losses, x.matches), (3, 1, 1));
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let players = vec![player(1, "X"), player(2, "Y")];
        let matches = vec![game(1, 1, 2, 2, 0, 10), game(2, 1, 2, 2, 1, 12)];
        let board = aggregate(&players, &matches, &[], at(10), at(12));
        assert!(board.iter().all(|s| s.matches == 2));
    }

    #[test]
    fn test_missing_snapshot_uses_defaults() {
        let board = aggregate(&[player(7, "New")], &[], &[], at(1), at(2));
        assert_eq!(board[0].strength, STARTING_STRENGTH);
        assert_eq!(board[0].dynamic_points, 0.0);
        assert_eq!(board[0].win_rate(), 0.0);
    }

    #[test]
    fn test_sort_order_and_tie_breaks() {
        let mut stats = vec![
            stat(1, 1, 1, 1000.0, 2.0),
            stat(2, 0, 0, 1000.0, 5.0),
            stat(3, 3, 1, 1010.0, 2.0),
            stat(4, 3, 0, 1000.0, 2.0),
            stat(5, 1, 1, 1000.0, 2.0),
        ];
        stats.sort_by(compare_stats);
        let order: Vec<i64> = stats.iter().map(|s| s.id).collect();
        // points, then strength, then win rate, then id
        assert_eq!(order, vec![2, 3, 4, 1, 5]);
    }

    #[test]
    fn test_qualification_filter() {
        let mut a = stat(1, 1, 0, 1000.0, 9.0);
        a.matches = 1;
        let mut b = stat(2, 2, 1, 1000.0, 5.0);
        b.matches = 2;
        let mut c = stat(3, 9, 4, 1000.0, 1.0);
        c.matches = 5;

        let weekly = qualified(vec![a, b, c], WEEKLY_MIN_MATCHES);
        let ids: Vec<i64> = weekly.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3]);

        let monthly = qualified(weekly, MONTHLY_MIN_MATCHES);
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].record(), "9-4");
    }

    #[tokio::test]
    async fn test_leaderboard_from_database() {
        use crate::calendar::CalendarWindow;
        use crate::elo::BradleyTerry;
        use crate::recorder::MatchRecorder;
        use std::sync::Arc;

        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let recorder = MatchRecorder::new(
            db.clone(),
            Arc::new(BradleyTerry::default()),
            CalendarWindow::default(),
        );
        let x = db.create_player("X").await.unwrap();
        let y = db.create_player("Y").await.unwrap();
        db.create_player("Bench").await.unwrap();

        recorder.record_match(x.id, y.id, 3, 0, at(3)).await.unwrap();
        recorder.record_match(x.id, y.id, 3, 2, at(20)).await.unwrap();

        let board = leaderboard(&db, at(15), at(25)).await;
        // Players without any match never appear
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].id, x.id);
        assert_eq!((board[0].wins, board[0].losses, board[0].matches), (3, 2, 1));

        let current = db.latest_rating(x.id).await.unwrap().unwrap();
        assert_eq!(board[0].strength, current.strength);
        assert_eq!(board[0].dynamic_points, current.dynamic_points);

        assert!(leaderboard(&db, at(26), at(25)).await.iter().all(|s| s.matches == 0));
    }
}
