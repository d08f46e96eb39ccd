// Historical reports built on repeated leaderboard windows.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::calendar::CalendarWindow;
use crate::db::{Database, Match, MatchQuery, Player, RatingSnapshot};
use crate::elo::STARTING_STRENGTH;
use crate::error::LadderError;
use crate::leaderboard::{leaderboard, qualified, PlayerStat, MONTHLY_MIN_MATCHES, WEEKLY_MIN_MATCHES};
use crate::metrics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekWinner {
    pub week: String,
    pub winner: String,
    pub record: String,
    pub total_players: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyChampion {
    pub month: String,
    pub champion: String,
    pub record: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CupCount {
    pub name: String,
    pub cups: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentRating {
    pub id: i64,
    pub name: String,
    pub strength: f64,
    pub matches_played: usize,
    /// Matches won, not games.
    pub wins: usize,
    pub losses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchView {
    #[serde(flatten)]
    pub record: Match,
    pub player_a_name: String,
    pub player_b_name: String,
}

// ── Period leaderboards ───────────────────────────────────────────────

/// Qualified board for the week containing `t`.
pub async fn weekly_leaderboard(db: &Database, calendar: &CalendarWindow, t: DateTime<Utc>) -> Vec<PlayerStat> {
    metrics::LEADERBOARD_QUERIES_TOTAL
        .with_label_values(&["weekly"])
        .inc();
    let board = leaderboard(db, calendar.week_start(t), calendar.week_end(t)).await;
    qualified(board, WEEKLY_MIN_MATCHES)
}

/// Qualified board for a calendar month.
pub async fn monthly_leaderboard(
    db: &Database,
    calendar: &CalendarWindow,
    year: i32,
    month: u32,
) -> Result<Vec<PlayerStat>, LadderError> {
    let (start, end) = calendar
        .month_bounds(year, month)
        .ok_or_else(|| LadderError::Validation(format!("Invalid month: {year}-{month}")))?;
    metrics::LEADERBOARD_QUERIES_TOTAL
        .with_label_values(&["monthly"])
        .inc();
    Ok(qualified(leaderboard(db, start, end).await, MONTHLY_MIN_MATCHES))
}

// ── History ───────────────────────────────────────────────────────────

/// Winner of every ISO week with matches, oldest first.
///
/// Weeks where nobody reached the weekly minimum are skipped.
pub async fn week_winners_history(db: &Database, calendar: &CalendarWindow) -> Vec<WeekWinner> {
    let matches = match db.list_matches(MatchQuery::all()).await {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Week winners query failed: {e}");
            return Vec::new();
        }
    };

    let weeks: BTreeSet<DateTime<Utc>> = matches
        .iter()
        .map(|m| calendar.week_start(m.played_at))
        .collect();

    let mut winners = Vec::new();
    for week_start in weeks {
        let board = qualified(
            leaderboard(db, week_start, calendar.week_end(week_start)).await,
            WEEKLY_MIN_MATCHES,
        );
        if let Some(top) = board.first() {
            winners.push(WeekWinner {
                week: calendar.week_label(week_start),
                winner: top.name.clone(),
                record: top.record(),
                total_players: board.len(),
            });
        }
    }
    winners
}

/// Champion of every month with matches, newest first.
pub async fn monthly_champions_history(db: &Database, calendar: &CalendarWindow) -> Vec<MonthlyChampion> {
    let championships = match db.list_championships().await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!("Championship query failed: {e}");
            return Vec::new();
        }
    };

    let mut champions = Vec::new();
    for c in championships {
        let Some((start, end)) = calendar.month_bounds(c.year, c.month) else {
            continue;
        };
        let board = qualified(leaderboard(db, start, end).await, MONTHLY_MIN_MATCHES);
        if let Some(top) = board.first() {
            champions.push(MonthlyChampion {
                month: format!("{}-{:02}", c.year, c.month),
                champion: top.name.clone(),
                record: top.record(),
            });
        }
    }
    champions
}

/// Monthly titles per player name, most first.
pub fn count_cups(champions: &[MonthlyChampion]) -> Vec<CupCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for c in champions {
        *counts.entry(c.champion.as_str()).or_insert(0) += 1;
    }
    let mut cups: Vec<CupCount> = counts
        .into_iter()
        .map(|(name, cups)| CupCount {
            name: name.to_string(),
            cups,
        })
        .collect();
    cups.sort_by(|a, b| b.cups.cmp(&a.cups).then_with(|| a.name.cmp(&b.name)));
    cups
}

pub async fn cups_leaderboard(db: &Database, calendar: &CalendarWindow) -> Vec<CupCount> {
    count_cups(&monthly_champions_history(db, calendar).await)
}

// ── Current standings ─────────────────────────────────────────────────

pub fn summarize_ratings(
    players: &[Player],
    matches: &[Match],
    latest: &[RatingSnapshot],
) -> Vec<CurrentRating> {
    let strengths: HashMap<i64, f64> = latest.iter().map(|r| (r.player_id, r.strength)).collect();

    let mut ratings: Vec<CurrentRating> = players
        .iter()
        .map(|p| {
            let played: Vec<&Match> = matches.iter().filter(|m| m.involves(p.id)).collect();
            let wins = played.iter().filter(|m| m.winner_id() == p.id).count();
            CurrentRating {
                id: p.id,
                name: p.name.clone(),
                strength: strengths.get(&p.id).copied().unwrap_or(STARTING_STRENGTH),
                matches_played: played.len(),
                wins,
                losses: played.len() - wins,
            }
        })
        .collect();

    ratings.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    ratings
}

/// Every player's current strength and match record.
pub async fn current_ratings(db: &Database) -> Vec<CurrentRating> {
    let loaded = async {
        let players = db.list_players().await?;
        let matches = db.list_matches(MatchQuery::all()).await?;
        let latest = db.latest_ratings().await?;
        Ok::<_, sqlx::Error>(summarize_ratings(&players, &matches, &latest))
    };
    match loaded.await {
        Ok(ratings) => ratings,
        Err(e) => {
            tracing::warn!("Current ratings query failed: {e}");
            Vec::new()
        }
    }
}

pub fn name_lookup(players: &[Player]) -> HashMap<i64, String> {
    players.iter().map(|p| (p.id, p.name.clone())).collect()
}

/// The newest matches with both player names attached.
pub async fn recent_matches(db: &Database, limit: i64) -> Vec<MatchView> {
    let loaded = async {
        let names = name_lookup(&db.list_players().await?);
        let matches = db.list_matches(MatchQuery::recent(limit)).await?;
        Ok::<_, sqlx::Error>(
            matches
                .into_iter()
                .map(|m| MatchView {
                    player_a_name: names.get(&m.player_a_id).cloned().unwrap_or_default(),
                    player_b_name: names.get(&m.player_b_id).cloned().unwrap_or_default(),
                    record: m,
                })
                .collect(),
        )
    };
    match loaded.await {
        Ok(views) => views,
        Err(e) => {
            tracing::warn!("Recent matches query failed: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elo::BradleyTerry;
    use crate::recorder::MatchRecorder;
    use chrono::TimeZone;
    use std::sync::Arc;

    struct Fixture {
        db: Arc<Database>,
        recorder: MatchRecorder,
        calendar: CalendarWindow,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let calendar = CalendarWindow::default();
        let recorder = MatchRecorder::new(db.clone(), Arc::new(BradleyTerry::default()), calendar);
        Fixture { db, recorder, calendar }
    }

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        // Midday in Denver
        Utc.with_ymd_and_hms(2024, month, day, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_count_cups_orders_by_titles_then_name() {
        let champ = |month: &str, name: &str| MonthlyChampion {
            month: month.to_string(),
            champion: name.to_string(),
            record: "0-0".to_string(),
        };
        let cups = count_cups(&[
            champ("2024-01", "Rodrigo"),
            champ("2024-02", "Mati"),
            champ("2024-03", "Rodrigo"),
            champ("2024-04", "Jake"),
        ]);
        assert_eq!(
            cups,
            vec![
                CupCount { name: "Rodrigo".into(), cups: 2 },
                CupCount { name: "Jake".into(), cups: 1 },
                CupCount { name: "Mati".into(), cups: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_week_winners_use_iso_weeks() {
        let f = fixture().await;
        let a = f.db.create_player("Ana").await.unwrap();
        let b = f.db.create_player("Ben").await.unwrap();
        let c = f.db.create_player("Cy").await.unwrap();

        // Week of Monday 2024-06-03: Ana plays twice
        f.recorder.record_match(a.id, b.id, 3, 0, at(6, 3)).await.unwrap();
        f.recorder.record_match(a.id, c.id, 3, 1, at(6, 5)).await.unwrap();
        // Week of Monday 2024-06-10: only Cy reaches two matches
        f.recorder.record_match(c.id, b.id, 3, 0, at(6, 10)).await.unwrap();
        f.recorder.record_match(c.id, a.id, 3, 2, at(6, 14)).await.unwrap();
        // Week of 2024-06-17: one match each, nobody qualifies
        f.recorder.record_match(b.id, a.id, 3, 0, at(6, 18)).await.unwrap();

        let winners = week_winners_history(&f.db, &f.calendar).await;
        assert_eq!(winners.len(), 2);
        assert_eq!(winners[0].week, "2024-W23");
        assert_eq!(winners[0].winner, "Ana");
        assert_eq!(winners[0].record, "6-1");
        assert_eq!(winners[0].total_players, 1);
        assert_eq!(winners[1].week, "2024-W24");
        assert_eq!(winners[1].winner, "Cy");
        assert_eq!(winners[1].record, "6-2");
    }

    #[tokio::test]
    async fn test_monthly_champions_and_cups() {
        let f = fixture().await;
        let a = f.db.create_player("Ana").await.unwrap();
        let b = f.db.create_player("Ben").await.unwrap();

        for day in [3, 10, 17, 24] {
            f.recorder.record_match(a.id, b.id, 3, 1, at(5, day)).await.unwrap();
        }
        for day in [3, 10, 17, 24] {
            f.recorder.record_match(b.id, a.id, 3, 2, at(6, day)).await.unwrap();
        }
        // July has a single match: nobody qualifies
        f.recorder.record_match(b.id, a.id, 3, 0, at(7, 2)).await.unwrap();

        let champions = monthly_champions_history(&f.db, &f.calendar).await;
        assert_eq!(champions.len(), 2);
        // Newest first. The champion is whoever leads on all-time points.
        assert_eq!(champions[0].month, "2024-06");
        assert_eq!(champions[1].month, "2024-05");

        let leader = leaderboard(&f.db, at(5, 1), at(7, 31)).await[0].name.clone();
        assert!(champions.iter().all(|c| c.champion == leader));

        let cups = cups_leaderboard(&f.db, &f.calendar).await;
        assert_eq!(cups, vec![CupCount { name: leader, cups: 2 }]);
    }

    #[tokio::test]
    async fn test_period_leaderboards_apply_thresholds() {
        let f = fixture().await;
        let a = f.db.create_player("Ana").await.unwrap();
        let b = f.db.create_player("Ben").await.unwrap();
        let c = f.db.create_player("Cy").await.unwrap();

        f.recorder.record_match(a.id, b.id, 3, 0, at(6, 3)).await.unwrap();
        f.recorder.record_match(a.id, b.id, 3, 1, at(6, 4)).await.unwrap();
        f.recorder.record_match(c.id, b.id, 3, 1, at(6, 5)).await.unwrap();

        let weekly = weekly_leaderboard(&f.db, &f.calendar, at(6, 6)).await;
        let names: Vec<&str> = weekly.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Ben"]);

        let monthly = monthly_leaderboard(&f.db, &f.calendar, 2024, 6).await.unwrap();
        assert!(monthly.is_empty());

        let err = monthly_leaderboard(&f.db, &f.calendar, 2024, 13).await.unwrap_err();
        assert!(matches!(err, LadderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_current_ratings_and_recent_matches() {
        let f = fixture().await;
        let a = f.db.create_player("Ana").await.unwrap();
        let b = f.db.create_player("Ben").await.unwrap();
        let idle = f.db.create_player("Idle").await.unwrap();

        f.recorder.record_match(a.id, b.id, 3, 0, at(6, 3)).await.unwrap();
        f.recorder.record_match(b.id, a.id, 3, 2, at(6, 4)).await.unwrap();
        f.recorder.record_match(a.id, b.id, 2, 0, at(6, 5)).await.unwrap();

        let ratings = current_ratings(&f.db).await;
        assert_eq!(ratings.len(), 3);
        assert_eq!(ratings[0].name, "Ana");
        assert_eq!((ratings[0].matches_played, ratings[0].wins, ratings[0].losses), (3, 2, 1));
        let idle_row = ratings.iter().find(|r| r.id == idle.id).unwrap();
        assert_eq!(idle_row.strength, STARTING_STRENGTH);
        assert_eq!(idle_row.matches_played, 0);

        let recent = recent_matches(&f.db, 2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].record.played_at, at(6, 5));
        assert_eq!(recent[0].player_a_name, "Ana");
        assert_eq!(recent[1].player_a_name, "Ben");
    }
}
