// Strength rating calculations.
//
// Bradley-Terry paired comparison on an Elo-style logistic scale, with a
// fractional score taken from the games won in a best-of-N match.
// Winners also collect "dynamic points" worth 1 / P(win).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub const STARTING_STRENGTH: f64 = 1000.0;
pub const STARTING_DYNAMIC_POINTS: f64 = 0.0;

const SCALE: f64 = 400.0;

pub const BRADLEY_TERRY_K: f64 = 16.0;
pub const MARGIN_OF_VICTORY_K: f64 = 24.0;

/// Result of rating one match, from both sides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingUpdate {
    pub strength_a: f64,
    pub strength_b: f64,
    pub points_a: f64,
    pub points_b: f64,
}

/// A scoring policy applied to every recorded match.
///
/// Callers must have validated the game counts already: no ties and no
/// negative counts. Implementations never fail on that domain.
pub trait RatingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn update(&self, strength_a: f64, strength_b: f64, games_a: i32, games_b: i32)
        -> RatingUpdate;
}

/// Win probabilities `(pA, pB)` for two strengths.
pub fn win_probabilities(strength_a: f64, strength_b: f64) -> (f64, f64) {
    let exp_a = 10.0_f64.powf(strength_a / SCALE);
    let exp_b = 10.0_f64.powf(strength_b / SCALE);
    let total = exp_a + exp_b;
    (exp_a / total, exp_b / total)
}

/// Upset bonus for the side with more games. The loser gets nothing.
pub fn dynamic_points(p_a: f64, p_b: f64, games_a: i32, games_b: i32) -> (f64, f64) {
    if games_a > games_b {
        (1.0 / p_a, 0.0)
    } else {
        (0.0, 1.0 / p_b)
    }
}

/// Fractional-score Bradley-Terry update. This is the default policy.
#[derive(Debug, Clone, Copy)]
pub struct BradleyTerry {
    pub k: f64,
}

impl Default for BradleyTerry {
    fn default() -> Self {
        Self { k: BRADLEY_TERRY_K }
    }
}

impl RatingPolicy for BradleyTerry {
    fn name(&self) -> &'static str {
        "bradley-terry"
    }

    fn update(
        &self,
        strength_a: f64,
        strength_b: f64,
        games_a: i32,
        games_b: i32,
    ) -> RatingUpdate {
        let (p_a, p_b) = win_probabilities(strength_a, strength_b);

        let total = f64::from(games_a) + f64::from(games_b);
        let score_a = f64::from(games_a) / total;
        let score_b = f64::from(games_b) / total;

        let delta_a = (self.k * (score_a - p_a)).round();
        let delta_b = (self.k * (score_b - p_b)).round();
        let (points_a, points_b) = dynamic_points(p_a, p_b, games_a, games_b);

        RatingUpdate {
            strength_a: strength_a + delta_a,
            strength_b: strength_b + delta_b,
            points_a,
            points_b,
        }
    }
}

/// Binary win/loss Elo scaled by `ln(1 + margin)`.
///
/// Kept as a selectable alternative. Mixing it with [`BradleyTerry`] over one
/// match history produces ratings neither policy would.
#[derive(Debug, Clone, Copy)]
pub struct MarginOfVictory {
    pub k: f64,
}

impl Default for MarginOfVictory {
    fn default() -> Self {
        Self {
            k: MARGIN_OF_VICTORY_K,
        }
    }
}

impl RatingPolicy for MarginOfVictory {
    fn name(&self) -> &'static str {
        "margin-of-victory"
    }

    fn update(
        &self,
        strength_a: f64,
        strength_b: f64,
        games_a: i32,
        games_b: i32,
    ) -> RatingUpdate {
        let (p_a, p_b) = win_probabilities(strength_a, strength_b);

        let (score_a, score_b) = if games_a > games_b {
            (1.0, 0.0)
        } else {
            (0.0, 1.0)
        };
        let multiplier = (f64::from(games_a) - f64::from(games_b)).abs().ln_1p();

        let delta_a = (self.k * multiplier * (score_a - p_a)).round();
        let delta_b = (self.k * multiplier * (score_b - p_b)).round();
        let (points_a, points_b) = dynamic_points(p_a, p_b, games_a, games_b);

        RatingUpdate {
            strength_a: strength_a + delta_a,
            strength_b: strength_b + delta_b,
            points_a,
            points_b,
        }
    }
}

/// Configured policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    BradleyTerry,
    MarginOfVictory,
}

impl PolicyKind {
    /// Parse a policy name (from config).
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bradley-terry" | "bradley_terry" | "bt" => Some(Self::BradleyTerry),
            "margin-of-victory" | "margin_of_victory" | "mov" => Some(Self::MarginOfVictory),
            _ => None,
        }
    }

    pub fn build(self) -> Arc<dyn RatingPolicy> {
        match self {
            Self::BradleyTerry => Arc::new(BradleyTerry::default()),
            Self::MarginOfVictory => Arc::new(MarginOfVictory::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bt(a: f64, b: f64, ga: i32, gb: i32) -> RatingUpdate {
        BradleyTerry::default().update(a, b, ga, gb)
    }

    #[test]
    fn test_huge_game_counts_do_not_overflow() {
        let u = bt(1000.0, 1000.0, i32::MAX, 1);
        assert_eq!(u.strength_a, 1008.0);
        assert_eq!(u.strength_b, 992.0);

        let u = bt(1000.0, 1000.0, 1, i32::MAX);
        assert_eq!(u.strength_b, 1008.0);

        let mov = MarginOfVictory::default().update(1000.0, 1000.0, i32::MAX, 0);
        assert!(mov.strength_a > 1000.0);
        assert!(mov.strength_b < 1000.0);
    }

    #[test]
    fn test_win_probability_equal_strengths() {
        let (p_a, p_b) = win_probabilities(1000.0, 1000.0);
        assert!((p_a - 0.5).abs() < 1e-12);
        assert!((p_b - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_win_probability_favours_stronger() {
        let (p_a, p_b) = win_probabilities(1400.0, 1000.0);
        // 10^(400/400) = 10 times the weight
        assert!((p_a - 10.0 / 11.0).abs() < 1e-9);
        assert!((p_a + p_b - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sweep_between_equals() {
        let u = bt(1000.0, 1000.0, 3, 0);
        assert_eq!(u.strength_a, 1008.0); // 16 * (1.0 - 0.5)
        assert_eq!(u.strength_b, 992.0);
        assert!((u.points_a - 2.0).abs() < 1e-12);
        assert_eq!(u.points_b, 0.0);
    }

    #[test]
    fn test_close_match_moves_less_than_sweep() {
        let close = bt(1000.0, 1000.0, 3, 2);
        let sweep = bt(1000.0, 1000.0, 3, 0);
        assert!(close.strength_a - 1000.0 < sweep.strength_a - 1000.0);
        // 16 * (0.6 - 0.5) = 1.6
        assert_eq!(close.strength_a, 1002.0);
        assert_eq!(close.strength_b, 998.0);
    }

    #[test]
    fn test_swapped_sides_give_swapped_results() {
        for &(a, b, ga, gb) in &[
            (1000.0, 1000.0, 3, 1),
            (1120.0, 940.0, 2, 3),
            (873.0, 1310.0, 4, 0),
            (1000.0, 1016.0, 0, 2),
        ] {
            let fwd = bt(a, b, ga, gb);
            let rev = bt(b, a, gb, ga);
            assert_eq!(fwd.strength_a, rev.strength_b);
            assert_eq!(fwd.strength_b, rev.strength_a);
            assert_eq!(fwd.points_a, rev.points_b);
            assert_eq!(fwd.points_b, rev.points_a);
        }
    }

    #[test]
    fn test_sweep_never_hurts_winner() {
        for &(a, b) in &[(1000.0, 1000.0), (1600.0, 900.0), (700.0, 1500.0)] {
            let u = bt(a, b, 3, 0);
            assert!(u.strength_a >= a);
            assert!(u.strength_b <= b);
        }
    }

    #[test]
    fn test_narrow_win_by_heavy_favourite_loses_strength() {
        // pA ~ 0.91 but only 60% of games won
        let u = bt(1400.0, 1000.0, 3, 2);
        assert!(u.strength_a < 1400.0);
        assert!(u.points_a > 1.0);
    }

    #[test]
    fn test_dynamic_points_only_for_winner() {
        let u = bt(1200.0, 1000.0, 1, 3);
        assert_eq!(u.points_a, 0.0);
        assert!(u.points_b >= 1.0);

        let u = bt(1000.0, 1200.0, 2, 0);
        assert!(u.points_a > 1.0);
        assert_eq!(u.points_b, 0.0);
    }

    #[test]
    fn test_upset_pays_more_than_expected_win() {
        let upset = bt(900.0, 1100.0, 3, 0);
        let expected = bt(1100.0, 900.0, 3, 0);
        assert!(upset.points_a > expected.points_a);
        assert!(expected.points_a >= 1.0);
    }

    #[test]
    fn test_zero_sum_for_fresh_players() {
        let u = bt(STARTING_STRENGTH, STARTING_STRENGTH, 3, 1);
        let delta_a = u.strength_a - STARTING_STRENGTH;
        let delta_b = u.strength_b - STARTING_STRENGTH;
        assert_ne!(delta_a, 0.0);
        assert_eq!(delta_a, -delta_b);
    }

    #[test]
    fn test_margin_of_victory_scales_with_margin() {
        let mov = MarginOfVictory::default();
        let narrow = mov.update(1000.0, 1000.0, 3, 2);
        let wide = mov.update(1000.0, 1000.0, 3, 0);
        // 24 * ln(2) * 0.5 = 8.3 ; 24 * ln(4) * 0.5 = 16.6
        assert_eq!(narrow.strength_a, 1008.0);
        assert_eq!(wide.strength_a, 1017.0);
        assert_eq!(wide.strength_b, 983.0);
        assert!((wide.points_a - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_policy_kind_parsing() {
        assert_eq!(
            PolicyKind::from_str_name("bradley-terry"),
            Some(PolicyKind::BradleyTerry)
        );
        assert_eq!(
            PolicyKind::from_str_name(" MOV "),
            Some(PolicyKind::MarginOfVictory)
        );
        assert_eq!(PolicyKind::from_str_name("glicko"), None);
        assert_eq!(PolicyKind::default().build().name(), "bradley-terry");
        assert_eq!(
            PolicyKind::MarginOfVictory.build().name(),
            "margin-of-victory"
        );
    }
}
