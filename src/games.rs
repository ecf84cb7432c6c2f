use serde::{Deserialize, Serialize};

/// Competitive division a program plays in. Cross-division results are kept
/// in the store but excluded from HFA estimation and prior fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Division {
    Fbs,
    Lower,
}

impl Division {
    pub fn as_str(self) -> &'static str {
        match self {
            Division::Fbs => "fbs",
            Division::Lower => "lower",
        }
    }

    pub fn parse(raw: &str) -> Division {
        if raw.trim().eq_ignore_ascii_case("fbs") {
            Division::Fbs
        } else {
            Division::Lower
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: u64,
    pub season: u16,
    pub week: u8,
    pub home_id: u32,
    pub away_id: u32,
    pub home_points: Option<i32>,
    pub away_points: Option<i32>,
    pub neutral_site: bool,
    pub postseason: bool,
    pub completed: bool,
    pub home_division: Division,
    pub away_division: Division,
}

impl Game {
    /// Home-minus-away scoring margin, present only for scored games.
    pub fn actual_margin(&self) -> Option<f64> {
        let (Some(home), Some(away)) = (self.home_points, self.away_points) else {
            return None;
        };
        if !self.completed {
            return None;
        }
        Some(f64::from(home) - f64::from(away))
    }

    pub fn is_scored(&self) -> bool {
        self.completed && self.home_points.is_some() && self.away_points.is_some()
    }

    /// Whether this game qualifies for home-field-advantage estimation:
    /// a scored regular-season game at a true home site between two
    /// top-division programs.
    pub fn counts_for_hfa(&self) -> bool {
        self.is_scored()
            && !self.neutral_site
            && !self.postseason
            && self.home_division == Division::Fbs
            && self.away_division == Division::Fbs
    }

    pub fn in_week_range(&self, range: Option<(u8, u8)>) -> bool {
        match range {
            Some((lo, hi)) => self.week >= lo && self.week <= hi,
            None => true,
        }
    }

    pub fn involves(&self, team_id: u32) -> bool {
        self.home_id == team_id || self.away_id == team_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> Game {
        Game {
            id: 1,
            season: 2024,
            week: 5,
            home_id: 10,
            away_id: 20,
            home_points: Some(31),
            away_points: Some(17),
            neutral_site: false,
            postseason: false,
            completed: true,
            home_division: Division::Fbs,
            away_division: Division::Fbs,
        }
    }

    #[test]
    fn margin_is_home_minus_away() {
        assert_eq!(game().actual_margin(), Some(14.0));
    }

    #[test]
    fn unfinished_game_has_no_margin() {
        let mut g = game();
        g.completed = false;
        assert_eq!(g.actual_margin(), None);
    }

    #[test]
    fn hfa_excludes_neutral_postseason_and_cross_division() {
        assert!(game().counts_for_hfa());

        let mut neutral = game();
        neutral.neutral_site = true;
        assert!(!neutral.counts_for_hfa());

        let mut bowl = game();
        bowl.postseason = true;
        assert!(!bowl.counts_for_hfa());

        let mut buy_game = game();
        buy_game.away_division = Division::Lower;
        assert!(!buy_game.counts_for_hfa());
    }

    #[test]
    fn week_range_filter() {
        let g = game();
        assert!(g.in_week_range(None));
        assert!(g.in_week_range(Some((1, 5))));
        assert!(!g.in_week_range(Some((6, 10))));
    }
}
