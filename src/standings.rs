//! The results table, folded from completed match scores.

use {
    lazy_regex::regex_captures,
    crate::prelude::*,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("playoff result names {0:?}, but no such team appears in any match")]
    MissingPlayoffTeam(String),
    #[error("playoff result names {0:?} more than once")]
    DuplicatePlayoffTeam(String),
}

/// Parses a `scores_csv` value like `"3-1"`. `:`, `,` and a space are accepted as separators as well.
pub(crate) fn parse_score(scores_csv: &str) -> Option<(u16, u16)> {
    let (_, score1, score2) = regex_captures!(r"^\s*(\d+)\s*[-:, ]\s*(\d+)\s*$", scores_csv)?;
    Some((score1.parse().ok()?, score2.parse().ok()?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TeamStats {
    pub(crate) team: String,
    pub(crate) played: u32,
    pub(crate) won: u32,
    pub(crate) drawn: u32,
    pub(crate) lost: u32,
    pub(crate) goals_for: u32,
    pub(crate) goals_against: u32,
    pub(crate) goal_difference: i64,
    pub(crate) points: u32,
    /// Set for teams listed in the configured playoff result, 1 being the tournament winner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) final_position: Option<u32>,
}

impl TeamStats {
    fn new(team: String) -> Self {
        Self {
            team,
            played: 0,
            won: 0,
            drawn: 0,
            lost: 0,
            goals_for: 0,
            goals_against: 0,
            goal_difference: 0,
            points: 0,
            final_position: None,
        }
    }

    fn record(&mut self, scored: u16, conceded: u16) {
        self.played += 1;
        self.goals_for = self.goals_for.saturating_add(scored.into());
        self.goals_against = self.goals_against.saturating_add(conceded.into());
        match scored.cmp(&conceded) {
            Ordering::Greater => {
                self.won += 1;
                self.points += 3;
            }
            Ordering::Equal => {
                self.drawn += 1;
                self.points += 1;
            }
            Ordering::Less => self.lost += 1,
        }
        self.goal_difference = i64::from(self.goals_for) - i64::from(self.goals_against);
    }

    fn table_order(&self, other: &Self) -> Ordering {
        match (self.final_position, other.final_position) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => other.points.cmp(&self.points)
                .then_with(|| other.goal_difference.cmp(&self.goal_difference))
                .then_with(|| other.goals_for.cmp(&self.goals_for)),
        }
    }
}

/// Computes the table for every team that appears in `matches`.
///
/// Only complete matches with a parseable score and both slots filled are counted; other matches
/// still contribute their teams with zeroed stats. Teams named in `playoff_result` get their final
/// position from it and are ranked above everyone else. Ties keep the order in which teams first
/// appear in `matches`.
pub(crate) fn calculate(matches: &[EnrichedMatch], playoff_result: &[String]) -> Result<Vec<TeamStats>, Error> {
    let mut table = Vec::<TeamStats>::default();
    let mut index = HashMap::<&str, usize>::default();
    for team in matches.iter().flat_map(EnrichedMatch::teams) {
        index.entry(&team.display_name).or_insert_with(|| {
            table.push(TeamStats::new(team.display_name.clone()));
            table.len() - 1
        });
    }
    for enriched in matches {
        if enriched.inner.state != MatchState::Complete { continue }
        let (Some(player1), Some(player2)) = (&enriched.player1, &enriched.player2) else { continue };
        let Some((score1, score2)) = parse_score(&enriched.inner.scores_csv) else {
            debug!("skipping match {} with unparseable score {:?}", enriched.inner.id, enriched.inner.scores_csv);
            continue
        };
        table[index[&*player1.display_name]].record(score1, score2);
        table[index[&*player2.display_name]].record(score2, score1);
    }
    for (position, team) in (1..).zip(playoff_result) {
        let &idx = index.get(&**team).ok_or_else(|| Error::MissingPlayoffTeam(team.clone()))?;
        if table[idx].final_position.is_some() {
            return Err(Error::DuplicatePlayoffTeam(team.clone()))
        }
        table[idx].final_position = Some(position);
    }
    table.sort_by(TeamStats::table_order);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use {
        crate::bracket::fixtures::enriched,
        super::*,
    };

    fn names(table: &[TeamStats]) -> Vec<&str> {
        table.iter().map(|stats| &*stats.team).collect()
    }

    #[test]
    fn score_separators() {
        for input in ["3-1", "3:1", "3,1", "3 1", " 3 - 1 "] {
            assert_eq!(parse_score(input), Some((3, 1)), "{input:?}");
        }
        for input in ["", "abc", "3-1-2", "3", "-1", "3-", "4000000000-0", "0-65536"] {
            assert_eq!(parse_score(input), None, "{input:?}");
        }
        assert_eq!(parse_score("65535-0"), Some((65535, 0)));
    }

    #[test]
    fn large_scores_do_not_overflow() {
        let matches = [
            enriched(1, "X", "Y", MatchState::Complete, "65535-0"),
            enriched(2, "X", "Z", MatchState::Complete, "65535-0"),
            enriched(3, "X", "Z", MatchState::Complete, "4000000000-0"),
        ];
        let table = calculate(&matches, &[]).unwrap();
        assert_eq!(names(&table), ["X", "Y", "Z"]);
        let x = &table[0];
        assert_eq!((x.played, x.won, x.points), (2, 2, 6));
        assert_eq!((x.goals_for, x.goals_against, x.goal_difference), (131070, 0, 131070));
    }

    #[test]
    fn single_win() {
        let table = calculate(&[enriched(1, "X", "Y", MatchState::Complete, "2-1")], &[]).unwrap();
        assert_eq!(names(&table), ["X", "Y"]);
        let (x, y) = (&table[0], &table[1]);
        assert_eq!((x.played, x.won, x.lost, x.points, x.goal_difference), (1, 1, 0, 3, 1));
        assert_eq!((y.played, y.won, y.lost, y.points, y.goal_difference), (1, 0, 1, 0, -1));
        assert_eq!((x.goals_for, x.goals_against), (2, 1));
    }

    #[test]
    fn unfinished_and_unparseable_matches_only_register_teams() {
        let table = calculate(&[
            enriched(1, "X", "Y", MatchState::Complete, ""),
            enriched(2, "X", "Z", MatchState::Complete, "abc"),
            enriched(3, "Y", "Z", MatchState::Open, "4-0"),
            enriched(4, "Z", "W", MatchState::Pending, ""),
        ], &[]).unwrap();
        assert_eq!(names(&table), ["X", "Y", "Z", "W"]);
        assert!(table.iter().all(|stats| stats.played == 0 && stats.points == 0));
    }

    #[test]
    fn tbd_slots_are_skipped() {
        let mut half = enriched(1, "X", "Y", MatchState::Complete, "1-0");
        half.player2 = None;
        let table = calculate(&[half], &[]).unwrap();
        assert_eq!(names(&table), ["X"]);
        assert_eq!(table[0].played, 0);
    }

    #[test]
    fn points_are_conserved() {
        let pairs = [("A", "B"), ("B", "C"), ("C", "A")];
        for score_a in 0..3 {
            for score_b in 0..3 {
                for score_c in 0..3 {
                    let scores = [format!("{score_a}-{score_b}"), format!("{score_b}-{score_c}"), format!("{score_c}-{score_a}")];
                    let matches = pairs.iter().zip(&scores).enumerate()
                        .map(|(i, ((p1, p2), scores))| enriched(i as i64, p1, p2, MatchState::Complete, scores))
                        .collect_vec();
                    let table = calculate(&matches, &[]).unwrap();
                    let draws = scores.iter().filter(|s| parse_score(s).is_some_and(|(a, b)| a == b)).count() as u32;
                    let decided = 3 - draws;
                    assert_eq!(table.iter().map(|stats| stats.points).sum::<u32>(), 3 * decided + 2 * draws);
                    assert_eq!(table.iter().map(|stats| stats.won).sum::<u32>(), decided);
                    assert_eq!(table.iter().map(|stats| stats.lost).sum::<u32>(), decided);
                    assert_eq!(table.iter().map(|stats| stats.goal_difference).sum::<i64>(), 0);
                    for stats in &table {
                        assert_eq!(stats.goal_difference, i64::from(stats.goals_for) - i64::from(stats.goals_against));
                        assert_eq!(stats.points, 3 * stats.won + stats.drawn);
                        assert_eq!(stats.played, stats.won + stats.drawn + stats.lost);
                    }
                }
            }
        }
    }

    #[test]
    fn calculation_is_idempotent() {
        let matches = [
            enriched(1, "X", "Y", MatchState::Complete, "2-2"),
            enriched(2, "Y", "Z", MatchState::Complete, "0-1"),
        ];
        assert_eq!(calculate(&matches, &[]).unwrap(), calculate(&matches, &[]).unwrap());
    }

    #[test]
    fn ranking_uses_points_then_goal_difference_then_goals() {
        let table = calculate(&[
            enriched(1, "A", "D", MatchState::Complete, "1-0"),
            enriched(2, "B", "E", MatchState::Complete, "2-1"),
            enriched(3, "C", "F", MatchState::Complete, "3-0"),
            enriched(4, "G", "H", MatchState::Complete, "1-1"),
        ], &[]).unwrap();
        assert_eq!(names(&table), ["C", "B", "A", "G", "H", "E", "D", "F"]);
    }

    #[test]
    fn playoff_result_overrides_points() {
        let matches = [
            enriched(1, "GLAKTICOS", "KAMZÍCI", MatchState::Complete, "0-5"),
            enriched(2, "DZIVY MIX", "OSTATNI", MatchState::Complete, "0-9"),
        ];
        let table = calculate(&matches, &[format!("GLAKTICOS"), format!("DZIVY MIX")]).unwrap();
        assert_eq!(names(&table), ["GLAKTICOS", "DZIVY MIX", "OSTATNI", "KAMZÍCI"]);
        assert_eq!(table[0].final_position, Some(1));
        assert_eq!(table[1].final_position, Some(2));
        assert_eq!(table[2].final_position, None);
    }

    #[test]
    fn unknown_playoff_team_fails() {
        let matches = [enriched(1, "X", "Y", MatchState::Complete, "1-0")];
        assert!(matches!(calculate(&matches, &[format!("Z")]), Err(Error::MissingPlayoffTeam(team)) if team == "Z"));
        assert!(matches!(calculate(&matches, &[format!("X"), format!("X")]), Err(Error::DuplicatePlayoffTeam(_))));
    }
}
