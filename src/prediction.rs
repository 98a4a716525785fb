//! Match winner predictions and tournament-stage picks, and the vote tallies derived from them.

use {
    anyhow::anyhow,
    sqlx::{
        Decode,
        Encode,
        postgres::{
            PgArgumentBuffer,
            PgTypeInfo,
            PgValueRef,
        },
    },
    crate::{
        bracket::unique_teams,
        config::ConfigGroup,
        prelude::*,
    },
};

/// How many teams a session may pick per semifinalist group, and as finalists overall.
pub(crate) const SELECTION_LIMIT: usize = 2;

/// Length of each leaderboard.
const TOP_N: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PredictionType {
    Semifinalist,
    Finalist,
}

impl PredictionType {
    pub(crate) fn slug(&self) -> &'static str {
        match self {
            Self::Semifinalist => "semifinalist",
            Self::Finalist => "finalist",
        }
    }
}

impl FromStr for PredictionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        all::<Self>().find(|prediction_type| prediction_type.slug() == s).ok_or(())
    }
}

impl fmt::Display for PredictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.slug().fmt(f)
    }
}

impl<'r> Decode<'r, Postgres> for PredictionType {
    fn decode(value: PgValueRef<'r>) -> Result<Self, Box<dyn std::error::Error + 'static + Send + Sync>> {
        let prediction_type = <&str as Decode<Postgres>>::decode(value)?;
        prediction_type.parse().map_err(|()| anyhow!("unknown prediction type: {prediction_type}").into())
    }
}

impl<'q> Encode<'q, Postgres> for PredictionType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Encode::<Postgres>::encode_by_ref(&self.slug(), buf)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Encode::<Postgres>::produces(&self.slug())
    }
}

impl sqlx::Type<Postgres> for PredictionType {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as sqlx::Type<Postgres>>::compatible(ty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub(crate) struct Prediction {
    pub(crate) session_id: String,
    pub(crate) match_id: i64,
    pub(crate) predicted_winner_id: i64,
    pub(crate) predicted_score: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub(crate) struct TournamentPrediction {
    pub(crate) session_id: String,
    pub(crate) prediction_type: PredictionType,
    pub(crate) team_id: i64,
    /// The picked team's group at the time of the pick.
    pub(crate) group_id: Option<i64>,
    pub(crate) username: Option<String>,
    /// Strictly increasing in insertion order, so the lowest value in a set of picks is the oldest.
    pub(crate) seq: i64,
    pub(crate) created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub(crate) struct PredictionStat {
    pub(crate) match_id: i64,
    pub(crate) predicted_winner_id: i64,
    pub(crate) vote_count: i64,
    /// Share of all votes for this match, rounded to a whole percent.
    pub(crate) vote_percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub(crate) struct TournamentPredictionStat {
    pub(crate) prediction_type: PredictionType,
    pub(crate) team_id: i64,
    pub(crate) vote_count: i64,
}

/// `count / total` as a percentage, rounded half up. 0 if there are no votes.
pub(crate) fn vote_percentage(count: i64, total: i64) -> i64 {
    if total <= 0 { return 0 }
    (count * 200 + total) / (2 * total)
}

/// Vote counts per match and predicted winner, ordered by match then winner.
pub(crate) fn match_stats<'a>(predictions: impl IntoIterator<Item = &'a Prediction>) -> Vec<PredictionStat> {
    let mut counts = HashMap::<(i64, i64), i64>::default();
    let mut totals = HashMap::<i64, i64>::default();
    for prediction in predictions {
        *counts.entry((prediction.match_id, prediction.predicted_winner_id)).or_default() += 1;
        *totals.entry(prediction.match_id).or_default() += 1;
    }
    counts.into_iter()
        .sorted_unstable_by_key(|&(key, _)| key)
        .map(|((match_id, predicted_winner_id), vote_count)| PredictionStat {
            vote_percentage: vote_percentage(vote_count, totals[&match_id]),
            match_id, predicted_winner_id, vote_count,
        })
        .collect()
}

/// Vote counts per prediction type and team, ordered by type then team.
pub(crate) fn tournament_stats<'a>(selections: impl IntoIterator<Item = &'a TournamentPrediction>) -> Vec<TournamentPredictionStat> {
    selections.into_iter()
        .counts_by(|selection| (selection.prediction_type, selection.team_id))
        .into_iter()
        .sorted_unstable_by_key(|&(key, _)| key)
        .map(|((prediction_type, team_id), vote_count)| TournamentPredictionStat {
            vote_count: vote_count as i64,
            prediction_type, team_id,
        })
        .collect()
}

/// What a toggle did to a session's picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub(crate) enum Toggle {
    Removed,
    Added {
        /// The team whose pick was dropped to stay within [`SELECTION_LIMIT`].
        evicted: Option<i64>,
    },
}

/// One session's tournament-stage picks.
#[derive(Debug, Clone, Default)]
pub(crate) struct SelectionSet(Vec<TournamentPrediction>);

impl SelectionSet {
    pub(crate) fn new(mut selections: Vec<TournamentPrediction>) -> Self {
        selections.sort_by_key(|selection| selection.seq);
        Self(selections)
    }

    pub(crate) fn is_selected(&self, prediction_type: PredictionType, team_id: i64) -> bool {
        self.0.iter().any(|selection| selection.prediction_type == prediction_type && selection.team_id == team_id)
    }

    pub(crate) fn count(&self, prediction_type: PredictionType) -> usize {
        self.0.iter().filter(|selection| selection.prediction_type == prediction_type).count()
    }

    /// Semifinalist picks from the given group.
    pub(crate) fn count_in_group(&self, group_id: Option<i64>) -> usize {
        self.0.iter().filter(|selection| selection.prediction_type == PredictionType::Semifinalist && selection.group_id == group_id).count()
    }

    /// Decides how picking `team_id` changes this set.
    ///
    /// Picking a team that is already picked removes it. Otherwise the team is added and, if the limit for its
    /// group (semifinalists) or for all finalists is already reached, the oldest pick counting toward that
    /// limit is evicted.
    pub(crate) fn plan_toggle(&self, prediction_type: PredictionType, team_id: i64, group_id: Option<i64>) -> Toggle {
        if self.is_selected(prediction_type, team_id) {
            return Toggle::Removed
        }
        let competing = self.0.iter()
            .filter(|selection| selection.prediction_type == prediction_type)
            .filter(|selection| match prediction_type {
                PredictionType::Semifinalist => selection.group_id == group_id,
                PredictionType::Finalist => true,
            })
            .collect_vec();
        let evicted = if competing.len() >= SELECTION_LIMIT {
            competing.into_iter().min_by_key(|selection| selection.seq).map(|selection| selection.team_id)
        } else {
            None
        };
        Toggle::Added { evicted }
    }
}

/// Vote counts and percentages keyed by match and predicted winner.
pub(crate) struct MatchVotes(HashMap<(i64, i64), (i64, i64)>);

impl MatchVotes {
    pub(crate) fn new(stats: &[PredictionStat]) -> Self {
        Self(stats.iter().map(|stat| ((stat.match_id, stat.predicted_winner_id), (stat.vote_count, stat.vote_percentage))).collect())
    }

    /// `(vote_count, vote_percentage)`, zero if nobody picked this team.
    pub(crate) fn get(&self, match_id: i64, team_id: i64) -> (i64, i64) {
        self.0.get(&(match_id, team_id)).copied().unwrap_or_default()
    }

    /// Votes for `team` summed over the matches of its own group.
    pub(crate) fn group_total(&self, team: &Participant, matches: &[EnrichedMatch]) -> i64 {
        matches.iter()
            .filter(|enriched| enriched.inner.group_id == team.group_id)
            .map(|enriched| self.get(enriched.inner.id, team.id).0)
            .sum()
    }
}

pub(crate) struct TournamentVotes(HashMap<(PredictionType, i64), i64>);

impl TournamentVotes {
    pub(crate) fn new(stats: &[TournamentPredictionStat]) -> Self {
        Self(stats.iter().map(|stat| ((stat.prediction_type, stat.team_id), stat.vote_count)).collect())
    }

    pub(crate) fn get(&self, prediction_type: PredictionType, team_id: i64) -> i64 {
        self.0.get(&(prediction_type, team_id)).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Ranked {
    pub(crate) team: Participant,
    pub(crate) votes: i64,
}

/// The teams with the most votes, most first. Teams without votes are left out; ties keep input order.
fn top(teams: &[Participant], votes: impl Fn(&Participant) -> i64) -> Vec<Ranked> {
    teams.iter()
        .map(|team| Ranked { votes: votes(team), team: team.clone() })
        .filter(|ranked| ranked.votes > 0)
        .sorted_by(|a, b| b.votes.cmp(&a.votes))
        .take(TOP_N)
        .collect()
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupLeaders {
    pub(crate) group: ConfigGroup,
    pub(crate) top: Vec<Ranked>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Leaderboard {
    pub(crate) groups: Vec<GroupLeaders>,
    pub(crate) semifinalists: Vec<Ranked>,
    pub(crate) finalists: Vec<Ranked>,
}

pub(crate) fn leaderboard(config: &Config, matches: &[EnrichedMatch], match_stats: &[PredictionStat], tournament_stats: &[TournamentPredictionStat]) -> Leaderboard {
    let teams = unique_teams(matches);
    let match_votes = MatchVotes::new(match_stats);
    let tournament_votes = TournamentVotes::new(tournament_stats);
    Leaderboard {
        groups: config.groups.iter()
            .map(|group| {
                let members = teams.iter().filter(|team| team.group_id == Some(group.id)).cloned().collect_vec();
                GroupLeaders {
                    top: top(&members, |team| match_votes.group_total(team, matches)),
                    group: group.clone(),
                }
            })
            .collect(),
        semifinalists: top(&teams, |team| tournament_votes.get(PredictionType::Semifinalist, team.id)),
        finalists: top(&teams, |team| tournament_votes.get(PredictionType::Finalist, team.id)),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Pick {
    pub(crate) selected: bool,
    pub(crate) votes: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct TeamPicks {
    pub(crate) team: Participant,
    pub(crate) semifinalist: Pick,
    pub(crate) finalist: Pick,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupPicks {
    pub(crate) group: ConfigGroup,
    pub(crate) selected: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Summary {
    pub(crate) teams: Vec<TeamPicks>,
    pub(crate) groups: Vec<GroupPicks>,
    pub(crate) finalists_selected: usize,
    pub(crate) limit: usize,
}

/// A session's picks alongside everyone's votes, for every team that appears in `matches`.
pub(crate) fn summarize(config: &Config, matches: &[EnrichedMatch], selections: &SelectionSet, stats: &[TournamentPredictionStat]) -> Summary {
    let votes = TournamentVotes::new(stats);
    let pick = |prediction_type, team: &Participant| Pick {
        selected: selections.is_selected(prediction_type, team.id),
        votes: votes.get(prediction_type, team.id),
    };
    Summary {
        teams: unique_teams(matches).into_iter()
            .map(|team| TeamPicks {
                semifinalist: pick(PredictionType::Semifinalist, &team),
                finalist: pick(PredictionType::Finalist, &team),
                team,
            })
            .collect(),
        groups: config.groups.iter()
            .map(|group| GroupPicks {
                selected: selections.count_in_group(Some(group.id)),
                group: group.clone(),
            })
            .collect(),
        finalists_selected: selections.count(PredictionType::Finalist),
        limit: SELECTION_LIMIT,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn selection(prediction_type: PredictionType, team_id: i64, group_id: Option<i64>, seq: i64) -> TournamentPrediction {
        TournamentPrediction {
            session_id: format!("session_test"),
            prediction_type, team_id, group_id,
            username: None,
            seq,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn prediction(session_id: &str, match_id: i64, predicted_winner_id: i64) -> Prediction {
        Prediction {
            session_id: session_id.to_owned(),
            match_id, predicted_winner_id,
            predicted_score: None,
            username: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
