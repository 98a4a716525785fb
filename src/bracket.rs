//! Joining the bracket provider's matches with its participants.

use crate::{
    challonge::{
        self,
        Tournament,
    },
    config::PlayoffPairing,
    prelude::*,
};

#[async_trait]
pub(crate) trait BracketSource: Send + Sync {
    async fn tournament(&self) -> Result<Tournament, challonge::Error>;
    async fn participants(&self) -> Result<Vec<Participant>, challonge::Error>;
    async fn matches(&self) -> Result<Vec<Match>, challonge::Error>;
    async fn update_match(&self, match_id: i64, scores_csv: &str, winner_id: Option<i64>) -> Result<Match, challonge::Error>;
}

/// A match with its participant references resolved. `None` means the slot is still TBD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct EnrichedMatch {
    #[serde(flatten)]
    pub(crate) inner: Match,
    pub(crate) player1: Option<Participant>,
    pub(crate) player2: Option<Participant>,
}

impl EnrichedMatch {
    pub(crate) fn teams(&self) -> impl Iterator<Item = &Participant> {
        self.player1.iter().chain(&self.player2)
    }
}

/// Resolves `player1_id`/`player2_id` against the participants.
///
/// In team tournaments the match slots reference entries of `group_player_ids`; participants without any
/// such entries are looked up by their own ID.
pub(crate) fn enrich(matches: Vec<Match>, participants: &[Participant]) -> Vec<EnrichedMatch> {
    let mut by_player_id = HashMap::new();
    for participant in participants {
        if participant.group_player_ids.is_empty() {
            by_player_id.insert(participant.id, participant);
        } else {
            for &group_player_id in &participant.group_player_ids {
                by_player_id.insert(group_player_id, participant);
            }
        }
    }
    matches.into_iter()
        .map(|inner| EnrichedMatch {
            player1: inner.player1_id.and_then(|id| by_player_id.get(&id)).map(|&participant| participant.clone()),
            player2: inner.player2_id.and_then(|id| by_player_id.get(&id)).map(|&participant| participant.clone()),
            inner,
        })
        .collect()
}

/// Replaces the participants of playoff matches (those outside any group) named in `pairings`.
/// Team names that don't match any participant keep the provider's participant.
pub(crate) fn apply_playoff_pairings(matches: &mut [EnrichedMatch], participants: &[Participant], pairings: &[PlayoffPairing]) {
    let by_name = |name: &str| participants.iter().find(|participant| participant.display_name == name).cloned();
    for pairing in pairings {
        for enriched in matches.iter_mut().filter(|enriched| enriched.inner.group_id.is_none() && enriched.inner.round == pairing.round && enriched.inner.identifier == pairing.identifier) {
            if let Some(player1) = by_name(&pairing.player1) {
                enriched.player1 = Some(player1);
            }
            if let Some(player2) = by_name(&pairing.player2) {
                enriched.player2 = Some(player2);
            }
        }
    }
}

/// Every participant appearing in at least one match, in order of first appearance.
pub(crate) fn unique_teams(matches: &[EnrichedMatch]) -> Vec<Participant> {
    matches.iter()
        .flat_map(EnrichedMatch::teams)
        .unique_by(|participant| participant.id)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Phase {
    Group,
    Playoff,
}

impl FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "group" => Ok(Self::Group),
            "playoff" => Ok(Self::Playoff),
            _ => Err(()),
        }
    }
}

/// Matches of the given phase, earliest scheduled first. Unscheduled matches go last.
pub(crate) fn phase_matches(matches: &[EnrichedMatch], config: &Config, phase: Phase) -> Vec<EnrichedMatch> {
    matches.iter()
        .filter(|enriched| config.is_group(enriched.inner.group_id) == (phase == Phase::Group))
        .sorted_by(|a, b| match (a.inner.scheduled_time, b.inner.scheduled_time) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .cloned()
        .collect()
}

/// Fetches matches and participants and joins them, applying the configured playoff pairings.
pub(crate) async fn load(source: &dyn BracketSource, config: &Config) -> Result<Vec<EnrichedMatch>, challonge::Error> {
    let (matches, participants) = tokio::try_join!(source.matches(), source.participants())?;
    let mut matches = enrich(matches, &participants);
    apply_playoff_pairings(&mut matches, &participants, &config.playoff_pairings);
    Ok(matches)
}

/// A fixed bracket, for exercising the layers above the provider without network access.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct StaticBracket {
    pub(crate) tournament: Option<Tournament>,
    pub(crate) participants: Vec<Participant>,
    pub(crate) matches: Mutex<Vec<Match>>,
}

#[cfg(test)]
#[async_trait]
impl BracketSource for StaticBracket {
    async fn tournament(&self) -> Result<Tournament, challonge::Error> {
        self.tournament.clone().ok_or(challonge::Error::NotFound)
    }

    async fn participants(&self) -> Result<Vec<Participant>, challonge::Error> {
        Ok(self.participants.clone())
    }

    async fn matches(&self) -> Result<Vec<Match>, challonge::Error> {
        Ok(self.matches.lock().await.clone())
    }

    async fn update_match(&self, match_id: i64, scores_csv: &str, winner_id: Option<i64>) -> Result<Match, challonge::Error> {
        let mut matches = self.matches.lock().await;
        let Some(found) = matches.iter_mut().find(|found| found.id == match_id) else {
            return Err(challonge::Error::NotFound)
        };
        found.scores_csv = scores_csv.to_owned();
        found.winner_id = winner_id;
        found.state = MatchState::Complete;
        Ok(found.clone())
    }
}
