//! Client for the Challonge v1 REST API, which hosts the tournament bracket.

use {
    serde::de::DeserializeOwned,
    crate::prelude::*,
};

/// Minimum delay between two requests to the Challonge API.
const RATE_LIMIT: Duration = Duration::from_millis(250);

/// How long a cached response may still be served after it expired, if the API is unreachable.
const STALE_GRACE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error(transparent)] Url(#[from] url::ParseError),
    #[error("not found on Challonge")]
    NotFound,
}

impl IsNetworkError for Error {
    fn is_network_error(&self) -> bool {
        match self {
            Self::Json(_) => false,
            Self::Reqwest(e) => e.is_network_error(),
            Self::Url(_) => false,
            Self::NotFound => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TournamentState {
    Pending,
    Underway,
    AwaitingReview,
    Complete,
    GroupStagesUnderway,
    GroupStagesFinalized,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Tournament {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) description: String,
    pub(crate) tournament_type: String,
    pub(crate) state: TournamentState,
    pub(crate) started_at: Option<DateTime<FixedOffset>>,
    pub(crate) completed_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub(crate) participants_count: i64,
    #[serde(default)]
    pub(crate) group_stages_enabled: bool,
    #[serde(default)]
    pub(crate) hold_third_place_match: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct Participant {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) display_name: String,
    #[serde(default)]
    pub(crate) seed: i64,
    pub(crate) group_id: Option<i64>,
    /// In team tournaments, matches refer to participants by these IDs rather than by `id`.
    #[serde(default)]
    pub(crate) group_player_ids: Vec<i64>,
    pub(crate) final_rank: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MatchState {
    Pending,
    Open,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct Match {
    pub(crate) id: i64,
    pub(crate) tournament_id: i64,
    pub(crate) state: MatchState,
    pub(crate) player1_id: Option<i64>,
    pub(crate) player2_id: Option<i64>,
    pub(crate) winner_id: Option<i64>,
    pub(crate) loser_id: Option<i64>,
    #[serde(default)]
    pub(crate) identifier: String,
    pub(crate) round: i64,
    pub(crate) group_id: Option<i64>,
    pub(crate) scheduled_time: Option<DateTime<FixedOffset>>,
    pub(crate) completed_at: Option<DateTime<FixedOffset>>,
    /// Usually `"<int>-<int>"`, empty until a result is reported.
    #[serde(default, deserialize_with = "nullable_string")]
    pub(crate) scores_csv: String,
}

fn nullable_string<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
struct TournamentEnvelope {
    tournament: Tournament,
}

#[derive(Deserialize)]
struct ParticipantEnvelope {
    participant: Participant,
}

#[derive(Deserialize)]
struct MatchEnvelope {
    #[serde(rename = "match")]
    inner: Match,
}

struct Cache {
    next_request: Instant,
    entries: HashMap<String, (Instant, serde_json::Value)>,
}

pub(crate) struct Client {
    http_client: reqwest::Client,
    base_url: Url,
    username: String,
    api_key: String,
    tournament_id: String,
    ttl: Duration,
    cache: Mutex<Cache>,
}

impl Client {
    pub(crate) fn new(http_client: reqwest::Client, config: &Config) -> Self {
        Self {
            http_client,
            base_url: config.challonge.base_url.clone(),
            username: config.challonge.username.clone(),
            api_key: config.challonge.api_key.clone(),
            tournament_id: config.tournament_id.clone(),
            ttl: Duration::from_secs(config.cache_seconds),
            cache: Mutex::new(Cache {
                next_request: Instant::now(),
                entries: HashMap::default(),
            }),
        }
    }

    async fn get_uncached(&self, path: &str, query: &[(&str, &str)], next_request: &mut Instant) -> Result<serde_json::Value, Error> {
        sleep_until(*next_request).await;
        let response = self.http_client.get(self.base_url.join(path)?)
            .basic_auth(&self.username, Some(&self.api_key))
            .query(query)
            .send().await;
        *next_request = Instant::now() + RATE_LIMIT;
        let response = response?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound)
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: String, query: &[(&str, &str)]) -> Result<T, Error> {
        let mut cache = self.cache.lock().await;
        let Cache { ref mut next_request, ref mut entries } = *cache;
        let value = match entries.entry(path) {
            hash_map::Entry::Occupied(mut entry) => {
                let retrieved = entry.get().0;
                if retrieved.elapsed() < self.ttl {
                    debug!("Challonge cache hit for {}", entry.key());
                    entry.get().1.clone()
                } else {
                    match self.get_uncached(entry.key(), query, next_request).await {
                        Ok(value) => {
                            entry.insert((Instant::now(), value.clone()));
                            value
                        }
                        Err(e) if e.is_network_error() && retrieved.elapsed() < self.ttl + STALE_GRACE => {
                            warn!("serving stale Challonge data for {}: {e}", entry.key());
                            entry.get().1.clone()
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            hash_map::Entry::Vacant(entry) => {
                debug!("Challonge cache miss for {}", entry.key());
                let value = self.get_uncached(entry.key(), query, next_request).await?;
                entry.insert((Instant::now(), value.clone()));
                value
            }
        };
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl BracketSource for Client {
    async fn tournament(&self) -> Result<Tournament, Error> {
        let TournamentEnvelope { tournament } = self.get(format!("tournaments/{}.json", self.tournament_id), &[]).await?;
        Ok(tournament)
    }

    async fn participants(&self) -> Result<Vec<Participant>, Error> {
        let participants = self.get::<Vec<ParticipantEnvelope>>(format!("tournaments/{}/participants.json", self.tournament_id), &[]).await?;
        Ok(participants.into_iter().map(|ParticipantEnvelope { participant }| participant).collect())
    }

    async fn matches(&self) -> Result<Vec<Match>, Error> {
        let matches = self.get::<Vec<MatchEnvelope>>(format!("tournaments/{}/matches.json", self.tournament_id), &[("state", "all")]).await?;
        Ok(matches.into_iter().map(|MatchEnvelope { inner }| inner).collect())
    }

    async fn update_match(&self, match_id: i64, scores_csv: &str, winner_id: Option<i64>) -> Result<Match, Error> {
        let mut cache = self.cache.lock().await;
        sleep_until(cache.next_request).await;
        let response = self.http_client.put(self.base_url.join(&format!("tournaments/{}/matches/{match_id}.json", self.tournament_id))?)
            .basic_auth(&self.username, Some(&self.api_key))
            .json(&serde_json::json!({
                "match": {
                    "scores_csv": scores_csv,
                    "winner_id": winner_id,
                },
            }))
            .send().await;
        cache.next_request = Instant::now() + RATE_LIMIT;
        let MatchEnvelope { inner } = response?.error_for_status()?.json().await?;
        // scores and bracket progression may both have changed
        cache.entries.clear();
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use {
        mockito::Matcher,
        crate::config::test_config,
        super::*,
    };

    const MATCHES: &str = r#"[
        { "match": {
            "id": 1, "tournament_id": 9, "state": "complete",
            "player1_id": 11, "player2_id": 12, "winner_id": 11, "loser_id": 12,
            "identifier": "A", "round": 1, "group_id": 100,
            "scheduled_time": "2026-06-13T10:00:00.000+02:00", "completed_at": null,
            "scores_csv": "2-1", "underway_at": null
        } },
        { "match": {
            "id": 2, "tournament_id": 9, "state": "pending",
            "player1_id": null, "player2_id": null, "winner_id": null, "loser_id": null,
            "identifier": "C", "round": 2, "group_id": null,
            "scheduled_time": null, "completed_at": null,
            "scores_csv": null
        } }
    ]"#;

    fn client(server: &mockito::ServerGuard) -> Client {
        let mut config = test_config();
        config.challonge.base_url = Url::parse(&format!("{}/", server.url())).unwrap();
        Client::new(reqwest::Client::new(), &config)
    }

    #[rocket::async_test]
    async fn fetches_and_unwraps_matches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/tournaments/bijacovce2026/matches.json")
            .match_query(Matcher::UrlEncoded(format!("state"), format!("all")))
            .match_header("authorization", Matcher::Regex(format!("^Basic ")))
            .with_header("content-type", "application/json")
            .with_body(MATCHES)
            .create_async().await;
        let matches = client(&server).matches().await.unwrap();
        mock.assert_async().await;
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].state, MatchState::Complete);
        assert_eq!(matches[0].scores_csv, "2-1");
        assert_eq!(matches[0].group_id, Some(100));
        assert!(matches[0].scheduled_time.is_some());
        assert_eq!(matches[1].state, MatchState::Pending);
        assert_eq!(matches[1].scores_csv, "");
        assert_eq!(matches[1].player1_id, None);
    }

    #[rocket::async_test]
    async fn caches_responses_within_ttl() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/tournaments/bijacovce2026/participants.json")
            .with_header("content-type", "application/json")
            .with_body(r#"[{ "participant": { "id": 11, "name": "GLAKTICOS", "display_name": "GLAKTICOS", "seed": 1, "group_id": null, "group_player_ids": [111], "final_rank": null } }]"#)
            .expect(1)
            .create_async().await;
        let client = client(&server);
        let first = client.participants().await.unwrap();
        let second = client.participants().await.unwrap();
        mock.assert_async().await;
        assert_eq!(first, second);
        assert_eq!(first[0].group_player_ids, vec![111]);
    }

    #[rocket::async_test]
    async fn unknown_tournament_state_is_tolerated() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/tournaments/bijacovce2026.json")
            .with_header("content-type", "application/json")
            .with_body(r#"{ "tournament": { "id": 9, "name": "Bijacovce 2026", "url": "bijacovce2026", "description": "", "tournament_type": "round robin", "state": "checking_in", "started_at": null, "completed_at": null, "participants_count": 8 } }"#)
            .create_async().await;
        let tournament = client(&server).tournament().await.unwrap();
        assert_eq!(tournament.state, TournamentState::Other);
        assert_eq!(tournament.participants_count, 8);
    }

    #[rocket::async_test]
    async fn client_errors_are_not_network_errors() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/tournaments/bijacovce2026.json")
            .with_status(401)
            .create_async().await;
        let e = client(&server).tournament().await.unwrap_err();
        assert!(!e.is_network_error());
    }

    #[rocket::async_test]
    async fn update_match_sends_scores_and_clears_cache() {
        let mut server = mockito::Server::new_async().await;
        let list = server.mock("GET", "/tournaments/bijacovce2026/matches.json")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(MATCHES)
            .expect(2)
            .create_async().await;
        let update = server.mock("PUT", "/tournaments/bijacovce2026/matches/2.json")
            .match_body(Matcher::PartialJson(serde_json::json!({ "match": { "scores_csv": "3-0", "winner_id": 11 } })))
            .with_header("content-type", "application/json")
            .with_body(r#"{ "match": { "id": 2, "tournament_id": 9, "state": "complete", "player1_id": 11, "player2_id": 12, "winner_id": 11, "loser_id": 12, "identifier": "C", "round": 2, "group_id": null, "scheduled_time": null, "completed_at": null, "scores_csv": "3-0" } }"#)
            .create_async().await;
        let client = client(&server);
        client.matches().await.unwrap();
        let updated = client.update_match(2, "3-0", Some(11)).await.unwrap();
        assert_eq!(updated.scores_csv, "3-0");
        client.matches().await.unwrap();
        update.assert_async().await;
        list.assert_async().await;
    }
}
