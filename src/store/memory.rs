use {
    crate::{
        prediction::{
            self,
            Prediction,
            PredictionStat,
            SelectionSet,
            Toggle,
            TournamentPrediction,
            TournamentPredictionStat,
        },
        prelude::*,
    },
    super::{
        Error,
        NewPick,
        NewPlayer,
        NewPrediction,
        Player,
        PlayerUpdate,
    },
};

#[derive(Default)]
struct Tables {
    predictions: Vec<Prediction>,
    tournament_predictions: Vec<TournamentPrediction>,
    /// Session ID to username.
    user_sessions: HashMap<String, String>,
    players: Vec<Player>,
    last_seq: i64,
}

/// A [`Store`] that keeps everything in process memory. Used when no database is configured.
#[derive(Default)]
pub(crate) struct MemoryStore(Mutex<Tables>);

#[async_trait]
impl Store for MemoryStore {
    async fn predictions(&self, session: &SessionId) -> Result<Vec<Prediction>, Error> {
        let tables = self.0.lock().await;
        Ok(tables.predictions.iter().filter(|prediction| prediction.session_id == session.as_str()).cloned().collect())
    }

    async fn upsert_prediction(&self, session: &SessionId, new: NewPrediction) -> Result<Prediction, Error> {
        let mut tables = self.0.lock().await;
        let now = Utc::now();
        if let Some(existing) = tables.predictions.iter_mut().find(|prediction| prediction.session_id == session.as_str() && prediction.match_id == new.match_id) {
            existing.predicted_winner_id = new.predicted_winner_id;
            existing.predicted_score = new.predicted_score;
            if new.username.is_some() {
                existing.username = new.username;
            }
            existing.updated_at = now;
            return Ok(existing.clone())
        }
        let prediction = Prediction {
            session_id: session.to_string(),
            match_id: new.match_id,
            predicted_winner_id: new.predicted_winner_id,
            predicted_score: new.predicted_score,
            username: new.username,
            created_at: now,
            updated_at: now,
        };
        tables.predictions.push(prediction.clone());
        Ok(prediction)
    }

    async fn delete_prediction(&self, session: &SessionId, match_id: i64) -> Result<(), Error> {
        self.0.lock().await.predictions.retain(|prediction| !(prediction.session_id == session.as_str() && prediction.match_id == match_id));
        Ok(())
    }

    async fn prediction_stats(&self, match_id: Option<i64>) -> Result<Vec<PredictionStat>, Error> {
        let tables = self.0.lock().await;
        Ok(prediction::match_stats(tables.predictions.iter().filter(|prediction| match_id.is_none_or(|match_id| prediction.match_id == match_id))))
    }

    async fn tournament_predictions(&self, session: &SessionId) -> Result<Vec<TournamentPrediction>, Error> {
        let tables = self.0.lock().await;
        Ok(tables.tournament_predictions.iter().filter(|selection| selection.session_id == session.as_str()).cloned().collect())
    }

    async fn toggle_tournament_prediction(&self, session: &SessionId, pick: NewPick) -> Result<Toggle, Error> {
        let mut tables = self.0.lock().await;
        let selections = SelectionSet::new(tables.tournament_predictions.iter().filter(|selection| selection.session_id == session.as_str()).cloned().collect());
        let toggle = selections.plan_toggle(pick.prediction_type, pick.team_id, pick.group_id);
        let is_pick = |selection: &TournamentPrediction, team_id| selection.session_id == session.as_str() && selection.prediction_type == pick.prediction_type && selection.team_id == team_id;
        match toggle {
            Toggle::Removed => tables.tournament_predictions.retain(|selection| !is_pick(selection, pick.team_id)),
            Toggle::Added { evicted } => {
                if let Some(evicted) = evicted {
                    tables.tournament_predictions.retain(|selection| !is_pick(selection, evicted));
                }
                tables.last_seq += 1;
                let seq = tables.last_seq;
                tables.tournament_predictions.push(TournamentPrediction {
                    session_id: session.to_string(),
                    prediction_type: pick.prediction_type,
                    team_id: pick.team_id,
                    group_id: pick.group_id,
                    username: pick.username,
                    seq,
                    created_at: Utc::now(),
                });
            }
        }
        Ok(toggle)
    }

    async fn delete_tournament_prediction(&self, session: &SessionId, prediction_type: PredictionType, team_id: i64) -> Result<(), Error> {
        self.0.lock().await.tournament_predictions.retain(|selection| !(selection.session_id == session.as_str() && selection.prediction_type == prediction_type && selection.team_id == team_id));
        Ok(())
    }

    async fn tournament_prediction_stats(&self, prediction_type: Option<PredictionType>) -> Result<Vec<TournamentPredictionStat>, Error> {
        let tables = self.0.lock().await;
        Ok(prediction::tournament_stats(tables.tournament_predictions.iter().filter(|selection| prediction_type.is_none_or(|prediction_type| selection.prediction_type == prediction_type))))
    }

    async fn username(&self, session: &SessionId) -> Result<Option<String>, Error> {
        let tables = self.0.lock().await;
        Ok(
            tables.user_sessions.get(session.as_str()).cloned()
                .or_else(|| tables.predictions.iter().filter(|prediction| prediction.session_id == session.as_str()).find_map(|prediction| prediction.username.clone()))
                .or_else(|| tables.tournament_predictions.iter().filter(|selection| selection.session_id == session.as_str()).find_map(|selection| selection.username.clone()))
        )
    }

    async fn bind_username(&self, session: &SessionId, username: &str) -> Result<(), Error> {
        let mut tables = self.0.lock().await;
        if tables.user_sessions.iter().any(|(other_session, other_username)| other_username == username && other_session != session.as_str()) {
            return Err(Error::UsernameTaken)
        }
        tables.user_sessions.insert(session.to_string(), username.to_owned());
        for prediction in tables.predictions.iter_mut().filter(|prediction| prediction.session_id == session.as_str()) {
            prediction.username = Some(username.to_owned());
        }
        for selection in tables.tournament_predictions.iter_mut().filter(|selection| selection.session_id == session.as_str()) {
            selection.username = Some(username.to_owned());
        }
        Ok(())
    }

    async fn players(&self) -> Result<Vec<Player>, Error> {
        let tables = self.0.lock().await;
        Ok(
            tables.players.iter()
                .sorted_by(|a, b| a.team_name.cmp(&b.team_name).then_with(|| match (a.player_number, b.player_number) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }))
                .cloned()
                .collect()
        )
    }

    async fn create_player(&self, new: NewPlayer) -> Result<Player, Error> {
        let now = Utc::now();
        let player = Player {
            id: Uuid::new_v4(),
            team_name: new.team_name,
            player_name: new.player_name,
            player_number: new.player_number,
            position: new.position,
            created_at: now,
            updated_at: now,
        };
        self.0.lock().await.players.push(player.clone());
        Ok(player)
    }

    async fn update_player(&self, id: Uuid, update: PlayerUpdate) -> Result<Option<Player>, Error> {
        let mut tables = self.0.lock().await;
        let Some(player) = tables.players.iter_mut().find(|player| player.id == id) else { return Ok(None) };
        if let Some(team_name) = update.team_name { player.team_name = team_name }
        if let Some(player_name) = update.player_name { player.player_name = player_name }
        if let Some(player_number) = update.player_number { player.player_number = Some(player_number) }
        if let Some(position) = update.position { player.position = Some(position) }
        player.updated_at = Utc::now();
        Ok(Some(player.clone()))
    }

    async fn delete_player(&self, id: Uuid) -> Result<bool, Error> {
        let mut tables = self.0.lock().await;
        let len = tables.players.len();
        tables.players.retain(|player| player.id != id);
        Ok(tables.players.len() < len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> SessionId {
        SessionId::parse(id).unwrap()
    }

    fn pick(prediction_type: PredictionType, team_id: i64, group_id: Option<i64>) -> NewPick {
        NewPick { prediction_type, team_id, group_id, username: None }
    }

    async fn picked(store: &MemoryStore, session: &SessionId, prediction_type: PredictionType) -> Vec<i64> {
        store.tournament_predictions(session).await.unwrap().into_iter()
            .filter(|selection| selection.prediction_type == prediction_type)
            .map(|selection| selection.team_id)
            .collect()
    }

    #[rocket::async_test]
    async fn toggle_evicts_oldest_in_group() {
        let store = MemoryStore::default();
        let janko = session("session_janko");
        let other = session("session_other");
        for team_id in [1, 2] {
            store.toggle_tournament_prediction(&janko, pick(PredictionType::Semifinalist, team_id, Some(100))).await.unwrap();
        }
        // another session's picks neither count toward the limit nor get evicted
        store.toggle_tournament_prediction(&other, pick(PredictionType::Semifinalist, 9, Some(100))).await.unwrap();
        let toggle = store.toggle_tournament_prediction(&janko, pick(PredictionType::Semifinalist, 3, Some(100))).await.unwrap();
        assert_eq!(toggle, Toggle::Added { evicted: Some(1) });
        assert_eq!(picked(&store, &janko, PredictionType::Semifinalist).await, [2, 3]);
        assert_eq!(picked(&store, &other, PredictionType::Semifinalist).await, [9]);
        let toggle = store.toggle_tournament_prediction(&janko, pick(PredictionType::Semifinalist, 2, Some(100))).await.unwrap();
        assert_eq!(toggle, Toggle::Removed);
        assert_eq!(picked(&store, &janko, PredictionType::Semifinalist).await, [3]);
    }

    #[rocket::async_test]
    async fn concurrent_toggles_respect_limit() {
        let store = Arc::new(MemoryStore::default());
        let janko = session("session_janko");
        let tasks = (1..=6).map(|team_id| {
            let store = Arc::clone(&store);
            let janko = janko.clone();
            tokio::spawn(async move {
                store.toggle_tournament_prediction(&janko, pick(PredictionType::Finalist, team_id, None)).await
            })
        }).collect_vec();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(picked(&store, &janko, PredictionType::Finalist).await.len(), 2);
    }

    #[rocket::async_test]
    async fn tournament_stats_count_sessions() {
        let store = MemoryStore::default();
        for id in ["session_a", "session_b"] {
            store.toggle_tournament_prediction(&session(id), pick(PredictionType::Finalist, 4, None)).await.unwrap();
        }
        store.toggle_tournament_prediction(&session("session_a"), pick(PredictionType::Semifinalist, 4, Some(200))).await.unwrap();
        let finalists = store.tournament_prediction_stats(Some(PredictionType::Finalist)).await.unwrap();
        assert_eq!(finalists, [TournamentPredictionStat { prediction_type: PredictionType::Finalist, team_id: 4, vote_count: 2 }]);
        assert_eq!(store.tournament_prediction_stats(None).await.unwrap().len(), 2);
    }

    #[rocket::async_test]
    async fn predictions_are_upserted_per_match() {
        let store = MemoryStore::default();
        let janko = session("session_janko");
        let new = |predicted_winner_id| NewPrediction { match_id: 7, predicted_winner_id, predicted_score: None, username: None };
        store.upsert_prediction(&janko, new(71)).await.unwrap();
        store.upsert_prediction(&janko, new(72)).await.unwrap();
        store.upsert_prediction(&session("session_other"), new(72)).await.unwrap();
        let predictions = store.predictions(&janko).await.unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].predicted_winner_id, 72);
        let stats = store.prediction_stats(Some(7)).await.unwrap();
        assert_eq!(stats, [PredictionStat { match_id: 7, predicted_winner_id: 72, vote_count: 2, vote_percentage: 100 }]);
        store.delete_prediction(&janko, 7).await.unwrap();
        assert!(store.predictions(&janko).await.unwrap().is_empty());
        assert!(store.prediction_stats(Some(8)).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn username_conflict_keeps_first_binding() {
        let store = MemoryStore::default();
        let first = session("session_first");
        let second = session("session_second");
        store.bind_username(&first, "Janko").await.unwrap();
        assert!(matches!(store.bind_username(&second, "Janko").await, Err(Error::UsernameTaken)));
        assert_eq!(store.username(&first).await.unwrap().as_deref(), Some("Janko"));
        assert_eq!(store.username(&second).await.unwrap(), None);
        // rebinding the same name to the same session is fine
        store.bind_username(&first, "Janko").await.unwrap();
    }

    #[rocket::async_test]
    async fn binding_rewrites_prediction_usernames() {
        let store = MemoryStore::default();
        let janko = session("session_janko");
        store.upsert_prediction(&janko, NewPrediction { match_id: 1, predicted_winner_id: 11, predicted_score: None, username: Some(format!("old")) }).await.unwrap();
        store.toggle_tournament_prediction(&janko, pick(PredictionType::Finalist, 11, None)).await.unwrap();
        store.bind_username(&janko, "Janko").await.unwrap();
        assert_eq!(store.predictions(&janko).await.unwrap()[0].username.as_deref(), Some("Janko"));
        assert_eq!(store.tournament_predictions(&janko).await.unwrap()[0].username.as_deref(), Some("Janko"));
    }

    #[rocket::async_test]
    async fn username_falls_back_to_predictions() {
        let store = MemoryStore::default();
        let janko = session("session_janko");
        let mut new_pick = pick(PredictionType::Finalist, 11, None);
        new_pick.username = Some(format!("from pick"));
        store.toggle_tournament_prediction(&janko, new_pick).await.unwrap();
        assert_eq!(store.username(&janko).await.unwrap().as_deref(), Some("from pick"));
        store.upsert_prediction(&janko, NewPrediction { match_id: 1, predicted_winner_id: 11, predicted_score: None, username: Some(format!("from prediction")) }).await.unwrap();
        assert_eq!(store.username(&janko).await.unwrap().as_deref(), Some("from prediction"));
        store.upsert_prediction(&janko, NewPrediction { match_id: 2, predicted_winner_id: 12, predicted_score: None, username: Some(format!("later prediction")) }).await.unwrap();
        assert_eq!(store.username(&janko).await.unwrap().as_deref(), Some("from prediction"));
    }

    #[rocket::async_test]
    async fn player_crud() {
        let store = MemoryStore::default();
        let new = |team_name: &str, player_name: &str, player_number| NewPlayer {
            team_name: team_name.to_owned(),
            player_name: player_name.to_owned(),
            player_number,
            position: None,
        };
        let keeper = store.create_player(new("KAMZÍCI", "Brankár", None)).await.unwrap();
        store.create_player(new("KAMZÍCI", "Útočník", Some(9))).await.unwrap();
        store.create_player(new("GLAKTICOS", "Obranca", Some(4))).await.unwrap();
        let names = |players: Vec<Player>| players.into_iter().map(|player| player.player_name).collect_vec();
        assert_eq!(names(store.players().await.unwrap()), ["Obranca", "Útočník", "Brankár"]);
        let updated = store.update_player(keeper.id, PlayerUpdate { player_number: Some(1), ..PlayerUpdate::default() }).await.unwrap().unwrap();
        assert_eq!(updated.player_name, "Brankár");
        assert_eq!(updated.player_number, Some(1));
        assert!(updated.updated_at >= keeper.updated_at);
        assert_eq!(names(store.players().await.unwrap()), ["Obranca", "Brankár", "Útočník"]);
        assert!(store.delete_player(keeper.id).await.unwrap());
        assert!(!store.delete_player(keeper.id).await.unwrap());
        assert!(store.update_player(keeper.id, PlayerUpdate::default()).await.unwrap().is_none());
    }
}
