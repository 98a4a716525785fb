//! Persistence for predictions, usernames and the team roster.

use crate::{
    prediction::{
        Prediction,
        PredictionStat,
        Toggle,
        TournamentPrediction,
        TournamentPredictionStat,
    },
    prelude::*,
};

pub(crate) mod memory;
pub(crate) mod pg;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("username is already bound to another session")]
    UsernameTaken,
}

impl Error {
    /// Maps a unique constraint violation on the username column to [`Error::UsernameTaken`].
    fn from_username_conflict(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => Self::UsernameTaken,
            e => Self::Sql(e),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NewPrediction {
    pub(crate) match_id: i64,
    pub(crate) predicted_winner_id: i64,
    pub(crate) predicted_score: Option<String>,
    pub(crate) username: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewPick {
    pub(crate) prediction_type: PredictionType,
    pub(crate) team_id: i64,
    pub(crate) group_id: Option<i64>,
    pub(crate) username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub(crate) struct Player {
    pub(crate) id: Uuid,
    pub(crate) team_name: String,
    pub(crate) player_name: String,
    pub(crate) player_number: Option<i32>,
    pub(crate) position: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewPlayer {
    pub(crate) team_name: String,
    pub(crate) player_name: String,
    pub(crate) player_number: Option<i32>,
    pub(crate) position: Option<String>,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlayerUpdate {
    pub(crate) team_name: Option<String>,
    pub(crate) player_name: Option<String>,
    pub(crate) player_number: Option<i32>,
    pub(crate) position: Option<String>,
}

#[async_trait]
pub(crate) trait Store: Send + Sync {
    async fn predictions(&self, session: &SessionId) -> Result<Vec<Prediction>, Error>;
    /// Creates or replaces the session's prediction for `prediction.match_id`.
    async fn upsert_prediction(&self, session: &SessionId, prediction: NewPrediction) -> Result<Prediction, Error>;
    async fn delete_prediction(&self, session: &SessionId, match_id: i64) -> Result<(), Error>;
    async fn prediction_stats(&self, match_id: Option<i64>) -> Result<Vec<PredictionStat>, Error>;

    /// The session's picks, oldest first.
    async fn tournament_predictions(&self, session: &SessionId) -> Result<Vec<TournamentPrediction>, Error>;
    /// Removes the pick if the session has it, otherwise adds it, evicting the oldest competing pick if the
    /// selection limit is reached. Concurrent toggles for the same session are serialized.
    async fn toggle_tournament_prediction(&self, session: &SessionId, pick: NewPick) -> Result<Toggle, Error>;
    async fn delete_tournament_prediction(&self, session: &SessionId, prediction_type: PredictionType, team_id: i64) -> Result<(), Error>;
    async fn tournament_prediction_stats(&self, prediction_type: Option<PredictionType>) -> Result<Vec<TournamentPredictionStat>, Error>;

    /// The session's bound username, falling back to one recorded on its predictions.
    async fn username(&self, session: &SessionId) -> Result<Option<String>, Error>;
    /// Binds `username` to the session and rewrites it on all of the session's predictions.
    /// Fails with [`Error::UsernameTaken`] if another session holds it.
    async fn bind_username(&self, session: &SessionId, username: &str) -> Result<(), Error>;

    /// Ordered by team name, then player number.
    async fn players(&self) -> Result<Vec<Player>, Error>;
    async fn create_player(&self, player: NewPlayer) -> Result<Player, Error>;
    /// `None` if there is no player with this ID.
    async fn update_player(&self, id: Uuid, update: PlayerUpdate) -> Result<Option<Player>, Error>;
    /// `false` if there was no player with this ID.
    async fn delete_player(&self, id: Uuid) -> Result<bool, Error>;
}
