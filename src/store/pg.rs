use {
    crate::{
        prediction::{
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

pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates any missing tables and (re)creates the stats views.
    pub(crate) async fn apply_schema(&self) -> Result<(), Error> {
        sqlx::raw_sql(include_str!("../../assets/schema.sql")).execute(&self.pool).await?;
        Ok(())
    }

    async fn lock_session(transaction: &mut Transaction<'_, Postgres>, session: &SessionId) -> sqlx::Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))").bind(session.as_str()).execute(&mut **transaction).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn predictions(&self, session: &SessionId) -> Result<Vec<Prediction>, Error> {
        Ok(sqlx::query_as("SELECT * FROM predictions WHERE session_id = $1 ORDER BY created_at")
            .bind(session.as_str())
            .fetch_all(&self.pool).await?)
    }

    async fn upsert_prediction(&self, session: &SessionId, new: NewPrediction) -> Result<Prediction, Error> {
        Ok(sqlx::query_as(r#"INSERT INTO predictions (session_id, match_id, predicted_winner_id, predicted_score, username) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_id, match_id) DO UPDATE SET
                predicted_winner_id = EXCLUDED.predicted_winner_id,
                predicted_score = EXCLUDED.predicted_score,
                username = COALESCE(EXCLUDED.username, predictions.username),
                updated_at = NOW()
            RETURNING *"#)
            .bind(session.as_str())
            .bind(new.match_id)
            .bind(new.predicted_winner_id)
            .bind(new.predicted_score)
            .bind(new.username)
            .fetch_one(&self.pool).await?)
    }

    async fn delete_prediction(&self, session: &SessionId, match_id: i64) -> Result<(), Error> {
        sqlx::query("DELETE FROM predictions WHERE session_id = $1 AND match_id = $2")
            .bind(session.as_str())
            .bind(match_id)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn prediction_stats(&self, match_id: Option<i64>) -> Result<Vec<PredictionStat>, Error> {
        Ok(sqlx::query_as("SELECT * FROM prediction_stats WHERE $1::BIGINT IS NULL OR match_id = $1 ORDER BY match_id, predicted_winner_id")
            .bind(match_id)
            .fetch_all(&self.pool).await?)
    }

    async fn tournament_predictions(&self, session: &SessionId) -> Result<Vec<TournamentPrediction>, Error> {
        Ok(sqlx::query_as("SELECT * FROM tournament_predictions WHERE session_id = $1 ORDER BY seq")
            .bind(session.as_str())
            .fetch_all(&self.pool).await?)
    }

    async fn toggle_tournament_prediction(&self, session: &SessionId, pick: NewPick) -> Result<Toggle, Error> {
        let mut transaction = self.pool.begin().await?;
        Self::lock_session(&mut transaction, session).await?;
        let selections = SelectionSet::new(
            sqlx::query_as("SELECT * FROM tournament_predictions WHERE session_id = $1")
                .bind(session.as_str())
                .fetch_all(&mut *transaction).await?
        );
        let toggle = selections.plan_toggle(pick.prediction_type, pick.team_id, pick.group_id);
        let evicted = match toggle {
            Toggle::Removed => Some(pick.team_id),
            Toggle::Added { evicted } => evicted,
        };
        if let Some(team_id) = evicted {
            sqlx::query("DELETE FROM tournament_predictions WHERE session_id = $1 AND prediction_type = $2 AND team_id = $3")
                .bind(session.as_str())
                .bind(pick.prediction_type)
                .bind(team_id)
                .execute(&mut *transaction).await?;
        }
        if let Toggle::Added { .. } = toggle {
            sqlx::query("INSERT INTO tournament_predictions (session_id, prediction_type, team_id, group_id, username) VALUES ($1, $2, $3, $4, $5)")
                .bind(session.as_str())
                .bind(pick.prediction_type)
                .bind(pick.team_id)
                .bind(pick.group_id)
                .bind(pick.username)
                .execute(&mut *transaction).await?;
        }
        transaction.commit().await?;
        Ok(toggle)
    }

    async fn delete_tournament_prediction(&self, session: &SessionId, prediction_type: PredictionType, team_id: i64) -> Result<(), Error> {
        let mut transaction = self.pool.begin().await?;
        Self::lock_session(&mut transaction, session).await?;
        sqlx::query("DELETE FROM tournament_predictions WHERE session_id = $1 AND prediction_type = $2 AND team_id = $3")
            .bind(session.as_str())
            .bind(prediction_type)
            .bind(team_id)
            .execute(&mut *transaction).await?;
        transaction.commit().await?;
        Ok(())
    }

    async fn tournament_prediction_stats(&self, prediction_type: Option<PredictionType>) -> Result<Vec<TournamentPredictionStat>, Error> {
        Ok(sqlx::query_as("SELECT * FROM tournament_prediction_stats WHERE $1::TEXT IS NULL OR prediction_type = $1 ORDER BY prediction_type DESC, team_id")
            .bind(prediction_type)
            .fetch_all(&self.pool).await?)
    }

    async fn username(&self, session: &SessionId) -> Result<Option<String>, Error> {
        for query in [
            "SELECT username FROM user_sessions WHERE session_id = $1",
            "SELECT username FROM predictions WHERE session_id = $1 AND username IS NOT NULL ORDER BY created_at LIMIT 1",
            "SELECT username FROM tournament_predictions WHERE session_id = $1 AND username IS NOT NULL ORDER BY seq LIMIT 1",
        ] {
            if let Some(username) = sqlx::query_scalar(query).bind(session.as_str()).fetch_optional(&self.pool).await? {
                return Ok(Some(username))
            }
        }
        Ok(None)
    }

    async fn bind_username(&self, session: &SessionId, username: &str) -> Result<(), Error> {
        let mut transaction = self.pool.begin().await?;
        if sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM user_sessions WHERE username = $1 AND session_id <> $2)")
            .bind(username)
            .bind(session.as_str())
            .fetch_one(&mut *transaction).await?
        {
            return Err(Error::UsernameTaken)
        }
        sqlx::query(r#"INSERT INTO user_sessions (session_id, username) VALUES ($1, $2)
            ON CONFLICT (session_id) DO UPDATE SET username = EXCLUDED.username, updated_at = NOW()"#)
            .bind(session.as_str())
            .bind(username)
            .execute(&mut *transaction).await
            .map_err(Error::from_username_conflict)?;
        sqlx::query("UPDATE predictions SET username = $2 WHERE session_id = $1")
            .bind(session.as_str())
            .bind(username)
            .execute(&mut *transaction).await?;
        sqlx::query("UPDATE tournament_predictions SET username = $2 WHERE session_id = $1")
            .bind(session.as_str())
            .bind(username)
            .execute(&mut *transaction).await?;
        transaction.commit().await?;
        Ok(())
    }

    async fn players(&self) -> Result<Vec<Player>, Error> {
        Ok(sqlx::query_as("SELECT * FROM players ORDER BY team_name, player_number")
            .fetch_all(&self.pool).await?)
    }

    async fn create_player(&self, new: NewPlayer) -> Result<Player, Error> {
        Ok(sqlx::query_as("INSERT INTO players (id, team_name, player_name, player_number, position) VALUES ($1, $2, $3, $4, $5) RETURNING *")
            .bind(Uuid::new_v4())
            .bind(new.team_name)
            .bind(new.player_name)
            .bind(new.player_number)
            .bind(new.position)
            .fetch_one(&self.pool).await?)
    }

    async fn update_player(&self, id: Uuid, update: PlayerUpdate) -> Result<Option<Player>, Error> {
        Ok(sqlx::query_as(r#"UPDATE players SET
                team_name = COALESCE($2, team_name),
                player_name = COALESCE($3, player_name),
                player_number = COALESCE($4, player_number),
                position = COALESCE($5, position),
                updated_at = NOW()
            WHERE id = $1 RETURNING *"#)
            .bind(id)
            .bind(update.team_name)
            .bind(update.player_name)
            .bind(update.player_number)
            .bind(update.position)
            .fetch_optional(&self.pool).await?)
    }

    async fn delete_player(&self, id: Uuid) -> Result<bool, Error> {
        Ok(sqlx::query("DELETE FROM players WHERE id = $1").bind(id).execute(&self.pool).await?.rows_affected() > 0)
    }
}
