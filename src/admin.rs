//! Roster management and result reporting, both gated by the shared admin password.

use {
    serde_json::{
        Value,
        json,
    },
    crate::{
        http::ApiError,
        standings::parse_score,
        store::{
            NewPlayer,
            Player,
            PlayerUpdate,
        },
        prelude::*,
    },
};

fn authorize(config: &Config, admin_password: Option<&str>) -> Result<(), ApiError> {
    if admin_password.is_some_and(|admin_password| admin_password == config.admin_password) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

#[derive(Deserialize)]
pub(crate) struct PlayerBody {
    admin_password: Option<String>,
    id: Option<Uuid>,
    team_name: Option<String>,
    player_name: Option<String>,
    player_number: Option<i32>,
    position: Option<String>,
}

#[rocket::get("/api/players")]
pub(crate) async fn players(store: &State<Arc<dyn Store>>) -> Result<Json<Vec<Player>>, ApiError> {
    Ok(Json(store.players().await?))
}

#[rocket::post("/api/players", data = "<body>")]
pub(crate) async fn create_player(store: &State<Arc<dyn Store>>, config: &State<Config>, body: Json<PlayerBody>) -> Result<Json<Player>, ApiError> {
    let PlayerBody { admin_password, id: _, team_name, player_name, player_number, position } = body.into_inner();
    authorize(config, admin_password.as_deref())?;
    let (Some(team_name), Some(player_name)) = (team_name.filter(|name| !name.is_empty()), player_name.filter(|name| !name.is_empty())) else {
        return Err(ApiError::BadRequest("Missing required fields"))
    };
    let player = store.create_player(NewPlayer { team_name, player_name, player_number, position }).await?;
    info!("added {} to the roster of {}", player.player_name, player.team_name);
    Ok(Json(player))
}

#[rocket::put("/api/players", data = "<body>")]
pub(crate) async fn update_player(store: &State<Arc<dyn Store>>, config: &State<Config>, body: Json<PlayerBody>) -> Result<Json<Player>, ApiError> {
    let PlayerBody { admin_password, id, team_name, player_name, player_number, position } = body.into_inner();
    authorize(config, admin_password.as_deref())?;
    let id = id.ok_or(ApiError::BadRequest("Missing player ID"))?;
    let player = store.update_player(id, PlayerUpdate { team_name, player_name, player_number, position }).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(player))
}

#[rocket::delete("/api/players?<id>&<admin_password>")]
pub(crate) async fn delete_player(store: &State<Arc<dyn Store>>, config: &State<Config>, id: Option<&str>, admin_password: Option<&str>) -> Result<Json<Value>, ApiError> {
    authorize(config, admin_password)?;
    let id = id.ok_or(ApiError::BadRequest("Missing player ID"))?;
    let id = Uuid::parse_str(id).map_err(|_| ApiError::BadRequest("Invalid player ID"))?;
    if !store.delete_player(id).await? {
        return Err(ApiError::NotFound)
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub(crate) struct MatchReport {
    admin_password: Option<String>,
    scores_csv: Option<String>,
    /// Derived from the score if omitted. A draw has no winner.
    winner_id: Option<i64>,
}

/// Reports a result to the bracket provider.
#[rocket::put("/api/admin/matches/<match_id>", data = "<body>")]
pub(crate) async fn report_match(source: &State<Arc<dyn BracketSource>>, config: &State<Config>, match_id: i64, body: Json<MatchReport>) -> Result<Json<Match>, ApiError> {
    let MatchReport { admin_password, scores_csv, winner_id } = body.into_inner();
    authorize(config, admin_password.as_deref())?;
    let scores_csv = scores_csv.ok_or(ApiError::BadRequest("Missing required fields"))?;
    let (score1, score2) = parse_score(&scores_csv).ok_or(ApiError::BadRequest("Invalid score"))?;
    let matches = source.matches().await?;
    let found = matches.iter().find(|found| found.id == match_id).ok_or(ApiError::NotFound)?;
    let winner_id = match winner_id {
        Some(winner_id) if Some(winner_id) == found.player1_id || Some(winner_id) == found.player2_id => Some(winner_id),
        Some(_) => return Err(ApiError::BadRequest("Winner must be one of the match's participants")),
        None => match score1.cmp(&score2) {
            Ordering::Greater => found.player1_id,
            Ordering::Less => found.player2_id,
            Ordering::Equal => None,
        },
    };
    // the provider expects the canonical separator
    let scores_csv = format!("{score1}-{score2}");
    let updated = source.update_match(match_id, &scores_csv, winner_id).await?;
    info!("reported {scores_csv} for match {match_id}");
    Ok(Json(updated))
}
