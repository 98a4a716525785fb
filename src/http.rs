use {
    rocket::{
        Build,
        Request,
        Rocket,
        response::Responder,
    },
    serde_json::{
        Value,
        json,
    },
    crate::{
        admin,
        bracket::{
            self,
            Phase,
            phase_matches,
        },
        challonge::{
            self,
            Tournament,
        },
        prediction::{
            self,
            Leaderboard,
            Prediction,
            PredictionStat,
            SelectionSet,
            Summary,
            Toggle,
            TournamentPrediction,
            TournamentPredictionStat,
        },
        standings::{
            self,
            TeamStats,
        },
        store::{
            self,
            NewPick,
            NewPrediction,
        },
        prelude::*,
    },
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error(transparent)] Challonge(#[from] challonge::Error),
    #[error(transparent)] Standings(#[from] standings::Error),
    #[error(transparent)] Store(#[from] store::Error),
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let (status, body) = match self {
            Self::BadRequest(message) => (Status::BadRequest, json!({ "error": message })),
            Self::NotFound | Self::Challonge(challonge::Error::NotFound) => (Status::NotFound, json!({ "error": "Not found" })),
            Self::Unauthorized => (Status::Unauthorized, json!({ "error": "Unauthorized" })),
            Self::Store(store::Error::UsernameTaken) => (Status::Conflict, json!({ "error": "USERNAME_TAKEN", "message": "Táto prezývka je už obsadená" })),
            Self::Challonge(e) => {
                error!("error talking to Challonge while handling {} {}: {e}", request.method(), request.uri());
                (Status::BadGateway, json!({ "error": "Failed to fetch data from Challonge" }))
            }
            Self::Standings(e) => {
                error!("misconfigured playoff result: {e}");
                (Status::InternalServerError, json!({ "error": e.to_string() }))
            }
            Self::Store(e) => {
                error!("database error while handling {} {}: {e}", request.method(), request.uri());
                (Status::InternalServerError, json!({ "error": "Internal server error" }))
            }
        };
        (status, Json(body)).respond_to(request)
    }
}

fn require_session(session_id: Option<&str>) -> Result<SessionId, ApiError> {
    session_id.and_then(SessionId::parse).ok_or(ApiError::BadRequest("Session ID is required"))
}

#[rocket::get("/api/tournament")]
async fn tournament(source: &State<Arc<dyn BracketSource>>) -> Result<Json<Tournament>, ApiError> {
    Ok(Json(source.tournament().await?))
}

#[rocket::get("/api/matches?<phase>")]
async fn matches(source: &State<Arc<dyn BracketSource>>, config: &State<Config>, phase: Option<&str>) -> Result<Json<Vec<EnrichedMatch>>, ApiError> {
    let matches = bracket::load(&**source.inner(), config).await?;
    Ok(Json(match phase {
        Some(phase) => phase_matches(&matches, config, phase.parse::<Phase>().map_err(|()| ApiError::BadRequest("Invalid phase"))?),
        None => matches,
    }))
}

#[rocket::get("/api/participants")]
async fn participants(source: &State<Arc<dyn BracketSource>>) -> Result<Json<Vec<Participant>>, ApiError> {
    Ok(Json(source.participants().await?))
}

#[rocket::get("/api/standings")]
async fn get_standings(source: &State<Arc<dyn BracketSource>>, config: &State<Config>) -> Result<Json<Vec<TeamStats>>, ApiError> {
    let matches = bracket::load(&**source.inner(), config).await?;
    Ok(Json(standings::calculate(&matches, &config.playoff_result)?))
}

#[rocket::post("/api/session")]
fn new_session() -> Json<Value> {
    Json(json!({ "session_id": SessionId::mint() }))
}

#[rocket::get("/api/predictions?<session_id>")]
async fn predictions(store: &State<Arc<dyn Store>>, session_id: Option<&str>) -> Result<Json<Vec<Prediction>>, ApiError> {
    let session = require_session(session_id)?;
    Ok(Json(store.predictions(&session).await?))
}

#[derive(Deserialize)]
struct PredictionBody {
    session_id: Option<String>,
    match_id: Option<i64>,
    predicted_winner_id: Option<i64>,
    predicted_score: Option<String>,
    username: Option<String>,
}

#[rocket::post("/api/predictions", data = "<body>")]
async fn save_prediction(store: &State<Arc<dyn Store>>, body: Json<PredictionBody>) -> Result<Json<Prediction>, ApiError> {
    let PredictionBody { session_id, match_id, predicted_winner_id, predicted_score, username } = body.into_inner();
    let (Some(session), Some(match_id), Some(predicted_winner_id)) = (session_id.as_deref().and_then(SessionId::parse), match_id, predicted_winner_id) else {
        return Err(ApiError::BadRequest("Missing required fields"))
    };
    Ok(Json(store.upsert_prediction(&session, NewPrediction {
        username: username.filter(|username| !username.is_empty()),
        match_id, predicted_winner_id, predicted_score,
    }).await?))
}

#[rocket::delete("/api/predictions?<session_id>&<match_id>")]
async fn delete_prediction(store: &State<Arc<dyn Store>>, session_id: Option<&str>, match_id: Option<i64>) -> Result<Json<Value>, ApiError> {
    let (Some(session), Some(match_id)) = (session_id.and_then(SessionId::parse), match_id) else {
        return Err(ApiError::BadRequest("Missing required parameters"))
    };
    store.delete_prediction(&session, match_id).await?;
    Ok(Json(json!({ "success": true })))
}

#[rocket::get("/api/predictions/stats?<match_id>")]
async fn prediction_stats(store: &State<Arc<dyn Store>>, match_id: Option<i64>) -> Result<Json<Vec<PredictionStat>>, ApiError> {
    Ok(Json(store.prediction_stats(match_id).await?))
}

#[rocket::get("/api/tournament-predictions?<session_id>")]
async fn tournament_predictions(store: &State<Arc<dyn Store>>, session_id: Option<&str>) -> Result<Json<Vec<TournamentPrediction>>, ApiError> {
    let session = require_session(session_id)?;
    Ok(Json(store.tournament_predictions(&session).await?))
}

#[derive(Deserialize)]
struct ToggleBody {
    session_id: Option<String>,
    prediction_type: Option<PredictionType>,
    team_id: Option<i64>,
    username: Option<String>,
}

#[rocket::post("/api/tournament-predictions/toggle", data = "<body>")]
async fn toggle_tournament_prediction(store: &State<Arc<dyn Store>>, source: &State<Arc<dyn BracketSource>>, body: Json<ToggleBody>) -> Result<Json<Toggle>, ApiError> {
    let ToggleBody { session_id, prediction_type, team_id, username } = body.into_inner();
    let (Some(session), Some(prediction_type), Some(team_id)) = (session_id.as_deref().and_then(SessionId::parse), prediction_type, team_id) else {
        return Err(ApiError::BadRequest("Missing required fields"))
    };
    let participants = source.participants().await?;
    let team = participants.iter().find(|participant| participant.id == team_id).ok_or(ApiError::BadRequest("Unknown team"))?;
    let toggle = store.toggle_tournament_prediction(&session, NewPick {
        group_id: team.group_id,
        username: username.filter(|username| !username.is_empty()),
        prediction_type, team_id,
    }).await?;
    if let Toggle::Added { evicted: Some(evicted) } = toggle {
        debug!("{session} picked {team_id} as {prediction_type}, replacing {evicted}");
    }
    Ok(Json(toggle))
}

#[rocket::delete("/api/tournament-predictions?<session_id>&<prediction_type>&<team_id>")]
async fn delete_tournament_prediction(store: &State<Arc<dyn Store>>, session_id: Option<&str>, prediction_type: Option<&str>, team_id: Option<i64>) -> Result<Json<Value>, ApiError> {
    let (Some(session), Some(prediction_type), Some(team_id)) = (session_id.and_then(SessionId::parse), prediction_type, team_id) else {
        return Err(ApiError::BadRequest("Missing required parameters"))
    };
    let prediction_type = prediction_type.parse().map_err(|()| ApiError::BadRequest("Invalid prediction type"))?;
    store.delete_tournament_prediction(&session, prediction_type, team_id).await?;
    Ok(Json(json!({ "success": true })))
}

#[rocket::get("/api/tournament-predictions/stats?<prediction_type>")]
async fn tournament_prediction_stats(store: &State<Arc<dyn Store>>, prediction_type: Option<&str>) -> Result<Json<Vec<TournamentPredictionStat>>, ApiError> {
    let prediction_type = prediction_type.map(|prediction_type| prediction_type.parse()).transpose().map_err(|()| ApiError::BadRequest("Invalid prediction type"))?;
    Ok(Json(store.tournament_prediction_stats(prediction_type).await?))
}

#[rocket::get("/api/tournament-predictions/summary?<session_id>")]
async fn tournament_prediction_summary(store: &State<Arc<dyn Store>>, source: &State<Arc<dyn BracketSource>>, config: &State<Config>, session_id: Option<&str>) -> Result<Json<Summary>, ApiError> {
    let session = require_session(session_id)?;
    let matches = bracket::load(&**source.inner(), config).await?;
    let selections = SelectionSet::new(store.tournament_predictions(&session).await?);
    let stats = store.tournament_prediction_stats(None).await?;
    Ok(Json(prediction::summarize(config, &matches, &selections, &stats)))
}

#[rocket::get("/api/leaderboard")]
async fn leaderboard(store: &State<Arc<dyn Store>>, source: &State<Arc<dyn BracketSource>>, config: &State<Config>) -> Result<Json<Leaderboard>, ApiError> {
    let matches = bracket::load(&**source.inner(), config).await?;
    let match_stats = store.prediction_stats(None).await?;
    let tournament_stats = store.tournament_prediction_stats(None).await?;
    Ok(Json(prediction::leaderboard(config, &matches, &match_stats, &tournament_stats)))
}

#[rocket::get("/api/user?<session_id>")]
async fn user(store: &State<Arc<dyn Store>>, session_id: Option<&str>) -> Result<Json<Value>, ApiError> {
    let session = require_session(session_id)?;
    Ok(Json(json!({ "username": store.username(&session).await? })))
}

#[derive(Deserialize)]
struct UserBody {
    session_id: Option<String>,
    username: Option<String>,
}

#[rocket::post("/api/user", data = "<body>")]
async fn set_user(store: &State<Arc<dyn Store>>, body: Json<UserBody>) -> Result<Json<Value>, ApiError> {
    let UserBody { session_id, username } = body.into_inner();
    let (Some(session), Some(username)) = (session_id.as_deref().and_then(SessionId::parse), username.as_deref().map(str::trim).filter(|username| !username.is_empty())) else {
        return Err(ApiError::BadRequest("Session ID and username are required"))
    };
    store.bind_username(&session, username).await?;
    info!("{session} is now known as {username}");
    Ok(Json(json!({ "success": true, "username": username })))
}

#[rocket::catch(400)]
fn bad_request() -> Json<Value> {
    Json(json!({ "error": "Bad request" }))
}

#[rocket::catch(404)]
fn not_found() -> Json<Value> {
    Json(json!({ "error": "Not found" }))
}

#[rocket::catch(422)]
fn unprocessable_content() -> Json<Value> {
    Json(json!({ "error": "Invalid request body" }))
}

#[rocket::catch(500)]
fn internal_server_error() -> Json<Value> {
    Json(json!({ "error": "Internal server error" }))
}

#[rocket::catch(default)]
fn fallback_catcher(status: Status, request: &Request<'_>) -> Json<Value> {
    warn!("responding with unexpected HTTP status code {} {} to request {request}", status.code, status.reason_lossy());
    Json(json!({ "error": status.reason_lossy() }))
}

pub(crate) fn rocket(store: Arc<dyn Store>, source: Arc<dyn BracketSource>, config: Config, port: u16) -> Rocket<Build> {
    rocket::custom(rocket::Config::figment().merge(rocket::Config {
        log_level: rocket::config::LogLevel::Critical,
        ..rocket::Config::default()
    }).merge(("port", port)))
    .mount("/", rocket::routes![
        tournament,
        matches,
        participants,
        get_standings,
        new_session,
        predictions,
        save_prediction,
        delete_prediction,
        prediction_stats,
        tournament_predictions,
        toggle_tournament_prediction,
        delete_tournament_prediction,
        tournament_prediction_stats,
        tournament_prediction_summary,
        leaderboard,
        user,
        set_user,
        admin::players,
        admin::create_player,
        admin::update_player,
        admin::delete_player,
        admin::report_match,
    ])
    .register("/", rocket::catchers![
        bad_request,
        not_found,
        unprocessable_content,
        internal_server_error,
        fallback_catcher,
    ])
    .manage(config)
    .manage(store)
    .manage(source)
}

/// A client for a server with a small two-group tournament and an empty in-memory store.
#[cfg(test)]
pub(crate) async fn test_client() -> rocket::local::asynchronous::Client {
    use crate::{
        bracket::{
            StaticBracket,
            fixtures::{
                participant,
                raw_match,
            },
        },
        config::test_config,
        store::memory::MemoryStore,
    };

    let mut group_a = raw_match(1, Some(1), Some(2), MatchState::Complete, "2-1");
    group_a.group_id = Some(100);
    let mut group_b = raw_match(2, Some(4), Some(3), MatchState::Open, "");
    group_b.group_id = Some(200);
    let final_match = raw_match(3, None, None, MatchState::Pending, "");
    let source = StaticBracket {
        tournament: None,
        participants: vec![
            participant(1, "GLAKTICOS", Some(100)),
            participant(2, "DZIVY MIX", Some(100)),
            participant(3, "KAMZÍCI", Some(200)),
            participant(4, "VLAŠSKY ORECHAČI", Some(200)),
        ],
        matches: Mutex::new(vec![group_a, group_b, final_match]),
    };
    rocket::local::asynchronous::Client::tracked(rocket(Arc::new(MemoryStore::default()), Arc::new(source), test_config(), 0)).await.expect("valid rocket instance")
}
