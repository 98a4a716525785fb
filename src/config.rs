use crate::prelude::*;

const FILE_NAME: &str = "bijacovce.json";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("failed to read config file at {}: {source}", path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config file at {}: {source}", path.display())]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("missing config file")]
    Missing,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Config {
    pub(crate) challonge: ConfigChallonge,
    pub(crate) tournament_id: String,
    pub(crate) admin_password: String,
    #[serde(default)]
    pub(crate) groups: Vec<ConfigGroup>,
    /// Final placings by team name, winner first. Overrides the computed table order for these teams.
    #[serde(default)]
    pub(crate) playoff_result: Vec<String>,
    #[serde(default)]
    pub(crate) playoff_pairings: Vec<PlayoffPairing>,
    #[serde(default)]
    pub(crate) database: Option<ConfigDatabase>,
    #[serde(default = "default_cache_seconds")]
    pub(crate) cache_seconds: u64,
}

fn default_cache_seconds() -> u64 { 30 }

impl Config {
    pub(crate) async fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => default_path().ok_or(Error::Missing)?,
        };
        info!("loading config from {}", path.display());
        let buf = tokio::fs::read_to_string(&path).await.map_err(|source| Error::Io { source, path: path.clone() })?;
        serde_json::from_str(&buf).map_err(|source| Error::Json { source, path })
    }

    pub(crate) fn is_group(&self, group_id: Option<i64>) -> bool {
        group_id.is_some_and(|group_id| self.groups.iter().any(|group| group.id == group_id))
    }
}

#[cfg(unix)]
fn default_path() -> Option<PathBuf> {
    xdg::BaseDirectories::new().find_config_file(FILE_NAME)
}

#[cfg(not(unix))]
fn default_path() -> Option<PathBuf> {
    Some(Path::new("cfg").join(FILE_NAME))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigChallonge {
    pub(crate) username: String,
    pub(crate) api_key: String,
    #[serde(default = "default_challonge_base_url")]
    pub(crate) base_url: Url,
}

fn default_challonge_base_url() -> Url {
    Url::parse("https://api.challonge.com/v1/").expect("hardcoded URL is valid")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigGroup {
    pub(crate) id: i64,
    pub(crate) name: String,
}

/// Participants to show for a playoff match whose slots the bracket provider cannot express.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayoffPairing {
    pub(crate) round: i64,
    pub(crate) identifier: String,
    pub(crate) player1: String,
    pub(crate) player2: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigDatabase {
    pub(crate) host: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) database: Option<String>,
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        challonge: ConfigChallonge {
            username: format!("organizer"),
            api_key: format!("secret"),
            base_url: default_challonge_base_url(),
        },
        tournament_id: format!("bijacovce2026"),
        admin_password: format!("admin123"),
        groups: vec![
            ConfigGroup { id: 100, name: format!("Skupina A") },
            ConfigGroup { id: 200, name: format!("Skupina B") },
        ],
        playoff_result: Vec::default(),
        playoff_pairings: Vec::default(),
        database: None,
        cache_seconds: default_cache_seconds(),
    }
}
