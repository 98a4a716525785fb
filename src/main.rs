use {
    clap::Parser as _,
    sqlx::{
        ConnectOptions as _,
        postgres::{
            PgConnectOptions,
            PgPoolOptions,
        },
    },
    crate::{
        challonge::Client as ChallongeClient,
        store::{
            memory::MemoryStore,
            pg::PgStore,
        },
        prelude::*,
    },
};

mod admin;
mod bracket;
mod challonge;
mod config;
mod http;
mod prediction;
mod prelude;
mod session;
mod standings;
mod store;

/// Errors whose cause may be transient, so that callers can decide to serve stale data instead.
pub(crate) trait IsNetworkError {
    fn is_network_error(&self) -> bool;
}

impl IsNetworkError for reqwest::Error {
    fn is_network_error(&self) -> bool {
        self.is_connect()
        || self.is_request()
        || self.is_timeout()
        || self.status().is_some_and(|status| status.is_server_error())
    }
}

#[derive(clap::Parser)]
#[clap(version)]
struct Args {
    #[clap(long, default_value_t = 24816)]
    port: u16,
    /// Defaults to bijacovce.json in the XDG config directories.
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Config(#[from] config::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error(transparent)] Rocket(#[from] rocket::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error(transparent)] Store(#[from] store::Error),
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let default_panic_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!("Thread panic: {info:?}");
        default_panic_hook(info)
    }));
    let Args { port, config } = Args::parse();
    let config = Config::load(config.as_deref()).await?;
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("bijacovce/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .use_rustls_tls()
        .build()?;
    let source: Arc<dyn BracketSource> = Arc::new(ChallongeClient::new(http_client, &config));
    let store: Arc<dyn Store> = if let Some(ref db_config) = config.database {
        let mut db_options = PgConnectOptions::default()
            .application_name("bijacovce")
            .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(10));
        if let Some(ref host) = db_config.host {
            db_options = db_options.host(host);
        }
        if let Some(port) = db_config.port {
            db_options = db_options.port(port);
        }
        if let Some(ref username) = db_config.username {
            db_options = db_options.username(username);
        }
        if let Some(ref password) = db_config.password {
            db_options = db_options.password(password);
        }
        if let Some(ref database) = db_config.database {
            db_options = db_options.database(database);
        }
        let db_pool = PgPoolOptions::default()
            .max_connections(16)
            .connect_with(db_options)
            .await?;
        let store = PgStore::new(db_pool);
        store.apply_schema().await?;
        info!("using Postgres store");
        Arc::new(store)
    } else {
        warn!("no database configured, predictions and roster are kept in memory only");
        Arc::new(MemoryStore::default())
    };
    info!("listening on port {port}");
    http::rocket(store, source, config, port).launch().await?;
    Ok(())
}
