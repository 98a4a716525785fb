pub(crate) use {
    std::{
        cmp::Ordering,
        collections::{
            HashMap,
            hash_map,
        },
        fmt,
        path::{
            Path,
            PathBuf,
        },
        str::FromStr,
        sync::Arc,
        time::Duration,
    },
    async_trait::async_trait,
    chrono::prelude::*,
    enum_iterator::{
        Sequence,
        all,
    },
    itertools::Itertools as _,
    log::{
        debug,
        error,
        info,
        warn,
    },
    rocket::{
        State,
        http::Status,
        serde::json::Json,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    sqlx::{
        PgPool,
        Postgres,
        Transaction,
    },
    tokio::{
        sync::Mutex,
        time::{
            Instant,
            sleep_until,
        },
    },
    url::Url,
    uuid::Uuid,
    crate::{
        IsNetworkError,
        bracket::{
            BracketSource,
            EnrichedMatch,
        },
        challonge::{
            Match,
            MatchState,
            Participant,
        },
        config::Config,
        prediction::PredictionType,
        session::SessionId,
        store::Store,
    },
};
