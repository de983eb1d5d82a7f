//! HTTP surface for the dashboard and the operator.
//!
//! Reads go through [`HistoryStore::snapshot`]; the only write is `/reset`.
//! `/control/*` flips the display gate and nothing else.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

use crate::control::ControlSurface;
use crate::error::{Error, Result};
use crate::model::Record;
use crate::store::HistoryStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<HistoryStore>,
    pub control: Arc<ControlSurface>,
    /// Age of the newest reading after which `/status` reports the feed as stale.
    pub stale_after: Duration,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub records: usize,
    pub capacity: usize,
    pub epoch: u64,
    pub active: bool,
    pub latest_timestamp: Option<String>,
    pub stale: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetReport {
    pub epoch: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct LatestQuery {
    client: Option<String>,
}

type ApiReply = WithStatus<Json>;

pub fn routes(
    state: ApiState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // GET /health
    let health = warp::get()
        .and(warp::path!("health"))
        .map(|| warp::reply::json(&"OK"));

    // GET /history?limit=N
    let history = warp::get()
        .and(warp::path!("history"))
        .and(warp::query::<HistoryQuery>())
        .and(with_state(state.clone()))
        .and_then(|q: HistoryQuery, state: ApiState| async move {
            let reply = match blocking(move || state.store.snapshot()).await {
                Ok(mut records) => {
                    if let Some(limit) = q.limit {
                        records.truncate(limit);
                    }
                    ok_reply(&records)
                }
                Err(e) => error_reply(e),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    // GET /history/latest?client=ID
    let latest = warp::get()
        .and(warp::path!("history" / "latest"))
        .and(warp::query::<LatestQuery>())
        .and(with_state(state.clone()))
        .and_then(|q: LatestQuery, state: ApiState| async move {
            let reply = match blocking(move || state.store.snapshot()).await {
                Ok(records) => {
                    let found = records.into_iter().find(|r| match &q.client {
                        Some(client) => r.client_id() == Some(client.as_str()),
                        None => true,
                    });
                    match found {
                        Some(record) => ok_reply(&record),
                        None => warp::reply::with_status(
                            warp::reply::json(&ErrorBody { error: "no matching record".into() }),
                            StatusCode::NOT_FOUND,
                        ),
                    }
                }
                Err(e) => error_reply(e),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    // GET /status
    let status = warp::get()
        .and(warp::path!("status"))
        .and(with_state(state.clone()))
        .and_then(|state: ApiState| async move {
            let store = state.store.clone();
            let reply = match blocking(move || store.snapshot()).await {
                Ok(records) => ok_reply(&status_report(
                    &records,
                    state.store.epoch(),
                    state.store.capacity(),
                    state.control.is_active(),
                    state.stale_after,
                    Utc::now(),
                )),
                Err(e) => error_reply(e),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    // POST /reset
    let reset = warp::post()
        .and(warp::path!("reset"))
        .and(with_state(state.clone()))
        .and_then(|state: ApiState| async move {
            let reply = match blocking(move || state.store.reset()).await {
                Ok(epoch) => ok_reply(&ResetReport { epoch }),
                Err(e) => error_reply(e),
            };
            Ok::<_, warp::Rejection>(reply)
        });

    // --- CONTROL SURFACE ---

    let control = warp::get()
        .and(warp::path!("control"))
        .and(with_state(state.clone()))
        .map(|state: ApiState| ok_reply(&state.control.state()));

    let start = warp::post()
        .and(warp::path!("control" / "start"))
        .and(with_state(state.clone()))
        .map(|state: ApiState| ok_reply(&state.control.set_active(true)));

    let stop = warp::post()
        .and(warp::path!("control" / "stop"))
        .and(with_state(state))
        .map(|state: ApiState| ok_reply(&state.control.set_active(false)));

    health
        .or(history)
        .or(latest)
        .or(status)
        .or(reset)
        .or(control)
        .or(start)
        .or(stop)
}

/// Binds the API. Returns the bound address and the serving future.
pub fn bind_api(state: ApiState, addr: &str) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let bind_err = |source: io::Error| Error::Bind { addr: addr.to_string(), source };

    let socket: SocketAddr = addr
        .parse()
        .map_err(|e| bind_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

    warp::serve(routes(state))
        .try_bind_ephemeral(socket)
        .map_err(|e| bind_err(io::Error::new(io::ErrorKind::Other, e.to_string())))
}

/// Summarizes history freshness for a dashboard's staleness banner.
pub fn status_report(
    records: &[Record],
    epoch: u64,
    capacity: usize,
    active: bool,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> StatusReport {
    let latest = records
        .iter()
        .filter_map(Record::parsed_timestamp)
        .map(|t| t.with_timezone(&Utc))
        .max();

    let stale = match latest {
        // A timestamp in the future is not stale.
        Some(t) => now.signed_duration_since(t).to_std().map_or(false, |age| age > stale_after),
        None => true,
    };

    StatusReport {
        records: records.len(),
        capacity,
        epoch,
        active,
        latest_timestamp: latest.map(|t| t.to_rfc3339()),
        stale,
    }
}

fn with_state(
    state: ApiState,
) -> impl Filter<Extract = (ApiState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn ok_reply<T: Serialize>(body: &T) -> ApiReply {
    warp::reply::with_status(warp::reply::json(body), StatusCode::OK)
}

fn error_reply(err: Error) -> ApiReply {
    error!("api request failed: {}", err);
    warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: err.to_string() }),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}
