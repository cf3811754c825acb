//! HTTP front-end: a toggle endpoint feeding the command queue and a
//! read-only status snapshot.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::mpsc::{SendError, SyncSender};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use kaku_shared::link::TransportError;
use kaku_shared::protocol::{SwitchToggled, DEVICE_ID_BITS};

use crate::registry::{SwitchRegistry, SWITCHES_PER_DEVICE};

#[derive(Clone)]
struct AppState {
    queue: SyncSender<SwitchToggled>,
    registry: Arc<SwitchRegistry>,
}

/// Serve the API until interrupted or until the transmit worker reports a
/// fatal transport error.
pub async fn serve(
    addr: SocketAddr,
    queue: SyncSender<SwitchToggled>,
    registry: Arc<SwitchRegistry>,
    fatal: oneshot::Receiver<TransportError>,
) -> anyhow::Result<()> {
    let state = AppState { queue, registry };
    let router = Router::new()
        .route("/switch", put(put_switch))
        .route("/status", get(get_status))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind http listener {}", addr))?;
    log::info!("http api listening on {}", addr);

    let server = axum::serve(listener, router).into_future();

    tokio::select! {
        result = server => result.context("http server failed"),
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupt received, shutting down");
            Ok(())
        }
        report = fatal => match report {
            Ok(err) => Err(anyhow::Error::new(err).context("transmit worker died")),
            // Worker gone without a report; nothing left to serve for.
            Err(_) => Ok(()),
        },
    }
}

#[derive(Debug, Deserialize)]
struct SwitchParams {
    id: String,
    val: String,
    sw: String,
}

#[derive(Debug, Serialize)]
struct SwitchAck {
    queued: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
enum RequestError {
    #[error("id is not a valid device id: {0:?}")]
    BadId(String),
    #[error("val must be 0 or 1: {0:?}")]
    BadVal(String),
    #[error("sw must be between 0 and 2: {0:?}")]
    BadSwitch(String),
}

fn parse_switch_params(params: &SwitchParams) -> Result<SwitchToggled, RequestError> {
    let device_id = params
        .id
        .parse::<u32>()
        .ok()
        .filter(|id| *id < 1 << DEVICE_ID_BITS)
        .ok_or_else(|| RequestError::BadId(params.id.clone()))?;

    let state = match params.val.as_str() {
        "0" => false,
        "1" => true,
        _ => return Err(RequestError::BadVal(params.val.clone())),
    };

    let channel = params
        .sw
        .parse::<u8>()
        .ok()
        .filter(|sw| usize::from(*sw) < SWITCHES_PER_DEVICE)
        .ok_or_else(|| RequestError::BadSwitch(params.sw.clone()))?;

    Ok(SwitchToggled {
        device_id,
        channel,
        state,
    })
}

async fn put_switch(
    State(state): State<AppState>,
    Query(params): Query<SwitchParams>,
) -> Result<Json<SwitchAck>, ApiError> {
    let event = parse_switch_params(&params)
        .map_err(|err| ApiError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    // The queue intentionally blocks while two commands are pending, so
    // the send happens off the async runtime.
    let queue = state.queue.clone();
    tokio::task::spawn_blocking(move || queue.send(event))
        .await
        .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "enqueue task failed"))?
        .map_err(|SendError(_)| {
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "transmit worker is gone")
        })?;

    Ok(Json(SwitchAck { queued: true }))
}

async fn get_status(
    State(state): State<AppState>,
) -> Json<HashMap<u32, [bool; SWITCHES_PER_DEVICE]>> {
    Json(state.registry.snapshot())
}
