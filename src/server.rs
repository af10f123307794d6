//! HTTP surface for conversational bookings
//!
//! `POST /bookings` opens a flow; while the flow is suspended the response
//! carries a session id and the pending question, and `POST
//! /bookings/:id/reply` feeds the answer back. Suspended flows are parked
//! in an in-memory session table and removed once they finish.

use crate::amadeus::TravelVendor;
use crate::config::Config;
use crate::llm::ChatModel;
use crate::orchestrator::{BookingFlow, BookingOutcome, FlowStep};
use crate::session::Mode;
use crate::{AmadeusClient, OpenAiClient, TravelError};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared handler state: the two clients plus the suspended-flow table
#[derive(Clone)]
pub struct AppState {
    llm: Arc<dyn ChatModel>,
    vendor: Arc<dyn TravelVendor>,
    sessions: Arc<Mutex<HashMap<Uuid, BookingFlow>>>,
}

impl AppState {
    pub fn new(llm: Arc<dyn ChatModel>, vendor: Arc<dyn TravelVendor>) -> Self {
        Self {
            llm,
            vendor,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, TravelError> {
        let llm = OpenAiClient::from_config(&config.llm)?;
        let vendor = AmadeusClient::from_config(&config.amadeus)?;
        Ok(Self::new(Arc::new(llm), Arc::new(vendor)))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub query: String,
    /// Batch requests finish in one call and never ask questions
    #[serde(default = "default_interactive")]
    pub interactive: bool,
}

fn default_interactive() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub answer: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BookingResponse {
    Suspended {
        id: Uuid,
        field: String,
        prompt: String,
    },
    Finished {
        id: Uuid,
        outcome: Box<BookingOutcome>,
    },
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:id/reply", post(reply))
        .layer(Extension(state))
}

/// Bind and serve until the process is stopped
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), TravelError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn create_booking(
    Extension(state): Extension<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<BookingResponse>, (StatusCode, String)> {
    let mode = if request.interactive {
        Mode::Interactive
    } else {
        Mode::Batch
    };
    let id = Uuid::new_v4();
    let mut flow = BookingFlow::new(&request.query, mode);

    let step = flow
        .begin(state.llm.as_ref(), state.vendor.as_ref())
        .await
        .map_err(internal_error)?;

    match step {
        FlowStep::Suspended(point) => {
            state.sessions.lock().await.insert(id, flow);
            info!(%id, field = %point.field, "booking suspended");
            Ok(Json(BookingResponse::Suspended {
                id,
                field: point.field,
                prompt: point.prompt,
            }))
        }
        FlowStep::Finished(outcome) => {
            info!(%id, "booking finished in one turn");
            Ok(Json(BookingResponse::Finished { id, outcome }))
        }
    }
}

async fn reply(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<BookingResponse>, (StatusCode, String)> {
    // Take the flow out of the table so the lock is not held across the
    // resume; re-insert it only if it suspends again.
    let mut flow = state
        .sessions
        .lock()
        .await
        .remove(&id)
        .ok_or((StatusCode::NOT_FOUND, format!("no suspended booking {}", id)))?;

    let step = flow
        .resume(state.llm.as_ref(), state.vendor.as_ref(), &request.answer)
        .await;

    match step {
        Ok(FlowStep::Suspended(point)) => {
            state.sessions.lock().await.insert(id, flow);
            Ok(Json(BookingResponse::Suspended {
                id,
                field: point.field,
                prompt: point.prompt,
            }))
        }
        Ok(FlowStep::Finished(outcome)) => {
            info!(%id, "booking finished");
            Ok(Json(BookingResponse::Finished { id, outcome }))
        }
        Err(e) => {
            warn!(%id, error = %e, "resume failed, dropping session");
            Err(internal_error(e))
        }
    }
}

fn internal_error(e: TravelError) -> (StatusCode, String) {
    let status = match e {
        TravelError::NotSuspended => StatusCode::CONFLICT,
        TravelError::MissingCredentials(_) | TravelError::ConfigError(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
