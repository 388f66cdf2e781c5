//! Inbound HTTP surface.
//!
//! Message webhooks always answer 200 once the turn has run, whatever its
//! outcome, so the transport never redelivers.

use std::sync::Arc;

use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::extract::{Form, Json, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use secrecy::SecretString;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::channels::cloud_api::verify_subscription;
use crate::channels::twilio::EMPTY_TWIML;
use crate::channels::{CloudWebhook, TwilioInbound};
use crate::dialogue::ConversationEngine;
use crate::session::SessionStore;

/// Shared state for webhook routes.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
    /// Token expected in the Cloud API subscription handshake.
    pub verify_token: Option<SecretString>,
}

/// Build the webhook routes.
pub fn webhook_routes(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(twilio_webhook))
        .route("/webhook/whatsapp", get(cloud_verify).post(cloud_webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.engine.sessions().len().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": "shop-assist",
        "sessions": sessions,
    }))
}

// ── Twilio ──────────────────────────────────────────────────────────────

/// POST /webhook
///
/// Form fields `From`, `Body` and optional `ListId`. Replies are sent out of
/// band, so the TwiML answer is always empty.
async fn twilio_webhook(
    State(state): State<AppState>,
    payload: Result<Form<TwilioInbound>, FormRejection>,
) -> Response {
    match payload {
        Ok(Form(inbound)) => {
            let identity = inbound.identity();
            if identity.is_empty() {
                warn!("Twilio webhook without sender");
            } else {
                state.engine.handle_message(identity, inbound.text()).await;
            }
        }
        Err(e) => warn!(error = %e, "Malformed Twilio webhook"),
    }

    ([(header::CONTENT_TYPE, "text/xml")], EMPTY_TWIML).into_response()
}

// ── WhatsApp Cloud API ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook/whatsapp
async fn cloud_verify(
    State(state): State<AppState>,
    params: Result<Query<VerifyParams>, QueryRejection>,
) -> Response {
    let Some(expected) = &state.verify_token else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Ok(Query(params)) = params else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match verify_subscription(
        params.mode.as_deref(),
        params.token.as_deref(),
        params.challenge.as_deref(),
        expected,
    ) {
        Some(challenge) => {
            debug!("Cloud API webhook verified");
            challenge.into_response()
        }
        None => {
            warn!("Cloud API webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook/whatsapp
async fn cloud_webhook(
    State(state): State<AppState>,
    payload: Result<Json<CloudWebhook>, JsonRejection>,
) -> StatusCode {
    match payload {
        Ok(Json(hook)) => {
            for inbound in hook.inbound_texts() {
                state
                    .engine
                    .handle_message(&inbound.identity, &inbound.text)
                    .await;
            }
        }
        Err(e) => warn!(error = %e, "Malformed Cloud API webhook"),
    }
    StatusCode::OK
}
