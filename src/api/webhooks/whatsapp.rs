//! `WhatsApp` Cloud API webhook handler
//!
//! `GET` answers the subscription handshake, `POST` receives message events.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::api::ApiState;
use crate::channels::WhatsAppWebhook;

/// Subscription handshake query (`hub.mode`, `hub.verify_token`, `hub.challenge`)
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// `WhatsApp` webhook response
#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    pub forwarded: usize,
}

/// Echo the challenge when the verify token matches
pub async fn verify_subscription(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<VerifyQuery>,
) -> (StatusCode, String) {
    let Some(expected) = state.whatsapp_verify_token.as_deref() else {
        tracing::warn!("WhatsApp webhook verification attempted without a verify token configured");
        return (StatusCode::FORBIDDEN, String::new());
    };

    let subscribing = query.mode.as_deref() == Some("subscribe");
    let token_matches = query.verify_token.as_deref() == Some(expected);

    match (subscribing && token_matches, query.challenge) {
        (true, Some(challenge)) => {
            tracing::info!("WhatsApp webhook subscription verified");
            (StatusCode::OK, challenge)
        }
        _ => {
            tracing::warn!(mode = ?query.mode, "WhatsApp webhook verification rejected");
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

/// Forward incoming `WhatsApp` messages to the channel handler
///
/// Always answers 200 so the Cloud API does not redeliver.
pub async fn handle_event(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<WhatsAppWebhook>,
) -> (StatusCode, Json<WebhookResponse>) {
    let Some(channel) = &state.whatsapp else {
        tracing::warn!("WhatsApp webhook received but channel is not configured");
        return (
            StatusCode::OK,
            Json(WebhookResponse {
                ok: false,
                forwarded: 0,
            }),
        );
    };

    match channel.handle_webhook(&payload).await {
        Ok(forwarded) => {
            tracing::debug!(forwarded, "WhatsApp webhook processed");
            (
                StatusCode::OK,
                Json(WebhookResponse { ok: true, forwarded }),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to forward WhatsApp webhook");
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    ok: false,
                    forwarded: 0,
                }),
            )
        }
    }
}
