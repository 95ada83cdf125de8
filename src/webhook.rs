use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::config::{ChatFilter, Config};
use crate::platform::telegram::TelegramClient;
use crate::platform::update::{ChatKind, Update};

pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

pub const START_REPLY: &str =
    "Hi! I'm online. Send me a message and I'll answer it with the help of a language model.";
pub const HELP_REPLY: &str = "I reply to any text you send me. Commands: /start, /help.";
pub const APOLOGY_REPLY: &str =
    "Oops, something went wrong on my side. Please try again later.";

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub agent: Agent,
    pub telegram: TelegramClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let agent = Agent::new(&config)?;
        let telegram = TelegramClient::new(&config.telegram)?;
        Ok(Self {
            config,
            agent,
            telegram,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/webhook/{token}", post(telegram_webhook))
        .with_state(state)
}

async fn root() -> &'static str {
    "OK"
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if !constant_time_eq(&token, &state.config.telegram.bot_token) {
        return (StatusCode::NOT_FOUND, "Not found");
    }

    if let Some(secret) = state.config.telegram.webhook_secret() {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !constant_time_eq(provided, secret) {
            warn!("Invalid webhook secret header");
            return (StatusCode::FORBIDDEN, "Forbidden");
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            error!("Bad JSON in webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    let Some(incoming) = update.extract() else {
        debug!("Update {:?} has no text, acknowledging", update.update_id);
        return (StatusCode::OK, "No content");
    };

    if state.config.telegram.chat_filter == ChatFilter::Private
        && incoming.chat_kind != ChatKind::Private
    {
        debug!(
            "Ignoring {:?} chat {} (private chats only)",
            incoming.chat_kind, incoming.chat_id
        );
        return (StatusCode::OK, "No content");
    }

    let chat_id = incoming.chat_id;
    let text = incoming.text.trim();

    info!("Message in chat {}: \"{}\"", chat_id, preview(text));

    if text.starts_with("/start") {
        state.telegram.send_text(chat_id, START_REPLY).await;
        return (StatusCode::OK, "OK");
    }
    if text.starts_with("/help") {
        state.telegram.send_text(chat_id, HELP_REPLY).await;
        return (StatusCode::OK, "OK");
    }

    state.telegram.send_typing(chat_id).await;

    let reply = match state.agent.complete(text).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Completion failed for chat {}: {}", chat_id, e);
            APOLOGY_REPLY.to_string()
        }
    };

    state.telegram.send_text(chat_id, &reply).await;

    (StatusCode::OK, "OK")
}
