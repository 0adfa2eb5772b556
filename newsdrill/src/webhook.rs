//! Inbound Telegram webhook: button callbacks trigger on-demand deliveries.

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, Utc};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, routes, Build, Rocket, State};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::notify::{NotificationChannel, VOCAB_REFRESH};
use crate::scheduler::deliver_drill;
use crate::storage::Store;

/// State shared with the webhook routes
pub struct WebhookState {
    pub store: Store,
    pub channel: Arc<dyn NotificationChannel>,
    /// Bot token; updates posted under any other path segment are rejected
    pub token: String,
    pub drill_size: usize,
    pub offset: FixedOffset,
    pub started_at: DateTime<Utc>,
}

/// The part of a Telegram update this bot reacts to
#[derive(Debug, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
}

type Reply = Result<Json<Value>, Custom<Json<Value>>>;

fn failure(status: Status, message: impl Into<String>) -> Custom<Json<Value>> {
    Custom(status, Json(json!({"status": "error", "message": message.into()})))
}

#[get("/")]
fn health(state: &State<WebhookState>) -> Json<Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(json!({"status": "ok", "uptime_seconds": uptime}))
}

#[post("/webhook/<token>", data = "<update>")]
async fn webhook(token: &str, update: Json<Update>, state: &State<WebhookState>) -> Reply {
    if token != state.token {
        return Err(failure(Status::NotFound, "unknown webhook"));
    }

    let Some(query) = update.into_inner().callback_query else {
        return Ok(Json(json!({"status": "ok"})));
    };
    info!("Callback query received: {:?}", query.data);

    if query.data.as_deref() == Some(VOCAB_REFRESH) {
        state.channel.answer_callback(&query.id, "Preparing new words...").await;
        let now = Utc::now().with_timezone(&state.offset);
        match deliver_drill(&state.store, state.channel.as_ref(), state.drill_size, now).await {
            Ok(Some(_)) => {}
            // Telegram redelivers any non-2xx update; a lost drill is not worth a loop.
            Ok(None) => error!("Vocab refresh drill could not be delivered"),
            Err(e) => {
                error!("Error handling vocab refresh: {:#}", e);
                return Err(failure(Status::InternalServerError, e.to_string()));
            }
        }
    }

    Ok(Json(json!({"status": "ok"})))
}

/// Build the webhook Rocket, applying `[server] bind/port` over Rocket's own figment.
pub fn build_rocket(state: WebhookState, server: &common::ServerConfig) -> Rocket<Build> {
    let mut fig = rocket::Config::figment();
    if let Some(bind) = &server.bind {
        fig = fig.merge(("address", bind.clone()));
    }
    if let Some(port) = server.port {
        fig = fig.merge(("port", port));
    }
    rocket::custom(fig).manage(state).mount("/", routes![health, webhook])
}

/// Serve until Rocket shuts down (SIGINT/SIGTERM).
pub async fn launch_webhook_server(state: WebhookState, server: &common::ServerConfig) -> Result<()> {
    info!("Starting webhook HTTP server");
    build_rocket(state, server)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;
    info!("Webhook HTTP server has shut down");
    Ok(())
}
