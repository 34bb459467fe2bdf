use crate::envelope::Reply;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use parley_core::{ChatMessage, Role};
use parley_llm::generate_bounded;
use parley_session::is_reset_command;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn relay_routes() -> Router<AppState> {
    Router::new().route("/ai", get(ai))
}

pub fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/conversation/{id}", get(history))
        .route("/history/{id}", get(history))
}

#[derive(Debug, Default, Deserialize)]
pub struct AiQuery {
    pub prompt: Option<String>,
    pub id: Option<String>,
    pub system: Option<String>,
    pub key: Option<String>,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.store.count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "started_at": state.started_at.to_rfc3339(),
    }))
}

async fn ai(State(state): State<AppState>, query: Result<Query<AiQuery>, QueryRejection>) -> Response {
    let result = match query {
        Ok(Query(query)) => relay(&state, query).await,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable query string");
            Err(ApiError::missing_params())
        }
    };
    state.envelope.render(result)
}

async fn relay(state: &AppState, query: AiQuery) -> Result<Reply, ApiError> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    let (Some(prompt), Some(id)) = (non_empty(query.prompt), non_empty(query.id)) else {
        return Err(ApiError::missing_params());
    };

    if !state.settings.is_privileged(query.key.as_deref()) {
        let count = state
            .store
            .admit_keyless(&id, state.settings.max_requests_without_key)
            .inspect_err(|_| warn!(id = %id, "request limit exceeded"))?;
        tracing::debug!(id = %id, count, "keyless request admitted");
    }

    if is_reset_command(&prompt) {
        state.store.reset(&id);
        return Ok(Reply::Reset { id });
    }

    let _turn = state.store.begin_turn(&id).inspect_err(|_| {
        warn!(id = %id, "rejecting concurrent request");
    })?;
    let ticket = state.store.start_turn(&id, query.system.as_deref(), prompt);

    let text = generate_bounded(
        state.generator.as_ref(),
        &state.settings.model,
        &ticket.messages,
        state.settings.generation_timeout,
    )
    .await
    .map_err(|e| {
        error!(id = %id, error = %e, "Error in /ai route");
        // A conversation whose first turn failed has no deadline yet.
        state.store.arm_if_unscheduled(&id);
        ApiError::generation_failed()
    })?;

    match state.store.append_assistant(&ticket, text.as_str()) {
        Ok(()) => {
            state.store.touch(&id);
            let turns = user_turns(&ticket.messages);
            info!(id = %id, turns, messages = ticket.messages.len() + 1, "reply delivered");
        }
        // Reset or expired mid-turn: the caller still gets the text, but
        // nothing is written back.
        Err(e) => warn!(id = %id, error = %e, "reply not recorded"),
    }

    Ok(Reply::Answer { id, text })
}

/// Prompts in a transcript. Failed turns leave an unanswered user message
/// behind, so this is not half the message count.
pub(crate) fn user_turns(messages: &[ChatMessage]) -> usize {
    messages.iter().filter(|m| m.role == Role::User).count()
}

async fn history(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = state
        .store
        .history(&id)
        .map(|messages| Reply::History { id, messages })
        .ok_or_else(ApiError::no_conversation);
    state.envelope.render(result)
}
