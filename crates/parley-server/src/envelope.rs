//! JSON envelopes: `{"status": <code>, "data": {...}}`.
//!
//! The `data` layout depends on the configured [`ResponseStyle`].

use crate::error::ApiError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use parley_core::config::ResponseConfig;
use parley_core::{ChatMessage, ResponseStyle};
use serde_json::{json, Map, Value};

pub const RESET_CONFIRMATION: &str = "Conversation has been reset.";
pub const RESET_CONFIRMATION_API: &str = "Conversation history has been cleared.";
pub const NO_HISTORY_API: &str = "No conversation history found for this ID.";

/// Successful outcomes of the relay routes.
#[derive(Debug, Clone)]
pub enum Reply {
    Answer { id: String, text: String },
    Reset { id: String },
    History { id: String, messages: Vec<ChatMessage> },
}

#[derive(Debug, Clone)]
pub struct Envelope {
    style: ResponseStyle,
    signature: String,
}

impl Envelope {
    pub fn new(style: ResponseStyle, signature: impl Into<String>) -> Self {
        Self { style, signature: signature.into() }
    }

    pub fn from_config(cfg: &ResponseConfig) -> Self {
        Self::new(cfg.style, cfg.signature.clone())
    }

    pub fn style(&self) -> ResponseStyle {
        self.style
    }

    pub fn render(&self, result: Result<Reply, ApiError>) -> Response {
        match result {
            Ok(reply) => self.reply(reply),
            Err(err) => self.error(&err),
        }
    }

    pub fn reply(&self, reply: Reply) -> Response {
        let mut data = Map::new();
        match (self.style, reply) {
            (ResponseStyle::Api, Reply::Answer { text, .. }) => {
                data.insert("response".into(), Value::String(text));
            }
            (ResponseStyle::Api, Reply::Reset { .. }) => {
                data.insert("response".into(), RESET_CONFIRMATION_API.into());
            }
            (ResponseStyle::Api, Reply::History { messages, .. }) => {
                data.insert("conversation".into(), json!(messages));
            }
            (_, Reply::Answer { id, text }) => {
                self.insert_id(&mut data, id);
                data.insert("message".into(), Value::String(text));
            }
            (_, Reply::Reset { id }) => {
                self.insert_id(&mut data, id);
                data.insert("message".into(), RESET_CONFIRMATION.into());
            }
            (_, Reply::History { id, messages }) => {
                self.insert_id(&mut data, id);
                data.insert("conversation".into(), json!(messages));
            }
        }
        self.wrap(StatusCode::OK, data)
    }

    pub fn error(&self, err: &ApiError) -> Response {
        let mut data = Map::new();
        match self.style {
            // The api layout reports a missing history as a plain response.
            ResponseStyle::Api if err.status == StatusCode::NOT_FOUND => {
                data.insert("response".into(), NO_HISTORY_API.into());
            }
            ResponseStyle::Api => {
                data.insert("error".into(), Value::String(err.message.clone()));
            }
            ResponseStyle::Classic | ResponseStyle::Pretty => {
                data.insert("message".into(), Value::String(err.message.clone()));
            }
        }
        self.wrap(err.status, data)
    }

    fn insert_id(&self, data: &mut Map<String, Value>, id: String) {
        if self.style == ResponseStyle::Classic {
            data.insert("id".into(), Value::String(id));
        }
    }

    fn wrap(&self, status: StatusCode, mut data: Map<String, Value>) -> Response {
        let signature_key = match self.style {
            ResponseStyle::Api => "author",
            ResponseStyle::Classic | ResponseStyle::Pretty => "developer",
        };
        data.insert(signature_key.into(), Value::String(self.signature.clone()));
        let body = json!({ "status": status.as_u16(), "data": data });

        let text = match self.style {
            ResponseStyle::Pretty => serde_json::to_string_pretty(&body),
            ResponseStyle::Classic | ResponseStyle::Api => serde_json::to_string(&body),
        };
        match text {
            Ok(text) => (status, [(header::CONTENT_TYPE, "application/json")], text).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response body");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
