//! Response normalisation.
//!
//! Everything above the gateway sees one canonical shape per endpoint; the
//! variants the service has been observed to return are folded here.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ClientError;
use crate::models::{Confirmation, Message, PingStatus};

use super::{ChatReply, TokenGrant};

/// Envelope keys a collection may be wrapped in.
const COLLECTION_KEYS: [&str; 2] = ["items", "projects"];

/// Fold a bare array or an enveloped `{items: [...]}` / `{projects: [...]}`
/// into an ordered `Vec<T>`.
pub(crate) fn collection<T: DeserializeOwned>(body: Value) -> Result<Vec<T>, ClientError> {
    let items = match body {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => COLLECTION_KEYS
            .iter()
            .find_map(|k| map.remove(*k).filter(Value::is_array))
            .ok_or_else(|| ClientError::Decode("collection envelope has no item array".into()))?,
        other => {
            return Err(ClientError::Decode(format!(
                "expected a collection, got {}",
                kind(&other)
            )));
        }
    };
    serde_json::from_value(items).map_err(|e| ClientError::Decode(e.to_string()))
}

pub(crate) fn entity<T: DeserializeOwned>(body: Value) -> Result<T, ClientError> {
    serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}

#[derive(Deserialize)]
struct RawChatBody {
    #[serde(default)]
    history: Option<Vec<Message>>,
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

/// A chat body is either the full authoritative history or just the reply.
/// When both are present the history wins.
pub(crate) fn chat_reply(body: Value) -> Result<ChatReply, ClientError> {
    let raw: RawChatBody = entity(body)?;
    if let Some(history) = raw.history {
        return Ok(ChatReply::History(history));
    }
    raw.reply
        .or(raw.response)
        .map(ChatReply::Reply)
        .ok_or_else(|| ClientError::Decode("chat body has neither history nor reply".into()))
}

#[derive(Deserialize)]
struct RawTokenBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

/// A login body without `access_token` is a rejected login even when the
/// status was 2xx.
pub(crate) fn token_grant(body: Value) -> Result<TokenGrant, ClientError> {
    let reason = detail(&body);
    let raw: RawTokenBody = entity(body)?;
    match raw.access_token.filter(|t| !t.is_empty()) {
        Some(access_token) => Ok(TokenGrant {
            access_token,
            token_type: raw.token_type.unwrap_or_else(|| "bearer".to_string()),
        }),
        None => Err(ClientError::InvalidCredentials(
            reason.unwrap_or_else(|| "login failed".to_string()),
        )),
    }
}

pub(crate) fn confirmation(body: &Value) -> Confirmation {
    let message = body
        .get("msg")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Confirmation { message }
}

pub(crate) fn ping(body: &Value) -> PingStatus {
    match body.get("error").and_then(Value::as_str) {
        Some(err) => PingStatus { reachable: false, message: err.to_string() },
        None => PingStatus { reachable: true, message: confirmation(body).message },
    }
}

/// Extract the failure `detail` of an error body.
///
/// Accepts a plain string or a validation list of `{msg}` objects, which is
/// joined with `"; "`.
pub(crate) fn detail(body: &Value) -> Option<String> {
    match body.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|i| i.get("msg").and_then(Value::as_str))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
