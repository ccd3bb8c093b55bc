//! JSON text framing for the push channel: `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Result, SyncError};
use crate::event::{ClientEvent, names};

/// One frame on the push channel, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// First frame the client sends. The token goes in `auth.token`; without
    /// one the server falls back to the cookie on the upgrade request.
    pub fn handshake(token: Option<&str>) -> Self {
        let auth = match token {
            Some(token) => json!({ "token": token }),
            None => json!({}),
        };
        Self::new(names::HANDSHAKE, json!({ "auth": auth }))
    }

    pub fn from_client_event(event: &ClientEvent) -> Result<Self> {
        Ok(Self::new(event.name(), event.payload()?))
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::Protocol(format!("bad frame: {e}")))
    }

    /// The bearer token carried by a handshake frame, if any.
    pub fn auth_token(&self) -> Option<&str> {
        self.data.get("auth")?.get("token")?.as_str()
    }
}
