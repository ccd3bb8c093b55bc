//! Typed push events (server → client) and client emits (client → server).
//!
//! Each event name maps to exactly one payload type. Frames arrive as
//! `(name, json)` pairs and are decoded with [`ServerEvent::decode`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    ChatMessage, DocumentPatch, DocumentProgress, Notification, ReportPatch, Transaction,
    TransactionPatch,
};

/// Event names used on the wire.
pub mod names {
    pub const CONNECTED: &str = "connected";
    pub const ERROR: &str = "error";
    /// Local pseudo-event fired when the live connection drops.
    pub const DISCONNECT: &str = "disconnect";

    pub const CHAT_MESSAGE: &str = "chat:message";
    pub const CHAT_MESSAGE_ACK: &str = "chat:message:ack";
    pub const CHAT_TYPING: &str = "chat:typing";
    pub const CHAT_SEND: &str = "chat:send";

    pub const TRANSACTION_CREATED: &str = "transaction:created";
    pub const TRANSACTION_UPDATED: &str = "transaction:updated";
    pub const TRANSACTION_DELETED: &str = "transaction:deleted";

    pub const DOCUMENT_PROGRESS: &str = "document:progress";
    pub const DOCUMENT_UPDATED: &str = "document:updated";
    pub const DOCUMENT_DELETED: &str = "document:deleted";
    pub const DOCUMENT_STATUS: &str = "document:status";

    pub const NOTIFICATION_NEW: &str = "notification:new";
    pub const NOTIFICATION_READ: &str = "notification:read";
    pub const NOTIFICATION_ALL_READ: &str = "notification:all-read";

    pub const REPORT_CREATED: &str = "report:created";
    pub const REPORT_UPDATED: &str = "report:updated";
    pub const REPORT_DELETED: &str = "report:deleted";

    pub const USER_ONLINE: &str = "user:online";
    pub const USER_OFFLINE: &str = "user:offline";

    /// Client handshake frame.
    pub const HANDSHAKE: &str = "handshake";

    /// Every name a [`ServerEvent`](super::ServerEvent) can be dispatched under.
    pub const SERVER_EVENTS: &[&str] = &[
        CONNECTED,
        ERROR,
        DISCONNECT,
        CHAT_MESSAGE,
        CHAT_MESSAGE_ACK,
        CHAT_TYPING,
        TRANSACTION_CREATED,
        TRANSACTION_UPDATED,
        TRANSACTION_DELETED,
        DOCUMENT_PROGRESS,
        DOCUMENT_UPDATED,
        DOCUMENT_DELETED,
        DOCUMENT_STATUS,
        NOTIFICATION_NEW,
        NOTIFICATION_READ,
        NOTIFICATION_ALL_READ,
        REPORT_CREATED,
        REPORT_UPDATED,
        REPORT_DELETED,
        USER_ONLINE,
        USER_OFFLINE,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub socket_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAck {
    /// Id the client assigned when sending.
    pub client_message_id: String,
    /// Id the server assigned.
    pub message_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCreated {
    pub transaction: Transaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdated {
    pub transaction_id: String,
    #[serde(default)]
    pub changes: TransactionPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRef {
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdated {
    pub document_id: String,
    #[serde(default)]
    pub changes: DocumentPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatus {
    pub document_id: String,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRef {
    pub notification_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEvent {
    pub transaction_id: String,
    pub report: ReportPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub user_id: String,
}

/// Events the push channel delivers to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    Error(ErrorPayload),
    Disconnect { reason: String },

    ChatMessage(ChatMessage),
    ChatMessageAck(ChatAck),
    ChatTyping(TypingPayload),

    TransactionCreated(TransactionCreated),
    TransactionUpdated(TransactionUpdated),
    TransactionDeleted(TransactionRef),

    DocumentProgress(DocumentProgress),
    DocumentUpdated(DocumentUpdated),
    DocumentDeleted(DocumentRef),
    DocumentStatus(DocumentStatus),

    NotificationNew(Notification),
    NotificationRead(NotificationRef),
    NotificationAllRead,

    ReportCreated(ReportEvent),
    ReportUpdated(ReportEvent),
    ReportDeleted(TransactionRef),

    UserOnline(UserRef),
    UserOffline(UserRef),
}

impl ServerEvent {
    /// Decode a named payload. Unknown names yield `Ok(None)`.
    pub fn decode(name: &str, data: Value) -> Result<Option<Self>> {
        use serde_json::from_value as de;
        let event = match name {
            names::CONNECTED => Self::Connected(de(data)?),
            names::ERROR => Self::Error(if data.is_null() { ErrorPayload::default() } else { de(data)? }),
            names::DISCONNECT => Self::Disconnect {
                reason: data
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            names::CHAT_MESSAGE => Self::ChatMessage(de(data)?),
            names::CHAT_MESSAGE_ACK => Self::ChatMessageAck(de(data)?),
            names::CHAT_TYPING => Self::ChatTyping(de(data)?),
            names::TRANSACTION_CREATED => Self::TransactionCreated(de(data)?),
            names::TRANSACTION_UPDATED => Self::TransactionUpdated(de(data)?),
            names::TRANSACTION_DELETED => Self::TransactionDeleted(de(data)?),
            names::DOCUMENT_PROGRESS => Self::DocumentProgress(de(data)?),
            names::DOCUMENT_UPDATED => Self::DocumentUpdated(de(data)?),
            names::DOCUMENT_DELETED => Self::DocumentDeleted(de(data)?),
            names::DOCUMENT_STATUS => Self::DocumentStatus(de(data)?),
            names::NOTIFICATION_NEW => Self::NotificationNew(de(data)?),
            names::NOTIFICATION_READ => Self::NotificationRead(de(data)?),
            names::NOTIFICATION_ALL_READ => Self::NotificationAllRead,
            names::REPORT_CREATED => Self::ReportCreated(de(data)?),
            names::REPORT_UPDATED => Self::ReportUpdated(de(data)?),
            names::REPORT_DELETED => Self::ReportDeleted(de(data)?),
            names::USER_ONLINE => Self::UserOnline(de(data)?),
            names::USER_OFFLINE => Self::UserOffline(de(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// The wire name this event is dispatched under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => names::CONNECTED,
            Self::Error(_) => names::ERROR,
            Self::Disconnect { .. } => names::DISCONNECT,
            Self::ChatMessage(_) => names::CHAT_MESSAGE,
            Self::ChatMessageAck(_) => names::CHAT_MESSAGE_ACK,
            Self::ChatTyping(_) => names::CHAT_TYPING,
            Self::TransactionCreated(_) => names::TRANSACTION_CREATED,
            Self::TransactionUpdated(_) => names::TRANSACTION_UPDATED,
            Self::TransactionDeleted(_) => names::TRANSACTION_DELETED,
            Self::DocumentProgress(_) => names::DOCUMENT_PROGRESS,
            Self::DocumentUpdated(_) => names::DOCUMENT_UPDATED,
            Self::DocumentDeleted(_) => names::DOCUMENT_DELETED,
            Self::DocumentStatus(_) => names::DOCUMENT_STATUS,
            Self::NotificationNew(_) => names::NOTIFICATION_NEW,
            Self::NotificationRead(_) => names::NOTIFICATION_READ,
            Self::NotificationAllRead => names::NOTIFICATION_ALL_READ,
            Self::ReportCreated(_) => names::REPORT_CREATED,
            Self::ReportUpdated(_) => names::REPORT_UPDATED,
            Self::ReportDeleted(_) => names::REPORT_DELETED,
            Self::UserOnline(_) => names::USER_ONLINE,
            Self::UserOffline(_) => names::USER_OFFLINE,
        }
    }
}

/// `chat:send` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSend {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Echoed back in `chat:message:ack`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

/// `chat:typing` payload sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSend {
    pub conversation_id: String,
    pub is_typing: bool,
}

/// Events the client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ChatSend(ChatSend),
    ChatTyping(TypingSend),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatSend(_) => names::CHAT_SEND,
            Self::ChatTyping(_) => names::CHAT_TYPING,
        }
    }

    pub fn payload(&self) -> Result<Value> {
        Ok(match self {
            Self::ChatSend(p) => serde_json::to_value(p)?,
            Self::ChatTyping(p) => serde_json::to_value(p)?,
        })
    }
}
