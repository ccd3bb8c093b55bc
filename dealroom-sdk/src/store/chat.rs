//! Assistant chat over the push channel.
//!
//! Sent messages appear immediately as pending, under an id generated here.
//! `chat:message:ack` swaps that id for the server's.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::event::{ChatAck, ChatSend, ClientEvent, ServerEvent, TypingPayload, TypingSend, names};
use crate::models::ChatMessage;
use crate::registry::{EventRegistry, handler};
use crate::store::{Listeners, SocketListeners};

#[derive(Default)]
struct ChatState {
    messages: Vec<ChatMessage>,
    conversation_id: Option<String>,
    /// conversation id -> users currently typing
    typing: HashMap<String, BTreeSet<String>>,
    sending: bool,
    error: Option<String>,
}

impl ChatState {
    fn acknowledge(&mut self, ack: &ChatAck) {
        if self.messages.iter().any(|m| m.id == ack.message_id) {
            // The server's copy arrived first.
            self.messages.retain(|m| m.id != ack.client_message_id);
        } else if let Some(msg) = self
            .messages
            .iter_mut()
            .find(|m| m.id == ack.client_message_id)
        {
            msg.id = ack.message_id.clone();
            msg.pending = false;
            if ack.conversation_id.is_some() {
                msg.conversation_id = ack.conversation_id.clone();
            }
        } else {
            tracing::debug!(client_id = %ack.client_message_id, "Ack for unknown message");
        }
        if self.conversation_id.is_none() {
            self.conversation_id = ack.conversation_id.clone();
        }
    }

    fn receive(&mut self, message: &ChatMessage) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message.clone(),
            None => self.messages.push(message.clone()),
        }
        if self.conversation_id.is_none() {
            self.conversation_id = message.conversation_id.clone();
        }
    }

    fn typing(&mut self, payload: &TypingPayload) {
        if payload.is_typing {
            self.typing
                .entry(payload.conversation_id.clone())
                .or_default()
                .insert(payload.user_id.clone());
        } else if let Some(users) = self.typing.get_mut(&payload.conversation_id) {
            users.remove(&payload.user_id);
            if users.is_empty() {
                self.typing.remove(&payload.conversation_id);
            }
        }
    }
}

#[derive(Clone)]
pub struct ChatStore {
    connection: ConnectionManager,
    state: Arc<Mutex<ChatState>>,
    listeners: Listeners,
}

impl ChatStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            state: Arc::new(Mutex::new(ChatState::default())),
            listeners: Listeners::default(),
        }
    }

    /// Send a user message. Returns the local id of the pending message, or
    /// `None` for blank input. Without `conversation_id` the current
    /// conversation is continued.
    pub async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<String>,
        context: Option<Value>,
    ) -> Result<Option<String>> {
        let content = text.trim();
        if content.is_empty() {
            return Ok(None);
        }
        let client_id = format!("local-{:016x}", rand::random::<u64>());

        let conversation_id = {
            let mut state = self.state.lock();
            let conversation_id = conversation_id.or_else(|| state.conversation_id.clone());
            state.messages.push(ChatMessage {
                id: client_id.clone(),
                conversation_id: conversation_id.clone(),
                role: "user".into(),
                content: content.to_string(),
                created_at: Utc::now(),
                pending: true,
            });
            state.sending = true;
            state.error = None;
            conversation_id
        };

        let sent = self
            .connection
            .emit(ClientEvent::ChatSend(ChatSend {
                message: content.to_string(),
                conversation_id,
                context,
                client_message_id: Some(client_id.clone()),
            }))
            .await;

        let mut state = self.state.lock();
        state.sending = false;
        match sent {
            Ok(()) => Ok(Some(client_id)),
            Err(e) => {
                tracing::warn!(error = %e, "Chat message not sent");
                state.messages.retain(|m| m.id != client_id);
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn set_typing(&self, conversation_id: &str, is_typing: bool) -> Result<()> {
        self.connection
            .emit(ClientEvent::ChatTyping(TypingSend {
                conversation_id: conversation_id.to_string(),
                is_typing,
            }))
            .await
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().messages.clone()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.state.lock().conversation_id.clone()
    }

    /// Start a fresh conversation.
    pub fn set_conversation(&self, conversation_id: Option<String>) {
        let mut state = self.state.lock();
        state.conversation_id = conversation_id;
        state.messages.clear();
    }

    pub fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        self.state
            .lock()
            .typing
            .get(conversation_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_sending(&self) -> bool {
        self.state.lock().sending
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn clear(&self) {
        *self.state.lock() = ChatState::default();
    }

    fn apply(&self, event: &ServerEvent) {
        let mut state = self.state.lock();
        match event {
            ServerEvent::ChatMessage(m) => state.receive(m),
            ServerEvent::ChatMessageAck(ack) => state.acknowledge(ack),
            ServerEvent::ChatTyping(t) => state.typing(t),
            _ => {}
        }
    }
}

impl SocketListeners for ChatStore {
    fn setup_socket_listeners(&self, registry: &EventRegistry) {
        let store = self.clone();
        let on_event = handler(move |event| store.apply(event));
        self.listeners.install(
            registry,
            vec![
                (names::CHAT_MESSAGE, on_event.clone()),
                (names::CHAT_MESSAGE_ACK, on_event.clone()),
                (names::CHAT_TYPING, on_event),
            ],
        );
    }

    fn remove_socket_listeners(&self) {
        self.listeners.remove();
    }
}
