use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent_engine::event_bus::{AgentEvent, EventBus};
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, MessageContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Status notes for the user. Never sent to the model.
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    /// Screenshot as a `data:` URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub ts: DateTime<Utc>,
}

/// Ordered conversation owned by the host and lent to the engine per call.
#[derive(Debug)]
pub struct Session {
    id: String,
    messages: Vec<SessionMessage>,
    events: Option<EventBus>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
            events: None,
        }
    }

    /// Every append is also published on `bus`.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, text: impl Into<String>, image: Option<String>) {
        self.push(Role::User, text.into(), image);
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(Role::Assistant, text.into(), None);
    }

    pub fn push_note(&mut self, text: impl Into<String>) {
        self.push(Role::System, text.into(), None);
    }

    /// Drops the conversation and starts a fresh session id.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session = %self.id, "session cleared");
    }

    pub fn publish(&self, event: AgentEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    fn push(&mut self, role: Role, content: String, image: Option<String>) {
        let message = SessionMessage { role, content, image, ts: Utc::now() };
        self.publish(AgentEvent::Message(message.clone()));
        self.messages.push(message);
    }

    /// Model-facing view of the transcript. Status notes are skipped; only the
    /// `history_images` most recent screenshots are attached (all when `None`).
    pub fn to_chat_messages(&self, history_images: Option<usize>) -> Vec<ChatMessage> {
        let total_images = self.messages.iter().filter(|m| m.image.is_some()).count();
        let skip_images = history_images.map_or(0, |keep| total_images.saturating_sub(keep));

        let mut seen_images = 0;
        let mut out = Vec::with_capacity(self.messages.len());
        for m in &self.messages {
            if m.role == Role::System {
                continue;
            }
            let image = m.image.as_ref().filter(|_| {
                seen_images += 1;
                seen_images > skip_images
            });
            let content = match image {
                Some(url) => MessageContent::Parts(vec![
                    ContentPart::ImageUrl { image_url: ImageUrl { url: url.clone() } },
                    ContentPart::Text { text: m.content.clone() },
                ]),
                None => MessageContent::Text(m.content.clone()),
            };
            out.push(ChatMessage { role: m.role.as_str().to_string(), content });
        }
        out
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_count(messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m.content, MessageContent::Parts(_)))
            .count()
    }

    #[test]
    fn notes_are_not_sent_to_the_model() {
        let mut s = Session::new();
        s.push_user("open settings", None);
        s.push_assistant("click(1,2)");
        s.push_note("Executed left click at (1, 2)");
        let chat = s.to_chat_messages(None);
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0].role, "user");
        assert_eq!(chat[1].role, "assistant");
    }

    #[test]
    fn only_recent_images_are_attached() {
        let mut s = Session::new();
        for i in 0..4 {
            s.push_user(format!("step {i}"), Some(format!("data:image/png;base64,{i}")));
            s.push_assistant("wait()");
        }
        assert_eq!(image_count(&s.to_chat_messages(None)), 4);

        let chat = s.to_chat_messages(Some(2));
        assert_eq!(chat.len(), 8);
        assert_eq!(image_count(&chat), 2);
        assert!(matches!(&chat[0].content, MessageContent::Text(t) if t == "step 0"));
        assert!(matches!(chat[6].content, MessageContent::Parts(_)));
    }

    #[test]
    fn clear_resets_messages_and_id() {
        let mut s = Session::new();
        let first = s.id().to_string();
        s.push_user("hi", None);
        s.clear();
        assert!(s.messages().is_empty());
        assert_ne!(s.id(), first);
    }

    #[tokio::test]
    async fn appends_are_published() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let mut s = Session::new().with_events(bus);
        s.push_note("ready");
        match rx.recv().await.unwrap() {
            AgentEvent::Message(m) => {
                assert_eq!(m.role, Role::System);
                assert_eq!(m.content, "ready");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
