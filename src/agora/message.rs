//! Addressed messages exchanged during a meeting.
//!
//! A [`Message`] is created only by the [`MessageBus`](crate::bus::MessageBus)
//! from a [`MessageDraft`]. The bus assigns the id, stamps the creation time and
//! checks that the addressing is coherent before the message exists, so every
//! `Message` in the system is already valid.
//!
//! # Example
//!
//! ```rust
//! use agora::message::{MessageDraft, MessageType, Recipient};
//!
//! let draft = MessageDraft::direct("analyst", "trader", "What is your entry?")
//!     .with_type(MessageType::Question)
//!     .with_metadata("turn", "3");
//!
//! assert_eq!(draft.recipient, Recipient::Agent("trader".into()));
//! assert_eq!(draft.message_type, MessageType::Question);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Who a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// Every registered agent except the sender.
    Broadcast,
    /// A single named agent.
    Agent(String),
}

impl Recipient {
    /// Shorthand for `Recipient::Agent`.
    pub fn agent(id: impl Into<String>) -> Self {
        Recipient::Agent(id.into())
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Recipient::Broadcast)
    }

    /// The addressed agent id, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Recipient::Broadcast => None,
            Recipient::Agent(id) => Some(id),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Broadcast => write!(f, "all"),
            Recipient::Agent(id) => write!(f, "{}", id),
        }
    }
}

/// The semantic kind of a message.
///
/// Only the recipient decides routing. `Question`, `Agreement` and
/// `Disagreement` exist so summaries can count stance-taking without
/// re-reading content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    Broadcast,
    Direct,
    Private,
    Question,
    Agreement,
    Disagreement,
    ToolCall,
    ToolResult,
}

impl MessageType {
    /// Whether the type only makes sense with a named recipient.
    pub fn requires_agent_recipient(&self) -> bool {
        matches!(self, MessageType::Direct | MessageType::Private)
    }

    /// Whether the type expresses a position on the discussion.
    pub fn is_stance(&self) -> bool {
        matches!(self, MessageType::Agreement | MessageType::Disagreement)
    }

    /// Tool traffic is not conversational content.
    pub fn is_tool_traffic(&self) -> bool {
        matches!(self, MessageType::ToolCall | MessageType::ToolResult)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Broadcast => "Broadcast",
            MessageType::Direct => "Direct",
            MessageType::Private => "Private",
            MessageType::Question => "Question",
            MessageType::Agreement => "Agreement",
            MessageType::Disagreement => "Disagreement",
            MessageType::ToolCall => "ToolCall",
            MessageType::ToolResult => "ToolResult",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unpublished message. Turned into a [`Message`] by
/// [`MessageBus::compose`](crate::bus::MessageBus::compose).
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub sender_id: String,
    pub recipient: Recipient,
    pub content: String,
    pub message_type: MessageType,
    pub metadata: HashMap<String, String>,
    pub reply_to: Option<String>,
}

impl MessageDraft {
    /// A `Broadcast` draft addressed to every other agent.
    pub fn broadcast(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient: Recipient::Broadcast,
            content: content.into(),
            message_type: MessageType::Broadcast,
            metadata: HashMap::new(),
            reply_to: None,
        }
    }

    /// A `Direct` draft addressed to one agent.
    pub fn direct(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient: Recipient::Agent(recipient_id.into()),
            content: content.into(),
            message_type: MessageType::Direct,
            metadata: HashMap::new(),
            reply_to: None,
        }
    }

    /// A `Private` draft addressed to one agent.
    pub fn private(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::direct(sender_id, recipient_id, content).with_type(MessageType::Private)
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }
}

/// A published (or attempted) unit of communication.
///
/// All fields except `metadata` are fixed at construction and exposed through
/// accessors only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    sender_id: String,
    recipient: Recipient,
    content: String,
    #[serde(rename = "type")]
    message_type: MessageType,
    /// Free-form annotations. The agent loop uses `"intent_provenance"`,
    /// `"tools"` and `"structured_call"`.
    pub metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
    reply_to: Option<String>,
}

impl Message {
    /// Build a message from an already-validated draft. Only the bus calls this.
    pub(crate) fn from_draft(id: String, draft: MessageDraft) -> Self {
        Self {
            id,
            sender_id: draft.sender_id,
            recipient: draft.recipient,
            content: draft.content,
            message_type: draft.message_type,
            metadata: draft.metadata,
            created_at: Utc::now(),
            reply_to: draft.reply_to,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn recipient(&self) -> &Recipient {
        &self.recipient
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn is_private(&self) -> bool {
        self.message_type == MessageType::Private
    }

    /// Whether `agent_id` would find this message in its queue.
    pub fn is_visible_to(&self, agent_id: &str) -> bool {
        match &self.recipient {
            Recipient::Broadcast => self.sender_id != agent_id,
            Recipient::Agent(id) => id == agent_id,
        }
    }

    /// Single-line rendering used in prompts and logs.
    pub fn render(&self) -> String {
        format!(
            "[{} -> {}] ({}): {}",
            self.sender_id, self.recipient, self.message_type, self.content
        )
    }
}
