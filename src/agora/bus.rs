//! Message routing for a single meeting.
//!
//! The [`MessageBus`] owns one FIFO queue per registered agent, the global
//! append-only history, and the set of live observers.
//!
//! ```text
//! publish(msg) ──► history.push(msg)          (always)
//!              ├─► Broadcast: every queue except the sender's
//!              ├─► Agent(id): queue[id]        (RoutingError if unregistered)
//!              └─► observers, in subscription order
//! ```
//!
//! Two locks are involved. `state` guards queues, history and the id sequence
//! and is only ever held for a single push/drain. `publish_order` is held for
//! the whole of a publish, including observer notification, so observers see
//! messages in exactly history order while `drain` never waits on an observer.
//!
//! # Example
//!
//! ```rust
//! use agora::bus::MessageBus;
//! use agora::message::MessageDraft;
//!
//! let bus = MessageBus::new("demo");
//! bus.register("alice");
//! bus.register("bob");
//!
//! bus.post(MessageDraft::broadcast("alice", "Long BTC?")).unwrap();
//!
//! assert_eq!(bus.drain("bob").len(), 1);
//! assert!(bus.drain("alice").is_empty());
//! assert_eq!(bus.history().len(), 1);
//! ```

use crate::agora::message::{Message, MessageDraft, MessageType, Recipient};
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Errors raised while composing or routing a message.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingError {
    /// The named recipient is not registered on this bus.
    UnknownRecipient { message_id: String, recipient: String },
    /// The message type and recipient do not fit together (e.g. a private
    /// broadcast).
    InvalidAddress {
        message_type: MessageType,
        recipient: Recipient,
    },
    /// `reply_to` names a message that is not in history.
    UnknownReplyTarget(String),
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::UnknownRecipient {
                message_id,
                recipient,
            } => write!(
                f,
                "Message {} addressed to unregistered recipient '{}'",
                message_id, recipient
            ),
            RoutingError::InvalidAddress {
                message_type,
                recipient,
            } => write!(
                f,
                "Message type {} cannot be addressed to '{}'",
                message_type, recipient
            ),
            RoutingError::UnknownReplyTarget(id) => {
                write!(f, "reply_to references unknown message '{}'", id)
            }
        }
    }
}

impl Error for RoutingError {}

/// A live listener notified of every message published after it subscribes.
///
/// Notification happens synchronously inside `publish`, while the bus holds
/// its publish lock. Implementations should hand the message off quickly and
/// must not publish on the same bus: calling `publish` or `post` from
/// `on_message` deadlocks. To react to a message by posting, use a
/// [`ChannelObserver`] and post from the receiving task.
pub trait BusObserver: Send + Sync {
    fn on_message(&self, message: &Message);
}

/// Handle returned by [`MessageBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Forwards every published message into a tokio unbounded channel.
///
/// ```rust
/// use agora::bus::{ChannelObserver, MessageBus};
/// use agora::message::MessageDraft;
/// use std::sync::Arc;
///
/// let bus = MessageBus::new("demo");
/// bus.register("a");
/// let (observer, mut rx) = ChannelObserver::new();
/// bus.subscribe(Arc::new(observer));
///
/// bus.post(MessageDraft::broadcast("a", "hello")).unwrap();
/// assert_eq!(rx.try_recv().unwrap().content(), "hello");
/// ```
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<Message>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl BusObserver for ChannelObserver {
    fn on_message(&self, message: &Message) {
        // A dropped receiver simply stops the stream.
        let _ = self.sender.send(message.clone());
    }
}

struct BusState {
    queues: HashMap<String, VecDeque<Message>>,
    history: Vec<Message>,
    next_seq: u64,
}

/// Routes messages between the agents of one meeting.
pub struct MessageBus {
    prefix: String,
    state: Mutex<BusState>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn BusObserver>)>>,
    next_observer: Mutex<u64>,
    publish_order: Mutex<()>,
}

/// Recover the guard even if another thread panicked while holding it; the bus
/// state is always left consistent between statements.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MessageBus {
    /// Create an empty bus. `prefix` is used to build message ids
    /// (`"<prefix>-<seq>"`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Mutex::new(BusState {
                queues: HashMap::new(),
                history: Vec::new(),
                next_seq: 1,
            }),
            observers: Mutex::new(Vec::new()),
            next_observer: Mutex::new(0),
            publish_order: Mutex::new(()),
        }
    }

    /// Register an agent queue. Registering twice keeps the existing queue.
    pub fn register(&self, agent_id: impl Into<String>) {
        let agent_id = agent_id.into();
        let mut state = lock(&self.state);
        if !state.queues.contains_key(&agent_id) {
            log::debug!("bus[{}]: registered '{}'", self.prefix, agent_id);
            state.queues.insert(agent_id, VecDeque::new());
        }
    }

    /// Drop an agent's queue. History entries are untouched.
    pub fn unregister(&self, agent_id: &str) {
        let mut state = lock(&self.state);
        if state.queues.remove(agent_id).is_some() {
            log::debug!("bus[{}]: unregistered '{}'", self.prefix, agent_id);
        }
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        lock(&self.state).queues.contains_key(agent_id)
    }

    /// Registered agent ids, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.state).queues.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Validate a draft and turn it into a [`Message`] with a fresh id.
    ///
    /// Checks that the type fits the recipient and that `reply_to`, when set,
    /// resolves to a message already in history. Recipient registration is
    /// checked later, at publish time, so the attempt is still recorded.
    pub fn compose(&self, draft: MessageDraft) -> Result<Message, RoutingError> {
        let type_fits = match draft.message_type {
            MessageType::Broadcast => draft.recipient.is_broadcast(),
            t if t.requires_agent_recipient() => !draft.recipient.is_broadcast(),
            _ => true,
        };
        if !type_fits {
            return Err(RoutingError::InvalidAddress {
                message_type: draft.message_type,
                recipient: draft.recipient,
            });
        }

        let mut state = lock(&self.state);
        if let Some(target) = &draft.reply_to {
            if !state.history.iter().any(|m| m.id() == target) {
                return Err(RoutingError::UnknownReplyTarget(target.clone()));
            }
        }
        let id = format!("{}-{}", self.prefix, state.next_seq);
        state.next_seq += 1;
        Ok(Message::from_draft(id, draft))
    }

    /// Append `message` to history, route it, then notify observers.
    ///
    /// The message is recorded in history even when routing fails.
    pub fn publish(&self, message: Message) -> Result<(), RoutingError> {
        let _order = lock(&self.publish_order);

        let routed = {
            let mut state = lock(&self.state);
            let routed = match message.recipient() {
                Recipient::Broadcast => {
                    for (agent_id, queue) in state.queues.iter_mut() {
                        if agent_id != message.sender_id() {
                            queue.push_back(message.clone());
                        }
                    }
                    Ok(())
                }
                Recipient::Agent(id) => match state.queues.get_mut(id) {
                    Some(queue) => {
                        queue.push_back(message.clone());
                        Ok(())
                    }
                    None => Err(RoutingError::UnknownRecipient {
                        message_id: message.id().to_string(),
                        recipient: id.clone(),
                    }),
                },
            };
            state.history.push(message.clone());
            routed
        };

        match &routed {
            Ok(()) => log::debug!(
                "bus[{}]: {} {} -> {}",
                self.prefix,
                message.id(),
                message.sender_id(),
                message.recipient()
            ),
            Err(e) => log::warn!("bus[{}]: {}", self.prefix, e),
        }

        let observers: Vec<Arc<dyn BusObserver>> = lock(&self.observers)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_message(&message);
        }

        routed
    }

    /// Compose and publish in one step, returning the published message.
    ///
    /// Composition errors publish nothing. Routing errors are returned after
    /// the message has been recorded in history.
    pub fn post(&self, draft: MessageDraft) -> Result<Message, RoutingError> {
        let message = self.compose(draft)?;
        self.publish(message.clone())?;
        Ok(message)
    }

    /// Atomically empty and return an agent's queue.
    pub fn drain(&self, agent_id: &str) -> Vec<Message> {
        let mut state = lock(&self.state);
        match state.queues.get_mut(agent_id) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Number of queued messages for an agent, without draining.
    pub fn pending(&self, agent_id: &str) -> usize {
        lock(&self.state)
            .queues
            .get(agent_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Start receiving every message published from now on.
    pub fn subscribe(&self, observer: Arc<dyn BusObserver>) -> ObserverId {
        let id = {
            let mut next = lock(&self.next_observer);
            *next += 1;
            ObserverId(*next)
        };
        lock(&self.observers).push((id, observer));
        id
    }

    /// Stop notifying an observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ObserverId) {
        lock(&self.observers).retain(|(observer_id, _)| *observer_id != id);
    }

    /// Snapshot of the full, authoritative history.
    pub fn history(&self) -> Vec<Message> {
        lock(&self.state).history.clone()
    }

    /// The last `n` messages of history, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let state = lock(&self.state);
        let start = state.history.len().saturating_sub(n);
        state.history[start..].to_vec()
    }

    /// History without `Private` messages.
    pub fn public_transcript(&self) -> Vec<Message> {
        lock(&self.state)
            .history
            .iter()
            .filter(|m| !m.is_private())
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.state).history.len()
    }
}
