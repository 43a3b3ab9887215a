//! When a meeting stops.
//!
//! A [`TerminationPolicy`] is evaluated at every turn boundary. Several
//! conditions may hold at once; the meeting stops either way and the fixed
//! priority `max_turns > max_duration > custom` only decides which
//! [`TerminationCause`] is reported.
//!
//! # Example
//!
//! ```rust
//! use agora::termination::{CustomPredicate, TerminationCause, TerminationPolicy};
//! use std::time::Duration;
//!
//! let policy = TerminationPolicy::new()
//!     .with_max_turns(12)
//!     .with_max_duration(Duration::from_secs(300))
//!     .with_custom(CustomPredicate::agreement_consensus(3));
//!
//! assert!(policy.validate().is_ok());
//! assert_eq!(
//!     policy.evaluate(12, Duration::from_secs(1), &[]),
//!     Some(TerminationCause::MaxTurns)
//! );
//! ```

use crate::agora::message::{Message, MessageType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a meeting stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    MaxTurns,
    MaxDuration,
    CustomPredicate,
    /// With require-stimulus, a full rotation found nobody with pending
    /// messages.
    Quiescent,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationCause::MaxTurns => "max_turns",
            TerminationCause::MaxDuration => "max_duration",
            TerminationCause::CustomPredicate => "custom_predicate",
            TerminationCause::Quiescent => "quiescent",
        };
        f.write_str(s)
    }
}

type PredicateFn = Arc<dyn Fn(&[Message]) -> bool + Send + Sync>;

/// A user-supplied stop condition over the most recent slice of history.
#[derive(Clone)]
pub struct CustomPredicate {
    name: String,
    window: usize,
    predicate: PredicateFn,
}

impl CustomPredicate {
    /// `predicate` receives at most the last `window` messages of history.
    pub fn new<F>(name: impl Into<String>, window: usize, predicate: F) -> Self
    where
        F: Fn(&[Message]) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            window: window.max(1),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn check(&self, recent: &[Message]) -> bool {
        let start = recent.len().saturating_sub(self.window);
        (self.predicate)(&recent[start..])
    }

    /// True once the last `k` messages are all `Agreement`.
    pub fn agreement_consensus(k: usize) -> Self {
        let k = k.max(1);
        Self::new("agreement_consensus", k, move |recent| {
            recent.len() >= k
                && recent
                    .iter()
                    .all(|m| m.message_type() == MessageType::Agreement)
        })
    }

    /// True when speakers stop changing their minds: for every sender with two
    /// conversational messages in the window, the word-overlap (Jaccard)
    /// similarity of their last two is averaged, and the mean must reach
    /// `threshold`.
    pub fn converged(window: usize, threshold: f32) -> Self {
        Self::new("converged", window, move |recent| {
            convergence_score(recent).map_or(false, |score| score >= threshold)
        })
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("name", &self.name)
            .field("window", &self.window)
            .finish()
    }
}

/// Mean Jaccard similarity of each sender's last two messages, if any sender
/// spoke twice.
pub fn convergence_score(messages: &[Message]) -> Option<f32> {
    let mut by_sender: HashMap<&str, Vec<&str>> = HashMap::new();
    for m in messages.iter().filter(|m| !m.message_type().is_tool_traffic()) {
        by_sender.entry(m.sender_id()).or_default().push(m.content());
    }

    let scores: Vec<f32> = by_sender
        .values()
        .filter(|said| said.len() >= 2)
        .map(|said| jaccard_similarity(said[said.len() - 2], said[said.len() - 1]))
        .collect();

    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f32>() / scores.len() as f32)
    }
}

/// Calculate Jaccard similarity between two texts based on normalised word sets.
///
/// Words shorter than 3 characters are ignored to reduce noise from articles
/// and prepositions. Returns `1.0` when both texts are empty, `0.0` when only
/// one is.
pub fn jaccard_similarity(text1: &str, text2: &str) -> f32 {
    let words1 = word_set(text1);
    let words2 = word_set(text2);

    if words1.is_empty() && words2.is_empty() {
        return 1.0;
    }
    if words1.is_empty() || words2.is_empty() {
        return 0.0;
    }

    let intersection = words1.intersection(&words2).count();
    let union = words1.union(&words2).count();
    intersection as f32 / union as f32
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 2)
        .collect()
}

/// Stop conditions for a meeting. At least one of `max_turns` and
/// `max_duration` must be set.
#[derive(Debug, Clone, Default)]
pub struct TerminationPolicy {
    pub max_turns: Option<usize>,
    pub max_duration: Option<Duration>,
    pub custom: Option<CustomPredicate>,
}

impl TerminationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn with_custom(mut self, predicate: CustomPredicate) -> Self {
        self.custom = Some(predicate);
        self
    }

    /// Reject policies that could never stop, or that stop before starting.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_turns.is_none() && self.max_duration.is_none() {
            return Err("termination policy needs max_turns or max_duration".to_string());
        }
        if self.max_turns == Some(0) {
            return Err("max_turns must be greater than zero".to_string());
        }
        if self.max_duration == Some(Duration::ZERO) {
            return Err("max_duration must be greater than zero".to_string());
        }
        Ok(())
    }

    /// The highest-priority condition that holds, if any.
    ///
    /// `recent` should be the tail of history; the custom predicate sees at
    /// most its configured window of it.
    pub fn evaluate(
        &self,
        turn: usize,
        elapsed: Duration,
        recent: &[Message],
    ) -> Option<TerminationCause> {
        if self.max_turns.map_or(false, |max| turn >= max) {
            return Some(TerminationCause::MaxTurns);
        }
        if self.max_duration.map_or(false, |max| elapsed >= max) {
            return Some(TerminationCause::MaxDuration);
        }
        if self.custom.as_ref().map_or(false, |c| c.check(recent)) {
            return Some(TerminationCause::CustomPredicate);
        }
        None
    }

    /// How much history the custom predicate needs.
    pub fn window(&self) -> usize {
        self.custom.as_ref().map_or(0, |c| c.window())
    }
}
