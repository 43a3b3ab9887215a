//! Structured records produced by the extraction cascade.
//!
//! A [`Decision`] is the final, safety-checked outcome of a meeting. A
//! [`MessageIntent`] is the per-utterance classification the agent uses to
//! pick a message type. Both carry the [`Provenance`] of the strategy that
//! produced them.

use crate::agora::message::MessageType;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_MAGNITUDE: f64 = 100.0;
pub const MIN_LEVERAGE: u32 = 1;
pub const MAX_LEVERAGE: u32 = 20;
pub const MAX_CONFIDENCE: f64 = 100.0;

/// Which extraction strategy produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Structured,
    Delimited,
    Lexical,
    Default,
}

impl Provenance {
    /// Lexical and default records are salvaged from free text rather than
    /// stated in a schema.
    pub fn is_salvaged(&self) -> bool {
        matches!(self, Provenance::Lexical | Provenance::Default)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Structured => "structured",
            Provenance::Delimited => "delimited",
            Provenance::Lexical => "lexical",
            Provenance::Default => "default",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Hold,
}

impl Direction {
    /// Parse a direction word, accepting the usual aliases.
    ///
    /// ```rust
    /// use agora::decision::Direction;
    ///
    /// assert_eq!(Direction::from_alias("Bullish"), Some(Direction::Long));
    /// assert_eq!(Direction::from_alias(" sell "), Some(Direction::Short));
    /// assert_eq!(Direction::from_alias("close"), Some(Direction::Hold));
    /// assert_eq!(Direction::from_alias("moon"), None);
    /// ```
    pub fn from_alias(word: &str) -> Option<Direction> {
        match word.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" | "bullish" => Some(Direction::Long),
            "short" | "sell" | "bearish" => Some(Direction::Short),
            "hold" | "wait" | "neutral" | "close" | "none" => Some(Direction::Hold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Hold => "hold",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The synthesized outcome of a meeting.
///
/// Every `Decision` handed out by the extractor has passed through
/// [`Decision::sanitized`], so its ranges always hold:
/// magnitude in `0..=100`, leverage in `1..=20`, confidence in `0..=100`,
/// price levels positive and finite, and `Hold` carrying no size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub direction: Direction,
    /// Position size as percent of capital.
    pub magnitude: f64,
    pub leverage: u32,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    pub reasoning: String,
    pub provenance: Provenance,
}

impl Decision {
    /// Hold, no size, no confidence.
    pub fn neutral(reasoning: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            direction: Direction::Hold,
            magnitude: 0.0,
            leverage: MIN_LEVERAGE,
            confidence: 0.0,
            entry_price: None,
            take_profit: None,
            stop_loss: None,
            reasoning: reasoning.into(),
            provenance,
        }
    }

    /// Clamp every field into range.
    pub fn sanitized(mut self) -> Self {
        self.magnitude = clamp_finite(self.magnitude, 0.0, MAX_MAGNITUDE);
        self.leverage = self.leverage.clamp(MIN_LEVERAGE, MAX_LEVERAGE);
        self.confidence = clamp_finite(self.confidence, 0.0, MAX_CONFIDENCE);
        self.entry_price = positive(self.entry_price);
        self.take_profit = positive(self.take_profit);
        self.stop_loss = positive(self.stop_loss);
        if self.direction == Direction::Hold {
            self.magnitude = 0.0;
        }
        self
    }

    /// Risk gate applied before handing a decision to an execution venue.
    ///
    /// `Hold` and zero-size decisions are never actionable. Salvaged
    /// (lexical/default) decisions are refused when their magnitude exceeds
    /// `salvaged_magnitude_limit`.
    ///
    /// ```rust
    /// use agora::decision::{Decision, Direction, Provenance};
    ///
    /// let mut d = Decision::neutral("", Provenance::Lexical);
    /// d.direction = Direction::Long;
    /// d.magnitude = 40.0;
    /// assert!(!d.is_actionable(10.0));
    ///
    /// d.provenance = Provenance::Structured;
    /// assert!(d.is_actionable(10.0));
    /// ```
    pub fn is_actionable(&self, salvaged_magnitude_limit: f64) -> bool {
        if self.direction == Direction::Hold || self.magnitude <= 0.0 {
            return false;
        }
        !(self.provenance.is_salvaged() && self.magnitude > salvaged_magnitude_limit)
    }
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        min
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// What an utterance is doing, as far as message typing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Statement,
    Private,
    Question,
    Agreement,
    Disagreement,
}

impl IntentKind {
    pub fn from_alias(word: &str) -> Option<IntentKind> {
        match word.trim().to_ascii_lowercase().as_str() {
            "statement" | "inform" | "broadcast" => Some(IntentKind::Statement),
            "private" | "confidential" => Some(IntentKind::Private),
            "question" | "ask" => Some(IntentKind::Question),
            "agreement" | "agree" => Some(IntentKind::Agreement),
            "disagreement" | "disagree" => Some(IntentKind::Disagreement),
            _ => None,
        }
    }

    /// The message type this intent maps to. `Private` only applies to
    /// addressed utterances; `Statement` keeps the default type.
    pub fn message_type(&self, addressed: bool) -> Option<MessageType> {
        match self {
            IntentKind::Statement => None,
            IntentKind::Private if addressed => Some(MessageType::Private),
            IntentKind::Private => None,
            IntentKind::Question => Some(MessageType::Question),
            IntentKind::Agreement => Some(MessageType::Agreement),
            IntentKind::Disagreement => Some(MessageType::Disagreement),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MessageIntent {
    pub kind: IntentKind,
    /// In `0..=1`.
    pub confidence: f64,
    pub provenance: Provenance,
}

impl MessageIntent {
    pub fn statement(provenance: Provenance) -> Self {
        Self {
            kind: IntentKind::Statement,
            confidence: 0.0,
            provenance,
        }
    }

    pub fn sanitized(mut self) -> Self {
        self.confidence = clamp_finite(self.confidence, 0.0, 1.0);
        self
    }
}
