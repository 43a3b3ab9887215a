//! Turns free-form agent output into validated records.
//!
//! Extraction never fails. A [`DecisionExtractor`] runs a fixed, ordered
//! cascade of pure strategies and stops at the first one that yields a record:
//!
//! ```text
//! structured ──► delimited ──► lexical ──► default
//!   (call)      (```json / {…})  (keywords)   (always)
//! ```
//!
//! The same driver serves two schemas through [`ExtractionTarget`]:
//! [`Decision`] for the meeting's final synthesis and [`MessageIntent`] for
//! classifying each utterance before it is published.
//!
//! # Example
//!
//! ```rust
//! use agora::decision::{Direction, Provenance};
//! use agora::decision_extractor::{DecisionExtractor, ExtractionInput};
//!
//! let extractor = DecisionExtractor::final_decision();
//!
//! let block = "Summary:\n```json\n{\"direction\": \"long\", \"magnitude\": 5}\n```";
//! let d = extractor.extract(&ExtractionInput::text(block));
//! assert_eq!(d.direction, Direction::Long);
//! assert_eq!(d.provenance, Provenance::Delimited);
//!
//! let prose = extractor.extract(&ExtractionInput::text("We should go long with 5% at 3x."));
//! assert_eq!(prose.direction, Direction::Long);
//! assert_eq!(prose.leverage, 3);
//! assert_eq!(prose.provenance, Provenance::Lexical);
//!
//! let empty = extractor.extract(&ExtractionInput::text(""));
//! assert_eq!(empty.provenance, Provenance::Default);
//! ```

use crate::agora::decision::{
    Decision, Direction, IntentKind, MessageIntent, Provenance, MIN_LEVERAGE,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

/// Longest reasoning text carried by a salvaged record, in characters.
pub const REASONING_LIMIT: usize = 280;

/// Confidence assigned to a structured intent that does not state one.
const STRUCTURED_INTENT_CONFIDENCE: f64 = 0.9;

lazy_static! {
    static ref FENCE: Regex = Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").unwrap();
    static ref DIRECTION_WORD: Regex =
        Regex::new(r"(?i)\b(long|buy|bullish|short|sell|bearish|hold|wait|neutral)\b").unwrap();
    static ref NEGATION: Regex = Regex::new(
        r"(?i)\b(not|no|never|avoid|against|don't|dont|won't|wouldn't|shouldn't|isn't|aren't)\s+(?:\w+\s+){0,2}$"
    )
    .unwrap();
    static ref CONFIDENCE_AFTER: Regex = Regex::new(
        r"(?i)\bconfiden(?:ce|t)\b\s*(?:level|score)?\s*(?:of|:|=|is|at|around)?\s*(\d+(?:\.\d+)?)\s*%?"
    )
    .unwrap();
    static ref CONFIDENCE_BEFORE: Regex =
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*confiden(?:ce|t)\b").unwrap();
    static ref PERCENT: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s*%").unwrap();
    static ref LEVERAGE_SUFFIX: Regex = Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*x\b").unwrap();
    static ref LEVERAGE_WORD: Regex =
        Regex::new(r"(?i)\bleverage\s*(?:of|:|=|at)?\s*(\d+(?:\.\d+)?)").unwrap();
    static ref ENTRY: Regex = Regex::new(
        r"(?i)\bentry(?:\s+price)?\s*(?:at|of|:|=|@|around|near)?\s*\$?(\d[\d,]*(?:\.\d+)?)"
    )
    .unwrap();
    static ref TAKE_PROFIT: Regex = Regex::new(
        r"(?i)\b(?:take[\s-]?profit|tp|target)\s*(?:at|of|:|=|@|around|near)?\s*\$?(\d[\d,]*(?:\.\d+)?)"
    )
    .unwrap();
    static ref STOP_LOSS: Regex = Regex::new(
        r"(?i)\b(?:stop[\s-]?loss|stop|sl)\s*(?:at|of|:|=|@|around|near)?\s*\$?(\d[\d,]*(?:\.\d+)?)"
    )
    .unwrap();
    static ref PRIVATE_MARKER: Regex =
        Regex::new(r"(?i)\bprivately\b|\bin confidence\b|\[private\]|\bbetween us\b").unwrap();
    static ref DISAGREEMENT_MARKER: Regex = Regex::new(
        r"(?i)\bi disagree\b|\bi (?:don't|don’t|do not) agree\b|\bi object\b|\bnot convinced\b|\bpush back\b"
    )
    .unwrap();
    static ref AGREEMENT_MARKER: Regex = Regex::new(
        r"(?i)\bi agree\b|\bagreed\b|\bi concur\b|\+1|\bi support\b|\baligned with\b"
    )
    .unwrap();
    static ref LEADING_INTERROGATIVE: Regex = Regex::new(
        r"(?i)^\s*(?:@[\w.-]+[:,]?\s*)?(?:who|what|when|where|why|how|which|should|could|would|can|do|does|did|is|are|will)\b"
    )
    .unwrap();
}

/// Why a single strategy declined. Absorbed by the cascade and only logged.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionParseError {
    NoStructuredInput,
    NoDelimitedBlock,
    InvalidJson(String),
    MissingField(&'static str),
    InvalidField { field: &'static str, value: String },
    NoMatch,
}

impl fmt::Display for DecisionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionParseError::NoStructuredInput => write!(f, "no structured call"),
            DecisionParseError::NoDelimitedBlock => write!(f, "no parseable delimited block"),
            DecisionParseError::InvalidJson(msg) => write!(f, "invalid JSON: {}", msg),
            DecisionParseError::MissingField(field) => write!(f, "missing field '{}'", field),
            DecisionParseError::InvalidField { field, value } => {
                write!(f, "invalid value '{}' for '{}'", value, field)
            }
            DecisionParseError::NoMatch => write!(f, "no lexical match"),
        }
    }
}

impl Error for DecisionParseError {}

/// What the cascade looks at.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub text: &'a str,
    /// Arguments of an explicit structured call, if the speaker made one.
    pub structured: Option<&'a JsonValue>,
}

impl<'a> ExtractionInput<'a> {
    pub fn text(text: &'a str) -> Self {
        Self {
            text,
            structured: None,
        }
    }

    pub fn with_structured(mut self, structured: &'a JsonValue) -> Self {
        self.structured = Some(structured);
        self
    }
}

/// A schema the cascade can produce.
pub trait ExtractionTarget: Sized {
    /// Build from a JSON object (structured call or delimited block).
    fn from_fields(
        fields: &JsonValue,
        text: &str,
        provenance: Provenance,
    ) -> Result<Self, DecisionParseError>;

    /// Salvage from prose.
    fn lexical(text: &str) -> Result<Self, DecisionParseError>;

    /// Terminal fallback. Must not fail.
    fn neutral(text: &str) -> Self;

    /// Clamp into the schema's ranges.
    fn sanitize(self) -> Self;

    fn provenance(&self) -> Provenance;
}

type Strategy<T> = fn(&ExtractionInput<'_>) -> Result<T, DecisionParseError>;

/// Ordered cascade of extraction strategies with a guaranteed default.
pub struct DecisionExtractor<T> {
    strategies: Vec<(Provenance, Strategy<T>)>,
    _target: PhantomData<fn() -> T>,
}

impl<T: ExtractionTarget> DecisionExtractor<T> {
    pub fn new() -> Self {
        Self {
            strategies: vec![
                (Provenance::Structured, structured_strategy::<T> as Strategy<T>),
                (Provenance::Delimited, delimited_strategy::<T> as Strategy<T>),
                (Provenance::Lexical, lexical_strategy::<T> as Strategy<T>),
            ],
            _target: PhantomData,
        }
    }

    /// Run the cascade. Always returns a sanitized record.
    pub fn extract(&self, input: &ExtractionInput<'_>) -> T {
        for (provenance, strategy) in &self.strategies {
            match strategy(input) {
                Ok(record) => {
                    log::debug!("extraction matched via {}", provenance);
                    return record.sanitize();
                }
                Err(e) => log::debug!("extraction: {} declined ({})", provenance, e),
            }
        }
        log::debug!("extraction fell through to default");
        T::neutral(input.text).sanitize()
    }

    /// Run only the strategies up to and including `last`, without the
    /// terminal default. `None` if none matched.
    pub fn try_extract(&self, input: &ExtractionInput<'_>, last: Provenance) -> Option<T> {
        for (provenance, strategy) in &self.strategies {
            if let Ok(record) = strategy(input) {
                return Some(record.sanitize());
            }
            if *provenance == last {
                break;
            }
        }
        None
    }
}

impl<T: ExtractionTarget> Default for DecisionExtractor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionExtractor<Decision> {
    /// Final-decision mode.
    pub fn final_decision() -> Self {
        Self::new()
    }
}

impl DecisionExtractor<MessageIntent> {
    /// Intent mode.
    pub fn intent() -> Self {
        Self::new()
    }
}

fn structured_strategy<T: ExtractionTarget>(
    input: &ExtractionInput<'_>,
) -> Result<T, DecisionParseError> {
    let fields = input
        .structured
        .ok_or(DecisionParseError::NoStructuredInput)?;
    T::from_fields(fields, input.text, Provenance::Structured)
}

fn delimited_strategy<T: ExtractionTarget>(
    input: &ExtractionInput<'_>,
) -> Result<T, DecisionParseError> {
    let mut last_error = DecisionParseError::NoDelimitedBlock;

    for caps in FENCE.captures_iter(input.text) {
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        match parse_object(body).and_then(|v| T::from_fields(&v, input.text, Provenance::Delimited))
        {
            Ok(record) => return Ok(record),
            Err(e) => last_error = e,
        }
    }

    for candidate in balanced_objects(input.text) {
        match parse_object(candidate.text)
            .and_then(|v| T::from_fields(&v, input.text, Provenance::Delimited))
        {
            Ok(record) => return Ok(record),
            Err(e) => {
                log::debug!("object at byte {} rejected: {}", candidate.start, e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

fn lexical_strategy<T: ExtractionTarget>(
    input: &ExtractionInput<'_>,
) -> Result<T, DecisionParseError> {
    T::lexical(input.text)
}

fn parse_object(text: &str) -> Result<JsonValue, DecisionParseError> {
    let value: JsonValue =
        serde_json::from_str(text).map_err(|e| DecisionParseError::InvalidJson(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(DecisionParseError::InvalidJson("not an object".to_string()))
    }
}

/// A `{...}` fragment located in a larger text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BalancedObject<'a> {
    pub text: &'a str,
    /// Byte offset of the opening brace.
    pub start: usize,
}

/// Bytes of a response searched for embedded objects.
const MAX_SCAN_BYTES: usize = 64 * 1024;

/// Objects nested deeper than this are not reported; serde_json rejects them anyway.
const MAX_OBJECT_DEPTH: usize = 128;

/// Every brace-balanced `{...}` in `text`, ordered by start offset, so an
/// enclosing object comes before the objects nested in it. Braces inside
/// JSON string literals are ignored and unmatched braces are skipped.
///
/// One pass over at most [`MAX_SCAN_BYTES`] of the text.
pub(crate) fn balanced_objects(text: &str) -> Vec<BalancedObject<'_>> {
    let mut limit = text.len().min(MAX_SCAN_BYTES);
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    let scanned = &text[..limit];

    let mut open: Vec<usize> = Vec::new();
    let mut found = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in scanned.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(idx),
            '}' => {
                if let Some(start) = open.pop() {
                    if open.len() < MAX_OBJECT_DEPTH {
                        found.push((start, &scanned[start..=idx]));
                    }
                }
            }
            _ => {}
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found
        .into_iter()
        .map(|(start, text)| BalancedObject { text, start })
        .collect()
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn field<'a>(fields: &'a JsonValue, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .find(|v| !v.is_null())
}

/// Read a number, tolerating strings like `"5%"`, `"3x"` or `"$1,200"`.
fn number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_end_matches(['%', 'x', 'X'])
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.trim().parse().ok()
        }
        _ => None,
    }
}

fn number_field(
    fields: &JsonValue,
    keys: &[&str],
    name: &'static str,
) -> Result<Option<f64>, DecisionParseError> {
    match field(fields, keys) {
        None => Ok(None),
        Some(v) => number(v)
            .map(Some)
            .ok_or_else(|| DecisionParseError::InvalidField {
                field: name,
                value: v.to_string(),
            }),
    }
}

fn capture_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Magnitude used when a direction is known but no size was stated.
fn default_magnitude(direction: Direction) -> f64 {
    match direction {
        Direction::Hold => 0.0,
        Direction::Long | Direction::Short => 1.0,
    }
}

const DEFAULT_CONFIDENCE: f64 = 50.0;

/// Decision confidence is a percentage; values up to 1.0 are fractions of it.
fn percent_confidence(confidence: f64) -> f64 {
    if confidence > 0.0 && confidence <= 1.0 {
        confidence * 100.0
    } else {
        confidence
    }
}

impl ExtractionTarget for Decision {
    fn from_fields(
        fields: &JsonValue,
        text: &str,
        provenance: Provenance,
    ) -> Result<Self, DecisionParseError> {
        let fields = field(fields, &["final_decision", "decision"])
            .filter(|v| v.is_object())
            .unwrap_or(fields);

        let raw_direction = field(fields, &["direction", "action", "stance", "side", "position"])
            .ok_or(DecisionParseError::MissingField("direction"))?;
        let direction = raw_direction
            .as_str()
            .and_then(Direction::from_alias)
            .ok_or_else(|| DecisionParseError::InvalidField {
                field: "direction",
                value: raw_direction.to_string(),
            })?;

        let magnitude = number_field(
            fields,
            &["magnitude", "size", "position_size", "allocation", "percent"],
            "magnitude",
        )?
        .unwrap_or_else(|| default_magnitude(direction));

        let leverage = number_field(fields, &["leverage"], "leverage")?
            .map(|l| l.round().max(0.0) as u32)
            .unwrap_or(MIN_LEVERAGE);

        let confidence = number_field(fields, &["confidence"], "confidence")?
            .map(percent_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);

        let reasoning = field(fields, &["reasoning", "rationale", "reason", "thesis"])
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| truncate_chars(text.trim(), REASONING_LIMIT));

        Ok(Decision {
            direction,
            magnitude,
            leverage,
            confidence,
            entry_price: number_field(fields, &["entry_price", "entry"], "entry_price")?,
            take_profit: number_field(fields, &["take_profit", "tp", "target"], "take_profit")?,
            stop_loss: number_field(fields, &["stop_loss", "sl", "stop"], "stop_loss")?,
            reasoning,
            provenance,
        })
    }

    fn lexical(text: &str) -> Result<Self, DecisionParseError> {
        let direction = lexical_direction(text).ok_or(DecisionParseError::NoMatch)?;

        let confidence_spans: Vec<Range<usize>> = CONFIDENCE_AFTER
            .find_iter(text)
            .chain(CONFIDENCE_BEFORE.find_iter(text))
            .map(|m| m.range())
            .collect();
        let confidence = capture_number(&CONFIDENCE_BEFORE, text)
            .or_else(|| capture_number(&CONFIDENCE_AFTER, text))
            .map(percent_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);

        let magnitude = PERCENT
            .captures_iter(text)
            .filter(|c| {
                let whole = c.get(0).map(|m| m.range()).unwrap_or(0..0);
                !confidence_spans
                    .iter()
                    .any(|span| span.start < whole.end && whole.start < span.end)
            })
            .find_map(|c| c.get(1).and_then(|m| m.as_str().parse::<f64>().ok()))
            .unwrap_or_else(|| default_magnitude(direction));

        let leverage = capture_number(&LEVERAGE_SUFFIX, text)
            .or_else(|| capture_number(&LEVERAGE_WORD, text))
            .map(|l| l.round().max(0.0) as u32)
            .unwrap_or(MIN_LEVERAGE);

        Ok(Decision {
            direction,
            magnitude,
            leverage,
            confidence,
            entry_price: capture_number(&ENTRY, text),
            take_profit: capture_number(&TAKE_PROFIT, text),
            stop_loss: capture_number(&STOP_LOSS, text),
            reasoning: truncate_chars(text.trim(), REASONING_LIMIT),
            provenance: Provenance::Lexical,
        })
    }

    fn neutral(text: &str) -> Self {
        Decision::neutral(truncate_chars(text.trim(), REASONING_LIMIT), Provenance::Default)
    }

    fn sanitize(self) -> Self {
        self.sanitized()
    }

    fn provenance(&self) -> Provenance {
        self.provenance
    }
}

/// Count non-negated direction keywords. Equal long/short evidence is a Hold.
fn lexical_direction(text: &str) -> Option<Direction> {
    let (mut long, mut short, mut hold) = (0usize, 0usize, 0usize);

    for m in DIRECTION_WORD.find_iter(text) {
        if NEGATION.is_match(&text[..m.start()]) {
            continue;
        }
        match Direction::from_alias(m.as_str()) {
            Some(Direction::Long) => long += 1,
            Some(Direction::Short) => short += 1,
            Some(Direction::Hold) => hold += 1,
            None => {}
        }
    }

    if long > short {
        Some(Direction::Long)
    } else if short > long {
        Some(Direction::Short)
    } else if long > 0 || hold > 0 {
        Some(Direction::Hold)
    } else {
        None
    }
}

impl ExtractionTarget for MessageIntent {
    fn from_fields(
        fields: &JsonValue,
        _text: &str,
        provenance: Provenance,
    ) -> Result<Self, DecisionParseError> {
        let raw = field(fields, &["intent", "kind", "message_type"])
            .ok_or(DecisionParseError::MissingField("intent"))?;
        let kind = raw
            .as_str()
            .and_then(IntentKind::from_alias)
            .ok_or_else(|| DecisionParseError::InvalidField {
                field: "intent",
                value: raw.to_string(),
            })?;
        let confidence = match number_field(fields, &["confidence"], "confidence")? {
            Some(c) if c > 1.0 => c / 100.0,
            Some(c) => c,
            None => STRUCTURED_INTENT_CONFIDENCE,
        };
        Ok(MessageIntent {
            kind,
            confidence,
            provenance,
        })
    }

    fn lexical(text: &str) -> Result<Self, DecisionParseError> {
        let (kind, confidence) = if PRIVATE_MARKER.is_match(text) {
            (IntentKind::Private, 0.8)
        } else if DISAGREEMENT_MARKER.is_match(text) {
            (IntentKind::Disagreement, 0.75)
        } else if AGREEMENT_MARKER.is_match(text) {
            (IntentKind::Agreement, 0.75)
        } else if text.trim_end().ends_with('?') || LEADING_INTERROGATIVE.is_match(text) {
            (IntentKind::Question, 0.7)
        } else {
            return Err(DecisionParseError::NoMatch);
        };
        Ok(MessageIntent {
            kind,
            confidence,
            provenance: Provenance::Lexical,
        })
    }

    fn neutral(_text: &str) -> Self {
        MessageIntent::statement(Provenance::Default)
    }

    fn sanitize(self) -> Self {
        self.sanitized()
    }

    fn provenance(&self) -> Provenance {
        self.provenance
    }
}
