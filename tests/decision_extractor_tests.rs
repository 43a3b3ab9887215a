use agora::decision::{
    Decision, Direction, IntentKind, MessageIntent, Provenance, MAX_LEVERAGE,
};
use agora::decision_extractor::{DecisionExtractor, ExtractionInput, REASONING_LIMIT};
use serde_json::json;

fn final_decision(text: &str) -> Decision {
    DecisionExtractor::final_decision().extract(&ExtractionInput::text(text))
}

#[test]
fn test_same_stance_three_ways() {
    let extractor = DecisionExtractor::final_decision();
    let args = json!({"direction": "short", "magnitude": 5, "confidence": 0.8});

    let structured =
        extractor.extract(&ExtractionInput::text("see call").with_structured(&args));
    let delimited = extractor.extract(&ExtractionInput::text(
        "My view:\n```json\n{\"direction\": \"short\", \"magnitude\": 5, \"confidence\": 80}\n```",
    ));
    let lexical = extractor.extract(&ExtractionInput::text(
        "I would go short with 5% of the book, confidence 0.8.",
    ));

    assert_eq!(structured.direction, Direction::Short);
    assert_eq!(delimited.direction, Direction::Short);
    assert_eq!(lexical.direction, Direction::Short);
    assert_eq!(structured.provenance, Provenance::Structured);
    assert_eq!(delimited.provenance, Provenance::Delimited);
    assert_eq!(lexical.provenance, Provenance::Lexical);
    assert_eq!(structured.magnitude, 5.0);
    assert_eq!(delimited.magnitude, 5.0);
    assert_eq!(lexical.magnitude, 5.0);
    for d in [&structured, &delimited, &lexical] {
        assert!((d.confidence - 80.0).abs() < 1e-9, "confidence {}", d.confidence);
    }
}

#[test]
fn test_confidence_of_one_is_full() {
    let delimited = final_decision("```json\n{\"direction\": \"long\", \"confidence\": 1.0}\n```");
    assert_eq!(delimited.confidence, 100.0);

    let lexical = final_decision("Go long 2%, confidence 1");
    assert_eq!(lexical.confidence, 100.0);

    let percent = final_decision("Go long 2%, confidence 45");
    assert_eq!(percent.confidence, 45.0);
}

#[test]
fn test_long_unbalanced_text_falls_back_quickly() {
    let mut text = "{".repeat(40_000);
    text.push_str(" go long 2%");
    let started = std::time::Instant::now();
    let d = final_decision(&text);
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
    assert_eq!(d.provenance, Provenance::Lexical);
    assert_eq!(d.direction, Direction::Long);
}

#[test]
fn test_empty_input_is_neutral_default() {
    let d = final_decision("");
    assert_eq!(d.direction, Direction::Hold);
    assert_eq!(d.magnitude, 0.0);
    assert_eq!(d.confidence, 0.0);
    assert_eq!(d.provenance, Provenance::Default);
    assert_eq!(d.reasoning, "");

    let json = serde_json::to_value(&d).unwrap();
    assert_eq!(json["provenance"], "default");
    assert_eq!(json["direction"], "hold");
    assert!(json.get("stop_loss").is_none());
}

#[test]
fn test_default_reasoning_is_truncated() {
    let text = "markets ".repeat(100);
    let d = final_decision(&text);
    assert_eq!(d.provenance, Provenance::Default);
    assert_eq!(d.reasoning.chars().count(), REASONING_LIMIT);
}

#[test]
fn test_invalid_structured_call_falls_through() {
    let extractor = DecisionExtractor::final_decision();
    let bogus = json!({"direction": "sideways"});
    let d = extractor.extract(
        &ExtractionInput::text("Still bearish, sell 3%.").with_structured(&bogus),
    );
    assert_eq!(d.provenance, Provenance::Lexical);
    assert_eq!(d.direction, Direction::Short);
    assert_eq!(d.magnitude, 3.0);
}

#[test]
fn test_bare_object_in_prose() {
    let d = final_decision(
        r#"After the debate the call is {"final_decision": {"action": "buy", "size": 7, "leverage": 2, "stop_loss": 58000}} and we move on."#,
    );
    assert_eq!(d.provenance, Provenance::Delimited);
    assert_eq!(d.direction, Direction::Long);
    assert_eq!(d.magnitude, 7.0);
    assert_eq!(d.leverage, 2);
    assert_eq!(d.stop_loss, Some(58000.0));
}

#[test]
fn test_broken_block_then_lexical() {
    let d = final_decision("```json\n{\"direction\": \"long\",\n```\nAnyway, long 2% at 3x.");
    assert_eq!(d.provenance, Provenance::Lexical);
    assert_eq!(d.direction, Direction::Long);
    assert_eq!(d.magnitude, 2.0);
    assert_eq!(d.leverage, 3);
}

#[test]
fn test_results_are_sanitized() {
    let d = final_decision(
        "```json\n{\"direction\": \"long\", \"magnitude\": 400, \"leverage\": 125, \"confidence\": 300, \"entry_price\": -5}\n```",
    );
    assert_eq!(d.magnitude, 100.0);
    assert_eq!(d.leverage, MAX_LEVERAGE);
    assert_eq!(d.confidence, 100.0);
    assert_eq!(d.entry_price, None);

    let hold = final_decision("```json\n{\"direction\": \"hold\", \"magnitude\": 30}\n```");
    assert_eq!(hold.magnitude, 0.0);
}

#[test]
fn test_lexical_price_levels() {
    let d = final_decision(
        "Buy with entry at $64,000, take profit 70000, stop loss 61000, confidence: 80",
    );
    assert_eq!(d.direction, Direction::Long);
    assert_eq!(d.entry_price, Some(64000.0));
    assert_eq!(d.take_profit, Some(70000.0));
    assert_eq!(d.stop_loss, Some(61000.0));
    assert_eq!(d.confidence, 80.0);
}

#[test]
fn test_try_extract_stops_before_default() {
    let extractor = DecisionExtractor::final_decision();
    assert!(extractor
        .try_extract(&ExtractionInput::text("nothing to see"), Provenance::Lexical)
        .is_none());
    assert!(extractor
        .try_extract(&ExtractionInput::text("go long"), Provenance::Delimited)
        .is_none());
    assert_eq!(
        extractor
            .try_extract(&ExtractionInput::text("go long"), Provenance::Lexical)
            .map(|d| d.direction),
        Some(Direction::Long)
    );
}

#[test]
fn test_risk_gate() {
    let mut d = final_decision("long 25%");
    assert!(!d.is_actionable(10.0));
    d.provenance = Provenance::Delimited;
    assert!(d.is_actionable(10.0));

    let small = final_decision("long 5%");
    assert!(small.is_actionable(10.0));
    assert!(!final_decision("wait").is_actionable(10.0));
}

#[test]
fn test_intent_mode() {
    let extractor = DecisionExtractor::intent();

    let question = extractor.extract(&ExtractionInput::text("How big should we go?"));
    assert_eq!(question.kind, IntentKind::Question);
    assert_eq!(question.provenance, Provenance::Lexical);

    let statement = extractor.extract(&ExtractionInput::text("BTC is ranging."));
    assert_eq!(statement, MessageIntent::statement(Provenance::Default));

    let args = json!({"intent": "disagree"});
    let structured = extractor.extract(&ExtractionInput::text("").with_structured(&args));
    assert_eq!(structured.kind, IntentKind::Disagreement);
    assert_eq!(structured.confidence, 0.9);

    let labeled = extractor.extract(&ExtractionInput::text(
        r#"{"intent": "agreement", "confidence": 80}"#,
    ));
    assert_eq!(labeled.kind, IntentKind::Agreement);
    assert!((labeled.confidence - 0.8).abs() < 1e-9);
    assert_eq!(labeled.provenance, Provenance::Delimited);
}
