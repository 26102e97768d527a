//! Constrained prompt construction and reply parsing.
//!
//! The reasoner is asked for a single JSON object and nothing else.
//! Models decorate their answers anyway, so parsing scans for the first
//! balanced object rather than trusting the reply to be bare JSON.

use warden_contracts::FailureClass;

use crate::{Deliberation, ReasonError, ReasonHints};

/// Builds the deliberation prompt for one payload.
///
/// The candidate classes from the earlier tiers are listed explicitly;
/// constraining the answer space is what keeps reply parsing reliable.
pub fn build_prompt(text: &str, hints: &ReasonHints) -> String {
    let mut candidates: Vec<&str> = hints.candidates.iter().map(|c| c.as_str()).collect();
    if candidates.is_empty() {
        candidates = FailureClass::ALL.iter().map(|c| c.as_str()).collect();
    }

    let mut prompt = String::with_capacity(text.len() + 512);
    prompt.push_str(
        "You are a content-safety analyst. Inspect the text between the \
         markers and classify it.\n\n",
    );
    prompt.push_str("Candidate classes: ");
    prompt.push_str(&candidates.join(", "));
    prompt.push_str(", none\n");
    if !hints.tentative.is_silent() {
        prompt.push_str(&format!(
            "An earlier screening stage suspected '{}' at confidence {:.2}.\n",
            hints.tentative.failure_class, hints.tentative.confidence
        ));
    }
    prompt.push_str(
        "\nAnswer with exactly one JSON object, no prose:\n\
         {\"class\": \"<class>\", \"action\": \"block|warn|allow\", \
         \"confidence\": <0..1>, \"rationale\": \"<one sentence>\"}\n\n",
    );
    prompt.push_str("<<<TEXT\n");
    prompt.push_str(text);
    prompt.push_str("\nTEXT>>>\n");
    prompt
}

/// Extracts and validates the structured deliberation from a raw reply.
pub fn parse_deliberation(raw: &str) -> Result<Deliberation, ReasonError> {
    let object = first_json_object(raw)
        .ok_or_else(|| ReasonError::Parse("no JSON object in reply".to_string()))?;
    let deliberation: Deliberation = serde_json::from_str(object)
        .map_err(|e| ReasonError::Parse(format!("malformed deliberation: {e}")))?;
    if !(0.0..=1.0).contains(&deliberation.confidence) {
        return Err(ReasonError::Parse(format!(
            "confidence {} outside [0, 1]",
            deliberation.confidence
        )));
    }
    Ok(deliberation)
}

/// The first balanced `{...}` object in `raw`, ignoring braces inside
/// string literals.
fn first_json_object(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use warden_contracts::{Action, Escalation};

    fn hints_with_candidates() -> ReasonHints {
        ReasonHints {
            candidates: vec![FailureClass::PromptInjection, FailureClass::Overconfidence],
            tentative: Escalation {
                failure_class: FailureClass::PromptInjection,
                confidence: 0.66,
                tentative_action: Action::Block,
                method: "semantic".to_string(),
                tier: 2,
            },
            context: HashMap::new(),
        }
    }

    #[test]
    fn test_prompt_lists_candidates_and_tentative() {
        let prompt = build_prompt("suspicious text", &hints_with_candidates());
        assert!(prompt.contains("prompt_injection, overconfidence"));
        assert!(prompt.contains("0.66"));
        assert!(prompt.contains("<<<TEXT\nsuspicious text\nTEXT>>>"));
    }

    #[test]
    fn test_parse_bare_object() {
        let d = parse_deliberation(
            r#"{"class":"prompt_injection","action":"block","confidence":0.8,"rationale":"x"}"#,
        )
        .unwrap();
        assert_eq!(d.class, FailureClass::PromptInjection);
        assert_eq!(d.action, Action::Block);
    }

    #[test]
    fn test_parse_object_wrapped_in_prose() {
        let raw = "Sure! Here is my analysis:\n\
                   {\"class\": \"none\", \"action\": \"allow\", \"confidence\": 0.95, \
                   \"rationale\": \"benign {braces} in a string\"}\nHope that helps.";
        let d = parse_deliberation(raw).unwrap();
        assert_eq!(d.class, FailureClass::None);
        assert!((d.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_missing_object() {
        assert!(matches!(
            parse_deliberation("I refuse to answer in JSON."),
            Err(ReasonError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_class() {
        let raw = r#"{"class":"novel_attack","action":"block","confidence":0.9,"rationale":"x"}"#;
        assert!(parse_deliberation(raw).is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range_confidence() {
        let raw = r#"{"class":"none","action":"allow","confidence":1.2,"rationale":"x"}"#;
        assert!(parse_deliberation(raw).is_err());
    }

    #[test]
    fn test_empty_candidates_fall_back_to_full_taxonomy() {
        let hints = ReasonHints {
            candidates: Vec::new(),
            tentative: Escalation::empty(1, "pattern_weak"),
            context: HashMap::new(),
        };
        let prompt = build_prompt("text", &hints);
        assert!(prompt.contains("fabricated_concept"));
    }
}
