//! Extraction response parsing
//!
//! The extractor returns a JSON array of candidate memories, sometimes
//! wrapped in a markdown fence. Non-arrays are malformed; individual
//! candidates that violate the type/confidence/priority invariants are
//! dropped, not propagated. Invalid memory types are dropped by default; a
//! lenient flag coerces them to `context` when every other field is valid.

use serde_json::Value;

use crate::error::{CortexError, Result};
use crate::model::{MemoryType, Scope};

/// A validated extraction candidate, not yet a memory
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub content: String,
    pub summary: String,
    pub memory_type: MemoryType,
    pub scope: Scope,
    pub confidence: f64,
    pub priority: i64,
    pub tags: Vec<String>,
}

/// Parse outcome: surviving candidates plus how many were dropped
#[derive(Debug, Clone, Default)]
pub struct ParsedCandidates {
    pub candidates: Vec<Candidate>,
    pub dropped: usize,
}

/// Strip a markdown fence if present, returning the inner payload.
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.rfind("```").map(|end| &body[..end]).unwrap_or(body).trim()
}

/// Parse the extractor's response into candidates.
///
/// `global_min_confidence` enforces the scope rule: global-scope candidates
/// below it are demoted to project scope rather than dropped.
pub fn parse_extraction_response(
    raw: &str,
    lenient_types: bool,
    global_min_confidence: f64,
) -> Result<ParsedCandidates> {
    let payload = strip_fence(raw);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| CortexError::MalformedResponse(format!("extractor output: {e}")))?;

    let Value::Array(items) = value else {
        return Err(CortexError::MalformedResponse(
            "extractor output is not a JSON array".into(),
        ));
    };

    let mut parsed = ParsedCandidates::default();
    for item in items {
        match parse_candidate(&item, lenient_types, global_min_confidence) {
            Some(candidate) => parsed.candidates.push(candidate),
            None => parsed.dropped += 1,
        }
    }
    Ok(parsed)
}

fn parse_candidate(
    item: &Value,
    lenient_types: bool,
    global_min_confidence: f64,
) -> Option<Candidate> {
    let object = item.as_object()?;

    let content = object.get("content")?.as_str()?.trim().to_string();
    let summary = object.get("summary")?.as_str()?.trim().to_string();
    if content.is_empty() || summary.is_empty() {
        return None;
    }

    let confidence = object.get("confidence")?.as_f64()?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }

    let priority = object.get("priority")?.as_i64()?;
    if !(1..=10).contains(&priority) {
        return None;
    }

    let memory_type = match object
        .get("type")
        .and_then(Value::as_str)
        .map(str::parse::<MemoryType>)
    {
        Some(Ok(memory_type)) => memory_type,
        // Unknown or missing type: coerce only under the lenient flag, and
        // only now that every other field has validated
        _ if lenient_types => MemoryType::Context,
        _ => return None,
    };

    let mut scope = match object.get("scope").and_then(Value::as_str) {
        Some(raw) => raw.parse::<Scope>().ok()?,
        None => Scope::Project,
    };
    if scope == Scope::Global && confidence <= global_min_confidence {
        scope = Scope::Project;
    }

    let tags = coerce_tags(object.get("tags"));

    Some(Candidate {
        content,
        summary,
        memory_type,
        scope,
        confidence,
        priority,
        tags,
    })
}

/// Coerce a tags value to a list of strings: scalars are stringified,
/// composites dropped, non-arrays ignored.
fn coerce_tags(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLOBAL_MIN: f64 = 0.8;

    fn candidate_json(memory_type: &str, confidence: f64, priority: i64) -> String {
        format!(
            r#"{{"content":"body","summary":"short","type":"{memory_type}","confidence":{confidence},"priority":{priority}}}"#
        )
    }

    #[test]
    fn test_raw_array_parses() {
        let raw = format!("[{}]", candidate_json("gotcha", 0.9, 5));
        let parsed = parse_extraction_response(&raw, false, GLOBAL_MIN).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.candidates[0].memory_type, MemoryType::Gotcha);
    }

    #[test]
    fn test_fenced_array_parses() {
        let raw = format!("```json\n[{}]\n```", candidate_json("pattern", 0.7, 3));
        let parsed = parse_extraction_response(&raw, false, GLOBAL_MIN).unwrap();
        assert_eq!(parsed.candidates.len(), 1);

        let bare_fence = format!("```\n[{}]\n```", candidate_json("pattern", 0.7, 3));
        assert_eq!(
            parse_extraction_response(&bare_fence, false, GLOBAL_MIN)
                .unwrap()
                .candidates
                .len(),
            1
        );
    }

    #[test]
    fn test_non_array_is_malformed() {
        assert!(matches!(
            parse_extraction_response("{\"not\":\"array\"}", false, GLOBAL_MIN),
            Err(CortexError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_extraction_response("not json at all", false, GLOBAL_MIN),
            Err(CortexError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_invalid_fields_dropped() {
        let raw = format!(
            "[{},{},{},{}]",
            candidate_json("gotcha", 1.5, 5),   // confidence out of range
            candidate_json("gotcha", 0.9, 0),   // priority out of range
            candidate_json("gotcha", 0.9, 5),   // valid
            r#"{"content":"","summary":"s","type":"gotcha","confidence":0.5,"priority":5}"#,
        );
        let parsed = parse_extraction_response(&raw, false, GLOBAL_MIN).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.dropped, 3);
    }

    #[test]
    fn test_unknown_type_strict_drops_lenient_coerces() {
        let raw = format!("[{}]", candidate_json("weird_type", 0.9, 5));

        let strict = parse_extraction_response(&raw, false, GLOBAL_MIN).unwrap();
        assert!(strict.candidates.is_empty());
        assert_eq!(strict.dropped, 1);

        let lenient = parse_extraction_response(&raw, true, GLOBAL_MIN).unwrap();
        assert_eq!(lenient.candidates.len(), 1);
        assert_eq!(lenient.candidates[0].memory_type, MemoryType::Context);
    }

    #[test]
    fn test_lenient_coercion_requires_other_fields_valid() {
        // Bad priority blocks coercion even in lenient mode
        let raw = format!("[{}]", candidate_json("weird_type", 0.9, 99));
        let lenient = parse_extraction_response(&raw, true, GLOBAL_MIN).unwrap();
        assert!(lenient.candidates.is_empty());
        assert_eq!(lenient.dropped, 1);
    }

    #[test]
    fn test_global_scope_demoted_below_threshold() {
        let raw = r#"[
            {"content":"a","summary":"a","type":"decision","confidence":0.9,"priority":5,"scope":"global"},
            {"content":"b","summary":"b","type":"decision","confidence":0.6,"priority":5,"scope":"global"}
        ]"#;
        let parsed = parse_extraction_response(raw, false, GLOBAL_MIN).unwrap();
        assert_eq!(parsed.candidates[0].scope, Scope::Global);
        assert_eq!(parsed.candidates[1].scope, Scope::Project);
    }

    #[test]
    fn test_tags_coercion() {
        let raw = r#"[{"content":"a","summary":"a","type":"context","confidence":0.5,"priority":5,
                       "tags":["x",3,true,{"nested":1},null]}]"#;
        let parsed = parse_extraction_response(raw, false, GLOBAL_MIN).unwrap();
        assert_eq!(parsed.candidates[0].tags, vec!["x", "3", "true"]);

        let raw = r#"[{"content":"a","summary":"a","type":"context","confidence":0.5,"priority":5,
                       "tags":"not-a-list"}]"#;
        let parsed = parse_extraction_response(raw, false, GLOBAL_MIN).unwrap();
        assert!(parsed.candidates[0].tags.is_empty());
    }

    #[test]
    fn test_priority_must_be_integer() {
        let raw = r#"[{"content":"a","summary":"a","type":"context","confidence":0.5,"priority":5.5}]"#;
        let parsed = parse_extraction_response(raw, false, GLOBAL_MIN).unwrap();
        assert!(parsed.candidates.is_empty());
        assert_eq!(parsed.dropped, 1);
    }
}
