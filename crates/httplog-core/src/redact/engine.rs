use super::{MaskStrategy, RedactionNote, Rule};
use bytes::Bytes;
use serde_json::Value;

/// A body after redaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redacted {
    /// The bytes to log
    pub bytes: Bytes,
    /// What the engine did
    pub note: RedactionNote,
}

impl Redacted {
    fn unchanged(body: &Bytes, note: RedactionNote) -> Self {
        Self {
            bytes: body.clone(),
            note,
        }
    }
}

/// Media type without parameters, lowercased
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether the content type denotes a JSON body (`application/json`,
/// `text/json` or any `+json` suffix)
pub fn is_json_content(content_type: Option<&str>) -> bool {
    content_type.map(essence).is_some_and(|mime| {
        mime == "application/json" || mime == "text/json" || mime.ends_with("+json")
    })
}

/// Whether the content type denotes an url-encoded form
pub fn is_form_content(content_type: Option<&str>) -> bool {
    content_type
        .map(essence)
        .is_some_and(|mime| mime == "application/x-www-form-urlencoded")
}

/// Redact `body` according to `rules`, applied in order.
///
/// Bodies that are neither JSON nor url-encoded forms, and bodies that fail
/// to parse, are returned unchanged with a note saying why. When no rule
/// matches anything the original bytes are returned verbatim.
pub fn redact<'r>(
    body: &Bytes,
    content_type: Option<&str>,
    rules: impl IntoIterator<Item = &'r Rule>,
    mask_token: &str,
) -> Redacted {
    if is_json_content(content_type) {
        redact_json(body, rules, mask_token)
    } else if is_form_content(content_type) {
        redact_form(body, rules, mask_token)
    } else {
        Redacted::unchanged(body, RedactionNote::NotJson)
    }
}

fn redact_json<'r>(
    body: &Bytes,
    rules: impl IntoIterator<Item = &'r Rule>,
    mask_token: &str,
) -> Redacted {
    if body.is_empty() {
        return Redacted::unchanged(body, RedactionNote::Untouched);
    }

    let mut doc: Value = match serde_json::from_slice(body) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::debug!(error = %e, "body is not valid JSON, logging it unredacted");
            return Redacted::unchanged(body, RedactionNote::Unparseable);
        }
    };

    let matches: usize = rules
        .into_iter()
        .map(|rule| rule.path().apply(&mut doc, rule.strategy(), mask_token))
        .sum();

    if matches == 0 {
        return Redacted::unchanged(body, RedactionNote::Untouched);
    }

    let bytes = match serde_json::to_vec(&doc) {
        Ok(out) => Bytes::from(out),
        Err(e) => {
            // never fall back to the unmasked input
            tracing::warn!(error = %e, "failed to re-serialize redacted body");
            Bytes::copy_from_slice(mask_token.as_bytes())
        }
    };

    Redacted {
        bytes,
        note: RedactionNote::Masked { matches },
    }
}

/// Form fields are masked by rules addressing a single top-level member.
fn redact_form<'r>(
    body: &Bytes,
    rules: impl IntoIterator<Item = &'r Rule>,
    mask_token: &str,
) -> Redacted {
    let mut pairs: Vec<(String, String)> = match serde_urlencoded::from_bytes(body) {
        Ok(pairs) => pairs,
        Err(e) => {
            tracing::debug!(error = %e, "form body could not be decoded, logging it unredacted");
            return Redacted::unchanged(body, RedactionNote::Unparseable);
        }
    };

    let mut matches = 0;
    for rule in rules {
        let Some(name) = rule.path().top_level_member() else {
            continue;
        };

        match rule.strategy() {
            MaskStrategy::Remove => {
                let before = pairs.len();
                pairs.retain(|(key, _)| key != name);
                matches += before - pairs.len();
            }
            strategy => {
                for (_, value) in pairs.iter_mut().filter(|(key, _)| key == name) {
                    *value = mask_text(value, strategy, mask_token).unwrap_or_default();
                    matches += 1;
                }
            }
        }
    }

    if matches == 0 {
        return Redacted::unchanged(body, RedactionNote::Untouched);
    }

    let bytes = serde_urlencoded::to_string(&pairs)
        .map(Bytes::from)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to re-encode redacted form body");
            Bytes::copy_from_slice(mask_token.as_bytes())
        });

    Redacted {
        bytes,
        note: RedactionNote::Masked { matches },
    }
}

/// Mask a single text value. Returns `None` for [`MaskStrategy::Remove`].
pub fn mask_text(text: &str, strategy: MaskStrategy, mask_token: &str) -> Option<String> {
    match strategy {
        MaskStrategy::Full => Some(mask_token.to_string()),
        MaskStrategy::Partial { keep_last } => Some(keep_trailing(text, keep_last)),
        MaskStrategy::Remove => None,
    }
}

pub(super) fn mask_value(value: &mut Value, strategy: MaskStrategy, mask_token: &str) {
    match (strategy, &mut *value) {
        (MaskStrategy::Partial { keep_last }, Value::String(text)) => {
            *text = keep_trailing(text, keep_last);
        }
        _ => *value = Value::String(mask_token.to_string()),
    }
}

/// Star every character but the last `keep`; short strings are fully starred.
fn keep_trailing(text: &str, keep: usize) -> String {
    let count = text.chars().count();
    if count <= keep {
        return "*".repeat(count);
    }

    let hidden = count - keep;
    let mut out = "*".repeat(hidden);
    out.extend(text.chars().skip(hidden));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JSON: Option<&str> = Some("application/json");

    fn rules(specs: &[&str]) -> Vec<Rule> {
        specs.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn run(body: &str, content_type: Option<&str>, specs: &[&str]) -> Redacted {
        redact(
            &Bytes::copy_from_slice(body.as_bytes()),
            content_type,
            &rules(specs),
            "***",
        )
    }

    #[test]
    fn test_no_match_returns_input_verbatim() {
        let body = "{ \"z\": 1.50, \"a\": [1e3, \"x\"],\n  \"m\": {\"k\": null} }";
        let out = run(body, JSON, &["$.user.ssn", "$.a[9]"]);

        assert_eq!(&out.bytes[..], body.as_bytes());
        assert_eq!(out.note, RedactionNote::Untouched);
    }

    #[test]
    fn test_full_mask() {
        let out = run(r#"{"user":{"ssn":"123-45-6789"}}"#, JSON, &["$.user.ssn=full"]);
        let parsed: Value = serde_json::from_slice(&out.bytes).unwrap();

        assert_eq!(parsed, json!({"user": {"ssn": "***"}}));
        assert_eq!(out.note, RedactionNote::Masked { matches: 1 });
    }

    #[test]
    fn test_partial_keeps_last_characters() {
        let out = run(r#"{"card":"4111111111111111"}"#, JSON, &["$.card=partial:4"]);
        let parsed: Value = serde_json::from_slice(&out.bytes).unwrap();
        let card = parsed["card"].as_str().unwrap();

        assert!(card.ends_with("1111"));
        assert_eq!(&card[..12], "************");
    }

    #[test]
    fn test_partial_on_short_and_non_string_values() {
        let out = run(
            r#"{"pin":"12","n":12345,"flag":true}"#,
            JSON,
            &["$.pin=partial:4", "$.n=partial:2", "$.flag=partial:1"],
        );
        assert_eq!(
            String::from_utf8_lossy(&out.bytes),
            r#"{"pin":"**","n":"***","flag":"***"}"#
        );
    }

    #[test]
    fn test_untouched_fields_keep_order_and_number_text() {
        let out = run(
            r#"{"z":1.50,"secret":"s","a":10000000000000000000001,"e":1e3}"#,
            JSON,
            &["$.secret=remove"],
        );
        assert_eq!(
            String::from_utf8_lossy(&out.bytes),
            r#"{"z":1.50,"a":10000000000000000000001,"e":1e3}"#
        );
    }

    #[test]
    fn test_rules_apply_in_order() {
        // the second rule sees the first rule's output
        let out = run(
            r#"{"token":"abcdef"}"#,
            JSON,
            &["$.token=partial:2", "$.token=partial:1"],
        );
        assert_eq!(String::from_utf8_lossy(&out.bytes), r#"{"token":"*****f"}"#);
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        let out = run("plain text", Some("text/plain"), &["$.a"]);
        assert_eq!(&out.bytes[..], b"plain text");
        assert_eq!(out.note, RedactionNote::NotJson);

        let out = run(r#"{"a":1}"#, None, &["$.a"]);
        assert_eq!(out.note, RedactionNote::NotJson);
    }

    #[test]
    fn test_unparseable_json_is_unchanged() {
        let out = run(r#"{"password":"hunter2""#, JSON, &["$.password"]);
        assert_eq!(&out.bytes[..], br#"{"password":"hunter2""#);
        assert_eq!(out.note, RedactionNote::Unparseable);
    }

    #[test]
    fn test_json_content_type_variants() {
        assert!(is_json_content(Some("application/json; charset=utf-8")));
        assert!(is_json_content(Some("Application/Problem+JSON")));
        assert!(is_json_content(Some("text/json")));
        assert!(!is_json_content(Some("text/plain")));
        assert!(!is_json_content(None));
    }

    #[test]
    fn test_form_fields_are_masked() {
        let out = run(
            "user=ann&password=hunter2&card=4111111111111111&drop=1",
            Some("application/x-www-form-urlencoded"),
            &["$.password", "$.card=partial:4", "$.drop=remove", "$.nested.x"],
        );
        assert_eq!(
            String::from_utf8_lossy(&out.bytes),
            "user=ann&password=***&card=************1111"
        );
        assert_eq!(out.note, RedactionNote::Masked { matches: 3 });
    }

    #[test]
    fn test_empty_json_body() {
        let out = run("", JSON, &["$.a"]);
        assert!(out.bytes.is_empty());
        assert_eq!(out.note, RedactionNote::Untouched);
    }

    #[test]
    fn test_mask_text() {
        assert_eq!(mask_text("Bearer xyz", MaskStrategy::Full, "***").as_deref(), Some("***"));
        assert_eq!(
            mask_text("Bearer xyz", MaskStrategy::partial(3), "***").as_deref(),
            Some("*******xyz")
        );
        assert_eq!(mask_text("x", MaskStrategy::Remove, "***"), None);
    }
}
