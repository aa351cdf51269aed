//! Tolerant JSON extraction from free-text backend replies.
//!
//! ## Why is extraction necessary?
//!
//! The backend is asked for a bare JSON object, but routinely answers with
//! something close to one instead:
//!
//! - `Sure! Here is the report: ```json { ... } ``` Let me know if ...`
//! - the object wrapped in a string literal: `'{ ... }'`
//! - literal `\n` sequences (or the malformed `/n`) sprinkled through values
//! - raw line breaks inside string values, which JSON forbids
//!
//! This module applies a fixed, ordered list of pure text transforms and
//! hands the result to `serde_json`. A parse is attempted before the first
//! transform and after each one; the first stage that yields a JSON object
//! wins. Well-formed input therefore comes back unchanged, and the more
//! destructive rewrites (escape normalisation) only run when needed.
//!
//! ## Stage Order
//!
//! 1. Strip Markdown code-fence markers
//! 2. Slice from the first `{` to the last `}`
//! 3. Replace literal `\n` and `/n` sequences with a space
//! 4. Replace raw line breaks and tabs inside string literals with a space
//! 5. Trim residual quote and whitespace characters at both ends
//!
//! Every stage is linear in the input length. Brace slicing is an explicit
//! index scan rather than a greedy regex, and the one regex used (fence
//! markers) runs on the `regex` crate's finite automata, so hostile input
//! cannot trigger backtracking blow-ups. No stage can panic: the extractor
//! either returns an object or [`ExtractError::MalformedResponse`].

use crate::error::ExtractError;
use crate::report::ValidatedReport;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

/// A single normalisation stage.
pub type Stage = fn(&str) -> Cow<'_, str>;

/// The normalisation pipeline, in application order.
pub const STAGES: [(&str, Stage); 5] = [
    ("strip_code_fences", strip_code_fences),
    ("slice_outer_braces", slice_outer_braces),
    ("normalize_escaped_newlines", normalize_escaped_newlines),
    ("flatten_raw_newlines_in_strings", flatten_raw_newlines_in_strings),
    ("trim_wrapping_quotes", trim_wrapping_quotes),
];

/// Recover a JSON object from a raw backend reply.
///
/// # Errors
/// [`ExtractError::MalformedResponse`] when no stage produces text that
/// parses as a JSON object. The detail carries the last parser message.
pub fn extract_report(raw: &str) -> Result<ValidatedReport, ExtractError> {
    let mut last_error = match try_parse(raw) {
        Ok(report) => return Ok(report),
        Err(e) => e,
    };

    let mut text: Cow<'_, str> = Cow::Borrowed(raw);
    for (name, stage) in STAGES {
        let next = stage(&text);
        if next == text {
            continue;
        }
        let next = next.into_owned();
        match try_parse(&next) {
            Ok(report) => {
                debug!("Extracted JSON object after stage '{}'", name);
                return Ok(report);
            }
            Err(e) => last_error = e,
        }
        text = Cow::Owned(next);
    }

    Err(ExtractError::MalformedResponse { detail: last_error })
}

fn try_parse(text: &str) -> Result<ValidatedReport, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => ValidatedReport::from_value(value)
            .ok_or_else(|| "top-level JSON value is not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

// ── Stage 1: Strip code-fence markers ───────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+\-]*").expect("static regex"));

/// Remove every triple-backtick marker, including an attached language tag.
pub fn strip_code_fences(input: &str) -> Cow<'_, str> {
    RE_FENCE.replace_all(input, "")
}

// ── Stage 2: Slice outer braces ─────────────────────────────────────────────

/// Keep the largest substring starting at the first `{` and ending at the
/// last `}`. Input without such a pair is returned unchanged.
pub fn slice_outer_braces(input: &str) -> Cow<'_, str> {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => Cow::Borrowed(&input[start..=end]),
        _ => Cow::Borrowed(input),
    }
}

// ── Stage 3: Normalise escaped newlines ─────────────────────────────────────

/// Replace the two-character sequences `\n` and `/n` with a single space.
pub fn normalize_escaped_newlines(input: &str) -> Cow<'_, str> {
    if !input.contains("\\n") && !input.contains("/n") {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.replace("\\n", " ").replace("/n", " "))
}

// ── Stage 4: Flatten raw line breaks inside strings ─────────────────────────

/// Replace `\r`, `\n` and `\t` characters that sit inside a JSON string
/// literal with a space. Characters outside strings are structural
/// whitespace and stay as they are.
pub fn flatten_raw_newlines_in_strings(input: &str) -> Cow<'_, str> {
    if !input.contains(['\n', '\r', '\t']) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in input.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' | '\r' | '\t' => out.push(' '),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    Cow::Owned(out)
}

// ── Stage 5: Trim wrapping quotes ───────────────────────────────────────────

/// Strip leading and trailing `'`, `"` and whitespace characters.
pub fn trim_wrapping_quotes(input: &str) -> Cow<'_, str> {
    Cow::Borrowed(input.trim_matches(|c: char| c == '\'' || c == '"' || c.is_whitespace()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(raw: &str) -> Value {
        extract_report(raw).expect("should extract").into_value()
    }

    #[test]
    fn well_formed_object_unchanged() {
        let raw = r#"{"a":"line one\nline two","b":[1,2]}"#;
        assert_eq!(extract(raw), json!({"a": "line one\nline two", "b": [1, 2]}));
    }

    #[test]
    fn prose_and_fences_removed() {
        let raw = "Sure! ```json\n{\"a\":1}\n```";
        assert_eq!(extract(raw), json!({"a": 1}));
    }

    #[test]
    fn trailing_commentary_removed() {
        let raw = "Here you go:\n{\"risk\": \"Red\"}\nLet me know if you need more.";
        assert_eq!(extract(raw), json!({"risk": "Red"}));
    }

    #[test]
    fn escaped_newlines_between_tokens() {
        let raw = "{\\n  \"a\": \"x\",/n  \"b\": 2\\n}";
        assert_eq!(extract(raw), json!({"a": "x", "b": 2}));
    }

    #[test]
    fn slash_n_left_alone_when_valid() {
        let raw = "{\"c\": \"and/nor\"}";
        assert_eq!(extract(raw), json!({"c": "and/nor"}));
    }

    #[test]
    fn single_quoted_wrapper_sliced() {
        let raw = "'{\"comments\": \"first\\nsecond\"}'";
        assert_eq!(extract(raw), json!({"comments": "first\nsecond"}));

        // `\q` is not a JSON escape and no stage repairs it.
        let raw = "'{\"comments\": \"first\\nsecond\", \"x\": \"a\\q\"}'";
        assert!(extract_report(raw).is_err());
    }

    #[test]
    fn raw_newline_inside_value_parses() {
        let raw = "{\"notes_and_warnings\": \"check the\nbill of exchange\"}";
        assert_eq!(
            extract(raw),
            json!({"notes_and_warnings": "check the bill of exchange"})
        );
    }

    #[test]
    fn quoted_wrapper_removed() {
        let raw = "\"{\\\"a\\\": 1}\"";
        // A JSON string containing an object is not an object.
        assert!(extract_report(raw).is_err());

        let raw = "'  {\"a\": 1}  '";
        assert_eq!(extract(raw), json!({"a": 1}));
    }

    #[test]
    fn garbage_is_malformed() {
        for raw in ["", "no json here", "{", "}", "} {", "```", "[1, 2, 3]", "null", "{\"a\":}"] {
            let err = extract_report(raw).unwrap_err();
            assert!(
                matches!(err, ExtractError::MalformedResponse { .. }),
                "input {raw:?}"
            );
        }
    }

    #[test]
    fn never_panics_on_awkward_input() {
        let inputs = [
            "{\u{1F600}}",
            "\u{FEFF}{\"a\":\"é\"}",
            "{\"a\":\"\\",
            "\"\\\n",
            "{{{{{{{{{{",
            "}}}}}}}}}}{{{{{",
            "```json```json```",
            "/n/n/n\\n\\n",
            "{\"a\":\"\u{0}\"}",
        ];
        for raw in inputs {
            let _ = extract_report(raw);
        }
        let long = "{".repeat(10_000) + &"}".repeat(10_000);
        assert!(extract_report(&long).is_err());
    }

    #[test]
    fn full_report_shape() {
        let raw = r#"Here is the verification report:

```json
{
  "invoice": {
    "extracted_details": {"invoice_number": "INV-1"},
    "validation_status": "pass",
    "errors": [],
    "comments": "Amounts match.",
    "stamp_present": true,
    "signature_present": false
  },
  "final_summary": {
    "overall_risk_rating": "Green",
    "key_discrepancies": [],
    "notes_and_warnings": "None."
  }
}
```"#;
        let report = extract_report(raw).unwrap();
        assert_eq!(report.risk_rating(), Some(crate::report::RiskRating::Green));
    }

    // ── individual stages ────────────────────────────────────────────────

    #[test]
    fn stage_strip_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "\n{}\n");
        assert_eq!(strip_code_fences("```JSON5{}```"), "{}");
        assert!(matches!(strip_code_fences("{}"), Cow::Borrowed(_)));
    }

    #[test]
    fn stage_slice_braces() {
        assert_eq!(slice_outer_braces("x {a} y {b} z"), "{a} y {b}");
        assert_eq!(slice_outer_braces("} nothing {"), "} nothing {");
        assert_eq!(slice_outer_braces("plain"), "plain");
    }

    #[test]
    fn stage_escaped_newlines() {
        assert_eq!(normalize_escaped_newlines(r"a\nb/nc"), "a b c");
        assert!(matches!(normalize_escaped_newlines("abc"), Cow::Borrowed(_)));
    }

    #[test]
    fn stage_flatten_only_inside_strings() {
        let input = "{\n  \"a\": \"x\ny\",\n  \"b\": \"q\\\"\tz\"\n}";
        let expected = "{\n  \"a\": \"x y\",\n  \"b\": \"q\\\" z\"\n}";
        assert_eq!(flatten_raw_newlines_in_strings(input), expected);
    }

    #[test]
    fn stage_trim_quotes() {
        assert_eq!(trim_wrapping_quotes(" '\"{}\"' \n"), "{}");
    }
}
