//! Recovery of transactions from structured output that failed validation.
//!
//! Three strategies run in order and the first one that yields at least one
//! transaction wins:
//!
//! 1. [`strip_and_reparse`]: drop markdown fences, trim to the outermost
//!    object and parse it whole.
//! 2. [`balanced_segments`]: walk the `transactions` array counting braces
//!    and parse every object that closes before the text ends.
//! 3. [`regex_extract`]: pull fields out with per-field patterns, ignoring
//!    JSON well-formedness entirely.
//!
//! Statement metadata is always extracted separately by [`extract_metadata`].
//! Nothing in here panics or returns an error; the worst case is an empty
//! outcome with a diagnostic note.

use crate::normalizer::parse_amount;
use crate::schema::{non_blank, RawTransaction, StatementMetadata};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

static RE_CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z]*").unwrap());
static RE_TRUNCATION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\.{3}|…)\s*\[?\s*\(?\d+\s+more\s+(?:characters|chars|bytes)\)?\s*\]?|\[truncated\]")
        .unwrap()
});
static RE_TRANSACTIONS_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""transactions"\s*:\s*\["#).unwrap());

static RE_FIELD_DATE: Lazy<Regex> = Lazy::new(|| string_field("date"));
static RE_FIELD_DESCRIPTION: Lazy<Regex> = Lazy::new(|| string_field("description"));
static RE_FIELD_TYPE: Lazy<Regex> = Lazy::new(|| string_field("type"));
static RE_FIELD_CATEGORY: Lazy<Regex> = Lazy::new(|| string_field("category"));
static RE_FIELD_PAYEE: Lazy<Regex> = Lazy::new(|| string_field("payee"));
static RE_FIELD_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""amount"\s*:\s*(?:"(?P<quoted>[^"]*)"|(?P<bare>-?\d[\d,]*(?:\.\d+)?(?:[eE][+-]?\d+)?))"#)
        .unwrap()
});
static RE_FIELD_CONFIDENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""confidence"\s*:\s*"?(?P<value>-?\d*\.?\d+\s*%?)"?"#).unwrap());

static RE_META_ACCOUNT: Lazy<Regex> = Lazy::new(|| string_field("(?:accountNumber|account_number)"));
static RE_META_PERIOD: Lazy<Regex> =
    Lazy::new(|| string_field("(?:statementPeriod|statement_period)"));
static RE_META_BANK: Lazy<Regex> = Lazy::new(|| string_field("(?:bankName|bank_name)"));

/// `"key": "value"` with JSON string escapes allowed inside the value.
fn string_field(key: &str) -> Regex {
    Regex::new(&format!(r#""{}"\s*:\s*"(?P<value>(?:[^"\\]|\\.)*)""#, key)).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepairStrategy {
    StripAndReparse,
    BalancedSegments,
    RegexExtraction,
}

impl fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairStrategy::StripAndReparse => write!(f, "re-parsing the cleaned response"),
            RepairStrategy::BalancedSegments => write!(f, "recovering complete records before the cut-off"),
            RepairStrategy::RegexExtraction => write!(f, "pattern extraction"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub transactions: Vec<RawTransaction>,
    pub metadata: StatementMetadata,
    /// The strategy that produced the transactions; `None` when all failed.
    pub strategy: Option<RepairStrategy>,
    pub note: String,
}

impl RepairOutcome {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

type Strategy = fn(&str) -> Option<Vec<RawTransaction>>;

const STRATEGIES: [(RepairStrategy, Strategy); 3] = [
    (RepairStrategy::StripAndReparse, strip_and_reparse),
    (RepairStrategy::BalancedSegments, balanced_segments),
    (RepairStrategy::RegexExtraction, regex_extract),
];

/// Recover what can be recovered from a raw, possibly truncated response.
pub fn repair_response(raw: &str) -> RepairOutcome {
    let text = unescape_embedded(raw);
    let metadata = extract_metadata(&text);

    for (strategy, run) in STRATEGIES {
        match run(&text) {
            Some(transactions) => {
                let usable = transactions.iter().filter(|t| has_mandatory_fields(t)).count();
                info!(
                    "Recovered {} of {} record(s) by {}",
                    usable,
                    transactions.len(),
                    strategy
                );
                return RepairOutcome {
                    note: format!(
                        "Recovered {} transaction(s) from a malformed response by {}",
                        usable, strategy
                    ),
                    transactions,
                    metadata,
                    strategy: Some(strategy),
                };
            }
            None => debug!("Repair strategy '{}' recovered nothing", strategy),
        }
    }

    warn!(
        "No transactions recoverable from a {}-byte malformed response",
        raw.len()
    );
    RepairOutcome {
        transactions: Vec::new(),
        metadata,
        strategy: None,
        note: "The response could not be repaired and no transactions were recovered".to_string(),
    }
}

/// Strategy 1: remove code fences, trim to the outermost `{...}` and parse.
/// A bare top-level array of transactions is accepted too.
pub fn strip_and_reparse(raw: &str) -> Option<Vec<RawTransaction>> {
    let cleaned = RE_CODE_FENCE.replace_all(raw, "");
    let trimmed = cleaned.trim();

    let list = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<Value>>(trimmed).ok()?
    } else {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if end <= start {
            return None;
        }
        let value: Value = serde_json::from_str(&trimmed[start..=end]).ok()?;
        value.get("transactions")?.as_array()?.clone()
    };

    // Items of the wrong shape are kept as empty records so the normalizer
    // counts them as dropped.
    let mut parsed = 0usize;
    let records: Vec<RawTransaction> = list
        .into_iter()
        .map(|v| match serde_json::from_value::<RawTransaction>(v) {
            Ok(txn) => {
                parsed += 1;
                txn
            }
            Err(e) => {
                debug!("Unreadable transaction item: {}", e);
                RawTransaction::default()
            }
        })
        .collect();

    if parsed == 0 {
        None
    } else {
        Some(records)
    }
}

/// Strategy 2: brace-depth scan of the `transactions` array, keeping only
/// objects that close before the text (or a truncation marker) ends.
pub fn balanced_segments(raw: &str) -> Option<Vec<RawTransaction>> {
    let text = cut_at_truncation_marker(raw);
    let array_start = RE_TRANSACTIONS_ARRAY.find(text)?.end();

    let recovered = complete_objects(&text[array_start..])
        .into_iter()
        .filter_map(|segment| serde_json::from_str::<RawTransaction>(segment).ok())
        .filter(has_mandatory_fields)
        .collect();

    non_empty(recovered)
}

/// Strategy 3: field-by-field pattern extraction, one record per `{`.
pub fn regex_extract(raw: &str) -> Option<Vec<RawTransaction>> {
    let text = cut_at_truncation_marker(raw);

    let from_segments = |segments: Vec<&str>| -> Vec<RawTransaction> {
        segments
            .into_iter()
            .filter_map(record_from_fields)
            .filter(has_mandatory_fields)
            .collect()
    };

    let recovered = from_segments(record_segments(text));
    if !recovered.is_empty() {
        return Some(recovered);
    }
    // quotes too broken to track; fall back to a plain split
    non_empty(from_segments(text.split('{').collect()))
}

/// Metadata fields found anywhere in the raw text; first occurrence wins.
pub fn extract_metadata(raw: &str) -> StatementMetadata {
    StatementMetadata {
        bank_name: capture_string(&RE_META_BANK, raw),
        account_number: capture_string(&RE_META_ACCOUNT, raw),
        statement_period: capture_string(&RE_META_PERIOD, raw),
    }
}

/// A record must carry a date, a description and a numeric amount to be
/// worth keeping.
pub fn has_mandatory_fields(txn: &RawTransaction) -> bool {
    non_blank(txn.date.as_deref()).is_some()
        && non_blank(txn.description.as_deref()).is_some()
        && txn.amount.as_ref().and_then(parse_amount).is_some()
}

fn non_empty(transactions: Vec<RawTransaction>) -> Option<Vec<RawTransaction>> {
    if transactions.is_empty() {
        None
    } else {
        Some(transactions)
    }
}

fn cut_at_truncation_marker(text: &str) -> &str {
    match RE_TRUNCATION_MARKER.find(text) {
        Some(m) => {
            debug!("Truncation marker found at byte {}", m.start());
            &text[..m.start()]
        }
        None => text,
    }
}

/// Raw output embedded in an error message is often JSON-escaped.
fn unescape_embedded(raw: &str) -> Cow<'_, str> {
    if raw.contains(r#"\"transactions\""#) || raw.contains(r#"\"date\""#) {
        Cow::Owned(decode_one_escape_level(raw))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Undo exactly one level of JSON string escaping, so `\\\"` becomes `\"`
/// and stays inside its string. The input may be cut off anywhere, even in
/// the middle of an escape.
fn decode_one_escape_level(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next_if(char::is_ascii_hexdigit)).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => out.push(decoded),
                    _ => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Top-level `{...}` spans of `text` that balance to zero. Scanning stops at
/// the array's closing `]` or at the end of the text; an unterminated
/// trailing object is discarded.
fn complete_objects(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = None;

    for (pos, ch) in structural_chars(text) {
        match ch {
            '{' => {
                if depth == 0 {
                    start = Some(pos);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        segments.push(&text[s..=pos]);
                    }
                }
            }
            ']' if depth == 0 => break,
            _ => {}
        }
    }

    segments
}

/// Characters of `text` that sit outside JSON string literals, with their
/// byte offsets.
fn structural_chars(text: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut in_string = false;
    let mut escaped = false;

    text.char_indices().filter(move |&(_, ch)| {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            return false;
        }
        if ch == '"' {
            in_string = true;
            return false;
        }
        true
    })
}

/// Spans of `text` starting at each `{` found outside a string literal.
fn record_segments(text: &str) -> Vec<&str> {
    let starts: Vec<usize> = structural_chars(text)
        .filter(|&(_, ch)| ch == '{')
        .map(|(pos, _)| pos)
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            &text[start..end]
        })
        .collect()
}

fn record_from_fields(segment: &str) -> Option<RawTransaction> {
    let date = capture_string(&RE_FIELD_DATE, segment)?;

    let amount = RE_FIELD_AMOUNT.captures(segment).map(|caps| {
        if let Some(quoted) = caps.name("quoted") {
            Value::String(quoted.as_str().to_string())
        } else {
            let bare = caps
                .name("bare")
                .map(|m| m.as_str().trim_end_matches(','))
                .unwrap_or_default();
            serde_json::from_str::<Value>(bare).unwrap_or_else(|_| Value::String(bare.to_string()))
        }
    });

    let confidence = RE_FIELD_CONFIDENCE
        .captures(segment)
        .map(|caps| {
            let value = &caps["value"];
            if value.ends_with('%') {
                Value::String(value.to_string())
            } else {
                value.parse::<f64>().map(Value::from).unwrap_or_else(|_| Value::String(value.to_string()))
            }
        });

    Some(RawTransaction {
        date: Some(date),
        description: capture_string(&RE_FIELD_DESCRIPTION, segment),
        amount,
        kind: capture_string(&RE_FIELD_TYPE, segment),
        payee: capture_string(&RE_FIELD_PAYEE, segment),
        category: capture_string(&RE_FIELD_CATEGORY, segment),
        confidence,
    })
}

fn capture_string(re: &Regex, text: &str) -> Option<String> {
    let value = re.captures(text)?.name("value")?.as_str();
    let decoded = serde_json::from_str::<String>(&format!("\"{}\"", value))
        .unwrap_or_else(|_| value.to_string());
    non_blank(Some(&decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_COMPLETE: &str = r#"{"date":"2024-03-01","description":"Swiggy {order}","amount":250,"type":"debit"},{"date":"2024-03-02","description":"Salary","amount":"52,000.00","type":"credit"}"#;

    #[test]
    fn test_strip_and_reparse_handles_code_fences() {
        let raw = format!(
            "Here you go:\n```json\n{{\"bankName\":\"HDFC\",\"transactions\":[{}]}}\n```",
            TWO_COMPLETE
        );
        let out = repair_response(&raw);
        assert_eq!(out.strategy, Some(RepairStrategy::StripAndReparse));
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.metadata.bank_name.as_deref(), Some("HDFC"));
    }

    #[test]
    fn test_strip_and_reparse_accepts_bare_array() {
        let raw = format!("[{}]", TWO_COMPLETE);
        assert_eq!(strip_and_reparse(&raw).unwrap().len(), 2);
    }

    #[test]
    fn test_strip_and_reparse_empty_array_falls_through() {
        assert!(strip_and_reparse(r#"{"transactions": []}"#).is_none());
        let out = repair_response(r#"{"transactions": []}"#);
        assert!(out.is_empty());
        assert!(out.strategy.is_none());
    }

    #[test]
    fn test_truncated_mid_object_keeps_complete_records() {
        let raw = format!(
            r#"{{"accountNumber":"XXXX1234","transactions":[{},{{"date": "2024-0"#,
            TWO_COMPLETE
        );
        let out = repair_response(&raw);
        assert_eq!(out.strategy, Some(RepairStrategy::BalancedSegments));
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.transactions[0].description.as_deref(), Some("Swiggy {order}"));
        assert_eq!(out.transactions[1].description.as_deref(), Some("Salary"));
        assert_eq!(out.metadata.account_number.as_deref(), Some("XXXX1234"));
    }

    #[test]
    fn test_truncation_marker_cuts_text() {
        let raw = format!(
            r#"{{"transactions":[{},{{"date":"2024-03-03","description":"Uber ... 1234 more characters"#,
            TWO_COMPLETE
        );
        let out = balanced_segments(&raw).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_balanced_segments_drops_records_missing_fields() {
        let raw = r#"{"transactions":[{"date":"2024-03-01","amount":5},{"date":"2024-03-02","description":"Ola","amount":"abc"},{"date":"2024-03-03","description":"Metro","amount":40}"#;
        let out = balanced_segments(raw).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description.as_deref(), Some("Metro"));
    }

    #[test]
    fn test_regex_extraction_ignores_broken_json() {
        let raw = r#"{"transactions": [
            {"description": "Zomato" "date": "2024-03-15" "amount": 450.00, "type": "debit", "confidence": 0.9}
            {"date": "2024-03-16", "description": "Refund \"ZOMATO\"", "amount": "120", "type": "credit", "payee": "Zomato",}
        "#;
        let out = repair_response(raw);
        assert_eq!(out.strategy, Some(RepairStrategy::RegexExtraction));
        assert_eq!(out.transactions.len(), 2);

        let first = &out.transactions[0];
        assert_eq!(first.date.as_deref(), Some("2024-03-15"));
        assert_eq!(first.description.as_deref(), Some("Zomato"));
        assert_eq!(first.amount, Some(serde_json::json!(450.0)));
        assert_eq!(first.confidence, Some(serde_json::json!(0.9)));

        let second = &out.transactions[1];
        assert_eq!(second.description.as_deref(), Some("Refund \"ZOMATO\""));
        assert_eq!(second.payee.as_deref(), Some("Zomato"));
        assert_eq!(second.kind.as_deref(), Some("credit"));
    }

    #[test]
    fn test_escaped_payload_inside_error_message() {
        let raw = r#"Schema validation failed: Provided data: {\"bankName\": \"SBI\", \"transactions\": [{\"date\": \"2024-03-01\", \"description\": \"ATM\", \"amount\": 500, \"type\": \"debit\"}, {\"date\": \"2024"#;
        let out = repair_response(raw);
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.metadata.bank_name.as_deref(), Some("SBI"));
    }

    #[test]
    fn test_unreadable_items_are_kept_for_counting() {
        let raw = r#"{"transactions": [{"date": "2024-03-01", "description": "Uber", "amount": 220, "type": "debit"}, {"date": "2024-03-02", "description": 12345, "amount": 10}]"#;
        let out = repair_response(&format!("{}}}", raw));
        assert_eq!(out.strategy, Some(RepairStrategy::StripAndReparse));
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.transactions[1], RawTransaction::default());
        assert!(out.note.starts_with("Recovered 1 transaction"));
    }

    #[test]
    fn test_strip_and_reparse_with_only_unreadable_items_falls_through() {
        assert!(strip_and_reparse(r#"{"transactions": [{"date": 20240301}, "oops"]}"#).is_none());
    }

    #[test]
    fn test_escaped_quotes_inside_escaped_payload() {
        let raw = r#"Validation error, got: {\"transactions\": [{\"date\": \"2024-03-01\", \"description\": \"Pay \\\"ACME\\\" ltd\", \"amount\": 10, \"type\": \"debit\"}, {\"date\": \"2024-03-02\", \"description\": \"Uber\", \"amount\": 5, \"type\": \"debit\"}, {\"date\": \"2024-0"#;
        let out = repair_response(raw);
        assert_eq!(out.strategy, Some(RepairStrategy::BalancedSegments));
        let descriptions: Vec<Option<&str>> =
            out.transactions.iter().map(|t| t.description.as_deref()).collect();
        assert_eq!(descriptions, vec![Some("Pay \"ACME\" ltd"), Some("Uber")]);
    }

    #[test]
    fn test_decode_one_escape_level() {
        assert_eq!(decode_one_escape_level(r#"{\"a\": \"x\\\"y\"}"#), r#"{"a": "x\"y"}"#);
        assert_eq!(decode_one_escape_level(r"line\nnext ₹ \q"), "line\nnext ₹ \\q");
        assert_eq!(decode_one_escape_level(r"cut \u20"), r"cut \u20");
        assert_eq!(decode_one_escape_level("trailing \\"), "trailing \\");
    }

    #[test]
    fn test_regex_extraction_with_brace_in_description() {
        let raw = r#"{"transactions": [
            {"date": "2024-03-15" "description": "Swiggy {order 42}", "amount": 450, "type": "debit"}
            {"date": "2024-03-16", "description": "Ola", "amount": 90 "type": "debit", "confidence": "80%"}
        "#;
        let out = repair_response(raw);
        assert_eq!(out.strategy, Some(RepairStrategy::RegexExtraction));
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.transactions[0].description.as_deref(), Some("Swiggy {order 42}"));
        assert_eq!(out.transactions[0].amount, Some(serde_json::json!(450)));
        assert_eq!(out.transactions[1].confidence, Some(serde_json::json!("80%")));
    }

    #[test]
    fn test_garbage_never_panics() {
        let inputs = [
            "",
            "{",
            "}{",
            "\"transactions\": [",
            "\"transactions\": [{{{{",
            "not json at all",
            "{\"transactions\": [{\"date\": \"2024-03-01\", \"description\": \"é",
            "… 12 more characters",
        ];
        for input in inputs {
            let out = repair_response(input);
            assert!(out.transactions.is_empty(), "unexpected recovery from {:?}", input);
            assert!(!out.note.is_empty());
        }
    }

    #[test]
    fn test_metadata_extracted_even_without_transactions() {
        let meta = extract_metadata(
            r#"{"bankName": "HDFC Bank", "statementPeriod": "01/03/2024 - 31/03/2024", "account_number": " "}"#,
        );
        assert_eq!(meta.bank_name.as_deref(), Some("HDFC Bank"));
        assert_eq!(meta.statement_period.as_deref(), Some("01/03/2024 - 31/03/2024"));
        assert!(meta.account_number.is_none());
    }
}
