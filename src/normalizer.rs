use crate::categorize::{categorize, infer_payee};
use crate::config::{ImportConfig, UnknownDirectionPolicy};
use crate::schema::{non_blank, CandidateTransaction, Direction, RawTransaction};
use chrono::{Datelike, NaiveDate};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const PLACEHOLDER_DESCRIPTION: &str = "Unknown transaction";

const CREDIT_WORDS: &[&str] = &[
    "credit", "cr", "c", "deposit", "income", "refund", "received", "inflow", "incoming",
    "credited", "reversal", "cashback",
];
const DEBIT_WORDS: &[&str] = &[
    "debit", "dr", "d", "withdrawal", "expense", "purchase", "spent", "outflow", "outgoing",
    "debited", "charge", "fee",
];

const FULL_YEAR_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d %b %Y", "%d-%b-%Y",
    "%d %B %Y", "%b %d, %Y", "%B %d, %Y",
];
const SHORT_YEAR_FORMATS: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d.%m.%y", "%d %b %y", "%d-%b-%y"];

static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<open>[-(])?\s*(?:₹|\$|rs\.?|inr)?\s*(?P<minus>-)?\s*(?P<num>\d[\d,]*(?:\.\d+)?|\.\d+)\s*\)?\s*(?P<marker>dr|cr)?\.?\s*$",
    )
    .unwrap()
});
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Where a raw record came from. Repaired records get a lower default
/// confidence so their provenance stays visible downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Structured,
    Repaired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub transaction: CandidateTransaction,
    /// The direction came from the unknown-direction policy, not the data.
    pub direction_assumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedAmount {
    pub magnitude: f64,
    /// Direction implied by a sign or a Dr/Cr marker on the amount itself.
    pub direction_hint: Option<Direction>,
}

pub fn parse_amount(value: &Value) -> Option<ParsedAmount> {
    match value {
        Value::Number(n) => {
            let v = n.as_f64()?;
            if !v.is_finite() {
                return None;
            }
            Some(ParsedAmount {
                magnitude: v.abs(),
                direction_hint: (v < 0.0).then_some(Direction::Debit),
            })
        }
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

pub fn parse_amount_str(s: &str) -> Option<ParsedAmount> {
    let caps = RE_AMOUNT.captures(s)?;
    let magnitude: f64 = caps["num"].replace(',', "").parse().ok()?;
    if !magnitude.is_finite() {
        return None;
    }

    let negative = caps.name("open").is_some() || caps.name("minus").is_some();
    let direction_hint = match caps.name("marker").map(|m| m.as_str().to_ascii_lowercase()) {
        Some(m) if m == "cr" => Some(Direction::Credit),
        Some(_) => Some(Direction::Debit),
        None if negative => Some(Direction::Debit),
        None => None,
    };

    Some(ParsedAmount {
        magnitude,
        direction_hint,
    })
}

/// Parse the date forms seen on statements and in model output.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // ISO datetimes: keep the calendar date
    let candidate = match s.get(..10) {
        Some(head) if s.len() > 10 && s.as_bytes()[10] == b'T' => head,
        _ => s,
    };

    let plausible = |d: &NaiveDate| (1900..=2100).contains(&d.year());

    FULL_YEAR_FORMATS
        .iter()
        .chain(SHORT_YEAR_FORMATS)
        .filter_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
        .find(plausible)
}

pub fn direction_from_kind(kind: &str) -> Option<Direction> {
    let kind = kind.trim().to_lowercase();
    if CREDIT_WORDS.contains(&kind.as_str()) {
        Some(Direction::Credit)
    } else if DEBIT_WORDS.contains(&kind.as_str()) {
        Some(Direction::Debit)
    } else {
        None
    }
}

/// Numbers are taken as fractions; a string with a `%` suffix is a
/// percentage.
fn parse_confidence(value: Option<&Value>) -> Option<f64> {
    let v = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => match s.trim().strip_suffix('%') {
            Some(percent) => percent.trim().parse::<f64>().ok()? / 100.0,
            None => s.trim().parse::<f64>().ok()?,
        },
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Turn one loosely-typed record into a canonical transaction, or `None`
/// when the date, a numeric amount, a description or payee, or a direction
/// cannot be established.
pub fn normalize_transaction(
    raw: &RawTransaction,
    provenance: Provenance,
    config: &ImportConfig,
) -> Option<Normalized> {
    let Some(date) = raw.date.as_deref().and_then(parse_date) else {
        debug!("Dropping record without a usable date: {:?}", raw.date);
        return None;
    };

    let Some(amount) = raw.amount.as_ref().and_then(parse_amount) else {
        debug!("Dropping record without a numeric amount: {:?}", raw.amount);
        return None;
    };

    let explicit_payee = non_blank(raw.payee.as_deref());
    let description = match raw.description.as_deref().map(collapse_whitespace) {
        Some(d) if !d.is_empty() => d,
        _ => match &explicit_payee {
            Some(payee) => payee.clone(),
            None if !config.require_description => PLACEHOLDER_DESCRIPTION.to_string(),
            None => {
                debug!("Dropping record with neither description nor payee");
                return None;
            }
        },
    };

    let (direction, direction_assumed) = match raw
        .kind
        .as_deref()
        .and_then(direction_from_kind)
        .or(amount.direction_hint)
    {
        Some(direction) => (direction, false),
        None => match config.unknown_direction {
            UnknownDirectionPolicy::Debit => (Direction::Debit, true),
            UnknownDirectionPolicy::Credit => (Direction::Credit, true),
            UnknownDirectionPolicy::Drop => {
                debug!("Dropping record with unrecognized type {:?}", raw.kind);
                return None;
            }
        },
    };

    let payee = explicit_payee.or_else(|| {
        if description == PLACEHOLDER_DESCRIPTION {
            None
        } else {
            infer_payee(&description)
        }
    });

    let category = non_blank(raw.category.as_deref()).unwrap_or_else(|| {
        let haystack = match &payee {
            Some(p) => format!("{} {}", description, p),
            None => description.clone(),
        };
        categorize(&haystack).to_string()
    });

    let default_confidence = match provenance {
        Provenance::Structured => config.happy_path_confidence,
        Provenance::Repaired => config.repaired_confidence,
    };
    let confidence = parse_confidence(raw.confidence.as_ref())
        .unwrap_or(default_confidence)
        .clamp(0.0, 1.0);

    Some(Normalized {
        transaction: CandidateTransaction {
            date,
            description,
            amount: amount.magnitude,
            direction,
            payee,
            category,
            confidence,
        },
        direction_assumed,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub transactions: Vec<CandidateTransaction>,
    /// Number of raw records offered.
    pub candidates: usize,
    pub dropped: usize,
    pub assumed_direction: usize,
}

pub fn normalize_batch(
    raws: &[RawTransaction],
    provenance: Provenance,
    config: &ImportConfig,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch {
        candidates: raws.len(),
        ..Default::default()
    };

    for raw in raws {
        match normalize_transaction(raw, provenance, config) {
            Some(normalized) => {
                if normalized.direction_assumed {
                    batch.assumed_direction += 1;
                }
                batch.transactions.push(normalized.transaction);
            }
            None => batch.dropped += 1,
        }
    }

    batch
}

fn collapse_whitespace(s: &str) -> String {
    RE_WHITESPACE.replace_all(s.trim(), " ").into_owned()
}
