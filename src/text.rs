//! Cleanup of raw text extracted from statement PDFs.
//!
//! Line structure is preserved so the chunker can split on line boundaries;
//! whitespace is collapsed within each line and blank lines are dropped.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::borrow::Cow;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_ZERO_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new("[\u{200B}\u{200C}\u{200D}\u{FEFF}]").unwrap());

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bpage\s*(?:no\.?\s*)?:?\s*\d+(?:\s*(?:of|/)\s*\d+)?\b").unwrap()
});
static RE_BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)this is an? (?:system|computer)[ -]generated (?:statement|advice|document)",
        r"(?:,? and (?:hence )?(?:does not|doesn't) require (?:any )?(?:physical )?signature)?\.?",
        r"|(?:does not|doesn't|do not) require (?:any )?(?:physical )?signature\.?",
        r"|\(?continued on (?:the )?next page\)?",
        r"|\*+\s*end of statement\s*\*+",
    ))
    .unwrap()
});

static RE_DAY_FIRST_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})[.\-](\d{1,2})[.\-](\d{4}|\d{2})\b").unwrap()
});

static RE_RUPEE_VARIANTS: Lazy<Regex> =
    Lazy::new(|| Regex::new("â‚¹|\u{20A8}|&#8377;|&#x20[bB]9;").unwrap());
static RE_RUPEE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:Rs\.?|INR)\s*(\d)").unwrap());
static RE_INR_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bINR\b").unwrap());
static RE_RUPEE_SPACING: Lazy<Regex> = Lazy::new(|| Regex::new(r"₹\s*(\d)").unwrap());

static RE_TXN_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:balance|transactions?|txn|withdrawals?|deposits?|debit|credit|opening|closing|narration|particulars)\b",
    )
    .unwrap()
});
static RE_CURRENCY_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:₹|\$|€|£|\bRs\.?|\bINR\b|\bUSD\b|\b\d{1,3}(?:,\d{2,3})*\.\d{2}\b)").unwrap()
});
static RE_DATES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\b\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}\b",
        r"|\b\d{4}-\d{2}-\d{2}\b",
        r"|(?i)\b\d{1,2}[ \-](?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*[ \-,]+\d{2,4}\b",
    ))
    .unwrap()
});
static RE_ACCOUNT_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:account|a/c|acct|bank|ifsc|branch|statement|customer id)\b").unwrap()
});

/// Number of independent statement signals required by [`looks_like_statement`].
const REQUIRED_SIGNALS: usize = 2;

/// Clean raw extracted text. Pure and idempotent; unrecognized input passes
/// through with only whitespace changes.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = RE_ZERO_WIDTH.replace_all(&text, "");

    text.lines()
        .map(normalize_line)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_line(line: &str) -> String {
    let line = RE_BOILERPLATE.replace_all(line, " ");
    let line = RE_PAGE_NUMBER.replace_all(&line, " ");
    let line = rewrite_day_first_dates(&line);
    let line = normalize_currency(&line);
    RE_WHITESPACE.replace_all(&line, " ").trim().to_string()
}

/// `15.03.2024` and `15-03-24` become `15/03/2024` and `15/03/24`. Tokens
/// that are part of a longer dotted or dashed number run (reference numbers,
/// IP-like ids) or whose day/month are out of range (times such as
/// `10.30.45`) are left alone.
fn rewrite_day_first_dates(line: &str) -> Cow<'_, str> {
    RE_DAY_FIRST_DATE.replace_all(line, |caps: &Captures| {
        let whole = &caps[0];
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let in_range = (1..=31).contains(&day) && (1..=12).contains(&month);
        let standalone = caps
            .get(0)
            .map(|m| !joined_to_number_run(line, m.start(), m.end()))
            .unwrap_or(false);

        if in_range && standalone {
            format!("{}/{}/{}", &caps[1], &caps[2], &caps[3])
        } else {
            whole.to_string()
        }
    })
}

/// True when `line[start..end]` continues into a neighbouring `[./-]<digit>`
/// group on either side.
fn joined_to_number_run(line: &str, start: usize, end: usize) -> bool {
    const SEPARATORS: &[u8] = b"./-";
    let bytes = line.as_bytes();
    let before = start >= 2
        && SEPARATORS.contains(&bytes[start - 1])
        && bytes[start - 2].is_ascii_digit();
    let after = end + 1 < bytes.len()
        && SEPARATORS.contains(&bytes[end])
        && bytes[end + 1].is_ascii_digit();
    before || after
}

/// Map every Rupee spelling to `₹` placed directly before the amount.
pub fn normalize_currency(text: &str) -> String {
    let text = RE_RUPEE_VARIANTS.replace_all(text, "₹");
    let text = RE_RUPEE_PREFIX.replace_all(&text, "₹$1");
    let text = RE_INR_WORD.replace_all(&text, "₹");
    RE_RUPEE_SPACING.replace_all(&text, "₹$1").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementCheck {
    pub valid: bool,
    pub reason: String,
}

/// Cheap gate run before any structuring call.
pub fn looks_like_statement(text: &str, min_length: usize) -> StatementCheck {
    let length = text.trim().chars().count();
    if length < min_length {
        return StatementCheck {
            valid: false,
            reason: format!(
                "Text is too short to be a statement ({} characters, need at least {})",
                length, min_length
            ),
        };
    }

    let signals = [
        ("transaction keywords", RE_TXN_KEYWORDS.is_match(text)),
        ("currency amounts", RE_CURRENCY_MARKERS.is_match(text)),
        ("dates", RE_DATES.is_match(text)),
        ("account or bank details", RE_ACCOUNT_KEYWORDS.is_match(text)),
    ];

    let found: Vec<&str> = signals
        .iter()
        .filter(|(_, hit)| *hit)
        .map(|(name, _)| *name)
        .collect();

    if found.len() >= REQUIRED_SIGNALS {
        StatementCheck {
            valid: true,
            reason: format!("Found {}", found.join(", ")),
        }
    } else if found.is_empty() {
        StatementCheck {
            valid: false,
            reason: "No transaction keywords, amounts, dates or account details were found"
                .to_string(),
        }
    } else {
        StatementCheck {
            valid: false,
            reason: format!(
                "Only found {}; a statement needs at least {} of: transaction keywords, currency amounts, dates, account or bank details",
                found.join(", "),
                REQUIRED_SIGNALS
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "HDFC BANK LTD   Statement of Account\r\n\
        Page 1 of 3\n\
        Date\tNarration\t\tWithdrawal   Deposit   Closing Balance\n\
        15-03-2024   UPI-ZOMATO ORDER   Rs. 450.00 Dr\n\
        16.03.2024 NEFT-ACME SALARY INR 52,000.00 Cr\n\
        \n\
        This is a computer generated statement and does not require signature.\n";

    #[test]
    fn test_normalize_collapses_whitespace_and_keeps_lines() {
        let out = normalize_text(SAMPLE);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "HDFC BANK LTD Statement of Account");
        assert_eq!(lines[1], "Date Narration Withdrawal Deposit Closing Balance");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_normalize_strips_page_numbers_and_boilerplate() {
        let out = normalize_text(SAMPLE);
        assert!(!out.to_lowercase().contains("page 1"));
        assert!(!out.to_lowercase().contains("computer generated"));
        assert!(!out.to_lowercase().contains("signature"));
    }

    #[test]
    fn test_normalize_dates_and_currency() {
        let out = normalize_text(SAMPLE);
        assert!(out.contains("15/03/2024 UPI-ZOMATO ORDER ₹450.00 Dr"));
        assert!(out.contains("16/03/2024 NEFT-ACME SALARY ₹52,000.00 Cr"));
    }

    #[test]
    fn test_currency_variants_collapse_to_one_symbol() {
        assert_eq!(normalize_currency("â‚¹ 10"), "₹10");
        assert_eq!(normalize_currency("Rs.10"), "₹10");
        assert_eq!(normalize_currency("rs 10"), "₹10");
        assert_eq!(normalize_currency("\u{20A8} 10"), "₹10");
        assert_eq!(normalize_currency("Amount (INR)"), "Amount (₹)");
        assert_eq!(normalize_currency("Mrs 10"), "Mrs 10");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            SAMPLE,
            "",
            "   \n\t  ",
            "Rs  1,000 INR 20 â‚¹ 3 Page 2/9 01-02-24",
            "no statement content here at all",
            "Ref 10.20.30.40.50 NEFT",
            "IMPS-12-34-56-78 01.02.2024",
            "Txn 1.2.2024.5 at 10.30.45",
            "Rs.15.03.2024 09-10-23-",
        ];
        for input in inputs {
            let once = normalize_text(input);
            assert_eq!(normalize_text(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_number_runs_and_times_are_not_dates() {
        assert_eq!(normalize_text("Ref 10.20.30.40.50 NEFT"), "Ref 10.20.30.40.50 NEFT");
        assert_eq!(normalize_text("IMPS 12-03-2024-7788"), "IMPS 12-03-2024-7788");
        assert_eq!(normalize_text("ATM at 10.30.45"), "ATM at 10.30.45");
        assert_eq!(normalize_text("31.12.2023 Interest"), "31/12/2023 Interest");
        assert_eq!(normalize_text("Ref-15.03.2024 POS"), "Ref-15/03/2024 POS");
    }

    #[test]
    fn test_iso_dates_untouched() {
        assert_eq!(normalize_text("2024-03-15 ATM"), "2024-03-15 ATM");
    }

    #[test]
    fn test_looks_like_statement_accepts_sample() {
        let check = looks_like_statement(&normalize_text(SAMPLE), 50);
        assert!(check.valid, "{}", check.reason);
    }

    #[test]
    fn test_looks_like_statement_rejects_short_text() {
        let check = looks_like_statement("balance 12.00", 50);
        assert!(!check.valid);
        assert!(check.reason.contains("too short"));
    }

    #[test]
    fn test_looks_like_statement_needs_two_signals() {
        let prose = "The quick brown fox jumps over the lazy dog and keeps running across the field.";
        let check = looks_like_statement(prose, 20);
        assert!(!check.valid);

        let one_signal = "Quarterly newsletter about our opening hours and the new garden party plans.";
        let check = looks_like_statement(one_signal, 20);
        assert!(!check.valid);
        assert!(check.reason.contains("Only found"));
    }
}
