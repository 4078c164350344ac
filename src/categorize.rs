//! Deterministic payee and category heuristics for statement narrations.
//!
//! Keyword tables cover the common Indian retail-banking merchants and
//! channels; anything unmatched falls back to [`DEFAULT_CATEGORY`].

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_CATEGORY: &str = "Other";

/// Checked in order; the first category with a matching keyword wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Food & Dining",
        &[
            "zomato", "swiggy", "restaurant", "restaurants", "cafe", "food", "dominos",
            "domino's", "pizza", "mcdonalds", "mcdonald's", "kfc", "starbucks", "burger",
            "dining", "bakery", "eatery",
        ],
    ),
    (
        "Groceries",
        &[
            "bigbasket", "grocery", "groceries", "supermarket", "dmart", "blinkit", "zepto",
            "instamart", "kirana",
        ],
    ),
    (
        "Transportation",
        &[
            "uber", "ola", "rapido", "fuel", "petrol", "diesel", "metro", "irctc", "railway",
            "railways", "fastag", "parking", "toll", "indian oil", "hpcl", "bpcl",
        ],
    ),
    (
        "Shopping",
        &["amazon", "flipkart", "myntra", "ajio", "nykaa", "meesho", "mall", "shopping"],
    ),
    (
        "Bills & Utilities",
        &[
            "electricity", "water bill", "gas", "broadband", "jio", "airtel", "vodafone",
            "bsnl", "recharge", "dth", "tata sky", "bescom", "utility",
        ],
    ),
    (
        "Entertainment",
        &[
            "netflix", "spotify", "hotstar", "prime video", "bookmyshow", "pvr", "inox",
            "movie", "movies", "youtube",
        ],
    ),
    (
        "Healthcare",
        &[
            "pharmacy", "hospital", "apollo", "medical", "medicals", "clinic", "doctor",
            "pharmeasy", "1mg", "netmeds", "diagnostics",
        ],
    ),
    (
        "Education",
        &["school", "college", "university", "tuition", "course", "udemy", "coursera"],
    ),
    ("Rent", &["rent", "house rent", "landlord"]),
    ("EMI & Loans", &["emi", "loan"]),
    ("Insurance", &["insurance", "lic", "premium"]),
    (
        "Investments",
        &["mutual fund", "sip", "zerodha", "groww", "upstox", "nps", "ppf"],
    ),
    ("Salary", &["salary", "payroll"]),
    ("Interest", &["interest", "int.pd", "int pd"]),
    ("Cash Withdrawal", &["atm", "cash withdrawal", "cwdr"]),
    ("Transfer", &["neft", "imps", "rtgs", "transfer"]),
    ("Fees & Charges", &["charges", "fee", "fees", "penalty"]),
];

static CATEGORY_RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    CATEGORY_KEYWORDS
        .iter()
        .map(|(category, keywords)| (*category, keyword_regex(keywords)))
        .collect()
});

static RE_CHANNEL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:UPI|NEFT|RTGS|IMPS|ATM|CARD|POS|ACH|NACH|ECS)(?:[\s/:*\-]+|$))+").unwrap()
});
static RE_EMBEDDED_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:₹|\brs\.?|\binr)\s*\d[\d,]*(?:\.\d+)?|\b\d[\d,]*\.\d{2}\b").unwrap()
});
static RE_DIRECTION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[\s/\-])(?:dr|cr|debit|credit)\.?\s*$").unwrap());
static RE_TOKEN_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s/\-*|:_]+").unwrap());

fn keyword_regex(keywords: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).unwrap()
}

/// Category for a narration, or [`DEFAULT_CATEGORY`] when no keyword matches.
pub fn categorize(text: &str) -> &'static str {
    CATEGORY_RULES
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Guess the counterparty from a narration: strip the channel prefix
/// (UPI-, NEFT-, ...), embedded amounts and the trailing Dr/Cr marker, drop
/// reference numbers and VPAs, and keep the first two words.
pub fn infer_payee(description: &str) -> Option<String> {
    let stripped = RE_CHANNEL_PREFIX.replace(description.trim(), "");
    let mut stripped = RE_EMBEDDED_AMOUNT.replace_all(&stripped, " ").trim().to_string();
    while RE_DIRECTION_SUFFIX.is_match(&stripped) {
        stripped = RE_DIRECTION_SUFFIX.replace(&stripped, "").trim().to_string();
    }

    let tokens: Vec<String> = RE_TOKEN_SEPARATORS
        .split(&stripped)
        .filter(|t| is_name_token(t))
        .take(2)
        .map(tidy_case)
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn is_name_token(token: &str) -> bool {
    if token.is_empty() || token.contains('@') {
        return false;
    }
    if token.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return false;
    }
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    digits < 4 && token.chars().any(|c| c.is_alphanumeric())
}

/// SHOUTING tokens become Title case; mixed case is left alone.
fn tidy_case(token: &str) -> String {
    let has_lower = token.chars().any(|c| c.is_lowercase());
    if has_lower {
        return token.to_string();
    }
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_food() {
        assert_eq!(categorize("Zomato Food Order"), "Food & Dining");
        assert_eq!(categorize("UPI-SWIGGY INSTAMART"), "Food & Dining");
    }

    #[test]
    fn test_categorize_uses_word_boundaries() {
        // "rent" must not fire inside "current"
        assert_eq!(categorize("CURRENT ACCOUNT SWEEP"), DEFAULT_CATEGORY);
        assert_eq!(categorize("HOUSE RENT MARCH"), "Rent");
    }

    #[test]
    fn test_categorize_table_order() {
        assert_eq!(categorize("NEFT-ACME PAYROLL"), "Salary");
        assert_eq!(categorize("NEFT-RAHUL SHARMA"), "Transfer");
        assert_eq!(categorize("ATM CASH WITHDRAWAL"), "Cash Withdrawal");
        assert_eq!(categorize("Amazon Pay"), "Shopping");
    }

    #[test]
    fn test_categorize_default() {
        assert_eq!(categorize("Something unfamiliar"), DEFAULT_CATEGORY);
        assert_eq!(categorize(""), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_infer_payee_strips_prefix_amount_and_marker() {
        assert_eq!(
            infer_payee("UPI-ZOMATO ORDER ₹450.00 Dr").as_deref(),
            Some("Zomato Order")
        );
        assert_eq!(
            infer_payee("NEFT-ACME SOFTWARE PVT LTD CREDIT").as_deref(),
            Some("Acme Software")
        );
    }

    #[test]
    fn test_infer_payee_skips_reference_numbers_and_vpa() {
        assert_eq!(
            infer_payee("UPI/412345678901/SWIGGY/swiggy@icici").as_deref(),
            Some("Swiggy")
        );
    }

    #[test]
    fn test_infer_payee_keeps_mixed_case() {
        assert_eq!(infer_payee("Zomato Food Order").as_deref(), Some("Zomato Food"));
    }

    #[test]
    fn test_infer_payee_none_when_nothing_left() {
        assert_eq!(infer_payee("UPI- 123456789 Dr"), None);
        assert_eq!(infer_payee("   "), None);
    }
}
