use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text extracted from a single source file, consumed once per import attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub content: String,
}

impl RawDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.content.len()
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[schemars(description = "Money coming into the account (deposit, refund, salary)")]
    Credit,

    #[schemars(description = "Money leaving the account (purchase, withdrawal, fee)")]
    Debit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Credit => f.pad("credit"),
            Direction::Debit => f.pad("debit"),
        }
    }
}

/// A transaction exactly as the structuring service (or a repair strategy)
/// produced it. Every field is optional and loosely typed; nothing here is
/// trusted until it passes through the transaction normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[schemars(description = "Transaction date, preferably ISO 8601 (YYYY-MM-DD)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[schemars(description = "Narration exactly as printed on the statement, cleaned of reference noise")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[schemars(description = "Transaction amount as a number. Sign is ignored; use `type` for direction.")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<serde_json::Value>,

    #[schemars(description = "Either \"credit\" or \"debit\"")]
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[schemars(description = "Merchant or counterparty name, if identifiable")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,

    #[schemars(description = "Spending category such as \"Food & Dining\" or \"Transportation\"")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[schemars(description = "Extraction confidence between 0 and 1")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<serde_json::Value>,
}

/// Successful, schema-valid output of one structuring call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuredStatement {
    #[schemars(description = "Every transaction row found in the text, in statement order")]
    pub transactions: Vec<RawTransaction>,

    #[schemars(description = "Masked or partial account number, e.g. XXXX1234")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,

    #[schemars(description = "Statement period as printed, e.g. 01/03/2024 - 31/03/2024")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_period: Option<String>,

    #[schemars(description = "Name of the issuing bank")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,

    #[schemars(description = "Free-form notes about anything that could not be parsed")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsing_notes: Option<String>,

    #[schemars(description = "Number of transaction rows seen in the text")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_count: Option<u32>,

    /// Raw text the statement was parsed from, when the service keeps it.
    #[serde(skip)]
    pub raw_text: Option<String>,
}

impl StructuredStatement {
    pub fn metadata(&self) -> StatementMetadata {
        StatementMetadata {
            bank_name: non_blank(self.bank_name.as_deref()),
            account_number: non_blank(self.account_number.as_deref()),
            statement_period: non_blank(self.statement_period.as_deref()),
        }
    }

    /// True when the response declares more rows than it actually carries.
    pub fn is_short(&self) -> bool {
        self.transaction_count
            .map(|declared| declared as usize > self.transactions.len())
            .unwrap_or(false)
    }
}

/// The canonical, normalized transaction handed to the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Always a non-negative magnitude; the sign lives in `direction`.
    pub amount: f64,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    pub category: String,
    pub confidence: f64,
}

impl CandidateTransaction {
    /// Amount in minor currency units (paise/cents).
    pub fn amount_minor(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_period: Option<String>,
}

impl StatementMetadata {
    pub fn is_empty(&self) -> bool {
        self.bank_name.is_none() && self.account_number.is_none() && self.statement_period.is_none()
    }

    /// Fill only the fields that are still empty. Values already present are
    /// never overwritten.
    pub fn merge_first_wins(&mut self, other: &StatementMetadata) {
        if self.bank_name.is_none() {
            self.bank_name = non_blank(other.bank_name.as_deref());
        }
        if self.account_number.is_none() {
            self.account_number = non_blank(other.account_number.as_deref());
        }
        if self.statement_period.is_none() {
            self.statement_period = non_blank(other.statement_period.as_deref());
        }
    }
}

/// Final output of one document import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub transactions: Vec<CandidateTransaction>,
    #[serde(flatten)]
    pub metadata: StatementMetadata,
    pub parsing_notes: String,
}

impl ImportResult {
    pub fn empty(notes: impl Into<String>) -> Self {
        Self {
            transactions: Vec::new(),
            metadata: StatementMetadata::default(),
            parsing_notes: notes.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_result_serializes_flat_camel_case() {
        let result = ImportResult {
            transactions: vec![CandidateTransaction {
                date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                description: "Zomato Food Order".to_string(),
                amount: 450.0,
                direction: Direction::Debit,
                payee: None,
                category: "Food & Dining".to_string(),
                confidence: 0.7,
            }],
            metadata: StatementMetadata {
                bank_name: Some("HDFC".to_string()),
                account_number: None,
                statement_period: None,
            },
            parsing_notes: "ok".to_string(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["bankName"], "HDFC");
        assert!(json.get("accountNumber").is_none());
        assert_eq!(json["parsingNotes"], "ok");
        assert_eq!(json["transactions"][0]["date"], "2024-03-15");
        assert_eq!(json["transactions"][0]["direction"], "debit");
        assert!(json["transactions"][0].get("payee").is_none());
    }

    #[test]
    fn test_raw_transaction_accepts_string_amount_and_type_key() {
        let raw: RawTransaction = serde_json::from_str(
            r#"{"date":"2024-03-15","description":"ATM","amount":"1,200.00","type":"DEBIT"}"#,
        )
        .unwrap();
        assert_eq!(raw.kind.as_deref(), Some("DEBIT"));
        assert_eq!(raw.amount, Some(serde_json::json!("1,200.00")));
    }

    #[test]
    fn test_structured_statement_requires_transactions() {
        let missing = serde_json::from_str::<StructuredStatement>(r#"{"bankName":"HDFC"}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_is_short_compares_declared_count() {
        let statement = StructuredStatement {
            transactions: vec![RawTransaction::default()],
            transaction_count: Some(3),
            ..Default::default()
        };
        assert!(statement.is_short());

        let exact = StructuredStatement {
            transaction_count: Some(1),
            ..statement
        };
        assert!(!exact.is_short());
    }

    #[test]
    fn test_metadata_merge_is_first_wins() {
        let mut merged = StatementMetadata::default();
        merged.merge_first_wins(&StatementMetadata {
            bank_name: Some("HDFC".to_string()),
            account_number: Some("  ".to_string()),
            statement_period: None,
        });
        merged.merge_first_wins(&StatementMetadata {
            bank_name: Some("ICICI".to_string()),
            account_number: Some("XXXX1234".to_string()),
            statement_period: None,
        });
        assert_eq!(merged.bank_name.as_deref(), Some("HDFC"));
        assert_eq!(merged.account_number.as_deref(), Some("XXXX1234"));
        assert!(merged.statement_period.is_none());
    }

    #[test]
    fn test_raw_document_lengths() {
        let doc = RawDocument::new("₹450");
        assert_eq!(doc.char_len(), 4);
        assert_eq!(doc.byte_len(), 6);
        assert!(!doc.is_blank());
        assert!(RawDocument::new(" \n\t").is_blank());
    }
}
