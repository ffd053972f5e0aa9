//! Document types and their human-facing numbers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Each document type has its own numbering sequence per organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Quote,
    Invoice,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Quote => "quote",
            DocumentType::Invoice => "invoice",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quote" => Ok(DocumentType::Quote),
            "invoice" => Ok(DocumentType::Invoice),
            other => Err(format!("unknown document type '{}'", other)),
        }
    }
}

/// A document number such as `INV-00042`: a prefix followed by a zero-padded counter.
///
/// Ordering compares the numeric counter first, so `INV-100000` sorts after
/// `INV-99999` even though the string is longer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentNumber(String);

impl DocumentNumber {
    pub fn new(prefix: &str, counter: i64, width: usize) -> Self {
        Self(format!("{prefix}{counter:0width$}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing decimal counter, if the number ends in digits.
    pub fn counter(&self) -> Option<i64> {
        let digits_start = self
            .0
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        self.0[digits_start..].parse().ok()
    }
}

impl From<String> for DocumentNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for DocumentNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.counter(), other.counter()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for DocumentNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(DocumentNumber::new("INV-", 1, 5).as_str(), "INV-00001");
        assert_eq!(DocumentNumber::new("Q-", 123456, 5).as_str(), "Q-123456");
    }

    #[test]
    fn extracts_trailing_counter() {
        assert_eq!(DocumentNumber::new("INV-", 42, 5).counter(), Some(42));
        assert_eq!(DocumentNumber::from("manual".to_string()).counter(), None);
    }

    #[test]
    fn orders_numerically_past_the_pad_width() {
        let small = DocumentNumber::new("INV-", 99999, 5);
        let large = DocumentNumber::new("INV-", 100000, 5);
        assert!(small < large);
        assert!(small.as_str() > large.as_str());
    }
}
