//! Quote model.

use super::{DocumentNumber, LineItem, NewLineItem, Totals};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Quote status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Accepted,
    Signed,
    Expired,
    Rejected,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Signed => "signed",
            QuoteStatus::Expired => "expired",
            QuoteStatus::Rejected => "rejected",
        }
    }

    /// Only accepted or signed quotes may become invoices.
    pub fn is_convertible(&self) -> bool {
        matches!(self, QuoteStatus::Accepted | QuoteStatus::Signed)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(QuoteStatus::Draft),
            "sent" => Ok(QuoteStatus::Sent),
            "accepted" => Ok(QuoteStatus::Accepted),
            "signed" => Ok(QuoteStatus::Signed),
            "expired" => Ok(QuoteStatus::Expired),
            "rejected" => Ok(QuoteStatus::Rejected),
            other => Err(format!("unknown quote status '{}'", other)),
        }
    }
}

/// A user-driven step in the quote lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteAction {
    Send,
    Accept,
    Sign,
    Reject,
    Expire,
}

impl QuoteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteAction::Send => "send",
            QuoteAction::Accept => "accept",
            QuoteAction::Sign => "sign",
            QuoteAction::Reject => "reject",
            QuoteAction::Expire => "expire",
        }
    }

    /// The status reached by applying this action to `from`, if allowed.
    pub fn apply(self, from: QuoteStatus) -> Option<QuoteStatus> {
        use QuoteStatus::*;
        match (self, from) {
            (QuoteAction::Send, Draft) => Some(Sent),
            (QuoteAction::Accept, Sent) => Some(Accepted),
            (QuoteAction::Sign, Sent | Accepted) => Some(Signed),
            (QuoteAction::Reject, Draft | Sent) => Some(Rejected),
            (QuoteAction::Expire, Draft | Sent) => Some(Expired),
            _ => None,
        }
    }
}

impl fmt::Display for QuoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(QuoteAction::Send),
            "accept" => Ok(QuoteAction::Accept),
            "sign" => Ok(QuoteAction::Sign),
            "reject" => Ok(QuoteAction::Reject),
            "expire" => Ok(QuoteAction::Expire),
            other => Err(format!("unknown quote action '{}'", other)),
        }
    }
}

/// Quote header with its ordered line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: Uuid,
    pub org_id: Uuid,
    pub client_ref: String,
    pub number: DocumentNumber,
    pub status: QuoteStatus,
    pub currency: String,
    #[serde(flatten)]
    pub totals: Totals,
    pub valid_until: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub lines: Vec<LineItem>,
}

/// Input for creating a quote.
#[derive(Debug, Clone)]
pub struct CreateQuote {
    pub client_ref: String,
    pub currency: Option<String>,
    pub valid_until: Option<NaiveDate>,
    pub lines: Vec<NewLineItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_quote_lifecycle() {
        assert_eq!(QuoteAction::Send.apply(QuoteStatus::Draft), Some(QuoteStatus::Sent));
        assert_eq!(
            QuoteAction::Accept.apply(QuoteStatus::Sent),
            Some(QuoteStatus::Accepted)
        );
        assert_eq!(
            QuoteAction::Sign.apply(QuoteStatus::Accepted),
            Some(QuoteStatus::Signed)
        );
        assert_eq!(QuoteAction::Accept.apply(QuoteStatus::Draft), None);
        assert_eq!(QuoteAction::Reject.apply(QuoteStatus::Signed), None);
        assert_eq!(QuoteAction::Expire.apply(QuoteStatus::Accepted), None);
    }

    #[test]
    fn only_accepted_or_signed_quotes_convert() {
        assert!(QuoteStatus::Accepted.is_convertible());
        assert!(QuoteStatus::Signed.is_convertible());
        assert!(!QuoteStatus::Sent.is_convertible());
        assert!(!QuoteStatus::Rejected.is_convertible());
    }
}
