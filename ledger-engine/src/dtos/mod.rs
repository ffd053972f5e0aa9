//! Request and query types of the HTTP surface.

use crate::models::{
    CreateInvoice, CreateOrganization, CreateQuote, NewLineItem, PaymentMethod, RecordPayment,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_positive"))
    }
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        Err(ValidationError::new("must_not_be_negative"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    #[validate(range(min = 0, max = 3650, message = "Payment terms must be 0-3650 days"))]
    pub payment_terms_days: Option<i32>,
}

impl From<CreateOrganizationRequest> for CreateOrganization {
    fn from(req: CreateOrganizationRequest) -> Self {
        Self {
            name: req.name,
            payment_terms_days: req.payment_terms_days,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, message = "Description cannot be empty"))]
    pub description: String,
    #[validate(custom(function = "positive"))]
    pub quantity: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub unit_price_ht: Decimal,
    #[validate(custom(function = "non_negative"))]
    pub vat_rate: Decimal,
    pub unit: Option<String>,
}

impl From<LineItemRequest> for NewLineItem {
    fn from(req: LineItemRequest) -> Self {
        Self {
            description: req.description,
            quantity: req.quantity,
            unit_price_ht: req.unit_price_ht,
            vat_rate: req.vat_rate,
            unit: req.unit,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuoteRequest {
    #[validate(length(min = 1, max = 255, message = "Client reference must be 1-255 characters"))]
    pub client_ref: String,
    #[validate(length(equal = 3, message = "Currency must be an ISO 4217 code"))]
    pub currency: Option<String>,
    pub valid_until: Option<NaiveDate>,
    #[validate(nested)]
    #[serde(default)]
    pub lines: Vec<LineItemRequest>,
}

impl From<CreateQuoteRequest> for CreateQuote {
    fn from(req: CreateQuoteRequest) -> Self {
        Self {
            client_ref: req.client_ref,
            currency: req.currency,
            valid_until: req.valid_until,
            lines: req.lines.into_iter().map(NewLineItem::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, max = 255, message = "Client reference must be 1-255 characters"))]
    pub client_ref: String,
    #[validate(length(equal = 3, message = "Currency must be an ISO 4217 code"))]
    pub currency: Option<String>,
    #[validate(range(min = 0, max = 3650, message = "Payment terms must be 0-3650 days"))]
    pub payment_terms_days: Option<i32>,
    #[validate(nested)]
    #[serde(default)]
    pub lines: Vec<LineItemRequest>,
}

impl From<CreateInvoiceRequest> for CreateInvoice {
    fn from(req: CreateInvoiceRequest) -> Self {
        Self {
            client_ref: req.client_ref,
            currency: req.currency,
            payment_terms_days: req.payment_terms_days,
            lines: req.lines.into_iter().map(NewLineItem::from).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ConvertQuoteQuery {
    #[validate(range(min = 0, max = 3650, message = "Payment terms must be 0-3650 days"))]
    pub payment_terms_days: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendInvoiceQuery {
    pub issue_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(custom(function = "positive"))]
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// Defaults to the time of the request.
    pub paid_at: Option<DateTime<Utc>>,
    #[validate(length(max = 1000, message = "Note must be at most 1000 characters"))]
    pub note: Option<String>,
}

impl RecordPaymentRequest {
    pub fn into_record(self, invoice_id: Uuid) -> RecordPayment {
        RecordPayment {
            invoice_id,
            amount: self.amount,
            method: self.method,
            paid_utc: self.paid_at.unwrap_or_else(Utc::now),
            note: self.note,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LedgerExportQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tax_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_non_positive_payment_amounts() {
        let request = RecordPaymentRequest {
            amount: dec!(0),
            method: PaymentMethod::Cash,
            paid_at: None,
            note: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn validates_nested_line_items() {
        let request: CreateQuoteRequest = serde_json::from_value(serde_json::json!({
            "client_ref": "ACME",
            "lines": [
                { "description": "", "quantity": "1", "unit_price_ht": "10", "vat_rate": "0.2" }
            ]
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn accepts_decimal_strings() {
        let request: RecordPaymentRequest = serde_json::from_value(serde_json::json!({
            "amount": "500.00",
            "method": "bank_transfer"
        }))
        .unwrap();
        assert_eq!(request.amount, dec!(500.00));
        assert!(request.validate().is_ok());
    }
}
