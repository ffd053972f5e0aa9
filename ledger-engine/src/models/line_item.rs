//! Line item model shared by quotes and invoices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One billable line on a quote or invoice. Owned by exactly one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub position: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price_ht: Decimal,
    /// Fraction, e.g. `0.20` for 20 %.
    pub vat_rate: Decimal,
    pub unit: Option<String>,
}

impl LineItem {
    /// Unrounded `quantity × unit_price_ht`, `None` on overflow.
    pub fn total_ht(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_price_ht)
    }

    /// Unrounded `total_ht × vat_rate`, `None` on overflow.
    pub fn total_vat(&self) -> Option<Decimal> {
        self.total_ht()?.checked_mul(self.vat_rate)
    }
}

/// Input for a line item before it is given an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price_ht: Decimal,
    pub vat_rate: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Derived document totals, rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub total_ht: Decimal,
    pub total_vat: Decimal,
    pub total_ttc: Decimal,
}

impl Totals {
    pub const ZERO: Totals = Totals {
        total_ht: Decimal::ZERO,
        total_vat: Decimal::ZERO,
        total_ttc: Decimal::ZERO,
    };
}
