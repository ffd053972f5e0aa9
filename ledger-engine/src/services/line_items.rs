//! Line-item ledger: totals, validation and cloning of billable lines.
//!
//! Monetary values are rounded to cents only when totals are aggregated;
//! per-line amounts stay exact so that rounding never accumulates.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{LineItem, NewLineItem, Totals};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

/// Round to cents, halves away from zero, always carrying two decimals.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// 10^9 units per line.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);
/// 10^12 per unit; a bounded line stays far below `Decimal::MAX`.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Aggregate totals of a line list. An empty list totals zero.
///
/// Arithmetic is checked: a line or sum outside the decimal range is reported
/// as an invalid line or amount instead of panicking.
pub fn compute_totals(lines: &[LineItem]) -> LedgerResult<Totals> {
    let mut sum_ht = Decimal::ZERO;
    let mut sum_vat = Decimal::ZERO;

    for line in lines {
        let overflow = || LedgerError::InvalidLineItem {
            position: line.position.max(0) as usize,
            reason: "amount exceeds the supported range".to_string(),
        };
        let ht = line.total_ht().ok_or_else(overflow)?;
        let vat = line.total_vat().ok_or_else(overflow)?;
        sum_ht = sum_ht.checked_add(ht).ok_or_else(overflow)?;
        sum_vat = sum_vat.checked_add(vat).ok_or_else(overflow)?;
    }

    let total_ht = round_money(sum_ht);
    let total_vat = round_money(sum_vat);
    let total_ttc = total_ht.checked_add(total_vat).ok_or_else(|| {
        LedgerError::InvalidAmount("document total exceeds the supported range".to_string())
    })?;

    Ok(Totals {
        total_ht,
        total_vat,
        total_ttc,
    })
}

/// Copy `source` into a new, independently owned list with fresh identities.
pub fn clone_lines(source: &[LineItem]) -> Vec<LineItem> {
    source
        .iter()
        .map(|line| LineItem {
            line_item_id: Uuid::new_v4(),
            ..line.clone()
        })
        .collect()
}

/// Validate caller-supplied lines and assign identities and 1-based positions.
pub fn build_lines(inputs: &[NewLineItem]) -> LedgerResult<Vec<LineItem>> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let position = index + 1;
            let invalid = |reason: &str| LedgerError::InvalidLineItem {
                position,
                reason: reason.to_string(),
            };

            let description = input.description.trim();
            if description.is_empty() {
                return Err(invalid("description is required"));
            }
            if input.quantity <= Decimal::ZERO {
                return Err(invalid("quantity must be positive"));
            }
            if input.quantity > MAX_QUANTITY {
                return Err(invalid("quantity is too large"));
            }
            if input.unit_price_ht.is_sign_negative() {
                return Err(invalid("unit price cannot be negative"));
            }
            if input.unit_price_ht > MAX_UNIT_PRICE {
                return Err(invalid("unit price is too large"));
            }
            if input.vat_rate.is_sign_negative() || input.vat_rate > Decimal::ONE {
                return Err(invalid("vat rate must be a fraction between 0 and 1"));
            }

            Ok(LineItem {
                line_item_id: Uuid::new_v4(),
                position: position as i32,
                description: description.to_string(),
                quantity: input.quantity,
                unit_price_ht: input.unit_price_ht,
                vat_rate: input.vat_rate,
                unit: input.unit.clone(),
            })
        })
        .collect()
}
