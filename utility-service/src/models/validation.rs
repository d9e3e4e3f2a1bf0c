//! Field validators shared by the ledger input models.

use rust_decimal::Decimal;
use std::borrow::Cow;
use validator::ValidationError;

/// Units and MWK amounts are stored with two decimal places.
pub const MAX_SCALE: u32 = 2;

/// Integer digits of `NUMERIC(14, 2)` unit columns.
pub const UNIT_INTEGER_DIGITS: u32 = 12;

/// Integer digits of `NUMERIC(16, 2)` MWK columns.
pub const AMOUNT_INTEGER_DIGITS: u32 = 14;

/// Exclusive upper bound for a value with `digits` integer digits.
fn digit_limit(digits: u32) -> Decimal {
    Decimal::from(10_i64.pow(digits))
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn check_scale(value: &Decimal) -> Result<(), ValidationError> {
    if value.normalize().scale() > MAX_SCALE {
        return Err(invalid("scale", "must have at most two decimal places"));
    }
    Ok(())
}

/// Strictly positive quantity (units purchased or consumed).
pub fn validate_positive_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(invalid("positive", "must be greater than zero"));
    }
    if *value >= digit_limit(UNIT_INTEGER_DIGITS) {
        return Err(invalid("range", "must be less than 10^12"));
    }
    check_scale(value)
}

/// Zero or positive monetary amount.
pub fn validate_non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(invalid("non_negative", "must not be negative"));
    }
    if *value >= digit_limit(AMOUNT_INTEGER_DIGITS) {
        return Err(invalid("range", "must be less than 10^14"));
    }
    check_scale(value)
}
