//! Fixed-point monetary values
//!
//! Balances and amounts are held as a signed count of minor units (cents) so
//! repeated top-ups and transfers never accumulate rounding error. Decimal
//! values only appear at the boundary, when an amount enters the engine or a
//! balance is written out.

use super::error::LedgerError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits carried by every amount
pub const MINOR_UNIT_SCALE: u32 = 2;

const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// A monetary value in minor units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Build a value from a raw count of minor units
    pub const fn from_minor_units(units: i64) -> Self {
        Money(units)
    }

    /// Build a value from whole major units (`Money::from_major(5)` is 5.00)
    pub fn from_major(units: i64) -> Option<Self> {
        units.checked_mul(MINOR_UNITS_PER_MAJOR).map(Money)
    }

    /// Convert a decimal amount into minor units
    ///
    /// Fails with `InvalidAmount` when the value carries more fractional digits
    /// than [`MINOR_UNIT_SCALE`] or does not fit in the minor-unit range.
    /// Trailing zeros are ignored, so `100.50` and `100.5000` are the same amount.
    pub fn from_decimal(value: Decimal) -> Result<Self, LedgerError> {
        let normalized = value.normalize();
        if normalized.scale() > MINOR_UNIT_SCALE {
            return Err(LedgerError::invalid_amount(value));
        }

        normalized
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .and_then(|units| units.to_i64())
            .map(Money)
            .ok_or_else(|| LedgerError::invalid_amount(value))
    }

    /// The value as a decimal with exactly two fractional digits
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_decimal(), f)
    }
}

impl FromStr for Money {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| LedgerError::InvalidAmount {
            amount: s.to_string(),
        })?;
        Money::from_decimal(value)
    }
}

// Serialized as a decimal string so no consumer ever sees a float.
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
