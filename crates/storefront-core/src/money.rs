//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    55.00 × 0.08 = 4.3999999999999995  ❌ WRONG!                         │
//! │                                                                         │
//! │  Cart page and checkout page each round that differently and the       │
//! │  customer sees two totals that disagree by a cent.                      │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units + Round-Half-Up                      │
//! │    5500 × 800 bps = 4_400_000 → (4_400_000 + 5_000) / 10_000 = 440     │
//! │    Every boundary rounds exactly once, the same way, everywhere         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::money::{Currency, Money};
//!
//! let price = Money::new(1099, Currency::Usd); // $10.99
//! let line = price.multiply(3).unwrap();       // $32.97
//! let off = line.apply_percentage(10).unwrap(); // $3.30 (3.297 rounds up)
//! assert_eq!(line.minor(), 3297);
//! assert_eq!(off.minor(), 330);
//!
//! // Decimal strings only exist at the UI boundary
//! assert_eq!(line.to_decimal_string(), "32.97");
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use ts_rs::TS;

use crate::error::MoneyError;
use crate::types::TaxRate;

/// Basis points in 100%.
const BPS_PER_UNIT: i128 = 10_000;

// =============================================================================
// Currency
// =============================================================================

/// ISO-4217 currency codes supported by the storefront.
///
/// The minor exponent only matters for display and parsing; arithmetic is
/// always performed on whole minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
    Jpy,
}

impl Currency {
    /// Number of decimal digits in one major unit (2 for cents, 0 for yen).
    pub const fn minor_exponent(&self) -> u32 {
        match self {
            Currency::Jpy => 0,
            _ => 2,
        }
    }

    /// Three-letter ISO code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Jpy => "JPY",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Usd
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "CAD" => Ok(Currency::Cad),
            "AUD" => Ok(Currency::Aud),
            "JPY" => Ok(Currency::Jpy),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest unit of its currency.
///
/// ## Design Decisions
/// - **i64 minor units**: no floating point anywhere in the engine
/// - **Currency carried alongside**: combining USD with EUR is a programming
///   error and surfaces as [`MoneyError::CurrencyMismatch`]
/// - **No `PartialOrd`**: ordering across currencies is meaningless, use
///   [`Money::try_compare`]
/// - **Subtraction floors at zero**: a discount can never produce a negative
///   price
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Catalog unit price ──► CartLine.unit_price ──► line total (× qty)      │
/// │                                                    │                    │
/// │                                                    ▼                    │
/// │  subtotal ──► discount (% of subtotal) ──► tax (% of subtotal−disc)     │
/// │                                                    │                    │
/// │                                                    ▼                    │
/// │                          PricingSnapshot.total ──► "53.46" in the UI    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    /// Creates a Money value from minor units (cents for USD).
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::{Currency, Money};
    ///
    /// let price = Money::new(1099, Currency::Usd); // $10.99
    /// assert_eq!(price.minor(), 1099);
    /// ```
    #[inline]
    pub const fn new(minor: i64, currency: Currency) -> Self {
        Money { minor, currency }
    }

    /// Zero in the given currency.
    #[inline]
    pub const fn zero(currency: Currency) -> Self {
        Money { minor: 0, currency }
    }

    /// Returns the amount in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the currency.
    #[inline]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Adds two values of the same currency.
    pub fn add(self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(&other)?;
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    /// Subtracts `other`, flooring the result at zero.
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::{Currency, Money};
    ///
    /// let a = Money::new(500, Currency::Usd);
    /// let b = Money::new(800, Currency::Usd);
    /// assert_eq!(a.subtract(b).unwrap().minor(), 0);
    /// ```
    pub fn subtract(self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(&other)?;
        let minor = self
            .minor
            .checked_sub(other.minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor.max(0), self.currency))
    }

    /// Multiplies by a line quantity.
    pub fn multiply(self, quantity: u32) -> Result<Money, MoneyError> {
        let minor = self
            .minor
            .checked_mul(i64::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    /// Takes `percent` (0-100) of this amount, rounded half-up to the minor unit.
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::{Currency, Money};
    ///
    /// let subtotal = Money::new(5500, Currency::Usd);
    /// assert_eq!(subtotal.apply_percentage(10).unwrap().minor(), 550);
    /// assert!(subtotal.apply_percentage(101).is_err());
    /// ```
    pub fn apply_percentage(self, percent: u8) -> Result<Money, MoneyError> {
        if percent > 100 {
            return Err(MoneyError::InvalidPercentage(u32::from(percent)));
        }
        Ok(self.apply_rate(TaxRate::from_bps(u32::from(percent) * 100)))
    }

    /// Takes a basis-point rate of this amount, rounded half-up.
    ///
    /// ## Implementation
    /// `(amount × bps + 5000) / 10000` in i128, so no intermediate overflows.
    /// Negative amounts round half away from zero, which mirrors the positive
    /// case.
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::{Currency, Money};
    /// use storefront_core::types::TaxRate;
    ///
    /// let taxable = Money::new(4950, Currency::Usd);
    /// let tax = taxable.apply_rate(TaxRate::from_bps(800)); // 8%
    /// // 49.50 × 8% = 3.96
    /// assert_eq!(tax.minor(), 396);
    /// ```
    pub fn apply_rate(self, rate: TaxRate) -> Money {
        let product = i128::from(self.minor) * i128::from(rate.bps());
        let rounded = round_half_up(product, BPS_PER_UNIT);
        // |amount × bps / 10000| <= |amount| for bps <= 10000; larger rates
        // saturate instead of wrapping.
        let minor = i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX });
        Money::new(minor, self.currency)
    }

    /// Orders two values of the same currency.
    pub fn try_compare(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.minor.cmp(&other.minor))
    }

    /// Sums an iterator of values, all of which must be in `currency`.
    pub fn sum<I>(currency: Currency, values: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = Money>,
    {
        values
            .into_iter()
            .try_fold(Money::zero(currency), |acc, value| acc.add(value))
    }

    /// Renders the amount as a plain decimal string ("10.99", "-5.50", "1200").
    ///
    /// UI boundary only.
    pub fn to_decimal_string(&self) -> String {
        let exponent = self.currency.minor_exponent();
        if exponent == 0 {
            return self.minor.to_string();
        }
        let scale = 10_u64.pow(exponent);
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        format!(
            "{}{}.{:0width$}",
            sign,
            abs / scale,
            abs % scale,
            width = exponent as usize
        )
    }

    /// Parses a non-negative decimal string ("10.99", "10.9", "10") at the UI
    /// boundary.
    ///
    /// ## Rules
    /// - Only ASCII digits and a single `.` are accepted
    /// - At most `minor_exponent` fractional digits; excess precision is an
    ///   error rather than a silent rounding
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::{Currency, Money};
    ///
    /// assert_eq!(Money::parse_decimal("10.9", Currency::Usd).unwrap().minor(), 1090);
    /// assert!(Money::parse_decimal("10.999", Currency::Usd).is_err());
    /// assert!(Money::parse_decimal("abc", Currency::Usd).is_err());
    /// ```
    pub fn parse_decimal(input: &str, currency: Currency) -> Result<Money, MoneyError> {
        let trimmed = input.trim();
        let parse_err = |reason: &str| MoneyError::Parse {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (major_part, minor_part) = match trimmed.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (trimmed, ""),
        };

        if major_part.is_empty() || !major_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(parse_err("expected digits before the decimal point"));
        }
        if !minor_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(parse_err("expected digits after the decimal point"));
        }

        let exponent = currency.minor_exponent() as usize;
        if minor_part.len() > exponent {
            return Err(parse_err("too many fractional digits for currency"));
        }
        if trimmed.contains('.') && minor_part.is_empty() {
            return Err(parse_err("missing digits after the decimal point"));
        }

        let major: i64 = major_part
            .parse()
            .map_err(|_| parse_err("amount out of range"))?;
        let padded = format!("{:0<width$}", minor_part, width = exponent);
        let minor: i64 = if padded.is_empty() {
            0
        } else {
            padded.parse().map_err(|_| parse_err("amount out of range"))?
        };

        let scale = 10_i64.pow(exponent as u32);
        let total = major
            .checked_mul(scale)
            .and_then(|m| m.checked_add(minor))
            .ok_or(MoneyError::Overflow)?;

        Ok(Money::new(total, currency))
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }
}

/// Divides with round-half-up (half away from zero for negatives).
fn round_half_up(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        -((-numerator + half) / denominator)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the ISO code and the decimal amount, e.g. `USD 10.99`.
///
/// ## Note
/// This is for logs and debugging. The UI formats with its own locale rules
/// starting from [`Money::to_decimal_string`].
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.to_decimal_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
