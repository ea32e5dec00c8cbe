//! # Pricing Engine
//!
//! One pure function from a cart, an optional coupon and two policies to a
//! [`PricingSnapshot`]. Client and server run the same code, so totals agree
//! to the minor unit.
//!
//! ## Computation Order (fixed)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. subtotal  = Σ unit_price × quantity                                 │
//! │  2. shipping  = 0 if subtotal >= threshold or coupon grants free        │
//! │                 shipping, else flat_fee                                 │
//! │  3. discount  = subtotal × coupon% (rounded half-up)                    │
//! │  4. tax       = (subtotal - discount) × tax_rate (rounded half-up)      │
//! │  5. total     = subtotal + shipping + tax - discount                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! Example: subtotal 55.00, threshold 50.00, tax 8%, coupon 10%
//!   shipping = 0.00, discount = 5.50, tax = 49.50 × 8% = 3.96
//!   total    = 55.00 + 0.00 + 3.96 - 5.50 = 53.46
//! ```
//!
//! Discount is applied before tax. An inactive coupon contributes nothing.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::CartState;
use crate::coupon::CouponDescriptor;
use crate::error::{MoneyError, PricingError};
use crate::money::{Currency, Money};
use crate::types::TaxRate;

// =============================================================================
// Policies
// =============================================================================

/// Flat-fee shipping with a free-shipping threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingPolicy {
    /// Subtotal at or above which shipping is free.
    pub free_threshold: Money,
    /// Fee charged below the threshold.
    pub flat_fee: Money,
}

impl ShippingPolicy {
    pub fn new(free_threshold: Money, flat_fee: Money) -> Self {
        ShippingPolicy {
            free_threshold,
            flat_fee,
        }
    }
}

/// Single-rate sales tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxPolicy {
    pub rate: TaxRate,
}

impl TaxPolicy {
    pub fn new(rate: TaxRate) -> Self {
        TaxPolicy { rate }
    }
}

// =============================================================================
// Pricing Snapshot
// =============================================================================

/// Immutable totals for a cart at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PricingSnapshot {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub tax_amount: Money,
    pub total: Money,
}

impl PricingSnapshot {
    /// All-zero snapshot (the price of an empty cart).
    pub fn zero(currency: Currency) -> Self {
        let zero = Money::zero(currency);
        PricingSnapshot {
            subtotal: zero,
            shipping_cost: zero,
            discount_amount: zero,
            tax_amount: zero,
            total: zero,
        }
    }

    pub fn currency(&self) -> Currency {
        self.total.currency()
    }
}

// =============================================================================
// Compute
// =============================================================================

/// Prices `cart`.
///
/// ## Errors
/// Only [`PricingError::Money`]: a policy in a different currency than the
/// cart, or an overflow of i64 minor units.
///
/// ## Example
/// ```rust
/// use storefront_core::cart::CartState;
/// use storefront_core::money::{Currency, Money};
/// use storefront_core::pricing::{compute, ShippingPolicy, TaxPolicy};
/// use storefront_core::types::{LineKey, TaxRate};
///
/// let usd = |minor| Money::new(minor, Currency::Usd);
/// let mut cart = CartState::new(Currency::Usd);
/// cart.upsert_line(LineKey::product("P1"), 1, usd(5500), 10).unwrap();
///
/// let shipping = ShippingPolicy::new(usd(5000), usd(599));
/// let tax = TaxPolicy::new(TaxRate::from_percent(8));
///
/// let snapshot = compute(&cart, None, &shipping, &tax).unwrap();
/// assert_eq!(snapshot.shipping_cost.minor(), 0);
/// assert_eq!(snapshot.tax_amount.minor(), 440);
/// assert_eq!(snapshot.total.minor(), 5940);
/// ```
pub fn compute(
    cart: &CartState,
    coupon: Option<&CouponDescriptor>,
    shipping: &ShippingPolicy,
    tax: &TaxPolicy,
) -> Result<PricingSnapshot, PricingError> {
    let currency = cart.currency();
    ensure_currency(currency, shipping.free_threshold)?;
    ensure_currency(currency, shipping.flat_fee)?;

    // Step 1
    let subtotal = cart.subtotal()?;
    if cart.is_empty() {
        return Ok(PricingSnapshot::zero(currency));
    }

    let coupon = coupon.filter(|c| c.validated);

    // Step 2
    let free_by_threshold = subtotal.minor() >= shipping.free_threshold.minor();
    let free_by_coupon = coupon.is_some_and(|c| c.kind.grants_free_shipping());
    let shipping_cost = if free_by_threshold || free_by_coupon {
        Money::zero(currency)
    } else {
        shipping.flat_fee
    };

    // Step 3
    let discount_amount = match coupon {
        Some(c) => subtotal.apply_percentage(c.kind.percentage())?,
        None => Money::zero(currency),
    };

    // Step 4
    let taxable = subtotal.subtract(discount_amount)?;
    let tax_amount = taxable.apply_rate(tax.rate);

    // Step 5
    let total = subtotal
        .add(shipping_cost)?
        .add(tax_amount)?
        .subtract(discount_amount)?;

    Ok(PricingSnapshot {
        subtotal,
        shipping_cost,
        discount_amount,
        tax_amount,
        total,
    })
}

fn ensure_currency(expected: Currency, value: Money) -> Result<(), MoneyError> {
    if value.currency() != expected {
        return Err(MoneyError::CurrencyMismatch {
            left: expected,
            right: value.currency(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::CouponKind;
    use crate::types::LineKey;

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::Usd)
    }

    fn cart_with(lines: &[(&str, i64, i64)]) -> CartState {
        let mut cart = CartState::new(Currency::Usd);
        for (id, qty, price) in lines {
            cart.upsert_line(LineKey::product(*id), *qty, usd(*price), 100)
                .unwrap();
        }
        cart
    }

    fn policies() -> (ShippingPolicy, TaxPolicy) {
        (
            ShippingPolicy::new(usd(5000), usd(599)),
            TaxPolicy::new(TaxRate::from_percent(8)),
        )
    }

    fn coupon(kind: CouponKind, validated: bool) -> CouponDescriptor {
        CouponDescriptor {
            code: "TEST".to_string(),
            kind,
            validated,
        }
    }

    #[test]
    fn test_no_coupon_above_threshold() {
        let (shipping, tax) = policies();
        let cart = cart_with(&[("P1", 2, 2000), ("P2", 1, 1500)]);

        let snapshot = compute(&cart, None, &shipping, &tax).unwrap();
        assert_eq!(snapshot.subtotal, usd(5500));
        assert_eq!(snapshot.shipping_cost, usd(0));
        assert_eq!(snapshot.discount_amount, usd(0));
        assert_eq!(snapshot.tax_amount, usd(440));
        assert_eq!(snapshot.total, usd(5940));
    }

    #[test]
    fn test_discount_applied_before_tax() {
        let (shipping, tax) = policies();
        let cart = cart_with(&[("P1", 1, 5500)]);
        let ten_off = coupon(CouponKind::Percentage(10), true);

        let snapshot = compute(&cart, Some(&ten_off), &shipping, &tax).unwrap();
        assert_eq!(snapshot.discount_amount, usd(550));
        assert_eq!(snapshot.tax_amount, usd(396));
        assert_eq!(snapshot.total, usd(5346));
    }

    #[test]
    fn test_flat_fee_below_threshold() {
        let (shipping, tax) = policies();
        let cart = cart_with(&[("P1", 1, 4999)]);

        let snapshot = compute(&cart, None, &shipping, &tax).unwrap();
        assert_eq!(snapshot.shipping_cost, usd(599));
        // 49.99 × 8% = 3.9992 → 4.00
        assert_eq!(snapshot.tax_amount, usd(400));
        assert_eq!(snapshot.total, usd(4999 + 599 + 400));
    }

    #[test]
    fn test_free_shipping_coupon() {
        let (shipping, tax) = policies();
        let cart = cart_with(&[("P1", 1, 1000)]);

        let free = coupon(CouponKind::FreeShipping, true);
        let snapshot = compute(&cart, Some(&free), &shipping, &tax).unwrap();
        assert_eq!(snapshot.shipping_cost, usd(0));
        assert_eq!(snapshot.discount_amount, usd(0));

        let both = coupon(CouponKind::Both(20), true);
        let snapshot = compute(&cart, Some(&both), &shipping, &tax).unwrap();
        assert_eq!(snapshot.shipping_cost, usd(0));
        assert_eq!(snapshot.discount_amount, usd(200));
        assert_eq!(snapshot.tax_amount, usd(64));
        assert_eq!(snapshot.total, usd(1000 - 200 + 64));
    }

    #[test]
    fn test_inactive_coupon_contributes_nothing() {
        let (shipping, tax) = policies();
        let cart = cart_with(&[("P1", 1, 1000)]);
        let inactive = coupon(CouponKind::Both(50), false);

        let with = compute(&cart, Some(&inactive), &shipping, &tax).unwrap();
        let without = compute(&cart, None, &shipping, &tax).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_half_up_rounding() {
        let shipping = ShippingPolicy::new(usd(0), usd(0));
        let tax = TaxPolicy::new(TaxRate::from_bps(825));
        // 10.00 × 8.25% = 0.825 → 0.83
        let cart = cart_with(&[("P1", 1, 1000)]);
        let snapshot = compute(&cart, None, &shipping, &tax).unwrap();
        assert_eq!(snapshot.tax_amount, usd(83));

        // 0.15 × 10% = 0.015 → 0.02
        let cart = cart_with(&[("P1", 1, 15)]);
        let tenth = coupon(CouponKind::Percentage(10), true);
        let snapshot = compute(&cart, Some(&tenth), &shipping, &TaxPolicy::default()).unwrap();
        assert_eq!(snapshot.discount_amount, usd(2));
    }

    #[test]
    fn test_empty_cart_prices_to_zero() {
        let (shipping, tax) = policies();
        let cart = CartState::new(Currency::Usd);
        let snapshot = compute(&cart, None, &shipping, &tax).unwrap();
        assert_eq!(snapshot, PricingSnapshot::zero(Currency::Usd));
    }

    #[test]
    fn test_policy_currency_mismatch() {
        let shipping = ShippingPolicy::new(
            Money::new(5000, Currency::Eur),
            Money::new(599, Currency::Eur),
        );
        let cart = cart_with(&[("P1", 1, 1000)]);
        let err = compute(&cart, None, &shipping, &TaxPolicy::default()).unwrap_err();
        assert!(matches!(
            err,
            PricingError::Money(MoneyError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let (shipping, tax) = policies();
        let cart = cart_with(&[("P1", 3, 1234), ("P2", 7, 99), ("P3", 1, 45)]);
        let ten_off = coupon(CouponKind::Percentage(10), true);

        let first = compute(&cart, Some(&ten_off), &shipping, &tax).unwrap();
        for _ in 0..10 {
            assert_eq!(compute(&cart, Some(&ten_off), &shipping, &tax).unwrap(), first);
        }

        // Independent rebuild in a different insertion order agrees
        let reordered = cart_with(&[("P3", 1, 45), ("P1", 3, 1234), ("P2", 7, 99)]);
        assert_eq!(
            compute(&reordered, Some(&ten_off), &shipping, &tax).unwrap(),
            first
        );
    }
}
