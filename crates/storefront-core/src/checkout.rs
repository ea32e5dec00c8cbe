//! # Checkout Checks
//!
//! The pure half of the checkout gate: given a cart, the applied coupon and
//! freshly fetched stock/coupon snapshots, list everything that blocks the
//! order. The sync crate performs the fetch and calls [`evaluate`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  evaluate(cart, coupon, stock, catalog, now)                            │
//! │       │                                                                 │
//! │       ├── empty cart                      → EmptyCart                   │
//! │       ├── every line (sorted by key)                                    │
//! │       │     ├── missing from stock        → LineUnavailable             │
//! │       │     └── stock < quantity          → InsufficientStock           │
//! │       └── active coupon re-validated      → Coupon(err)                 │
//! │                                                                         │
//! │  Fails closed with the FULL list. Quantities are never clamped.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cart::CartState;
use crate::coupon::{validate, CouponCatalog, CouponDescriptor};
use crate::error::CouponError;
use crate::types::LineKey;

/// One reason the order cannot be placed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutBlocked {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: LineKey,
        requested: u32,
        available: i64,
    },

    /// The catalog no longer reports stock for this line.
    #[error("{key} is no longer available")]
    LineUnavailable { key: LineKey },

    #[error("Coupon no longer applies: {0}")]
    Coupon(CouponError),

    /// Stock or coupons could not be fetched; checkout fails closed.
    #[error("Catalog unavailable: {reason}")]
    CatalogUnavailable { reason: String },
}

impl CheckoutBlocked {
    /// The cart line this verdict names, if any.
    pub fn line_key(&self) -> Option<&LineKey> {
        match self {
            CheckoutBlocked::InsufficientStock { key, .. }
            | CheckoutBlocked::LineUnavailable { key } => Some(key),
            _ => None,
        }
    }
}

/// Checks every line against fresh stock levels, in key order.
pub fn check_lines(cart: &CartState, stock: &HashMap<LineKey, i64>) -> Vec<CheckoutBlocked> {
    cart.sorted_lines()
        .into_iter()
        .filter_map(|line| match stock.get(&line.key) {
            None => Some(CheckoutBlocked::LineUnavailable {
                key: line.key.clone(),
            }),
            Some(&available) if available < i64::from(line.quantity) => {
                Some(CheckoutBlocked::InsufficientStock {
                    key: line.key.clone(),
                    requested: line.quantity,
                    available,
                })
            }
            Some(_) => None,
        })
        .collect()
}

/// Re-validates an applied coupon. Inactive coupons are skipped.
pub fn check_coupon(
    cart: &CartState,
    coupon: Option<&CouponDescriptor>,
    catalog: &CouponCatalog,
    now: DateTime<Utc>,
) -> Option<CheckoutBlocked> {
    let coupon = coupon.filter(|c| c.validated)?;
    let subtotal = match cart.subtotal() {
        Ok(subtotal) => subtotal,
        Err(err) => return Some(CheckoutBlocked::Coupon(err.into())),
    };
    validate(&coupon.code, subtotal, catalog, now)
        .err()
        .map(CheckoutBlocked::Coupon)
}

/// Full checkout verdict.
///
/// ## Example
/// ```rust
/// use std::collections::HashMap;
/// use chrono::Utc;
/// use storefront_core::cart::CartState;
/// use storefront_core::checkout::{evaluate, CheckoutBlocked};
/// use storefront_core::coupon::CouponCatalog;
/// use storefront_core::money::{Currency, Money};
/// use storefront_core::types::LineKey;
///
/// let mut cart = CartState::new(Currency::Usd);
/// cart.upsert_line(LineKey::product("P1"), 3, Money::new(100, Currency::Usd), 5).unwrap();
///
/// let stock = HashMap::from([(LineKey::product("P1"), 2)]);
/// let blocked = evaluate(&cart, None, &stock, &CouponCatalog::new(), Utc::now()).unwrap_err();
/// assert_eq!(blocked.len(), 1);
/// assert!(matches!(blocked[0], CheckoutBlocked::InsufficientStock { available: 2, .. }));
/// ```
pub fn evaluate(
    cart: &CartState,
    coupon: Option<&CouponDescriptor>,
    stock: &HashMap<LineKey, i64>,
    catalog: &CouponCatalog,
    now: DateTime<Utc>,
) -> Result<(), Vec<CheckoutBlocked>> {
    if cart.is_empty() {
        return Err(vec![CheckoutBlocked::EmptyCart]);
    }

    let mut blocked = check_lines(cart, stock);
    blocked.extend(check_coupon(cart, coupon, catalog, now));

    if blocked.is_empty() {
        Ok(())
    } else {
        Err(blocked)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::{CouponDefinition, CouponKind};
    use crate::money::{Currency, Money};

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::Usd)
    }

    fn cart() -> CartState {
        let mut cart = CartState::new(Currency::Usd);
        cart.upsert_line(LineKey::product("P1"), 2, usd(2000), 10).unwrap();
        cart.upsert_line(LineKey::variant("P2", "L"), 5, usd(300), 10).unwrap();
        cart.upsert_line(LineKey::product("P3"), 1, usd(4500), 10).unwrap();
        cart
    }

    #[test]
    fn test_all_lines_in_stock_passes() {
        let stock = HashMap::from([
            (LineKey::product("P1"), 2),
            (LineKey::variant("P2", "L"), 50),
            (LineKey::product("P3"), 1),
        ]);
        assert!(evaluate(&cart(), None, &stock, &CouponCatalog::new(), Utc::now()).is_ok());
    }

    #[test]
    fn test_blocks_list_every_offending_line() {
        let stock = HashMap::from([
            (LineKey::product("P1"), 1),
            (LineKey::variant("P2", "L"), 50),
        ]);
        let blocked = evaluate(&cart(), None, &stock, &CouponCatalog::new(), Utc::now())
            .unwrap_err();

        assert_eq!(
            blocked,
            vec![
                CheckoutBlocked::InsufficientStock {
                    key: LineKey::product("P1"),
                    requested: 2,
                    available: 1,
                },
                CheckoutBlocked::LineUnavailable {
                    key: LineKey::product("P3"),
                },
            ]
        );
        assert_eq!(blocked[0].line_key(), Some(&LineKey::product("P1")));
    }

    #[test]
    fn test_empty_cart_blocks() {
        let cart = CartState::new(Currency::Usd);
        let blocked = evaluate(&cart, None, &HashMap::new(), &CouponCatalog::new(), Utc::now())
            .unwrap_err();
        assert_eq!(blocked, vec![CheckoutBlocked::EmptyCart]);
    }

    #[test]
    fn test_coupon_revalidated_at_checkout() {
        let stock = HashMap::from([
            (LineKey::product("P1"), 10),
            (LineKey::variant("P2", "L"), 10),
            (LineKey::product("P3"), 10),
        ]);
        let applied = CouponDescriptor {
            code: "GONE".to_string(),
            kind: CouponKind::Percentage(10),
            validated: true,
        };

        // Coupon was withdrawn from the catalog since it was applied
        let blocked = evaluate(&cart(), Some(&applied), &stock, &CouponCatalog::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(
            blocked.as_slice(),
            [CheckoutBlocked::Coupon(CouponError::NotFound { .. })]
        ));

        // Still valid
        let mut catalog = CouponCatalog::new();
        catalog.insert(CouponDefinition::new("GONE", CouponKind::Percentage(10)));
        assert!(evaluate(&cart(), Some(&applied), &stock, &catalog, Utc::now()).is_ok());
    }

    #[test]
    fn test_inactive_coupon_not_revalidated() {
        let stock = HashMap::from([
            (LineKey::product("P1"), 10),
            (LineKey::variant("P2", "L"), 10),
            (LineKey::product("P3"), 10),
        ]);
        let inactive = CouponDescriptor {
            code: "GONE".to_string(),
            kind: CouponKind::Percentage(10),
            validated: false,
        };
        assert!(evaluate(&cart(), Some(&inactive), &stock, &CouponCatalog::new(), Utc::now()).is_ok());
    }
}
