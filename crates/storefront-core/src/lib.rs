//! # storefront-core: Pure Cart & Pricing Logic
//!
//! This crate holds everything about a storefront cart that can be decided
//! without talking to anyone: money arithmetic, cart invariants, coupon
//! eligibility, pricing and the per-line checkout checks.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Storefront Cart Engine                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Storefront UI                                │   │
//! │  │   add / update / remove line ──► apply coupon ──► checkout      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ intents / watch(CartView)              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        storefront-sync (session actor, merge, write queue)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ storefront-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  money  │ │  cart   │ │ coupon  │ │ pricing │ │checkout │  │   │
//! │  │   │  Money  │ │CartState│ │validate │ │ compute │ │evaluate │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO CLOCK READS • NO NETWORK • PURE FUNCTIONS         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Fixed-point `Money` with half-up rounding
//! - [`types`] - `LineKey`, `TaxRate`
//! - [`cart`] - `CartState` and `CartLine`
//! - [`coupon`] - Coupon validation and applied-coupon lifecycle
//! - [`pricing`] - `compute` → `PricingSnapshot`
//! - [`checkout`] - Fail-closed checkout verdicts
//! - [`validation`] - Intent input validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output. `now` is a parameter.
//! 2. **Integer Money**: minor units in i64, never floats
//! 3. **Explicit Errors**: typed `thiserror` enums, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use storefront_core::cart::CartState;
//! use storefront_core::coupon::{CouponDescriptor, CouponKind};
//! use storefront_core::money::{Currency, Money};
//! use storefront_core::pricing::{compute, ShippingPolicy, TaxPolicy};
//! use storefront_core::types::{LineKey, TaxRate};
//!
//! let usd = |minor| Money::new(minor, Currency::Usd);
//!
//! let mut cart = CartState::new(Currency::Usd);
//! cart.upsert_line(LineKey::variant("SHIRT", "L-RED"), 2, usd(2000), 12).unwrap();
//! cart.upsert_line(LineKey::product("MUG"), 1, usd(1500), 4).unwrap();
//!
//! let coupon = CouponDescriptor {
//!     code: "SAVE10".to_string(),
//!     kind: CouponKind::Percentage(10),
//!     validated: true,
//! };
//! let shipping = ShippingPolicy::new(usd(5000), usd(599));
//! let tax = TaxPolicy::new(TaxRate::from_percent(8));
//!
//! let snapshot = compute(&cart, Some(&coupon), &shipping, &tax).unwrap();
//! assert_eq!(snapshot.subtotal.minor(), 5500);
//! assert_eq!(snapshot.discount_amount.minor(), 550);
//! assert_eq!(snapshot.tax_amount.minor(), 396);
//! assert_eq!(snapshot.total.minor(), 5346);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod checkout;
pub mod coupon;
pub mod error;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{CartLine, CartState, LineChange};
pub use checkout::CheckoutBlocked;
pub use coupon::{AppliedCoupon, CouponCatalog, CouponDescriptor, CouponKind, CouponTransition};
pub use error::{CartError, CoreError, CouponError, MoneyError, PricingError, ValidationError};
pub use money::{Currency, Money};
pub use pricing::{PricingSnapshot, ShippingPolicy, TaxPolicy};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

pub use cart::DEFAULT_MAX_LINES;

/// Default upper bound for a single line's quantity.
///
/// Prevents accidental over-ordering (typing 1000 instead of 10).
pub const DEFAULT_MAX_LINE_QUANTITY: i64 = 999;

/// Default cap applied to guest lines pushed to the remote cart at merge.
pub const DEFAULT_MAX_SYNC_QUANTITY: u32 = 99;
