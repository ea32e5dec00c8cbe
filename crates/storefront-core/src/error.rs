//! # Error Types
//!
//! Domain-specific error types for storefront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storefront-core errors (this file)                                    │
//! │  ├── MoneyError       - CurrencyMismatch (programming error), overflow │
//! │  ├── CartError        - Cart invariants (capacity, quantity)           │
//! │  ├── CouponError      - NotFound / MinimumNotMet / Expired / config    │
//! │  ├── PricingError     - Policy/cart currency disagreement              │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── CoreError        - Umbrella with #[from] conversions              │
//! │                                                                         │
//! │  storefront-sync errors (separate crate)                               │
//! │  └── SyncError        - Remote store, session, config failures         │
//! │                                                                         │
//! │  CheckoutBlocked (checkout.rs) is a verdict, not an error: it lists    │
//! │  every offending line so the UI can ask for corrections.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (code, key, amounts)
//! 3. Errors are enum variants, never String
//! 4. Pure code never swallows an error; only the sync layer may degrade one
//!    into a warning

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::money::{Currency, Money};
use crate::types::LineKey;

// =============================================================================
// Money Error
// =============================================================================

/// Failures of monetary arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Two amounts in different currencies were combined.
    ///
    /// This is a programming error: a cart, its policies and its coupons
    /// always share one currency.
    #[error("Currency mismatch: cannot combine {left} with {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// Result does not fit in i64 minor units.
    #[error("Monetary amount overflow")]
    Overflow,

    /// Percentage outside 0-100.
    #[error("Percentage must be between 0 and 100, got {0}")]
    InvalidPercentage(u32),

    /// Unknown ISO currency code.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// Decimal string could not be parsed at the UI boundary.
    #[error("Invalid amount '{input}': {reason}")]
    Parse { input: String, reason: String },
}

// =============================================================================
// Cart Error
// =============================================================================

/// Violations of cart invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Adding a new line would exceed the configured maximum.
    #[error("Cart cannot have more than {max} lines")]
    CartFull { max: usize },

    /// Quantity does not fit the line quantity type or configured limit.
    #[error("Quantity {requested} for {key} exceeds maximum allowed ({max})")]
    QuantityTooLarge {
        key: LineKey,
        requested: i64,
        max: i64,
    },

    /// Monetary failure (usually a unit price in the wrong currency).
    #[error(transparent)]
    Money(#[from] MoneyError),
}

// =============================================================================
// Coupon Error
// =============================================================================

/// Why a coupon is ineligible for the exhausted/expired case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// Past its expiry timestamp.
    PastExpiry,
    /// All permitted redemptions are used.
    UsageExhausted,
}

impl std::fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryReason::PastExpiry => write!(f, "expired"),
            ExpiryReason::UsageExhausted => write!(f, "usage limit reached"),
        }
    }
}

/// Coupon validation failures.
///
/// All variants are recoverable and user-facing; the cart is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    /// No coupon with this code exists.
    #[error("Coupon {code} not found")]
    NotFound { code: String },

    /// Cart subtotal is below the coupon's minimum.
    #[error("Coupon {code} requires a subtotal of at least {minimum}, cart has {subtotal}")]
    MinimumNotMet {
        code: String,
        minimum: Money,
        subtotal: Money,
    },

    /// Coupon is past its expiry or has no redemptions left.
    #[error("Coupon {code} is no longer valid: {reason}")]
    Expired {
        code: String,
        reason: ExpiryReason,
        expired_at: Option<DateTime<Utc>>,
    },

    /// Coupon definition itself is unusable (e.g. a discount over 100%).
    #[error("Coupon {code} is misconfigured: {source}")]
    Misconfigured {
        code: String,
        source: ValidationError,
    },

    /// Coupon minimum is in a different currency than the cart.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl CouponError {
    /// The code the failure refers to, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            CouponError::NotFound { code }
            | CouponError::MinimumNotMet { code, .. }
            | CouponError::Expired { code, .. }
            | CouponError::Misconfigured { code, .. } => Some(code),
            CouponError::Money(_) => None,
        }
    }
}

// =============================================================================
// Pricing Error
// =============================================================================

/// Pricing failures. Pricing is pure, so the only failures are
/// programming errors in the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error(transparent)]
    Money(#[from] MoneyError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before an intent touches the cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Core Error
// =============================================================================

/// Umbrella for every error this crate can produce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Unit Tests
// =============================================================================
