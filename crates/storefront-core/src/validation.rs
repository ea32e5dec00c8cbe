//! # Validation Module
//!
//! Input validation for cart intents, run before an intent touches a replica.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Storefront UI                                                 │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Cart session (storefront-sync)                               │
//! │  ├── THIS MODULE: identifiers, quantities, prices                      │
//! │  └── Rejected intents never reach the local replica                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: CartState invariants                                          │
//! │  ├── Key uniqueness, line capacity                                     │
//! │  └── Single currency                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::validation::{validate_product_id, validate_quantity};
//!
//! validate_product_id("SHIRT-001").unwrap();
//! validate_quantity(5, 999).unwrap();
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_IDENTIFIER_LEN: usize = 64;
const MAX_COUPON_CODE_LEN: usize = 32;

// =============================================================================
// String Validators
// =============================================================================

/// Checks the value exactly as given; surrounding whitespace is a format
/// error.
fn validate_identifier(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product identifier.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_product_id;
///
/// assert!(validate_product_id("SHIRT-001").is_ok());
/// assert!(validate_product_id("").is_err());
/// assert!(validate_product_id("has space").is_err());
/// ```
pub fn validate_product_id(product_id: &str) -> ValidationResult<()> {
    validate_identifier("product_id", product_id, MAX_IDENTIFIER_LEN)
}

/// Validates a variant composite such as `L-RED`.
///
/// `None` (no variant) is always valid.
pub fn validate_variant_key(variant_key: Option<&str>) -> ValidationResult<()> {
    match variant_key {
        Some(variant) => validate_identifier("variant_key", variant, MAX_IDENTIFIER_LEN),
        None => Ok(()),
    }
}

/// Validates a coupon code as typed by the user.
///
/// Surrounding whitespace is ignored; case is normalized later.
pub fn validate_coupon_code(code: &str) -> ValidationResult<()> {
    validate_identifier("coupon_code", code.trim(), MAX_COUPON_CODE_LEN)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a requested line quantity against the configured maximum.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart: Set Quantity                                                     │
/// │                                                                         │
/// │  User enters quantity: 5                                               │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5, max) ← THIS FUNCTION                             │
/// │       │                                                                 │
/// │       ├── qty <= 0?  → Error (use Remove instead)                      │
/// │       │                                                                 │
/// │       ├── qty > max? → Error                                           │
/// │       │                                                                 │
/// │       └── OK → SetQuantity intent proceeds                             │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64, max: i64) -> ValidationResult<()> {
    if qty <= 0 || qty > max {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max,
        });
    }

    Ok(())
}

/// Validates a unit price in minor units.
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_price_minor;
///
/// assert!(validate_price_minor(1099).is_ok());
/// assert!(validate_price_minor(0).is_ok());     // Free item
/// assert!(validate_price_minor(-100).is_err());
/// ```
pub fn validate_price_minor(minor: i64) -> ValidationResult<()> {
    if minor < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

/// Validates a coupon percentage.
pub fn validate_percentage(percent: u32) -> ValidationResult<()> {
    if percent > 100 {
        return Err(ValidationError::OutOfRange {
            field: "percentage".to_string(),
            min: 0,
            max: 100,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
