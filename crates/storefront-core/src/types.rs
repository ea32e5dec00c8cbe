//! # Domain Types
//!
//! Small value types shared by the cart, pricing and sync layers.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────────┐        ┌─────────────────────────┐        │
//! │  │        LineKey          │        │        TaxRate          │        │
//! │  │  ─────────────────────  │        │  ─────────────────────  │        │
//! │  │  product_id             │        │  bps (u32)              │        │
//! │  │  variant_key (Option)   │        │  800 = 8%               │        │
//! │  │  "SHIRT-1/L-RED"        │        │  825 = 8.25%            │        │
//! │  └─────────────────────────┘        └─────────────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25%, which whole percents cannot express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a whole percentage.
    #[inline]
    pub const fn from_percent(percent: u32) -> Self {
        TaxRate(percent * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Line Key
// =============================================================================

/// Identity of a cart line: a product plus an optional variant composite
/// (size/color, etc.).
///
/// At most one line per key exists in any cart, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: String,
    pub variant_key: Option<String>,
}

impl LineKey {
    pub fn new(product_id: impl Into<String>, variant_key: Option<String>) -> Self {
        LineKey {
            product_id: product_id.into(),
            variant_key,
        }
    }

    /// Key for a product without variants.
    pub fn product(product_id: impl Into<String>) -> Self {
        LineKey::new(product_id, None)
    }

    /// Key for a specific variant of a product.
    pub fn variant(product_id: impl Into<String>, variant_key: impl Into<String>) -> Self {
        LineKey::new(product_id, Some(variant_key.into()))
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_key {
            Some(variant) => write!(f, "{}/{}", self.product_id, variant),
            None => f.write_str(&self.product_id),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.bps(), 825);
        assert_eq!(TaxRate::from_percent(8).bps(), 800);
        assert!(TaxRate::default().is_zero());
    }

    #[test]
    fn test_line_key_display() {
        assert_eq!(LineKey::product("P1").to_string(), "P1");
        assert_eq!(LineKey::variant("P1", "L-RED").to_string(), "P1/L-RED");
    }

    #[test]
    fn test_line_key_variants_are_distinct() {
        assert_ne!(LineKey::product("P1"), LineKey::variant("P1", "L"));
        assert_ne!(LineKey::variant("P1", "M"), LineKey::variant("P1", "L"));
    }
}
