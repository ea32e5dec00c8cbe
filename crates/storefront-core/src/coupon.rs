//! # Coupon Engine
//!
//! Validates coupon codes against a cart subtotal and tracks the lifecycle of
//! an applied coupon.
//!
//! ## Validation Rules (applied in order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate(code, subtotal, catalog, now)                                 │
//! │       │                                                                 │
//! │       ├── 1. code unknown?            → CouponError::NotFound           │
//! │       │                                                                 │
//! │       ├── 2. percent over 100?        → CouponError::Misconfigured      │
//! │       │                                                                 │
//! │       ├── 3. subtotal < min_subtotal? → CouponError::MinimumNotMet      │
//! │       │                                                                 │
//! │       ├── 4. expired or used up?      → CouponError::Expired            │
//! │       │                                                                 │
//! │       └── 5. OK → CouponDescriptor { validated: true }                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Applied Coupon Lifecycle
//! ```text
//!   apply ──► ACTIVE ──(subtotal drops below minimum)──► INACTIVE
//!               ▲                                          │
//!               └────────(subtotal rises again)────────────┘
//!
//!   INACTIVE coupons stay visible with a zero discount until the user
//!   removes or re-applies them. Every flip is reported as a transition so
//!   the caller can emit an event; totals never change silently.
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CouponError, ExpiryReason};
use crate::money::Money;
use crate::validation::validate_percentage;

// =============================================================================
// Coupon Kind & Descriptor
// =============================================================================

/// What a coupon grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "percent", rename_all = "snake_case")]
pub enum CouponKind {
    /// Percentage off the subtotal (0-100).
    Percentage(u8),
    /// Shipping is free regardless of threshold.
    FreeShipping,
    /// Percentage off the subtotal plus free shipping.
    Both(u8),
}

impl CouponKind {
    /// Percentage off the subtotal; zero for shipping-only coupons.
    pub fn percentage(&self) -> u8 {
        match self {
            CouponKind::Percentage(p) | CouponKind::Both(p) => *p,
            CouponKind::FreeShipping => 0,
        }
    }

    pub fn grants_free_shipping(&self) -> bool {
        matches!(self, CouponKind::FreeShipping | CouponKind::Both(_))
    }
}

/// Result of a successful validation, held by the session.
///
/// `validated == false` marks a demoted coupon: still displayed, but it
/// contributes neither discount nor free shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CouponDescriptor {
    pub code: String,
    pub kind: CouponKind,
    pub validated: bool,
}

// =============================================================================
// Coupon Definitions (catalog collaborator data)
// =============================================================================

/// A coupon as defined by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponDefinition {
    pub code: String,
    pub kind: CouponKind,
    /// Minimum cart subtotal for eligibility.
    #[serde(default)]
    pub min_subtotal: Option<Money>,
    /// Coupon is invalid at and after this instant.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Total permitted redemptions.
    #[serde(default)]
    pub max_uses: Option<u32>,
    /// Redemptions so far.
    #[serde(default)]
    pub times_used: u32,
}

impl CouponDefinition {
    /// A coupon with no minimum, expiry or usage cap.
    pub fn new(code: impl Into<String>, kind: CouponKind) -> Self {
        CouponDefinition {
            code: normalize_code(&code.into()),
            kind,
            min_subtotal: None,
            expires_at: None,
            max_uses: None,
            times_used: 0,
        }
    }

    pub fn with_min_subtotal(mut self, minimum: Money) -> Self {
        self.min_subtotal = Some(minimum);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_usage(mut self, max_uses: u32, times_used: u32) -> Self {
        self.max_uses = Some(max_uses);
        self.times_used = times_used;
        self
    }
}

/// Read-only snapshot of coupon definitions, keyed by normalized code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CouponDefinition>", into = "Vec<CouponDefinition>")]
pub struct CouponCatalog {
    coupons: HashMap<String, CouponDefinition>,
}

impl CouponCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a definition.
    pub fn insert(&mut self, mut definition: CouponDefinition) {
        definition.code = normalize_code(&definition.code);
        self.coupons.insert(definition.code.clone(), definition);
    }

    /// Looks up a code, case-insensitively.
    pub fn get(&self, code: &str) -> Option<&CouponDefinition> {
        self.coupons.get(&normalize_code(code))
    }

    pub fn len(&self) -> usize {
        self.coupons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coupons.is_empty()
    }
}

impl From<Vec<CouponDefinition>> for CouponCatalog {
    fn from(definitions: Vec<CouponDefinition>) -> Self {
        let mut catalog = CouponCatalog::new();
        for definition in definitions {
            catalog.insert(definition);
        }
        catalog
    }
}

impl From<CouponCatalog> for Vec<CouponDefinition> {
    fn from(catalog: CouponCatalog) -> Self {
        let mut definitions: Vec<CouponDefinition> = catalog.coupons.into_values().collect();
        definitions.sort_by(|a, b| a.code.cmp(&b.code));
        definitions
    }
}

/// Codes are compared trimmed and uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

// =============================================================================
// Validation
// =============================================================================

/// Validates `code` against `subtotal`.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use storefront_core::coupon::{validate, CouponCatalog, CouponDefinition, CouponKind};
/// use storefront_core::money::{Currency, Money};
///
/// let mut catalog = CouponCatalog::new();
/// catalog.insert(
///     CouponDefinition::new("SAVE10", CouponKind::Percentage(10))
///         .with_min_subtotal(Money::new(5000, Currency::Usd)),
/// );
///
/// let ok = validate("save10", Money::new(5500, Currency::Usd), &catalog, Utc::now());
/// assert!(ok.unwrap().validated);
///
/// let low = validate("SAVE10", Money::new(4000, Currency::Usd), &catalog, Utc::now());
/// assert!(low.is_err());
/// ```
pub fn validate(
    code: &str,
    subtotal: Money,
    catalog: &CouponCatalog,
    now: DateTime<Utc>,
) -> Result<CouponDescriptor, CouponError> {
    let normalized = normalize_code(code);
    let definition = catalog.get(&normalized).ok_or_else(|| CouponError::NotFound {
        code: normalized.clone(),
    })?;

    validate_percentage(u32::from(definition.kind.percentage())).map_err(|source| {
        CouponError::Misconfigured {
            code: normalized.clone(),
            source,
        }
    })?;

    if let Some(minimum) = definition.min_subtotal {
        if subtotal.try_compare(&minimum)? == Ordering::Less {
            return Err(CouponError::MinimumNotMet {
                code: normalized,
                minimum,
                subtotal,
            });
        }
    }

    if let Some(expires_at) = definition.expires_at {
        if now >= expires_at {
            return Err(CouponError::Expired {
                code: normalized,
                reason: ExpiryReason::PastExpiry,
                expired_at: Some(expires_at),
            });
        }
    }

    if let Some(max_uses) = definition.max_uses {
        if definition.times_used >= max_uses {
            return Err(CouponError::Expired {
                code: normalized,
                reason: ExpiryReason::UsageExhausted,
                expired_at: None,
            });
        }
    }

    Ok(CouponDescriptor {
        code: normalized,
        kind: definition.kind,
        validated: true,
    })
}

// =============================================================================
// Applied Coupon
// =============================================================================

/// Outcome of re-validating an applied coupon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponTransition {
    /// Eligibility did not change.
    Unchanged,
    /// The coupon stopped qualifying; its discount is now zero.
    Deactivated(CouponError),
    /// A previously inactive coupon qualifies again.
    Reactivated,
}

/// A coupon the user applied, active or demoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    descriptor: CouponDescriptor,
    inactive_reason: Option<CouponError>,
}

impl AppliedCoupon {
    /// Wraps a freshly validated descriptor.
    pub fn new(descriptor: CouponDescriptor) -> Self {
        AppliedCoupon {
            inactive_reason: None,
            descriptor: CouponDescriptor {
                validated: true,
                ..descriptor
            },
        }
    }

    /// The descriptor as displayed (possibly `validated == false`).
    pub fn descriptor(&self) -> &CouponDescriptor {
        &self.descriptor
    }

    /// The descriptor only while it is active.
    pub fn effective(&self) -> Option<&CouponDescriptor> {
        self.descriptor.validated.then_some(&self.descriptor)
    }

    pub fn is_active(&self) -> bool {
        self.descriptor.validated
    }

    /// Why the coupon is inactive, if it is.
    pub fn inactive_reason(&self) -> Option<&CouponError> {
        self.inactive_reason.as_ref()
    }

    /// Re-runs validation for a changed subtotal.
    ///
    /// Never assumes a cached verdict: minimum-subtotal eligibility can
    /// flip in either direction.
    pub fn revalidate(
        &mut self,
        subtotal: Money,
        catalog: &CouponCatalog,
        now: DateTime<Utc>,
    ) -> CouponTransition {
        match validate(&self.descriptor.code, subtotal, catalog, now) {
            Ok(fresh) => {
                let was_active = self.descriptor.validated;
                self.descriptor = fresh;
                self.inactive_reason = None;
                if was_active {
                    CouponTransition::Unchanged
                } else {
                    CouponTransition::Reactivated
                }
            }
            Err(err) => {
                let was_active = self.descriptor.validated;
                self.descriptor.validated = false;
                self.inactive_reason = Some(err.clone());
                if was_active {
                    CouponTransition::Deactivated(err)
                } else {
                    CouponTransition::Unchanged
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::money::Currency;
    use chrono::Duration;

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::Usd)
    }

    fn catalog() -> CouponCatalog {
        let mut catalog = CouponCatalog::new();
        catalog.insert(
            CouponDefinition::new("SAVE10", CouponKind::Percentage(10)).with_min_subtotal(usd(5000)),
        );
        catalog.insert(CouponDefinition::new("SHIPFREE", CouponKind::FreeShipping));
        catalog.insert(
            CouponDefinition::new("OLD", CouponKind::Both(5))
                .with_expiry(Utc::now() - Duration::days(1)),
        );
        catalog.insert(CouponDefinition::new("USEDUP", CouponKind::Percentage(20)).with_usage(3, 3));
        catalog
    }

    #[test]
    fn test_validate_success_normalizes_code() {
        let descriptor = validate("  save10 ", usd(5500), &catalog(), Utc::now()).unwrap();
        assert_eq!(descriptor.code, "SAVE10");
        assert_eq!(descriptor.kind, CouponKind::Percentage(10));
        assert!(descriptor.validated);
    }

    #[test]
    fn test_validate_unknown_code() {
        let err = validate("NOPE", usd(5500), &catalog(), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            CouponError::NotFound {
                code: "NOPE".to_string()
            }
        );
    }

    #[test]
    fn test_validate_minimum_not_met() {
        let err = validate("SAVE10", usd(4999), &catalog(), Utc::now()).unwrap_err();
        assert!(matches!(err, CouponError::MinimumNotMet { .. }));

        // Exactly the minimum qualifies
        assert!(validate("SAVE10", usd(5000), &catalog(), Utc::now()).is_ok());
    }

    #[test]
    fn test_validate_expired_and_exhausted() {
        let err = validate("OLD", usd(100), &catalog(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CouponError::Expired {
                reason: ExpiryReason::PastExpiry,
                ..
            }
        ));

        let err = validate("USEDUP", usd(100), &catalog(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CouponError::Expired {
                reason: ExpiryReason::UsageExhausted,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_discount_over_100_percent() {
        let mut catalog = catalog();
        catalog.insert(CouponDefinition::new("TOOMUCH", CouponKind::Percentage(150)));
        catalog.insert(CouponDefinition::new("ALLOFF", CouponKind::Both(100)));

        let err = validate("toomuch", usd(1000), &catalog, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CouponError::Misconfigured {
                ref code,
                source: ValidationError::OutOfRange { .. },
            } if code == "TOOMUCH"
        ));

        // 100% is the boundary, still allowed
        assert!(validate("ALLOFF", usd(1000), &catalog, Utc::now()).is_ok());
    }

    #[test]
    fn test_minimum_checked_before_expiry() {
        let mut catalog = CouponCatalog::new();
        catalog.insert(
            CouponDefinition::new("BOTHBAD", CouponKind::Percentage(10))
                .with_min_subtotal(usd(10_000))
                .with_expiry(Utc::now() - Duration::days(1)),
        );
        let err = validate("BOTHBAD", usd(100), &catalog, Utc::now()).unwrap_err();
        assert!(matches!(err, CouponError::MinimumNotMet { .. }));
    }

    #[test]
    fn test_validate_currency_mismatch() {
        let err = validate("SAVE10", Money::new(9000, Currency::Eur), &catalog(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CouponError::Money(_)));
    }

    #[test]
    fn test_kind_helpers() {
        assert_eq!(CouponKind::Percentage(15).percentage(), 15);
        assert!(!CouponKind::Percentage(15).grants_free_shipping());
        assert_eq!(CouponKind::FreeShipping.percentage(), 0);
        assert!(CouponKind::FreeShipping.grants_free_shipping());
        assert_eq!(CouponKind::Both(5).percentage(), 5);
        assert!(CouponKind::Both(5).grants_free_shipping());
    }

    #[test]
    fn test_applied_coupon_deactivates_and_reactivates() {
        let catalog = catalog();
        let now = Utc::now();
        let descriptor = validate("SAVE10", usd(5500), &catalog, now).unwrap();
        let mut applied = AppliedCoupon::new(descriptor);
        assert!(applied.effective().is_some());

        // Subtotal drops below the minimum
        let transition = applied.revalidate(usd(3000), &catalog, now);
        assert!(matches!(
            transition,
            CouponTransition::Deactivated(CouponError::MinimumNotMet { .. })
        ));
        assert!(!applied.is_active());
        assert!(applied.effective().is_none());
        // Still shown to the user
        assert_eq!(applied.descriptor().code, "SAVE10");
        assert!(applied.inactive_reason().is_some());

        // Staying below does not re-fire
        assert_eq!(
            applied.revalidate(usd(2000), &catalog, now),
            CouponTransition::Unchanged
        );

        // Rising back above re-activates
        assert_eq!(
            applied.revalidate(usd(6000), &catalog, now),
            CouponTransition::Reactivated
        );
        assert!(applied.is_active());
        assert!(applied.inactive_reason().is_none());
    }

    #[test]
    fn test_catalog_serde_as_list() {
        let json = serde_json::to_string(&catalog()).unwrap();
        let back: CouponCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 4);
        assert!(back.get("shipfree").is_some());
    }
}
