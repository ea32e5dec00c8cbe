//! # Checkout Gate
//!
//! Final pre-checkout validation against FRESH catalog data. Stock snapshots
//! stored on cart lines are informational only; the gate always asks the
//! catalog again.
//!
//! ```text
//!   CartView ──► stock_levels(keys) ──┐
//!                                     ├──► evaluate() ──► Ok(()) | Vec<CheckoutBlocked>
//!   coupon?  ──► coupon_catalog()  ───┘
//! ```
//!
//! Fails closed: if the catalog cannot be reached in time, checkout is
//! blocked with [`CheckoutBlocked::CatalogUnavailable`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{info, warn};

use storefront_core::cart::CartState;
use storefront_core::checkout::{evaluate, CheckoutBlocked};
use storefront_core::coupon::{CouponCatalog, CouponDescriptor};
use storefront_core::types::LineKey;

use crate::error::StoreError;
use crate::events::CartView;
use crate::store::CatalogSource;

/// Runs checkout validation against a [`CatalogSource`].
#[derive(Clone)]
pub struct CheckoutGate {
    catalog: Arc<dyn CatalogSource>,
    fetch_timeout: Duration,
}

impl CheckoutGate {
    pub fn new(catalog: Arc<dyn CatalogSource>, fetch_timeout: Duration) -> Self {
        CheckoutGate {
            catalog,
            fetch_timeout,
        }
    }

    /// Validates `cart` (and the applied coupon, if active).
    ///
    /// Every blocking reason is reported, not just the first.
    pub async fn validate(
        &self,
        cart: &CartState,
        coupon: Option<&CouponDescriptor>,
    ) -> Result<(), Vec<CheckoutBlocked>> {
        if cart.is_empty() {
            return Err(vec![CheckoutBlocked::EmptyCart]);
        }

        let keys: Vec<LineKey> = cart.keys().cloned().collect();
        let stock = self.fetch_stock(&keys).await.map_err(fail_closed)?;

        let active = coupon.filter(|c| c.validated);
        let catalog = match active {
            Some(_) => self.fetch_coupons().await.map_err(fail_closed)?,
            None => CouponCatalog::new(),
        };

        let verdict = evaluate(cart, active, &stock, &catalog, Utc::now());
        match &verdict {
            Ok(()) => info!(lines = cart.len(), "Checkout validation passed"),
            Err(blocked) => {
                for reason in blocked {
                    warn!(%reason, "Checkout blocked");
                }
            }
        }
        verdict
    }

    /// Validates what a session is currently showing.
    pub async fn validate_view(&self, view: &CartView) -> Result<(), Vec<CheckoutBlocked>> {
        self.validate(&view.cart, view.coupon.as_ref()).await
    }

    async fn fetch_stock(&self, keys: &[LineKey]) -> Result<HashMap<LineKey, i64>, StoreError> {
        match timeout(self.fetch_timeout, self.catalog.stock_levels(keys)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout_ms())),
        }
    }

    async fn fetch_coupons(&self) -> Result<CouponCatalog, StoreError> {
        match timeout(self.fetch_timeout, self.catalog.coupon_catalog()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout_ms())),
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

fn fail_closed(err: StoreError) -> Vec<CheckoutBlocked> {
    warn!(error = %err, "Catalog unavailable, blocking checkout");
    vec![CheckoutBlocked::CatalogUnavailable {
        reason: err.to_string(),
    }]
}
