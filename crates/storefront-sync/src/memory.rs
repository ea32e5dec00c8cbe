//! # In-Memory Collaborators
//!
//! [`RemoteCartStore`] and [`CatalogSource`] implementations backed by
//! process memory. Used by tests and the `storefront-sim` binary.
//!
//! Both support failure and latency injection so the session's
//! PendingWrite, timeout and fail-closed paths can be exercised:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  InMemoryCartStore                                                      │
//! │    set_fail_writes(true)     every write → StoreError::Unavailable      │
//! │    fail_key(key)             writes for one key fail                    │
//! │    set_fail_fetch(true)      get_cart fails (merge → MergeFailed)       │
//! │    set_latency(d)            every call sleeps d first                  │
//! │    set_key_latency(key, d)   writes for one key sleep d first           │
//! │    writes()                  log of APPLIED writes, in apply order      │
//! │                                                                         │
//! │  InMemoryCatalog                                                        │
//! │    set_unavailable(true)     every call → CatalogUnavailable            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use storefront_core::cart::{CartLine, CartState};
use storefront_core::coupon::{CouponCatalog, CouponDefinition};
use storefront_core::money::Currency;
use storefront_core::types::LineKey;

use crate::error::StoreError;
use crate::store::{CatalogSource, RemoteCartStore};

// =============================================================================
// Write Log
// =============================================================================

/// A write that the in-memory store applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteRecord {
    Upsert {
        token: String,
        key: LineKey,
        quantity: u32,
    },
    Remove {
        token: String,
        key: LineKey,
    },
    Clear {
        token: String,
    },
}

// =============================================================================
// In-Memory Cart Store
// =============================================================================

#[derive(Debug, Default)]
struct StoreState {
    carts: HashMap<String, CartState>,
    writes: Vec<WriteRecord>,
    fail_writes: bool,
    fail_fetch: bool,
    failing_keys: HashSet<LineKey>,
    latency: Duration,
    key_latency: HashMap<LineKey, Duration>,
    calls: usize,
}

/// Authoritative cart store held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryCartStore {
    currency: Currency,
    max_lines: usize,
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryCartStore {
    /// Creates an empty store whose carts use `currency` and `max_lines`.
    pub fn new(currency: Currency, max_lines: usize) -> Self {
        InMemoryCartStore {
            currency,
            max_lines,
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    /// Replaces the cart stored for `token`.
    pub async fn seed(&self, token: &str, cart: CartState) {
        self.state.write().await.carts.insert(token.to_string(), cart);
    }

    /// Current stored cart for `token`.
    pub async fn cart(&self, token: &str) -> Option<CartState> {
        self.state.read().await.carts.get(token).cloned()
    }

    /// Writes applied so far.
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.state.read().await.writes.clone()
    }

    /// Number of calls received, including failed ones.
    pub async fn calls(&self) -> usize {
        self.state.read().await.calls
    }

    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.write().await.fail_writes = fail;
    }

    pub async fn set_fail_fetch(&self, fail: bool) {
        self.state.write().await.fail_fetch = fail;
    }

    /// Makes writes for `key` fail until [`InMemoryCartStore::heal_key`].
    pub async fn fail_key(&self, key: LineKey) {
        self.state.write().await.failing_keys.insert(key);
    }

    pub async fn heal_key(&self, key: &LineKey) {
        self.state.write().await.failing_keys.remove(key);
    }

    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    pub async fn set_key_latency(&self, key: LineKey, latency: Duration) {
        self.state.write().await.key_latency.insert(key, latency);
    }

    /// Counts the call and sleeps for the injected latency.
    async fn enter(&self, key: Option<&LineKey>) {
        let delay = {
            let mut state = self.state.write().await;
            state.calls += 1;
            key.and_then(|k| state.key_latency.get(k).copied())
                .unwrap_or(state.latency)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn empty_cart(&self) -> CartState {
        CartState::with_max_lines(self.currency, self.max_lines)
    }

    fn check_write(state: &StoreState, key: Option<&LineKey>) -> Result<(), StoreError> {
        if state.fail_writes {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        if let Some(key) = key {
            if state.failing_keys.contains(key) {
                return Err(StoreError::Unavailable(format!(
                    "injected write failure for {}",
                    key
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCartStore for InMemoryCartStore {
    async fn get_cart(&self, token: &str) -> Result<CartState, StoreError> {
        self.enter(None).await;
        let state = self.state.read().await;
        if state.fail_fetch {
            return Err(StoreError::Unavailable("injected fetch failure".into()));
        }
        Ok(state
            .carts
            .get(token)
            .cloned()
            .unwrap_or_else(|| self.empty_cart()))
    }

    async fn upsert_line(&self, token: &str, line: CartLine) -> Result<(), StoreError> {
        self.enter(Some(&line.key)).await;
        let mut state = self.state.write().await;
        Self::check_write(&state, Some(&line.key))?;

        let empty = self.empty_cart();
        let cart = state.carts.entry(token.to_string()).or_insert(empty);
        cart.upsert_line(
            line.key.clone(),
            i64::from(line.quantity),
            line.unit_price,
            line.stock_snapshot,
        )
        .map_err(|err| StoreError::Rejected {
            key: line.key.to_string(),
            reason: err.to_string(),
        })?;

        debug!(token, key = %line.key, quantity = line.quantity, "Remote upsert applied");
        state.writes.push(WriteRecord::Upsert {
            token: token.to_string(),
            key: line.key,
            quantity: line.quantity,
        });
        Ok(())
    }

    async fn remove_line(&self, token: &str, key: &LineKey) -> Result<(), StoreError> {
        self.enter(Some(key)).await;
        let mut state = self.state.write().await;
        Self::check_write(&state, Some(key))?;

        if let Some(cart) = state.carts.get_mut(token) {
            cart.remove_line(key);
        }
        state.writes.push(WriteRecord::Remove {
            token: token.to_string(),
            key: key.clone(),
        });
        Ok(())
    }

    async fn clear(&self, token: &str) -> Result<(), StoreError> {
        self.enter(None).await;
        let mut state = self.state.write().await;
        Self::check_write(&state, None)?;

        if let Some(cart) = state.carts.get_mut(token) {
            cart.clear();
        }
        state.writes.push(WriteRecord::Clear {
            token: token.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// In-Memory Catalog
// =============================================================================

#[derive(Debug, Default)]
struct CatalogState {
    coupons: CouponCatalog,
    stock: HashMap<LineKey, i64>,
    unavailable: bool,
}

/// Coupon and stock catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_coupon(&self, definition: CouponDefinition) {
        self.state.write().await.coupons.insert(definition);
    }

    pub async fn set_stock(&self, key: LineKey, available: i64) {
        self.state.write().await.stock.insert(key, available);
    }

    /// Forgets a line entirely (checkout sees it as unavailable).
    pub async fn remove_stock(&self, key: &LineKey) {
        self.state.write().await.stock.remove(key);
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn coupon_catalog(&self) -> Result<CouponCatalog, StoreError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(StoreError::CatalogUnavailable("injected catalog failure".into()));
        }
        Ok(state.coupons.clone())
    }

    async fn stock_levels(&self, keys: &[LineKey]) -> Result<HashMap<LineKey, i64>, StoreError> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(StoreError::CatalogUnavailable("injected catalog failure".into()));
        }
        Ok(keys
            .iter()
            .filter_map(|key| state.stock.get(key).map(|&n| (key.clone(), n)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::coupon::CouponKind;
    use storefront_core::money::Money;

    fn line(id: &str, quantity: u32) -> CartLine {
        CartLine {
            key: LineKey::product(id),
            quantity,
            unit_price: Money::new(1000, Currency::Usd),
            stock_snapshot: 10,
        }
    }

    #[tokio::test]
    async fn test_store_upsert_is_idempotent() {
        let store = InMemoryCartStore::new(Currency::Usd, 10);
        store.upsert_line("tok", line("P1", 3)).await.unwrap();
        store.upsert_line("tok", line("P1", 3)).await.unwrap();

        let cart = store.get_cart("tok").await.unwrap();
        assert_eq!(cart.quantity_of(&LineKey::product("P1")), 3);
        assert_eq!(store.writes().await.len(), 2);
    }

    #[tokio::test]
    async fn test_store_unknown_token_is_empty_cart() {
        let store = InMemoryCartStore::new(Currency::Usd, 10);
        assert!(store.get_cart("nobody").await.unwrap().is_empty());
        // Removing from a missing cart is fine
        store.remove_line("nobody", &LineKey::product("P1")).await.unwrap();
        store.clear("nobody").await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_injection() {
        let store = InMemoryCartStore::new(Currency::Usd, 10);
        store.fail_key(LineKey::product("P1")).await;

        let err = store.upsert_line("tok", line("P1", 1)).await.unwrap_err();
        assert!(err.is_retryable());
        store.upsert_line("tok", line("P2", 1)).await.unwrap();

        store.heal_key(&LineKey::product("P1")).await;
        store.upsert_line("tok", line("P1", 1)).await.unwrap();

        store.set_fail_fetch(true).await;
        assert!(store.get_cart("tok").await.is_err());
        assert_eq!(store.calls().await, 4);
    }

    #[tokio::test]
    async fn test_store_rejects_foreign_currency() {
        let store = InMemoryCartStore::new(Currency::Usd, 10);
        let mut euro = line("P1", 1);
        euro.unit_price = Money::new(100, Currency::Eur);
        let err = store.upsert_line("tok", euro).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_stock_and_coupons() {
        let catalog = InMemoryCatalog::new();
        catalog.set_stock(LineKey::product("P1"), 4).await;
        catalog
            .insert_coupon(CouponDefinition::new("SAVE10", CouponKind::Percentage(10)))
            .await;

        let keys = vec![LineKey::product("P1"), LineKey::product("P9")];
        let stock = catalog.stock_levels(&keys).await.unwrap();
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[&LineKey::product("P1")], 4);
        assert!(catalog.coupon_catalog().await.unwrap().get("save10").is_some());

        catalog.set_unavailable(true).await;
        assert!(catalog.stock_levels(&keys).await.is_err());
    }
}
