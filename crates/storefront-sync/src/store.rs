//! # Collaborator Interfaces
//!
//! The sync layer talks to three external collaborators. None of them is
//! implemented here (see [`crate::memory`] for in-memory doubles).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       External Collaborators                            │
//! │                                                                         │
//! │  Identity        watch::Receiver<Identity>                              │
//! │  ─────────       (is_authenticated, session_token)                      │
//! │                  Guest → Authenticated starts a merge                   │
//! │                  Authenticated → Guest detaches the session             │
//! │                                                                         │
//! │  Persistence     RemoteCartStore (authoritative cart, by token)         │
//! │  ───────────     get_cart / upsert_line / remove_line / clear           │
//! │                                                                         │
//! │  Catalog         CatalogSource (read-only snapshots)                    │
//! │  ───────         coupon definitions, fresh stock per line key           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use storefront_core::cart::{CartLine, CartState};
use storefront_core::coupon::CouponCatalog;
use storefront_core::types::LineKey;

use crate::error::StoreError;

// =============================================================================
// Identity
// =============================================================================

/// Who the session belongs to, as published by the identity collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub is_authenticated: bool,
    pub session_token: Option<String>,
}

impl Identity {
    /// Anonymous visitor.
    pub fn guest() -> Self {
        Identity::default()
    }

    /// Logged-in user with a session token.
    pub fn authenticated(token: impl Into<String>) -> Self {
        Identity {
            is_authenticated: true,
            session_token: Some(token.into()),
        }
    }

    /// Token usable against the remote store, only while authenticated.
    pub fn token(&self) -> Option<&str> {
        if self.is_authenticated {
            self.session_token.as_deref()
        } else {
            None
        }
    }
}

// =============================================================================
// Remote Cart Store
// =============================================================================

/// The authoritative, server-held cart.
///
/// Implementations must make each call idempotent: re-sending the same
/// upsert, remove or clear leaves the stored cart unchanged.
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Fetches the cart stored for `token` (empty if none).
    async fn get_cart(&self, token: &str) -> Result<CartState, StoreError>;

    /// Inserts or replaces one line.
    async fn upsert_line(&self, token: &str, line: CartLine) -> Result<(), StoreError>;

    /// Removes one line; absent keys are not an error.
    async fn remove_line(&self, token: &str, key: &LineKey) -> Result<(), StoreError>;

    /// Empties the cart.
    async fn clear(&self, token: &str) -> Result<(), StoreError>;
}

// =============================================================================
// Catalog Source
// =============================================================================

/// Read-only catalog data needed by coupons and checkout.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Current coupon definitions.
    async fn coupon_catalog(&self) -> Result<CouponCatalog, StoreError>;

    /// Fresh available stock for each requested key.
    ///
    /// Keys the catalog does not know are omitted from the result.
    async fn stock_levels(&self, keys: &[LineKey]) -> Result<HashMap<LineKey, i64>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_token_only_when_authenticated() {
        assert_eq!(Identity::guest().token(), None);
        assert_eq!(Identity::authenticated("tok-1").token(), Some("tok-1"));

        let stale = Identity {
            is_authenticated: false,
            session_token: Some("old".to_string()),
        };
        assert_eq!(stale.token(), None);
    }
}
