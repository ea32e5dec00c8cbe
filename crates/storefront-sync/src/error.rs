//! # Sync Error Types
//!
//! Error types for the sync layer.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Collaborators  │  │     Session             │ │
//! │  │  (ConfigError)  │  │  (StoreError)   │  │   (SessionError)        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Unavailable    │  │  Detached               │ │
//! │  │  LoadFailed     │  │  Rejected       │  │  Validation / Cart      │ │
//! │  │  SaveFailed     │  │  Timeout        │  │  Coupon / Pricing       │ │
//! │  │                 │  │  Catalog...     │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  SyncError wraps all of the above plus storefront-core's CoreError.    │
//! │                                                                         │
//! │  A StoreError on a line write is NOT returned to the caller: the       │
//! │  session degrades it into PendingWrite + a SyncWriteFailed event.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use storefront_core::error::{CartError, CouponError, PricingError, ValidationError};
use storefront_core::CoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Store Error
// =============================================================================

/// Failures reported by (or while talking to) a remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Collaborator could not be reached.
    #[error("Remote cart store unavailable: {0}")]
    Unavailable(String),

    /// Collaborator refused a write.
    #[error("Remote cart store rejected write for {key}: {reason}")]
    Rejected { key: String, reason: String },

    /// Call did not resolve in time.
    #[error("Remote call timed out after {0} ms")]
    Timeout(u64),

    /// Catalog (coupons or stock) could not be read.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Remote cart violates local invariants (foreign currency, etc.).
    #[error("Remote cart is invalid: {0}")]
    InvalidCart(#[from] CartError),
}

impl StoreError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::CatalogUnavailable(_)
        )
    }
}

// =============================================================================
// Session Error
// =============================================================================

/// Errors returned to callers of a `SessionHandle`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Session is detached after logout; it accepts no further commands.
    #[error("Cart session is detached")]
    Detached,

    /// Session task has stopped.
    #[error("Cart session is shutting down")]
    ShuttingDown,

    /// Operation needs an authenticated identity.
    #[error("Cart session has no authenticated identity")]
    NotAuthenticated,

    #[error("Invalid intent: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Config Error
// =============================================================================

/// Configuration load/validate/save failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid storefront configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::InvalidConfig(err.to_string())
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Umbrella error for the sync crate.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Simulator scenario could not be read or parsed.
    #[error("Invalid scenario: {0}")]
    Scenario(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Scenario(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Scenario(err.to_string())
    }
}

impl SyncError {
    /// Returns true if this error is recoverable and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(err) | SyncError::Session(SessionError::Store(err)) => {
                err.is_retryable()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(StoreError::Timeout(2000).is_retryable());
        assert!(!StoreError::Rejected {
            key: "P1".into(),
            reason: "no".into()
        }
        .is_retryable());

        let err: SyncError = SessionError::Store(StoreError::Timeout(10)).into();
        assert!(err.is_retryable());
        let err: SyncError = SessionError::Detached.into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Rejected {
            key: "SHIRT/L".into(),
            reason: "locked".into(),
        };
        assert!(err.to_string().contains("SHIRT/L"));
        assert_eq!(
            StoreError::Timeout(2000).to_string(),
            "Remote call timed out after 2000 ms"
        );
    }

    #[test]
    fn test_config_error_category() {
        let err: SyncError = ConfigError::InvalidConfig("bad".into()).into();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(!err.is_retryable());
    }
}
