//! # Session Events & Views
//!
//! What a cart session publishes to the UI.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  watch::Receiver<CartView>     latest state, always current             │
//! │  ──────────────────────────    lines, coupon, pricing, state,           │
//! │                                revisions, pending keys                  │
//! │                                                                         │
//! │  broadcast::Receiver<SyncEvent>   things the user should be told        │
//! │  ───────────────────────────────                                        │
//! │  CouponDeactivated   discount dropped to zero (subtotal below minimum)  │
//! │  CouponReactivated   discount restored                                  │
//! │  SyncWriteFailed     remote write failed, local value kept              │
//! │  SyncWriteRecovered  key caught up with the remote store                │
//! │  MergeCompleted      guest cart merged into the account cart            │
//! │  MergeFailed         remote fetch failed, still LocalOnly               │
//! │  Detached            logout; carries the parked cart if any             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use storefront_core::cart::{CartLine, CartState};
use storefront_core::coupon::CouponDescriptor;
use storefront_core::error::CouponError;
use storefront_core::pricing::PricingSnapshot;
use storefront_core::types::LineKey;

use crate::queue::WriteKey;

// =============================================================================
// Session State
// =============================================================================

/// Sync state machine.
///
/// ```text
///   LocalOnly ──identity──► Merging ──► Synced ◄──► PendingWrite
///       ▲                      │                         │
///       └────MergeFailed───────┘         logout ─────────┴──► Detached
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Guest session, or authenticated but not yet merged.
    #[default]
    LocalOnly,
    /// Remote cart fetch in progress.
    Merging,
    /// Local and remote agree, modulo in-flight writes.
    Synced,
    /// At least one key's last remote write failed.
    PendingWrite,
    /// Logged out; terminal.
    Detached,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::LocalOnly => write!(f, "local_only"),
            SessionState::Merging => write!(f, "merging"),
            SessionState::Synced => write!(f, "synced"),
            SessionState::PendingWrite => write!(f, "pending_write"),
            SessionState::Detached => write!(f, "detached"),
        }
    }
}

// =============================================================================
// Cart View
// =============================================================================

/// Read-only snapshot of a session, published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub state: SessionState,
    pub cart: CartState,
    /// Applied coupon as displayed; `validated == false` when inactive.
    pub coupon: Option<CouponDescriptor>,
    pub pricing: PricingSnapshot,
    pub local_revision: u64,
    pub remote_revision: u64,
    /// Keys whose last remote write failed.
    pub pending: Vec<WriteKey>,
    /// Writes queued or in flight.
    pub outstanding_writes: usize,
    pub authenticated: bool,
}

impl CartView {
    /// Lines in key order.
    pub fn lines(&self) -> Vec<&CartLine> {
        self.cart.sorted_lines()
    }

    pub fn quantity_of(&self, key: &LineKey) -> u32 {
        self.cart.quantity_of(key)
    }

    pub fn is_pending(&self, key: &WriteKey) -> bool {
        self.pending.contains(key)
    }

    /// Coupon that currently contributes to pricing.
    pub fn active_coupon(&self) -> Option<&CouponDescriptor> {
        self.coupon.as_ref().filter(|c| c.validated)
    }
}

// =============================================================================
// Sync Event
// =============================================================================

/// Notifications broadcast by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    CouponDeactivated {
        code: String,
        reason: CouponError,
    },
    CouponReactivated {
        code: String,
    },
    SyncWriteFailed {
        key: WriteKey,
        error: String,
        retryable: bool,
    },
    SyncWriteRecovered {
        key: WriteKey,
    },
    MergeCompleted {
        lines: usize,
        written: usize,
        dropped: Vec<LineKey>,
    },
    MergeFailed {
        error: String,
    },
    Detached {
        parked: Option<CartState>,
    },
}

impl SyncEvent {
    /// Short machine-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::CouponDeactivated { .. } => "coupon_deactivated",
            SyncEvent::CouponReactivated { .. } => "coupon_reactivated",
            SyncEvent::SyncWriteFailed { .. } => "sync_write_failed",
            SyncEvent::SyncWriteRecovered { .. } => "sync_write_recovered",
            SyncEvent::MergeCompleted { .. } => "merge_completed",
            SyncEvent::MergeFailed { .. } => "merge_failed",
            SyncEvent::Detached { .. } => "detached",
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::CouponDeactivated { code, reason } => {
                write!(f, "coupon {} deactivated: {}", code, reason)
            }
            SyncEvent::CouponReactivated { code } => write!(f, "coupon {} reactivated", code),
            SyncEvent::SyncWriteFailed { key, error, .. } => {
                write!(f, "write for {} failed: {}", key, error)
            }
            SyncEvent::SyncWriteRecovered { key } => write!(f, "write for {} recovered", key),
            SyncEvent::MergeCompleted {
                lines,
                written,
                dropped,
            } => write!(
                f,
                "merge completed: {} lines, {} written, {} dropped",
                lines,
                written,
                dropped.len()
            ),
            SyncEvent::MergeFailed { error } => write!(f, "merge failed: {}", error),
            SyncEvent::Detached { parked } => match parked {
                Some(cart) => write!(f, "detached, parked {} lines", cart.len()),
                None => write!(f, "detached"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::PendingWrite.to_string(), "pending_write");
        assert_eq!(SessionState::default(), SessionState::LocalOnly);
    }

    #[test]
    fn test_event_names_and_display() {
        let event = SyncEvent::SyncWriteFailed {
            key: WriteKey::Line(LineKey::variant("P1", "L")),
            error: "down".to_string(),
            retryable: true,
        };
        assert_eq!(event.name(), "sync_write_failed");
        assert_eq!(event.to_string(), "write for P1/L failed: down");
        assert_eq!(
            SyncEvent::Detached { parked: None }.to_string(),
            "detached"
        );
    }
}
