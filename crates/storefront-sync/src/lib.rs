//! # storefront-sync: Cart Replica Sync Engine
//!
//! This crate keeps a client-held cart replica consistent with the
//! server-held authoritative cart, across guest sessions, login merges,
//! concurrent edits and transient network failures.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Cart Session Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 CartSession (one actor per session)              │  │
//! │  │                                                                  │  │
//! │  │  Spawned as a Tokio task, driven through a SessionHandle         │  │
//! │  │  Owns the local + remote replicas, coupon and pricing            │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  plan_merge    │  │  WriteQueue    │  │  CheckoutGate          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Guest cart +   │  │ Per-key order, │  │ Fresh stock + coupon   │    │
//! │  │ remote cart,   │  │ parallel keys, │  │ re-validation, fails   │    │
//! │  │ remote wins    │  │ timeout+backoff│  │ closed on outages      │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  COLLABORATORS (traits in `store`):                                    │
//! │  • Identity         - watch channel of (is_authenticated, token)       │
//! │  • RemoteCartStore  - get_cart / upsert_line / remove_line / clear     │
//! │  • CatalogSource    - coupon definitions, fresh stock                  │
//! │                                                                         │
//! │  OUTPUTS (to the UI):                                                  │
//! │  • watch<CartView>     - lines, coupon, pricing, state, pending keys   │
//! │  • broadcast<SyncEvent> - coupon deactivated, write failed, ...        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`session`] - `CartSession` actor and its `SessionHandle`
//! - [`merge`] - Guest/remote merge planning
//! - [`queue`] - Per-key remote write queue
//! - [`replica`] - Local/remote replicas with revisions
//! - [`events`] - `CartView` and `SyncEvent`
//! - [`checkout`] - `CheckoutGate`
//! - [`store`] - Collaborator traits and `Identity`
//! - [`memory`] - In-memory collaborators (tests, simulator)
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio::sync::watch;
//! use storefront_sync::{CartSession, Identity, StorefrontConfig};
//!
//! let config = Arc::new(StorefrontConfig::load_or_default(None));
//! let (identity_tx, identity_rx) = watch::channel(Identity::guest());
//!
//! let session = CartSession::new(config, store, catalog, identity_rx).spawn();
//! session.set_quantity(LineKey::product("P1"), 2, price, stock).await?;
//!
//! // Login: the guest cart merges into the account cart
//! identity_tx.send(Identity::authenticated(token))?;
//! let view = session.settled().await?;
//! println!("{} lines, total {}", view.cart.len(), view.pricing.total);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod merge;
pub mod queue;
pub mod replica;
pub mod session;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use checkout::CheckoutGate;
pub use config::{CartSettings, DetachPolicy, PricingSettings, StorefrontConfig, SyncSettings};
pub use error::{ConfigError, SessionError, StoreError, SyncError, SyncResult};
pub use events::{CartView, SessionState, SyncEvent};
pub use memory::{InMemoryCartStore, InMemoryCatalog, WriteRecord};
pub use merge::{plan_merge, MergePlan};
pub use queue::{WriteKey, WriteOp, WriteQueue};
pub use session::{CartIntent, CartSession, SessionHandle};
pub use store::{CatalogSource, Identity, RemoteCartStore};
