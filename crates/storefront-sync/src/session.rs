//! # Cart Session
//!
//! One actor per shopping session. It owns the local cart replica, applies
//! user intents optimistically, merges with the authoritative cart when an
//! identity appears, and pushes every change to the remote store through the
//! per-key [`WriteQueue`].
//!
//! ## Session Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CartSession (tokio task)                       │
//! │                                                                         │
//! │   SessionHandle ──mpsc──►  ┌───────────────────────────────────────┐   │
//! │   (mutate, retry, ...)      │  select! loop                         │   │
//! │                             │   • commands       → apply intent     │   │
//! │   Identity ─────watch────►  │   • identity       → merge / detach   │   │
//! │                             │   • write outcomes → pending/recover  │   │
//! │                             │   • merge fetch    → plan_merge       │   │
//! │                             │   • retry timer    → requeue          │   │
//! │                             └──────────┬────────────────────────────┘   │
//! │                                        │                                │
//! │            ┌───────────────────────────┼────────────────────────┐       │
//! │            ▼                           ▼                        ▼       │
//! │   watch<CartView>            broadcast<SyncEvent>       RemoteCartStore │
//! │   (UI, read-only)            (UI notifications)         (FuturesUnordered│
//! │                                                          + timeout)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Intent Flow
//! ```text
//!   intent ─► validate ─► apply to local replica ─► re-validate coupon
//!                                 │
//!          ┌──────────────────────┼──────────────────────┐
//!          ▼                      ▼                      ▼
//!      LocalOnly               Merging                 Synced
//!     (local only)       (recorded, replayed      (write enqueued,
//!                         on the merge result)     per-key ordered)
//! ```
//!
//! Local mutations are synchronous and immediately visible in the returned
//! [`CartView`]; the caller never waits on the remote store (except when
//! applying a coupon, which needs the coupon catalog).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use storefront_core::cart::CartState;
use storefront_core::coupon::{self, AppliedCoupon, CouponCatalog, CouponTransition};
use storefront_core::error::{CouponError, PricingError};
use storefront_core::money::Money;
use storefront_core::pricing::{self, PricingSnapshot, ShippingPolicy, TaxPolicy};
use storefront_core::types::LineKey;
use storefront_core::validation::{
    validate_coupon_code, validate_price_minor, validate_product_id, validate_quantity,
    validate_variant_key,
};

use crate::config::{DetachPolicy, StorefrontConfig};
use crate::error::{SessionError, StoreError};
use crate::events::{CartView, SessionState, SyncEvent};
use crate::merge::plan_merge;
use crate::queue::{QueuedWrite, WriteKey, WriteOp, WriteQueue};
use crate::replica::ReplicaPair;
use crate::store::{CatalogSource, Identity, RemoteCartStore};

/// Command channel depth.
const COMMAND_BUFFER: usize = 64;

// =============================================================================
// Intents
// =============================================================================

/// A user-level request against the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CartIntent {
    /// Replace the line's quantity (`<= 0` removes it).
    SetQuantity {
        key: LineKey,
        quantity: i64,
        unit_price: Money,
        stock_snapshot: i64,
    },
    /// Add `delta` to the current quantity, computed against the session's
    /// own replica so concurrent "add" clicks never lose updates.
    AddQuantity {
        key: LineKey,
        delta: i64,
        unit_price: Money,
        stock_snapshot: i64,
    },
    Remove {
        key: LineKey,
    },
    Clear,
    ApplyCoupon {
        code: String,
    },
    /// Drop the applied coupon (also acknowledges a deactivated one).
    RemoveCoupon,
}

impl CartIntent {
    /// True for intents that change cart lines.
    pub fn mutates_lines(&self) -> bool {
        !matches!(self, CartIntent::ApplyCoupon { .. } | CartIntent::RemoveCoupon)
    }
}

// =============================================================================
// Commands & Handle
// =============================================================================

enum SessionCommand {
    Mutate {
        intent: CartIntent,
        reply: oneshot::Sender<Result<CartView, SessionError>>,
    },
    RetryPending {
        reply: oneshot::Sender<Result<usize, SessionError>>,
    },
    RetryMerge {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<CartView>,
    },
    Shutdown,
}

/// Handle for talking to a running [`CartSession`].
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    cmd_tx: mpsc::Sender<SessionCommand>,
    view_rx: watch::Receiver<CartView>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Applies an intent and returns the resulting view.
    pub async fn mutate(&self, intent: CartIntent) -> Result<CartView, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Mutate { intent, reply }).await?;
        rx.await.map_err(|_| SessionError::ShuttingDown)?
    }

    pub async fn set_quantity(
        &self,
        key: LineKey,
        quantity: i64,
        unit_price: Money,
        stock_snapshot: i64,
    ) -> Result<CartView, SessionError> {
        self.mutate(CartIntent::SetQuantity {
            key,
            quantity,
            unit_price,
            stock_snapshot,
        })
        .await
    }

    pub async fn add_quantity(
        &self,
        key: LineKey,
        delta: i64,
        unit_price: Money,
        stock_snapshot: i64,
    ) -> Result<CartView, SessionError> {
        self.mutate(CartIntent::AddQuantity {
            key,
            delta,
            unit_price,
            stock_snapshot,
        })
        .await
    }

    pub async fn remove(&self, key: LineKey) -> Result<CartView, SessionError> {
        self.mutate(CartIntent::Remove { key }).await
    }

    pub async fn clear(&self) -> Result<CartView, SessionError> {
        self.mutate(CartIntent::Clear).await
    }

    pub async fn apply_coupon(&self, code: impl Into<String>) -> Result<CartView, SessionError> {
        self.mutate(CartIntent::ApplyCoupon { code: code.into() }).await
    }

    pub async fn remove_coupon(&self) -> Result<CartView, SessionError> {
        self.mutate(CartIntent::RemoveCoupon).await
    }

    /// Re-sends every key in PendingWrite; returns how many were queued.
    pub async fn retry_pending(&self) -> Result<usize, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::RetryPending { reply }).await?;
        rx.await.map_err(|_| SessionError::ShuttingDown)?
    }

    /// Re-runs a merge that failed to fetch the remote cart.
    pub async fn retry_merge(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::RetryMerge { reply }).await?;
        rx.await.map_err(|_| SessionError::ShuttingDown)?
    }

    /// View after every previously sent command has been processed.
    pub async fn snapshot(&self) -> Result<CartView, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| SessionError::ShuttingDown)
    }

    /// Latest published view, without a round trip.
    pub fn view(&self) -> CartView {
        self.view_rx.borrow().clone()
    }

    /// Read-only subscription to view updates.
    pub fn watch(&self) -> watch::Receiver<CartView> {
        self.view_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Waits until no merge is running and no write is queued or in flight.
    pub async fn settled(&self) -> Result<CartView, SessionError> {
        let mut rx = self.view_rx.clone();
        let view = rx
            .wait_for(|v| v.state != SessionState::Merging && v.outstanding_writes == 0)
            .await
            .map_err(|_| SessionError::ShuttingDown)?;
        Ok(view.clone())
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::ShuttingDown)
    }
}

// =============================================================================
// Cart Session
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    LocalOnly,
    Merging,
    Synced,
    Detached,
}

#[derive(Debug)]
struct PendingEntry {
    last_error: StoreError,
    attempts: u32,
}

struct WriteOutcome {
    write: QueuedWrite,
    result: Result<(), StoreError>,
}

type MergeFuture = BoxFuture<'static, Result<CartState, StoreError>>;

/// The session actor. Build with [`CartSession::new`], then
/// [`CartSession::spawn`].
pub struct CartSession {
    id: Uuid,
    config: Arc<StorefrontConfig>,
    store: Arc<dyn RemoteCartStore>,
    catalog: Arc<dyn CatalogSource>,
    identity_rx: watch::Receiver<Identity>,
    identity: Identity,
    phase: Phase,

    replicas: ReplicaPair,
    coupon: Option<AppliedCoupon>,
    coupon_catalog: CouponCatalog,
    shipping: ShippingPolicy,
    tax: TaxPolicy,
    pricing: PricingSnapshot,

    queue: WriteQueue,
    in_flight: FuturesUnordered<BoxFuture<'static, WriteOutcome>>,
    pending: BTreeMap<WriteKey, PendingEntry>,
    backoff: ExponentialBackoff,
    retry_at: Option<Instant>,

    merge_task: Option<MergeFuture>,
    merge_base: Option<CartState>,
    replay: Vec<CartIntent>,

    event_tx: broadcast::Sender<SyncEvent>,
    view_tx: watch::Sender<CartView>,
}

impl CartSession {
    /// Creates a session with an empty guest cart.
    pub fn new(
        config: Arc<StorefrontConfig>,
        store: Arc<dyn RemoteCartStore>,
        catalog: Arc<dyn CatalogSource>,
        identity_rx: watch::Receiver<Identity>,
    ) -> Self {
        let currency = config.currency();
        let replicas = ReplicaPair::empty(currency, config.cart.max_lines);
        let (event_tx, _) = broadcast::channel(config.sync.event_capacity.max(1));
        let backoff = ExponentialBackoff {
            initial_interval: config.initial_backoff(),
            max_interval: config.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        CartSession {
            id: Uuid::new_v4(),
            shipping: config.shipping_policy(),
            tax: config.tax_policy(),
            pricing: PricingSnapshot::zero(currency),
            identity: Identity::guest(),
            phase: Phase::LocalOnly,
            replicas,
            coupon: None,
            coupon_catalog: CouponCatalog::new(),
            queue: WriteQueue::new(),
            in_flight: FuturesUnordered::new(),
            pending: BTreeMap::new(),
            backoff,
            retry_at: None,
            merge_task: None,
            merge_base: None,
            replay: Vec::new(),
            event_tx,
            view_tx: watch::channel(empty_view(currency, config.cart.max_lines)).0,
            config,
            store,
            catalog,
            identity_rx,
        }
    }

    /// Starts from an existing cart, e.g. one parked by a previous session.
    pub fn with_cart(mut self, cart: CartState) -> Result<Self, SessionError> {
        let cart = CartState::from_lines(
            self.config.currency(),
            self.config.cart.max_lines,
            cart.lines().cloned(),
        )?;
        self.price_cart(&cart, None)?;
        self.replicas.local.replace(cart);
        Ok(self)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Spawns the session task and returns its handle.
    pub fn spawn(mut self) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        self.refresh();

        let handle = SessionHandle {
            id: self.id,
            cmd_tx,
            view_rx: self.view_tx.subscribe(),
            event_tx: self.event_tx.clone(),
        };

        let span = info_span!("cart_session", session_id = %self.id);
        tokio::spawn(self.run(cmd_rx).instrument(span));

        handle
    }

    /// Main session loop.
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        info!("Cart session started");

        let initial = self.identity_rx.borrow_and_update().clone();
        self.handle_identity(initial);
        self.pump();

        let mut identity_open = true;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => {
                        info!("Cart session shutting down");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                },
                changed = self.identity_rx.changed(), if identity_open => match changed {
                    Ok(()) => {
                        let identity = self.identity_rx.borrow_and_update().clone();
                        self.handle_identity(identity);
                    }
                    Err(_) => {
                        debug!("Identity channel closed");
                        identity_open = false;
                    }
                },
                Some(outcome) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.handle_write_outcome(outcome);
                }
                result = poll_merge(&mut self.merge_task), if self.merge_task.is_some() => {
                    self.merge_task = None;
                    self.finish_merge(result);
                }
                _ = sleep_until_deadline(self.retry_at), if self.retry_at.is_some() => {
                    self.retry_at = None;
                    self.retry_due();
                }
            }

            self.pump();
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Mutate { intent, reply } => {
                let result = self.handle_mutate(intent).await;
                let _ = reply.send(result);
            }
            SessionCommand::RetryPending { reply } => {
                let result = match self.phase {
                    Phase::Detached => Err(SessionError::Detached),
                    Phase::Synced => Ok(self.requeue_pending()),
                    Phase::LocalOnly | Phase::Merging => Ok(0),
                };
                self.pump();
                let _ = reply.send(result);
            }
            SessionCommand::RetryMerge { reply } => {
                let result = match self.phase {
                    Phase::Detached => Err(SessionError::Detached),
                    _ if self.identity.token().is_none() => Err(SessionError::NotAuthenticated),
                    Phase::LocalOnly => {
                        self.retry_at = None;
                        self.start_merge();
                        Ok(())
                    }
                    Phase::Merging | Phase::Synced => Ok(()),
                };
                self.pump();
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.view());
            }
            // Handled by the run loop
            SessionCommand::Shutdown => {}
        }
    }

    async fn handle_mutate(&mut self, intent: CartIntent) -> Result<CartView, SessionError> {
        if self.phase == Phase::Detached {
            return Err(SessionError::Detached);
        }

        match &intent {
            CartIntent::ApplyCoupon { code } => self.apply_coupon(code).await?,
            CartIntent::RemoveCoupon => {
                if let Some(applied) = self.coupon.take() {
                    info!(code = %applied.descriptor().code, "Coupon removed");
                }
            }
            _ => {
                let touched = self.commit_line_intent(&intent)?;
                match self.phase {
                    Phase::Merging => self.replay.push(intent.clone()),
                    Phase::Synced => {
                        if let Some(key) = touched.clone() {
                            self.enqueue_for(key);
                        }
                    }
                    Phase::LocalOnly | Phase::Detached => {}
                }
                if touched.is_some() {
                    self.revalidate_coupon();
                }
            }
        }

        self.pump();
        Ok(self.view())
    }

    /// Applies a line intent and keeps it only if the result still prices.
    ///
    /// On a pricing failure the local replica is restored and nothing is
    /// queued.
    fn commit_line_intent(
        &mut self,
        intent: &CartIntent,
    ) -> Result<Option<WriteKey>, SessionError> {
        let before = self.replicas.local.clone();
        let touched = self.apply_local(intent)?;
        if touched.is_some() {
            if let Err(err) = self.price_cart(&self.replicas.local.cart, self.coupon.as_ref()) {
                warn!(%err, "Intent would leave the cart unpriceable, rolled back");
                self.replicas.local = before;
                return Err(err.into());
            }
        }
        Ok(touched)
    }

    /// Prices `cart` as the view would after coupon re-validation, without
    /// touching session state.
    fn price_cart(
        &self,
        cart: &CartState,
        coupon: Option<&AppliedCoupon>,
    ) -> Result<PricingSnapshot, PricingError> {
        let mut coupon = coupon.cloned();
        if let Some(applied) = coupon.as_mut() {
            applied.revalidate(cart.subtotal()?, &self.coupon_catalog, Utc::now());
        }
        pricing::compute(
            cart,
            coupon.as_ref().and_then(AppliedCoupon::effective),
            &self.shipping,
            &self.tax,
        )
    }

    /// Applies a line intent to the local replica.
    ///
    /// Returns the write key that changed, if anything did.
    fn apply_local(&mut self, intent: &CartIntent) -> Result<Option<WriteKey>, SessionError> {
        let max_quantity = self.config.cart.max_line_quantity;
        let remote_has_lines = !self.replicas.remote.cart.is_empty();
        let cart = &mut self.replicas.local.cart;

        let touched = match intent {
            CartIntent::SetQuantity {
                key,
                quantity,
                unit_price,
                stock_snapshot,
            } => {
                validate_line(key, unit_price)?;
                if *quantity > 0 {
                    validate_quantity(*quantity, max_quantity)?;
                }
                let change = cart.upsert_line(key.clone(), *quantity, *unit_price, *stock_snapshot)?;
                change.is_change().then(|| WriteKey::Line(key.clone()))
            }
            CartIntent::AddQuantity {
                key,
                delta,
                unit_price,
                stock_snapshot,
            } => {
                validate_line(key, unit_price)?;
                let target = i64::from(cart.quantity_of(key)).saturating_add(*delta);
                if target > 0 {
                    validate_quantity(target, max_quantity)?;
                }
                let change = cart.upsert_line(key.clone(), target, *unit_price, *stock_snapshot)?;
                change.is_change().then(|| WriteKey::Line(key.clone()))
            }
            CartIntent::Remove { key } => cart
                .remove_line(key)
                .is_change()
                .then(|| WriteKey::Line(key.clone())),
            CartIntent::Clear => {
                if cart.is_empty() && !remote_has_lines {
                    None
                } else {
                    cart.clear();
                    Some(WriteKey::Cart)
                }
            }
            CartIntent::ApplyCoupon { .. } | CartIntent::RemoveCoupon => None,
        };

        if let Some(key) = &touched {
            self.replicas.local.bump();
            debug!(key = %key, revision = self.replicas.local.revision, "Local replica updated");
        }
        Ok(touched)
    }

    async fn apply_coupon(&mut self, code: &str) -> Result<(), SessionError> {
        validate_coupon_code(code)?;

        let limit = self.config.fetch_timeout();
        let catalog = match timeout(limit, self.catalog.coupon_catalog()).await {
            Ok(result) => result?,
            Err(_) => return Err(StoreError::Timeout(millis(limit)).into()),
        };

        let subtotal = self
            .replicas
            .local
            .cart
            .subtotal()
            .map_err(CouponError::from)?;
        let descriptor = coupon::validate(code, subtotal, &catalog, Utc::now())?;
        let applied = AppliedCoupon::new(descriptor.clone());
        pricing::compute(
            &self.replicas.local.cart,
            applied.effective(),
            &self.shipping,
            &self.tax,
        )?;

        info!(code = %descriptor.code, kind = ?descriptor.kind, "Coupon applied");
        self.coupon_catalog = catalog;
        self.coupon = Some(applied);
        Ok(())
    }

    /// Re-checks the applied coupon against the current subtotal.
    fn revalidate_coupon(&mut self) {
        let subtotal = match self.replicas.local.cart.subtotal() {
            Ok(subtotal) => subtotal,
            Err(err) => {
                error!(?err, "Cannot compute subtotal for coupon re-validation");
                return;
            }
        };

        let (code, transition) = match self.coupon.as_mut() {
            Some(applied) => {
                let transition = applied.revalidate(subtotal, &self.coupon_catalog, Utc::now());
                (applied.descriptor().code.clone(), transition)
            }
            None => return,
        };

        match transition {
            CouponTransition::Unchanged => {}
            CouponTransition::Deactivated(reason) => {
                warn!(code = %code, %reason, "Coupon no longer qualifies, discount removed");
                self.emit(SyncEvent::CouponDeactivated { code, reason });
            }
            CouponTransition::Reactivated => {
                info!(code = %code, "Coupon qualifies again");
                self.emit(SyncEvent::CouponReactivated { code });
            }
        }
    }

    // =========================================================================
    // Identity & Merge
    // =========================================================================

    fn handle_identity(&mut self, identity: Identity) {
        if self.phase == Phase::Detached {
            return;
        }

        let was = self.identity.token().map(str::to_string);
        self.identity = identity;
        let now = self.identity.token().map(str::to_string);

        match (was, now) {
            (None, None) => {}
            (Some(_), None) => self.detach(),
            (Some(old), Some(new)) if old == new => {}
            (old, Some(_)) => {
                if old.is_some() {
                    info!("Session token changed, re-merging cart");
                }
                self.start_merge();
            }
        }
    }

    fn start_merge(&mut self) {
        let Some(token) = self.identity.token().map(str::to_string) else {
            return;
        };

        let stale = self.queue.drain_queued();
        if !stale.is_empty() {
            debug!(count = stale.len(), "Dropped queued writes ahead of merge");
        }
        self.pending.clear();
        self.retry_at = None;

        self.merge_base = Some(self.replicas.local.cart.clone());
        self.replay.clear();
        self.phase = Phase::Merging;

        info!(lines = self.replicas.local.cart.len(), "Identity established, merging cart");

        let store = Arc::clone(&self.store);
        let limit = self.config.fetch_timeout();
        self.merge_task = Some(
            async move {
                match timeout(limit, store.get_cart(&token)).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Timeout(millis(limit))),
                }
            }
            .boxed(),
        );
    }

    fn finish_merge(&mut self, result: Result<CartState, StoreError>) {
        let base = self
            .merge_base
            .take()
            .unwrap_or_else(|| self.replicas.local.cart.clone());
        let replay = std::mem::take(&mut self.replay);

        let remote = match result {
            Ok(remote) => remote,
            Err(err) => return self.fail_merge(err),
        };

        let plan = match plan_merge(&base, &remote, self.config.sync.max_sync_quantity) {
            Ok(plan) => plan,
            Err(err) => return self.fail_merge(StoreError::InvalidCart(err)),
        };
        if let Err(PricingError::Money(err)) = self.price_cart(&plan.merged, self.coupon.as_ref()) {
            return self.fail_merge(StoreError::InvalidCart(err.into()));
        }

        self.replicas.remote.replace(remote);
        self.replicas.local.replace(plan.merged);
        self.phase = Phase::Synced;
        self.backoff.reset();

        if let Some(token) = self.identity.token().map(str::to_string) {
            for line in &plan.writes {
                self.queue.enqueue(token.clone(), WriteOp::Upsert(line.clone()));
            }
            for key in &plan.removals {
                self.queue.enqueue(token.clone(), WriteOp::Remove(key.clone()));
            }
        }
        let written = plan.writes.len() + plan.removals.len();

        for intent in &replay {
            match self.commit_line_intent(intent) {
                Ok(Some(key)) => self.enqueue_for(key),
                Ok(None) => {}
                Err(err) => warn!(%err, "Intent made during merge rejected on replay"),
            }
        }

        self.revalidate_coupon();

        info!(
            lines = self.replicas.local.cart.len(),
            written,
            dropped = plan.dropped.len(),
            replayed = replay.len(),
            "Cart merge completed"
        );
        self.emit(SyncEvent::MergeCompleted {
            lines: self.replicas.local.cart.len(),
            written,
            dropped: plan.dropped,
        });
    }

    fn fail_merge(&mut self, err: StoreError) {
        warn!(error = %err, "Cart merge failed, staying local");
        self.phase = Phase::LocalOnly;
        self.emit(SyncEvent::MergeFailed {
            error: err.to_string(),
        });
        if err.is_retryable() {
            self.schedule_retry();
        }
    }

    fn detach(&mut self) {
        let policy = self.config.sync.detach_policy;
        info!(%policy, "Identity lost, detaching cart session");

        self.merge_task = None;
        self.merge_base = None;
        self.replay.clear();
        // In-flight writes finish on their own; their outcomes are ignored.
        self.queue.drain_queued();
        self.pending.clear();
        self.retry_at = None;
        self.coupon = None;

        let empty = CartState::with_max_lines(self.config.currency(), self.config.cart.max_lines);
        let cart = std::mem::replace(&mut self.replicas.local.cart, empty);
        self.replicas.local.bump();
        self.phase = Phase::Detached;

        let parked = match policy {
            DetachPolicy::Park => Some(cart),
            DetachPolicy::Discard => None,
        };
        self.emit(SyncEvent::Detached { parked });
    }

    // =========================================================================
    // Remote Writes
    // =========================================================================

    /// Enqueues a write carrying the current local value for `key`.
    fn enqueue_for(&mut self, key: WriteKey) {
        let Some(token) = self.identity.token().map(str::to_string) else {
            return;
        };
        let op = match key {
            WriteKey::Line(line_key) => match self.replicas.local.cart.get(&line_key) {
                Some(line) => WriteOp::Upsert(line.clone()),
                None => WriteOp::Remove(line_key),
            },
            WriteKey::Cart => WriteOp::Clear,
        };
        self.queue.enqueue(token, op);
    }

    /// Starts every write the queue allows.
    fn dispatch_ready(&mut self) {
        for write in self.queue.start_ready() {
            let store = Arc::clone(&self.store);
            let limit = self.config.write_timeout();
            debug!(seq = write.seq, key = %write.op.key(), "Starting remote write");

            self.in_flight.push(
                async move {
                    let result = match timeout(limit, execute(store.as_ref(), &write)).await {
                        Ok(result) => result,
                        Err(_) => Err(StoreError::Timeout(millis(limit))),
                    };
                    WriteOutcome { write, result }
                }
                .boxed(),
            );
        }
    }

    fn handle_write_outcome(&mut self, outcome: WriteOutcome) {
        let WriteOutcome { write, result } = outcome;
        self.queue.complete(write.seq);

        if self.phase == Phase::Detached || self.identity.token() != Some(write.token.as_str()) {
            debug!(seq = write.seq, "Ignoring write outcome from a previous identity");
            return;
        }

        let key = write.op.key();
        match result {
            Ok(()) => {
                self.mirror_remote(&write.op);

                let mut recovered = Vec::new();
                if self.pending.remove(&key).is_some() {
                    recovered.push(key.clone());
                }
                if key == WriteKey::Cart {
                    // The clear removed these remotely and they are gone locally too
                    let settled: Vec<WriteKey> = self
                        .pending
                        .keys()
                        .filter(|k| {
                            k.line()
                                .is_some_and(|line| !self.replicas.local.cart.contains(line))
                        })
                        .cloned()
                        .collect();
                    for k in settled {
                        self.pending.remove(&k);
                        recovered.push(k);
                    }
                }

                for key in recovered {
                    info!(key = %key, "Remote write recovered");
                    self.emit(SyncEvent::SyncWriteRecovered { key });
                }

                if self.pending.is_empty() {
                    self.backoff.reset();
                    self.retry_at = None;
                }
            }
            Err(err) => {
                let entry = self.pending.entry(key.clone()).or_insert(PendingEntry {
                    last_error: err.clone(),
                    attempts: 0,
                });
                entry.attempts += 1;
                entry.last_error = err.clone();
                warn!(
                    key = %key,
                    error = %err,
                    attempts = entry.attempts,
                    "Remote write failed, keeping local value"
                );

                self.emit(SyncEvent::SyncWriteFailed {
                    key,
                    error: err.to_string(),
                    retryable: err.is_retryable(),
                });
                self.schedule_retry();
            }
        }
    }

    /// Applies a confirmed write to the remote replica.
    fn mirror_remote(&mut self, op: &WriteOp) {
        let remote = &mut self.replicas.remote;
        let result = match op {
            WriteOp::Upsert(line) => remote
                .cart
                .upsert_line(
                    line.key.clone(),
                    i64::from(line.quantity),
                    line.unit_price,
                    line.stock_snapshot,
                )
                .map(|_| ()),
            WriteOp::Remove(key) => {
                remote.cart.remove_line(key);
                Ok(())
            }
            WriteOp::Clear => {
                remote.cart.clear();
                Ok(())
            }
        };

        match result {
            Ok(()) => remote.bump(),
            Err(err) => warn!(%err, "Remote replica could not mirror a confirmed write"),
        }
    }

    fn schedule_retry(&mut self) {
        if self.retry_at.is_some() {
            return;
        }
        match self.backoff.next_backoff() {
            Some(delay) => {
                debug!(?delay, "Scheduling retry");
                self.retry_at = Some(Instant::now() + delay);
            }
            None => warn!("Retry backoff exhausted"),
        }
    }

    fn retry_due(&mut self) {
        match self.phase {
            Phase::LocalOnly if self.identity.token().is_some() => {
                info!("Retrying cart merge");
                self.start_merge();
            }
            Phase::Synced => {
                let count = self.requeue_pending();
                debug!(count, "Retrying pending writes");
            }
            _ => {}
        }
    }

    /// Enqueues fresh writes for every pending key not already queued.
    fn requeue_pending(&mut self) -> usize {
        let keys: Vec<WriteKey> = self
            .pending
            .keys()
            .filter(|key| !self.queue.has_key(key))
            .cloned()
            .collect();

        for key in &keys {
            if let Some(entry) = self.pending.get(key) {
                debug!(key = %key, attempts = entry.attempts, last_error = %entry.last_error, "Re-sending");
            }
            self.enqueue_for(key.clone());
            if *key == WriteKey::Cart {
                // Lines added after the failed clear must survive the retry
                let lines: Vec<WriteKey> = self
                    .replicas
                    .local
                    .cart
                    .keys()
                    .cloned()
                    .map(WriteKey::Line)
                    .collect();
                for line in lines {
                    self.enqueue_for(line);
                }
            }
        }

        keys.len()
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Starts ready writes, recomputes pricing and publishes the view.
    fn pump(&mut self) {
        if self.phase != Phase::Detached {
            self.dispatch_ready();
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        let coupon = self.coupon.as_ref().and_then(AppliedCoupon::effective);
        match pricing::compute(&self.replicas.local.cart, coupon, &self.shipping, &self.tax) {
            Ok(snapshot) => self.pricing = snapshot,
            Err(err) => error!(%err, "Pricing failed, keeping previous snapshot"),
        }
        self.view_tx.send_replace(self.view());
    }

    fn state(&self) -> SessionState {
        match self.phase {
            Phase::LocalOnly => SessionState::LocalOnly,
            Phase::Merging => SessionState::Merging,
            Phase::Detached => SessionState::Detached,
            Phase::Synced if self.pending.is_empty() => SessionState::Synced,
            Phase::Synced => SessionState::PendingWrite,
        }
    }

    fn view(&self) -> CartView {
        CartView {
            state: self.state(),
            cart: self.replicas.local.cart.clone(),
            coupon: self.coupon.as_ref().map(|c| c.descriptor().clone()),
            pricing: self.pricing,
            local_revision: self.replicas.local.revision,
            remote_revision: self.replicas.remote.revision,
            pending: self.pending.keys().cloned().collect(),
            outstanding_writes: self.queue.len(),
            authenticated: self.identity.token().is_some(),
        }
    }

    fn emit(&self, event: SyncEvent) {
        debug!(event = event.name(), "Emitting sync event");
        if self.event_tx.send(event).is_err() {
            debug!("No event subscribers");
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_line(key: &LineKey, unit_price: &Money) -> Result<(), SessionError> {
    validate_product_id(&key.product_id)?;
    validate_variant_key(key.variant_key.as_deref())?;
    validate_price_minor(unit_price.minor())?;
    Ok(())
}

async fn execute(store: &dyn RemoteCartStore, write: &QueuedWrite) -> Result<(), StoreError> {
    match &write.op {
        WriteOp::Upsert(line) => store.upsert_line(&write.token, line.clone()).await,
        WriteOp::Remove(key) => store.remove_line(&write.token, key).await,
        WriteOp::Clear => store.clear(&write.token).await,
    }
}

async fn poll_merge(task: &mut Option<MergeFuture>) -> Result<CartState, StoreError> {
    match task {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn empty_view(currency: storefront_core::money::Currency, max_lines: usize) -> CartView {
    CartView {
        state: SessionState::LocalOnly,
        cart: CartState::with_max_lines(currency, max_lines),
        coupon: None,
        pricing: PricingSnapshot::zero(currency),
        local_revision: 0,
        remote_revision: 0,
        pending: Vec::new(),
        outstanding_writes: 0,
        authenticated: false,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
