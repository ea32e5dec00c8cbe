//! # Cart State
//!
//! The in-memory representation of a shopping cart and its invariants.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart State Operations                                │
//! │                                                                         │
//! │  Operation                       Effect                                 │
//! │  ─────────                       ──────                                 │
//! │                                                                         │
//! │  upsert_line(k, q > 0, ..) ────► lines[k].quantity = q   (REPLACE)     │
//! │                                                                         │
//! │  upsert_line(k, q <= 0, ..) ───► remove_line(k)                        │
//! │                                                                         │
//! │  remove_line(k) ───────────────► lines.remove(k)  (no-op if absent)    │
//! │                                                                         │
//! │  clear() ──────────────────────► lines.clear()                         │
//! │                                                                         │
//! │  lines() ──────────────────────► lazy, restartable, unordered          │
//! │                                                                         │
//! │  NOTE: upsert REPLACES quantity. "Add 2 more" is computed by the       │
//! │        caller as current + 2, and the caller is the session's          │
//! │        serialized mutation queue, so the read is never stale.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Exactly zero or one line per [`LineKey`]
//! - Every stored quantity is >= 1
//! - Every unit price is in the cart's currency
//! - Line count never exceeds `max_lines`

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CartError, MoneyError};
use crate::money::{Currency, Money};
use crate::types::LineKey;

/// Default maximum number of distinct lines in a cart.
pub const DEFAULT_MAX_LINES: usize = 100;

// =============================================================================
// Cart Line
// =============================================================================

/// One product+variant entry in a cart.
///
/// ## Design Notes
/// - `unit_price` is the catalog price captured when the line was written;
///   pricing always uses this frozen value
/// - `stock_snapshot` is informational only: checkout re-reads live stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(flatten)]
    pub key: LineKey,
    pub quantity: u32,
    pub unit_price: Money,
    pub stock_snapshot: i64,
}

impl CartLine {
    /// Calculates the line total (unit price × quantity).
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.unit_price.multiply(self.quantity)
    }
}

// =============================================================================
// Line Change
// =============================================================================

/// What a mutation actually did to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChange {
    /// A new line was created.
    Inserted,
    /// An existing line was overwritten.
    Updated { previous: CartLine },
    /// A line was removed.
    Removed { previous: CartLine },
    /// Nothing changed (removal of an absent key, or identical upsert).
    Unchanged,
}

impl LineChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, LineChange::Unchanged)
    }
}

// =============================================================================
// Cart State
// =============================================================================

/// An unordered set of cart lines keyed by `(product_id, variant_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CartRecord", try_from = "CartRecord")]
pub struct CartState {
    currency: Currency,
    max_lines: usize,
    lines: HashMap<LineKey, CartLine>,
}

impl CartState {
    /// Creates an empty cart with the default line limit.
    pub fn new(currency: Currency) -> Self {
        Self::with_max_lines(currency, DEFAULT_MAX_LINES)
    }

    /// Creates an empty cart bounded to `max_lines` distinct lines.
    pub fn with_max_lines(currency: Currency, max_lines: usize) -> Self {
        CartState {
            currency,
            max_lines,
            lines: HashMap::new(),
        }
    }

    /// Builds a cart from existing lines, enforcing every invariant.
    ///
    /// Later duplicates of a key replace earlier ones, which matches
    /// applying the lines as a sequence of upserts.
    pub fn from_lines<I>(currency: Currency, max_lines: usize, lines: I) -> Result<Self, CartError>
    where
        I: IntoIterator<Item = CartLine>,
    {
        let mut cart = Self::with_max_lines(currency, max_lines);
        for line in lines {
            cart.upsert_line(
                line.key,
                i64::from(line.quantity),
                line.unit_price,
                line.stock_snapshot,
            )?;
        }
        Ok(cart)
    }

    /// Inserts or REPLACES the line for `key`.
    ///
    /// ## Behavior
    /// - `quantity <= 0`: equivalent to [`CartState::remove_line`]
    /// - key present: quantity, price and stock snapshot are overwritten
    /// - key absent: a new line is created if capacity allows
    ///
    /// ## Errors
    /// - [`CartError::CartFull`] when a new key would exceed `max_lines`
    /// - [`CartError::QuantityTooLarge`] when quantity does not fit a `u32`
    /// - [`CartError::Money`] when `unit_price` is in another currency
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::cart::CartState;
    /// use storefront_core::money::{Currency, Money};
    /// use storefront_core::types::LineKey;
    ///
    /// let mut cart = CartState::new(Currency::Usd);
    /// let price = Money::new(999, Currency::Usd);
    /// cart.upsert_line(LineKey::product("P1"), 3, price, 10).unwrap();
    /// cart.upsert_line(LineKey::product("P1"), 3, price, 10).unwrap();
    /// assert_eq!(cart.get(&LineKey::product("P1")).unwrap().quantity, 3);
    /// ```
    pub fn upsert_line(
        &mut self,
        key: LineKey,
        quantity: i64,
        unit_price: Money,
        stock_snapshot: i64,
    ) -> Result<LineChange, CartError> {
        if quantity <= 0 {
            return Ok(self.remove_line(&key));
        }

        if unit_price.currency() != self.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: unit_price.currency(),
            }
            .into());
        }

        let quantity = u32::try_from(quantity).map_err(|_| CartError::QuantityTooLarge {
            key: key.clone(),
            requested: quantity,
            max: i64::from(u32::MAX),
        })?;

        if !self.lines.contains_key(&key) && self.lines.len() >= self.max_lines {
            return Err(CartError::CartFull {
                max: self.max_lines,
            });
        }

        let line = CartLine {
            key: key.clone(),
            quantity,
            unit_price,
            stock_snapshot,
        };

        match self.lines.insert(key, line) {
            None => Ok(LineChange::Inserted),
            Some(previous) => {
                if self.lines.get(&previous.key) == Some(&previous) {
                    Ok(LineChange::Unchanged)
                } else {
                    Ok(LineChange::Updated { previous })
                }
            }
        }
    }

    /// Removes the line for `key`. Idempotent: absent keys are a no-op.
    pub fn remove_line(&mut self, key: &LineKey) -> LineChange {
        match self.lines.remove(key) {
            Some(previous) => LineChange::Removed { previous },
            None => LineChange::Unchanged,
        }
    }

    /// Empties the cart.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Lazy, restartable sequence of lines in unspecified order.
    ///
    /// The iterator is `Clone`, so a consumer can walk it more than once
    /// without re-borrowing the cart.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> + Clone + '_ {
        self.lines.values()
    }

    /// Keys of every line, in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &LineKey> + Clone + '_ {
        self.lines.keys()
    }

    /// Lines sorted by key, for stable display and logging.
    pub fn sorted_lines(&self) -> Vec<&CartLine> {
        let mut lines: Vec<&CartLine> = self.lines.values().collect();
        lines.sort_by(|a, b| a.key.cmp(&b.key));
        lines
    }

    pub fn get(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.get(key)
    }

    pub fn contains(&self, key: &LineKey) -> bool {
        self.lines.contains_key(key)
    }

    /// Current quantity for `key`, zero if absent.
    pub fn quantity_of(&self, key: &LineKey) -> u32 {
        self.lines.get(key).map(|l| l.quantity).unwrap_or(0)
    }

    /// Number of distinct lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of all line quantities.
    pub fn total_quantity(&self) -> u64 {
        self.lines.values().map(|l| u64::from(l.quantity)).sum()
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Σ unit_price × quantity.
    pub fn subtotal(&self) -> Result<Money, MoneyError> {
        self.lines
            .values()
            .try_fold(Money::zero(self.currency), |acc, line| {
                acc.add(line.line_total()?)
            })
    }
}

// =============================================================================
// Serialized Form
// =============================================================================

/// Wire form of a cart: lines as a list, since JSON maps need string keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartRecord {
    currency: Currency,
    max_lines: usize,
    lines: Vec<CartLine>,
}

impl From<CartState> for CartRecord {
    fn from(cart: CartState) -> Self {
        let mut lines: Vec<CartLine> = cart.lines.into_values().collect();
        lines.sort_by(|a, b| a.key.cmp(&b.key));
        CartRecord {
            currency: cart.currency,
            max_lines: cart.max_lines,
            lines,
        }
    }
}

impl TryFrom<CartRecord> for CartState {
    type Error = CartError;

    fn try_from(record: CartRecord) -> Result<Self, Self::Error> {
        CartState::from_lines(record.currency, record.max_lines, record.lines)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
