//! # Replica Merge
//!
//! Pure planning of the one-time reconciliation between a guest (local) cart
//! and the authoritative (remote) cart when an identity is established.
//!
//! ## Merge Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key in remote only         → kept as-is                                │
//! │  key in both                → REMOTE WINS (no timestamps to compare)    │
//! │  key in local only          → kept, quantity capped at max_sync_qty,    │
//! │                               and written to the remote store           │
//! │  over max_lines             → dropped with a warning (remote first,     │
//! │                               then local-only lines in key order);      │
//! │                               dropped remote lines are also removed     │
//! │                               from the remote store                     │
//! │                                                                         │
//! │  Example:  local {P3:1}   remote {P1:2}                                 │
//! │            merged {P1:2, P3:1}, writes [P3:1]                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotency
//! Merging the result again with the same remote yields the same cart, and
//! merging against the post-write remote yields no writes at all.

use tracing::warn;

use storefront_core::cart::{CartLine, CartState};
use storefront_core::error::CartError;
use storefront_core::types::LineKey;

/// Outcome of [`plan_merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// The new local replica.
    pub merged: CartState,
    /// Lines to upsert remotely, in key order.
    pub writes: Vec<CartLine>,
    /// Keys that did not fit in `max_lines`.
    pub dropped: Vec<LineKey>,
    /// Dropped keys that exist remotely and must be removed there.
    pub removals: Vec<LineKey>,
}

impl MergePlan {
    /// True when the remote store already matches the merged cart.
    pub fn is_noop(&self) -> bool {
        self.writes.is_empty() && self.removals.is_empty()
    }
}

/// Plans the merge of `local` into `remote`.
///
/// The merged cart keeps `local`'s currency and line limit.
///
/// ## Errors
/// [`CartError::Money`] when the remote cart holds prices in another
/// currency.
pub fn plan_merge(
    local: &CartState,
    remote: &CartState,
    max_sync_quantity: u32,
) -> Result<MergePlan, CartError> {
    let mut merged = CartState::with_max_lines(local.currency(), local.max_lines());
    let mut writes = Vec::new();
    let mut dropped = Vec::new();

    for line in remote.sorted_lines() {
        insert_line(&mut merged, line, line.quantity, &mut dropped)?;
    }
    let removals = dropped.clone();

    for line in local.sorted_lines() {
        if remote.contains(&line.key) {
            continue;
        }
        let quantity = line.quantity.min(max_sync_quantity);
        if insert_line(&mut merged, line, quantity, &mut dropped)? {
            writes.push(CartLine {
                quantity,
                ..line.clone()
            });
        }
    }

    Ok(MergePlan {
        merged,
        writes,
        dropped,
        removals,
    })
}

fn insert_line(
    cart: &mut CartState,
    line: &CartLine,
    quantity: u32,
    dropped: &mut Vec<LineKey>,
) -> Result<bool, CartError> {
    match cart.upsert_line(
        line.key.clone(),
        i64::from(quantity),
        line.unit_price,
        line.stock_snapshot,
    ) {
        Ok(_) => Ok(true),
        Err(CartError::CartFull { max }) => {
            warn!(key = %line.key, max, "Cart full during merge, dropping line");
            dropped.push(line.key.clone());
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::money::{Currency, Money};

    fn cart(lines: &[(&str, u32)]) -> CartState {
        let mut cart = CartState::with_max_lines(Currency::Usd, 10);
        for (id, qty) in lines {
            cart.upsert_line(
                LineKey::product(*id),
                i64::from(*qty),
                Money::new(1000, Currency::Usd),
                50,
            )
            .unwrap();
        }
        cart
    }

    /// Applies the plan's writes to `remote` the way a store would.
    fn apply_writes(remote: &CartState, plan: &MergePlan) -> CartState {
        let mut after = remote.clone();
        for key in &plan.removals {
            after.remove_line(key);
        }
        for line in &plan.writes {
            after
                .upsert_line(
                    line.key.clone(),
                    i64::from(line.quantity),
                    line.unit_price,
                    line.stock_snapshot,
                )
                .unwrap();
        }
        after
    }

    #[test]
    fn test_guest_line_added_to_remote_cart() {
        let local = cart(&[("P3", 1)]);
        let remote = cart(&[("P1", 2)]);

        let plan = plan_merge(&local, &remote, 99).unwrap();
        assert_eq!(plan.merged.len(), 2);
        assert_eq!(plan.merged.quantity_of(&LineKey::product("P1")), 2);
        assert_eq!(plan.merged.quantity_of(&LineKey::product("P3")), 1);
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].key, LineKey::product("P3"));
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_remote_wins_on_shared_key() {
        let local = cart(&[("P1", 5)]);
        let remote = cart(&[("P1", 2)]);

        let plan = plan_merge(&local, &remote, 99).unwrap();
        assert_eq!(plan.merged.quantity_of(&LineKey::product("P1")), 2);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_local_quantity_capped() {
        let local = cart(&[("P3", 40)]);
        let remote = cart(&[]);

        let plan = plan_merge(&local, &remote, 10).unwrap();
        assert_eq!(plan.merged.quantity_of(&LineKey::product("P3")), 10);
        assert_eq!(plan.writes[0].quantity, 10);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let local = cart(&[("P3", 40), ("P1", 7), ("P4", 1)]);
        let remote = cart(&[("P1", 2), ("P2", 3)]);

        let first = plan_merge(&local, &remote, 10).unwrap();

        // Same remote again: same result
        let again = plan_merge(&first.merged, &remote, 10).unwrap();
        assert_eq!(again.merged, first.merged);

        // Against the post-write remote: nothing left to write
        let remote_after = apply_writes(&remote, &first);
        let settled = plan_merge(&first.merged, &remote_after, 10).unwrap();
        assert_eq!(settled.merged, first.merged);
        assert!(settled.is_noop());
    }

    #[test]
    fn test_overflow_lines_dropped() {
        let mut local = CartState::with_max_lines(Currency::Usd, 2);
        local
            .upsert_line(LineKey::product("P9"), 1, Money::new(100, Currency::Usd), 1)
            .unwrap();
        let remote = cart(&[("P1", 1), ("P2", 1)]);

        let plan = plan_merge(&local, &remote, 99).unwrap();
        assert_eq!(plan.merged.len(), 2);
        assert_eq!(plan.dropped, vec![LineKey::product("P9")]);
        assert!(plan.writes.is_empty());
        // P9 never reached the remote store
        assert!(plan.removals.is_empty());
    }

    #[test]
    fn test_remote_overflow_removed_remotely() {
        let local = CartState::with_max_lines(Currency::Usd, 2);
        let mut remote = CartState::with_max_lines(Currency::Usd, 10);
        for id in ["P1", "P2", "P3"] {
            remote
                .upsert_line(LineKey::product(id), 1, Money::new(100, Currency::Usd), 1)
                .unwrap();
        }

        let plan = plan_merge(&local, &remote, 99).unwrap();
        assert_eq!(plan.merged.len(), 2);
        assert!(!plan.merged.contains(&LineKey::product("P3")));
        assert_eq!(plan.dropped, vec![LineKey::product("P3")]);
        assert_eq!(plan.removals, vec![LineKey::product("P3")]);
        assert!(!plan.is_noop());

        // Once the removal lands, the next merge has nothing to do
        let remote_after = apply_writes(&remote, &plan);
        let settled = plan_merge(&plan.merged, &remote_after, 99).unwrap();
        assert_eq!(settled.merged, plan.merged);
        assert!(settled.is_noop());
    }

    #[test]
    fn test_foreign_remote_currency_is_an_error() {
        let local = cart(&[("P1", 1)]);
        let mut remote = CartState::new(Currency::Eur);
        remote
            .upsert_line(LineKey::product("P2"), 1, Money::new(100, Currency::Eur), 1)
            .unwrap();

        assert!(matches!(
            plan_merge(&local, &remote, 99),
            Err(CartError::Money(_))
        ));
    }
}
