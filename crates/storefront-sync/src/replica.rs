//! Local and remote cart replicas with revision counters.

use storefront_core::cart::CartState;
use storefront_core::money::Currency;

/// One copy of the cart plus a monotonically increasing local revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replica {
    pub cart: CartState,
    pub revision: u64,
}

impl Replica {
    pub fn new(cart: CartState) -> Self {
        Replica { cart, revision: 0 }
    }

    /// Records a change made through `cart`.
    pub fn bump(&mut self) {
        self.revision += 1;
    }

    /// Replaces the cart wholesale (merge, fetch).
    pub fn replace(&mut self, cart: CartState) {
        self.cart = cart;
        self.bump();
    }
}

/// The session's local replica and its belief of the remote one.
///
/// `remote` is updated only from fetches and confirmed writes, never
/// optimistically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaPair {
    pub local: Replica,
    pub remote: Replica,
}

impl ReplicaPair {
    /// Starts from `local` with an empty remote replica.
    pub fn new(local: CartState) -> Self {
        let remote = CartState::with_max_lines(local.currency(), local.max_lines());
        ReplicaPair {
            local: Replica::new(local),
            remote: Replica::new(remote),
        }
    }

    pub fn empty(currency: Currency, max_lines: usize) -> Self {
        Self::new(CartState::with_max_lines(currency, max_lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revisions_only_grow() {
        let mut pair = ReplicaPair::empty(Currency::Usd, 10);
        assert_eq!(pair.local.revision, 0);

        pair.local.bump();
        pair.local.replace(CartState::new(Currency::Usd));
        assert_eq!(pair.local.revision, 2);
        assert_eq!(pair.remote.revision, 0);
        assert_eq!(pair.remote.cart.max_lines(), 10);
    }
}
