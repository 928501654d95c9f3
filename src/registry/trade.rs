// =============================================================================
// Trade Registry (spec.md §4.A) — market -> TradeRecord, two-level locking
// =============================================================================
//
// The registry lock guards map structure only (insertion, iteration). Field
// access on a record goes through the record's own lock, taken only after
// the registry lock has been released. This is what lets StartAll/StopAll/
// UnsetAll iterate the map without blocking on any single market's
// long-running operation.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{Market, TriggerRule};
use crate::worker_group::WorkerGroup;

/// Mutable fields guarded by a `TradeRecord`'s own lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TradeRecordInner {
    pub sell: TriggerRule,
    pub buy: TriggerRule,
    pub running: bool,
}

impl TradeRecordInner {
    /// At least one side armed and not currently running (spec.md invariant 4).
    pub fn can_start(&self) -> bool {
        !self.running && (self.sell.armed || self.buy.armed)
    }
}

/// Per-market trading state: trigger rules, running flag, and the worker
/// group tracking this market's Evaluator + Dispatcher tasks.
pub struct TradeRecord {
    inner: RwLock<TradeRecordInner>,
    pub workers: WorkerGroup,
}

impl Default for TradeRecord {
    fn default() -> Self {
        Self {
            inner: RwLock::new(TradeRecordInner::default()),
            workers: WorkerGroup::new(),
        }
    }
}

impl TradeRecord {
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, TradeRecordInner> {
        self.inner.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, TradeRecordInner> {
        self.inner.write()
    }
}

/// Map from market to its `TradeRecord`. Entries are only ever inserted,
/// never removed, for the life of the process (spec.md invariant 5).
#[derive(Default)]
pub struct TradeRegistry {
    markets: RwLock<HashMap<Market, Arc<TradeRecord>>>,
}

impl TradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: insert an empty record for `market` if one doesn't exist.
    pub fn set_market(&self, market: &Market) {
        if self.markets.read().contains_key(market) {
            return;
        }
        self.markets
            .write()
            .entry(market.clone())
            .or_insert_with(|| Arc::new(TradeRecord::default()));
    }

    /// Look up a market's record. Two-level discipline: this only takes the
    /// registry reader lock, clones the `Arc`, and releases it; callers then
    /// take the record's own lock separately.
    pub fn get(&self, market: &Market) -> Option<Arc<TradeRecord>> {
        self.markets.read().get(market).cloned()
    }

    /// Snapshot of every market currently in the registry, in insertion-order-
    /// agnostic (HashMap) order — sufficient for StartAll/StopAll/UnsetAll,
    /// which only need "one result entry per market present".
    pub fn snapshot(&self) -> Vec<(Market, Arc<TradeRecord>)> {
        self.markets
            .read()
            .iter()
            .map(|(m, r)| (m.clone(), r.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_market_is_idempotent() {
        let registry = TradeRegistry::new();
        registry.set_market(&"pi_ethusd".to_string());
        registry.set_market(&"pi_ethusd".to_string());
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn unknown_market_returns_none() {
        let registry = TradeRegistry::new();
        assert!(registry.get(&"nope".to_string()).is_none());
    }

    #[test]
    fn can_start_requires_armed_and_not_running() {
        let mut inner = TradeRecordInner::default();
        assert!(!inner.can_start());
        inner.sell.arm(100.0, 1);
        assert!(inner.can_start());
        inner.running = true;
        assert!(!inner.can_start());
    }

    #[test]
    fn snapshot_has_one_entry_per_market() {
        let registry = TradeRegistry::new();
        registry.set_market(&"a".to_string());
        registry.set_market(&"b".to_string());
        registry.set_market(&"c".to_string());
        assert_eq!(registry.snapshot().len(), 3);
    }
}
