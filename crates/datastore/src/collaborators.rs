//! Trait seams for the external persistent store. The analytics engine
//! consumes these query capabilities; it never owns the storage itself.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use storepulse_core::types::{
    DailyLifecycleCounters, DailyOrderAggregate, FunnelSnapshot, StatusChangeEvent, StoreRecord,
};
use storepulse_core::{PulseResult, StoreStatus};

/// One page of a token-paginated scan.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque continuation token; `None` once the scan is exhausted.
    /// Callers must keep looping until then — partial scans are never
    /// surfaced as final aggregates.
    pub next_token: Option<String>,
}

/// Read access to the merchant store roster.
#[async_trait]
pub trait StoreRoster: Send + Sync {
    /// Full-table scan.
    async fn scan_all(&self) -> PulseResult<Vec<StoreRecord>>;

    /// Conditional scan filtered to a single status.
    async fn scan_by_status(&self, status: StoreStatus) -> PulseResult<Vec<StoreRecord>>;
}

/// Read access to the append-only status-change event log.
#[async_trait]
pub trait EventHistory: Send + Sync {
    /// Full-table scan of the entire history.
    async fn scan_all(&self) -> PulseResult<Vec<StatusChangeEvent>>;

    /// Events whose `changed_date` equals `date`.
    async fn events_on(&self, date: NaiveDate) -> PulseResult<Vec<StatusChangeEvent>>;

    /// Indexed range query: all events of one store, ordered by
    /// `changed_at`.
    async fn events_for_store(&self, store_id: &str) -> PulseResult<Vec<StatusChangeEvent>>;
}

/// Read access to the per-store per-day order aggregate table.
#[async_trait]
pub trait OrderActivity: Send + Sync {
    /// Paginated scan, optionally filtered to an inclusive date window.
    async fn scan_page(
        &self,
        window: Option<(NaiveDate, NaiveDate)>,
        continuation: Option<String>,
    ) -> PulseResult<Page<DailyOrderAggregate>>;

    /// Seqs with any positive-count day, optionally restricted to an
    /// inclusive window.
    async fn active_seqs(
        &self,
        window: Option<(NaiveDate, NaiveDate)>,
    ) -> PulseResult<HashSet<String>>;

    /// Seq → order count for one day, positive counts only.
    async fn order_counts_on(&self, date: NaiveDate) -> PulseResult<HashMap<String, u64>>;

    /// All distinct aggregate dates, ascending.
    async fn known_dates(&self) -> PulseResult<Vec<NaiveDate>>;
}

/// Write/read access for daily funnel snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Overwrite by `(snapshot_date, scope)`.
    async fn upsert_snapshot(&self, snapshot: FunnelSnapshot) -> PulseResult<()>;

    async fn get_snapshot(
        &self,
        date: NaiveDate,
        scope: &str,
    ) -> PulseResult<Option<FunnelSnapshot>>;
}

/// Write/read access for recalculated daily lifecycle counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Overwrite by date.
    async fn upsert_counters(&self, counters: DailyLifecycleCounters) -> PulseResult<()>;

    async fn get_counters(&self, date: NaiveDate) -> PulseResult<Option<DailyLifecycleCounters>>;
}
