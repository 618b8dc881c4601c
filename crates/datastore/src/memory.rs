//! In-memory stand-in for the external schema-less key-value store,
//! backed by `DashMap` for lock-free concurrent access. Used by tests,
//! the demo seeding path, and the default binary wiring.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use storepulse_core::types::{
    DailyLifecycleCounters, DailyOrderAggregate, FunnelSnapshot, StatusChangeEvent, StoreRecord,
};
use storepulse_core::{PulseError, PulseResult, StoreStatus};

use crate::collaborators::{
    CounterStore, EventHistory, OrderActivity, Page, SnapshotStore, StoreRoster,
};

/// Rows per page returned by the paginated order scan.
const SCAN_PAGE_SIZE: usize = 500;

pub struct MemoryDatastore {
    stores: DashMap<String, StoreRecord>,
    /// Events per store, kept ordered by `changed_at`.
    events: DashMap<String, Vec<StatusChangeEvent>>,
    orders: DashMap<(String, NaiveDate), u64>,
    snapshots: DashMap<(NaiveDate, String), FunnelSnapshot>,
    counters: DashMap<NaiveDate, DailyLifecycleCounters>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            stores: DashMap::new(),
            events: DashMap::new(),
            orders: DashMap::new(),
            snapshots: DashMap::new(),
            counters: DashMap::new(),
        }
    }

    pub fn insert_store(&self, store: StoreRecord) {
        self.stores.insert(store.store_id.clone(), store);
    }

    /// Append a status-change event, preserving `changed_at` order.
    pub fn record_event(&self, event: StatusChangeEvent) {
        let mut list = self.events.entry(event.store_id.clone()).or_default();
        list.push(event);
        list.sort_by_key(|e| e.changed_at);
    }

    /// Upsert the order count for one `(seq, date)` cell.
    pub fn insert_order(&self, seq: &str, order_date: NaiveDate, order_count: u64) {
        self.orders
            .insert((seq.to_string(), order_date), order_count);
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    fn sorted_orders(
        &self,
        window: Option<(NaiveDate, NaiveDate)>,
    ) -> Vec<DailyOrderAggregate> {
        let mut rows: Vec<DailyOrderAggregate> = self
            .orders
            .iter()
            .filter(|entry| match window {
                Some((start, end)) => {
                    let date = entry.key().1;
                    date >= start && date <= end
                }
                None => true,
            })
            .map(|entry| DailyOrderAggregate {
                seq: entry.key().0.clone(),
                order_date: entry.key().1,
                order_count: *entry.value(),
            })
            .collect();
        rows.sort_by(|a, b| (a.order_date, &a.seq).cmp(&(b.order_date, &b.seq)));
        rows
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreRoster for MemoryDatastore {
    async fn scan_all(&self) -> PulseResult<Vec<StoreRecord>> {
        let mut all: Vec<StoreRecord> = self.stores.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.store_id.cmp(&b.store_id));
        Ok(all)
    }

    async fn scan_by_status(&self, status: StoreStatus) -> PulseResult<Vec<StoreRecord>> {
        let mut matched: Vec<StoreRecord> = self
            .stores
            .iter()
            .filter(|s| s.value().status == status)
            .map(|s| s.value().clone())
            .collect();
        matched.sort_by(|a, b| a.store_id.cmp(&b.store_id));
        Ok(matched)
    }
}

#[async_trait]
impl EventHistory for MemoryDatastore {
    async fn scan_all(&self) -> PulseResult<Vec<StatusChangeEvent>> {
        let mut all: Vec<StatusChangeEvent> = self
            .events
            .iter()
            .flat_map(|e| e.value().clone())
            .collect();
        all.sort_by_key(|e| e.changed_at);
        Ok(all)
    }

    async fn events_on(&self, date: NaiveDate) -> PulseResult<Vec<StatusChangeEvent>> {
        let mut matched: Vec<StatusChangeEvent> = self
            .events
            .iter()
            .flat_map(|e| e.value().clone())
            .filter(|e| e.changed_date == Some(date))
            .collect();
        matched.sort_by_key(|e| e.changed_at);
        Ok(matched)
    }

    async fn events_for_store(&self, store_id: &str) -> PulseResult<Vec<StatusChangeEvent>> {
        Ok(self
            .events
            .get(store_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrderActivity for MemoryDatastore {
    async fn scan_page(
        &self,
        window: Option<(NaiveDate, NaiveDate)>,
        continuation: Option<String>,
    ) -> PulseResult<Page<DailyOrderAggregate>> {
        let offset = match continuation {
            Some(token) => token.parse::<usize>().map_err(|_| {
                PulseError::Datastore(format!("invalid continuation token: {token}"))
            })?,
            None => 0,
        };

        let rows = self.sorted_orders(window);
        let items: Vec<DailyOrderAggregate> = rows
            .iter()
            .skip(offset)
            .take(SCAN_PAGE_SIZE)
            .cloned()
            .collect();
        let consumed = offset + items.len();
        let next_token = (consumed < rows.len()).then(|| consumed.to_string());

        Ok(Page { items, next_token })
    }

    async fn active_seqs(
        &self,
        window: Option<(NaiveDate, NaiveDate)>,
    ) -> PulseResult<HashSet<String>> {
        Ok(self
            .sorted_orders(window)
            .into_iter()
            .filter(|row| row.order_count > 0)
            .map(|row| row.seq)
            .collect())
    }

    async fn order_counts_on(&self, date: NaiveDate) -> PulseResult<HashMap<String, u64>> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| entry.key().1 == date && *entry.value() > 0)
            .map(|entry| (entry.key().0.clone(), *entry.value()))
            .collect())
    }

    async fn known_dates(&self) -> PulseResult<Vec<NaiveDate>> {
        let dates: BTreeSet<NaiveDate> = self.orders.iter().map(|entry| entry.key().1).collect();
        Ok(dates.into_iter().collect())
    }
}

#[async_trait]
impl SnapshotStore for MemoryDatastore {
    async fn upsert_snapshot(&self, snapshot: FunnelSnapshot) -> PulseResult<()> {
        self.snapshots
            .insert((snapshot.snapshot_date, snapshot.scope.clone()), snapshot);
        Ok(())
    }

    async fn get_snapshot(
        &self,
        date: NaiveDate,
        scope: &str,
    ) -> PulseResult<Option<FunnelSnapshot>> {
        Ok(self
            .snapshots
            .get(&(date, scope.to_string()))
            .map(|s| s.value().clone()))
    }
}

#[async_trait]
impl CounterStore for MemoryDatastore {
    async fn upsert_counters(&self, counters: DailyLifecycleCounters) -> PulseResult<()> {
        self.counters.insert(counters.date, counters);
        Ok(())
    }

    async fn get_counters(
        &self,
        date: NaiveDate,
    ) -> PulseResult<Option<DailyLifecycleCounters>> {
        Ok(self.counters.get(&date).map(|c| c.value().clone()))
    }
}

// ---------------------------------------------------------------------------
// Demo seeding
// ---------------------------------------------------------------------------

fn ts(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, 0, 0)
        .expect("valid seed timestamp")
        .and_utc()
}

impl MemoryDatastore {
    /// Register a store plus its lifecycle events in one call. `installed`
    /// and `terminated` are day offsets before `today`.
    #[allow(clippy::too_many_arguments)]
    fn seed_store(
        &self,
        today: NaiveDate,
        store_id: &str,
        name: &str,
        owner_id: Option<&str>,
        status: StoreStatus,
        seq: Option<&str>,
        registered_days_ago: i64,
        installed_days_ago: Option<i64>,
        terminated_days_ago: Option<i64>,
    ) {
        let registered_on = today - Duration::days(registered_days_ago);
        self.insert_store(StoreRecord {
            store_id: store_id.to_string(),
            name: name.to_string(),
            seq: seq.map(String::from),
            status,
            owner_id: owner_id.map(String::from),
            created_at: ts(registered_on, 9),
        });
        self.record_event(StatusChangeEvent {
            store_id: store_id.to_string(),
            old_status: None,
            new_status: StoreStatus::Registered,
            changed_at: ts(registered_on, 9),
            changed_date: Some(registered_on),
        });

        if let Some(days) = installed_days_ago {
            let installed_on = today - Duration::days(days);
            self.record_event(StatusChangeEvent {
                store_id: store_id.to_string(),
                old_status: Some(StoreStatus::Registered),
                new_status: StoreStatus::InstallCompleted,
                changed_at: ts(installed_on, 10),
                changed_date: Some(installed_on),
            });
        }

        if let Some(days) = terminated_days_ago {
            let terminated_on = today - Duration::days(days);
            let old = if installed_days_ago.is_some() {
                Some(StoreStatus::InstallCompleted)
            } else {
                Some(StoreStatus::Registered)
            };
            self.record_event(StatusChangeEvent {
                store_id: store_id.to_string(),
                old_status: old,
                new_status: status,
                changed_at: ts(terminated_on, 11),
                changed_date: Some(terminated_on),
            });
        }
    }

    fn seed_orders(&self, rng: &mut StdRng, seq: &str, today: NaiveDate, from: i64, until: i64) {
        for days_ago in (until..=from).rev() {
            // Roughly one quiet day in four.
            if rng.gen_range(0..4) == 0 {
                continue;
            }
            let date = today - Duration::days(days_ago);
            self.insert_order(seq, date, rng.gen_range(1..=8));
        }
    }

    /// Seed a small roster with lifecycle histories and order activity for
    /// demo/testing purposes. Deterministic for a fixed `today`.
    pub fn seed_demo_data(&self, today: NaiveDate) {
        let mut rng = StdRng::seed_from_u64(42);

        // Ordering merchants with current activity.
        self.seed_store(today, "st-0001", "Harbor Coffee", Some("own-01"),
            StoreStatus::InstallCompleted, Some("SEQ-1001"), 420, Some(400), None);
        self.seed_store(today, "st-0002", "Maple & Stone", Some("own-02"),
            StoreStatus::InstallCompleted, Some("SEQ-1002"), 250, Some(230), None);
        self.seed_store(today, "st-0003", "Blue Fern Books", Some("own-01"),
            StoreStatus::InstallCompleted, Some("SEQ-1003"), 90, Some(75), None);
        self.seed_orders(&mut rng, "SEQ-1001", today, 60, 0);
        self.seed_orders(&mut rng, "SEQ-1002", today, 45, 0);
        self.seed_orders(&mut rng, "SEQ-1003", today, 30, 0);

        // Installed but quiet: ordered until last week, nothing today.
        self.seed_store(today, "st-0004", "Juniper Deli", Some("own-03"),
            StoreStatus::InstallCompleted, Some("SEQ-1004"), 180, Some(160), None);
        self.seed_orders(&mut rng, "SEQ-1004", today, 40, 6);
        self.insert_order("SEQ-1004", today - Duration::days(7), 5);

        // Installed long ago, dormant for months.
        self.seed_store(today, "st-0005", "Old Mill Outfitters", Some("own-02"),
            StoreStatus::InstallCompleted, Some("SEQ-1005"), 700, Some(680), None);
        self.seed_orders(&mut rng, "SEQ-1005", today, 680, 500);

        // Early-funnel stores, no commerce integration yet.
        self.seed_store(today, "st-0006", "Cedar Lane Goods", Some("own-03"),
            StoreStatus::Registered, None, 12, None, None);
        self.seed_store(today, "st-0007", "Riverbend Supply", None,
            StoreStatus::Preparing, None, 30, None, None);

        // Installed-set edge statuses.
        self.seed_store(today, "st-0008", "Garnet Atelier", Some("own-01"),
            StoreStatus::Suspended, Some("SEQ-1008"), 300, Some(280), None);
        self.seed_orders(&mut rng, "SEQ-1008", today, 280, 120);
        self.seed_store(today, "st-0009", "Northway Cycles", Some("own-02"),
            StoreStatus::Defect, Some("SEQ-1009"), 200, Some(190), None);

        // Churned stores.
        self.seed_store(today, "st-0010", "Lantern Row", Some("own-03"),
            StoreStatus::ServiceTerminated, Some("SEQ-1010"), 500, Some(480), Some(60));
        self.seed_store(today, "st-0011", "Quill & Co", None,
            StoreStatus::UnusedTerminated, None, 150, None, Some(100));

        // Reactivated: terminated, then back to install-completed.
        self.seed_store(today, "st-0012", "Summit Tea House", Some("own-01"),
            StoreStatus::InstallCompleted, Some("SEQ-1012"), 600, Some(580), None);
        let terminated_on = today - Duration::days(90);
        self.record_event(StatusChangeEvent {
            store_id: "st-0012".to_string(),
            old_status: Some(StoreStatus::InstallCompleted),
            new_status: StoreStatus::ServiceTerminated,
            changed_at: ts(terminated_on, 11),
            changed_date: Some(terminated_on),
        });
        let reactivated_on = today - Duration::days(30);
        self.record_event(StatusChangeEvent {
            store_id: "st-0012".to_string(),
            old_status: Some(StoreStatus::ServiceTerminated),
            new_status: StoreStatus::InstallCompleted,
            changed_at: ts(reactivated_on, 14),
            changed_date: Some(reactivated_on),
        });
        self.seed_orders(&mut rng, "SEQ-1012", today, 28, 0);

        info!(stores = self.stores.len(), "demo lifecycle data seeded");
    }
}
