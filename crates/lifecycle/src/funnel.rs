//! Daily funnel aggregation — one pass over the roster plus one pass over
//! today's events, emitting an overall snapshot and one snapshot per owner.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use storepulse_core::types::{
    owner_scope, ConversionRates, DailyChange, FunnelCounts, FunnelSnapshot, OVERALL_SCOPE,
};
use storepulse_core::{PulseResult, StoreStatus};
use storepulse_datastore::{EventHistory, OrderActivity, SnapshotStore, StoreRoster};

/// Mutable counters for one reporting scope. Owner scopes are initialized
/// lazily on first sight; nothing survives the invocation.
#[derive(Debug, Clone, Default)]
struct ScopeAccumulator {
    total: u64,
    stage_counts: BTreeMap<String, u64>,
    funnel: FunnelCounts,
}

impl ScopeAccumulator {
    fn observe(&mut self, status: StoreStatus, active: bool) {
        self.total += 1;
        *self
            .stage_counts
            .entry(status.as_str().to_string())
            .or_insert(0) += 1;
        self.funnel.registered += 1;
        if status.in_funnel_install_set() {
            self.funnel.install_completed += 1;
        }
        if active {
            self.funnel.active += 1;
        }
        if status.is_churned() {
            self.funnel.churned += 1;
        }
    }

    fn conversion(&self) -> ConversionRates {
        ConversionRates {
            register_to_install: percent(self.funnel.install_completed, self.funnel.registered),
            install_to_active: percent(self.funnel.active, self.funnel.install_completed),
        }
    }
}

/// Percentage rounded to one decimal; 0 when the denominator is 0.
fn percent(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 1000.0).round() / 10.0
}

/// Result of one daily funnel run: the upserted snapshots.
#[derive(Debug, Clone)]
pub struct DailyFunnelReport {
    pub overall: FunnelSnapshot,
    /// One snapshot per owner, ordered by owner id.
    pub owners: Vec<FunnelSnapshot>,
}

pub struct FunnelAggregator {
    roster: Arc<dyn StoreRoster>,
    events: Arc<dyn EventHistory>,
    orders: Arc<dyn OrderActivity>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl FunnelAggregator {
    pub fn new(
        roster: Arc<dyn StoreRoster>,
        events: Arc<dyn EventHistory>,
        orders: Arc<dyn OrderActivity>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            roster,
            events,
            orders,
            snapshots,
        }
    }

    /// Compute and upsert the funnel snapshots for `snapshot_date`.
    ///
    /// `activity_window` restricts the "active" determination to seqs with
    /// orders inside the window; `None` counts any order activity ever.
    /// Upserts overwrite by `(snapshot_date, scope)`, so reruns are
    /// idempotent.
    pub async fn run_daily(
        &self,
        snapshot_date: NaiveDate,
        activity_window: Option<(NaiveDate, NaiveDate)>,
    ) -> PulseResult<DailyFunnelReport> {
        let active_seqs = self.orders.active_seqs(activity_window).await?;
        let roster = self.roster.scan_all().await?;

        let mut overall = ScopeAccumulator::default();
        let mut owners: BTreeMap<String, ScopeAccumulator> = BTreeMap::new();
        for store in &roster {
            let active = store
                .seq
                .as_ref()
                .map(|seq| active_seqs.contains(seq))
                .unwrap_or(false);
            overall.observe(store.status, active);
            owners
                .entry(store.owner().to_string())
                .or_default()
                .observe(store.status, active);
        }

        let today_events = self.events.events_on(snapshot_date).await?;
        let mut daily_change = DailyChange::default();
        let mut churn_analysis: BTreeMap<String, u64> = BTreeMap::new();
        for event in &today_events {
            let was_installed = event
                .old_status
                .map(|s| s.in_funnel_install_set())
                .unwrap_or(false);
            let was_churned = event.old_status.map(|s| s.is_churned()).unwrap_or(false);

            if event.is_fresh_registration() {
                daily_change.new_registrations += 1;
            }
            if event.new_status.in_funnel_install_set() && !was_installed {
                daily_change.new_installs += 1;
            }
            if event.new_status.is_churned() && !was_churned {
                daily_change.new_churns += 1;
                let source = event
                    .old_status
                    .map(|s| s.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                *churn_analysis.entry(source).or_insert(0) += 1;
            }
        }

        let previous_day_delta = match self
            .snapshots
            .get_snapshot(snapshot_date - Duration::days(1), OVERALL_SCOPE)
            .await?
        {
            Some(previous) => Some(
                overall.funnel.registered as i64 - previous.funnel.registered as i64,
            ),
            None => {
                debug!(date = %snapshot_date, "no snapshot for previous day, delta omitted");
                None
            }
        };

        let overall_snapshot = FunnelSnapshot {
            snapshot_date,
            scope: OVERALL_SCOPE.to_string(),
            total_stores: overall.total,
            stage_counts: overall.stage_counts.clone(),
            funnel: overall.funnel.clone(),
            conversion: overall.conversion(),
            daily_change: Some(daily_change),
            churn_analysis: Some(churn_analysis),
            previous_day_delta,
        };
        self.snapshots
            .upsert_snapshot(overall_snapshot.clone())
            .await?;

        let mut owner_snapshots = Vec::with_capacity(owners.len());
        for (owner_id, acc) in &owners {
            let snapshot = FunnelSnapshot {
                snapshot_date,
                scope: owner_scope(owner_id),
                total_stores: acc.total,
                stage_counts: acc.stage_counts.clone(),
                funnel: acc.funnel.clone(),
                conversion: acc.conversion(),
                daily_change: None,
                churn_analysis: None,
                previous_day_delta: None,
            };
            self.snapshots.upsert_snapshot(snapshot.clone()).await?;
            owner_snapshots.push(snapshot);
        }

        info!(
            date = %snapshot_date,
            stores = overall.total,
            owners = owner_snapshots.len(),
            events = today_events.len(),
            "daily funnel snapshots written"
        );

        Ok(DailyFunnelReport {
            overall: overall_snapshot,
            owners: owner_snapshots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storepulse_core::types::{StatusChangeEvent, StoreRecord};
    use storepulse_datastore::MemoryDatastore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store(id: &str, status: StoreStatus, seq: Option<&str>, owner: Option<&str>) -> StoreRecord {
        StoreRecord {
            store_id: id.to_string(),
            name: format!("Store {id}"),
            seq: seq.map(String::from),
            status,
            owner_id: owner.map(String::from),
            created_at: Utc::now(),
        }
    }

    fn aggregator(ds: &Arc<MemoryDatastore>) -> FunnelAggregator {
        FunnelAggregator::new(ds.clone(), ds.clone(), ds.clone(), ds.clone())
    }

    #[tokio::test]
    async fn test_roster_with_no_activity() {
        // Two installed stores and a churned one, no orders at all; one
        // installed store has no seq.
        let ds = Arc::new(MemoryDatastore::new());
        ds.insert_store(store("st-1", StoreStatus::InstallCompleted, Some("S1"), None));
        ds.insert_store(store("st-2", StoreStatus::InstallCompleted, None, None));
        ds.insert_store(store(
            "st-3",
            StoreStatus::ServiceTerminated,
            Some("S3"),
            None,
        ));

        let report = aggregator(&ds)
            .run_daily(date(2025, 1, 10), None)
            .await
            .unwrap();

        let funnel = &report.overall.funnel;
        assert_eq!(funnel.registered, 3);
        assert_eq!(funnel.install_completed, 2);
        assert_eq!(funnel.active, 0);
        assert_eq!(funnel.churned, 1);
        assert_eq!(report.overall.conversion.install_to_active, 0.0);
    }

    #[tokio::test]
    async fn test_stage_counts_sum_to_total() {
        let ds = Arc::new(MemoryDatastore::new());
        for (i, status) in StoreStatus::ALL.iter().enumerate() {
            ds.insert_store(store(&format!("st-{i}"), *status, None, None));
        }

        let report = aggregator(&ds)
            .run_daily(date(2025, 1, 10), None)
            .await
            .unwrap();

        let sum: u64 = report.overall.stage_counts.values().sum();
        assert_eq!(sum, report.overall.total_stores);
        for snapshot in &report.owners {
            let sum: u64 = snapshot.stage_counts.values().sum();
            assert_eq!(sum, snapshot.total_stores);
        }
    }

    #[tokio::test]
    async fn test_conversion_rates_bounded_and_rounded() {
        let ds = Arc::new(MemoryDatastore::new());
        ds.insert_store(store("st-1", StoreStatus::InstallCompleted, Some("S1"), None));
        ds.insert_store(store("st-2", StoreStatus::InstallCompleted, Some("S2"), None));
        ds.insert_store(store("st-3", StoreStatus::Registered, None, None));
        ds.insert_order("S1", date(2025, 1, 9), 4);

        let report = aggregator(&ds)
            .run_daily(date(2025, 1, 10), None)
            .await
            .unwrap();

        let conversion = &report.overall.conversion;
        // 2/3 = 66.666..% -> 66.7, 1/2 = 50.0
        assert_eq!(conversion.register_to_install, 66.7);
        assert_eq!(conversion.install_to_active, 50.0);
        assert!(conversion.register_to_install <= 100.0);
        assert!(conversion.install_to_active <= 100.0);
    }

    #[tokio::test]
    async fn test_owner_attribution_defaults_to_unassigned() {
        let ds = Arc::new(MemoryDatastore::new());
        ds.insert_store(store("st-1", StoreStatus::Registered, None, Some("own-01")));
        ds.insert_store(store("st-2", StoreStatus::Registered, None, None));

        let report = aggregator(&ds)
            .run_daily(date(2025, 1, 10), None)
            .await
            .unwrap();

        let scopes: Vec<&str> = report.owners.iter().map(|s| s.scope.as_str()).collect();
        assert_eq!(scopes, vec!["owner:own-01", "owner:unassigned"]);
    }

    #[tokio::test]
    async fn test_daily_change_and_churn_sources() {
        let ds = Arc::new(MemoryDatastore::new());
        ds.insert_store(store("st-1", StoreStatus::Registered, None, None));
        let d = date(2025, 1, 10);
        let at = d.and_hms_opt(9, 0, 0).unwrap().and_utc();
        ds.record_event(StatusChangeEvent {
            store_id: "st-1".into(),
            old_status: None,
            new_status: StoreStatus::Registered,
            changed_at: at,
            changed_date: Some(d),
        });
        ds.record_event(StatusChangeEvent {
            store_id: "st-2".into(),
            old_status: Some(StoreStatus::Registered),
            new_status: StoreStatus::InstallCompleted,
            changed_at: at,
            changed_date: Some(d),
        });
        ds.record_event(StatusChangeEvent {
            store_id: "st-3".into(),
            old_status: Some(StoreStatus::InstallCompleted),
            new_status: StoreStatus::ServiceTerminated,
            changed_at: at,
            changed_date: Some(d),
        });
        ds.record_event(StatusChangeEvent {
            store_id: "st-4".into(),
            old_status: Some(StoreStatus::Suspended),
            new_status: StoreStatus::UnusedTerminated,
            changed_at: at,
            changed_date: Some(d),
        });

        let report = aggregator(&ds).run_daily(d, None).await.unwrap();

        let change = report.overall.daily_change.as_ref().unwrap();
        assert_eq!(change.new_registrations, 1);
        assert_eq!(change.new_installs, 1);
        assert_eq!(change.new_churns, 2);

        let churn = report.overall.churn_analysis.as_ref().unwrap();
        assert_eq!(churn.get("install_completed"), Some(&1));
        assert_eq!(churn.get("suspended"), Some(&1));
    }

    #[tokio::test]
    async fn test_missing_yesterday_snapshot_is_not_an_error() {
        let ds = Arc::new(MemoryDatastore::new());
        ds.insert_store(store("st-1", StoreStatus::Registered, None, None));

        let report = aggregator(&ds)
            .run_daily(date(2025, 1, 10), None)
            .await
            .unwrap();
        assert!(report.overall.previous_day_delta.is_none());
    }

    #[tokio::test]
    async fn test_previous_day_delta_when_snapshot_exists() {
        let ds = Arc::new(MemoryDatastore::new());
        ds.insert_store(store("st-1", StoreStatus::Registered, None, None));

        aggregator(&ds)
            .run_daily(date(2025, 1, 9), None)
            .await
            .unwrap();
        ds.insert_store(store("st-2", StoreStatus::Registered, None, None));
        let report = aggregator(&ds)
            .run_daily(date(2025, 1, 10), None)
            .await
            .unwrap();

        assert_eq!(report.overall.previous_day_delta, Some(1));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_byte_identical() {
        let ds = Arc::new(MemoryDatastore::new());
        ds.insert_store(store("st-1", StoreStatus::InstallCompleted, Some("S1"), Some("own-01")));
        ds.insert_store(store("st-2", StoreStatus::Registered, None, None));
        ds.insert_order("S1", date(2025, 1, 8), 2);

        let d = date(2025, 1, 10);
        aggregator(&ds).run_daily(d, None).await.unwrap();
        let first = ds.get_snapshot(d, OVERALL_SCOPE).await.unwrap().unwrap();
        aggregator(&ds).run_daily(d, None).await.unwrap();
        let second = ds.get_snapshot(d, OVERALL_SCOPE).await.unwrap().unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_windowed_activity() {
        let ds = Arc::new(MemoryDatastore::new());
        ds.insert_store(store("st-1", StoreStatus::InstallCompleted, Some("S1"), None));
        ds.insert_order("S1", date(2024, 12, 1), 9);

        // All-time activity counts the December orders...
        let all_time = aggregator(&ds)
            .run_daily(date(2025, 1, 10), None)
            .await
            .unwrap();
        assert_eq!(all_time.overall.funnel.active, 1);

        // ...a January window does not.
        let windowed = aggregator(&ds)
            .run_daily(date(2025, 1, 10), Some((date(2025, 1, 1), date(2025, 1, 10))))
            .await
            .unwrap();
        assert_eq!(windowed.overall.funnel.active, 0);
    }
}
