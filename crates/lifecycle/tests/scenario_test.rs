//! End-to-end scenarios for the lifecycle analytics engine over the
//! in-memory datastore.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use storepulse_core::config::{CohortConfig, LookupConfig};
use storepulse_core::types::{StatusChangeEvent, StoreRecord, OVERALL_SCOPE};
use storepulse_core::StoreStatus;
use storepulse_datastore::{CounterStore, MemoryDatastore, SnapshotStore};
use storepulse_lifecycle::{
    CohortAnalyzer, FunnelAggregator, HeatmapAggregator, InactivityDetector,
    ReactivationRecalculator,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn store(id: &str, status: StoreStatus, seq: Option<&str>) -> StoreRecord {
    StoreRecord {
        store_id: id.to_string(),
        name: format!("Store {id}"),
        seq: seq.map(String::from),
        status,
        owner_id: None,
        created_at: Utc::now(),
    }
}

fn transition(
    id: &str,
    old: Option<StoreStatus>,
    new: StoreStatus,
    on: NaiveDate,
) -> StatusChangeEvent {
    StatusChangeEvent {
        store_id: id.to_string(),
        old_status: old,
        new_status: new,
        changed_at: on.and_hms_opt(12, 0, 0).unwrap().and_utc(),
        changed_date: Some(on),
    }
}

/// Scenario A: three stores, two in the final-install status, one churned,
/// one with no seq, no order activity anywhere.
#[tokio::test]
async fn scenario_funnel_without_activity() {
    let ds = Arc::new(MemoryDatastore::new());
    ds.insert_store(store("st-1", StoreStatus::InstallCompleted, Some("S1")));
    ds.insert_store(store("st-2", StoreStatus::InstallCompleted, None));
    ds.insert_store(store("st-3", StoreStatus::ServiceTerminated, Some("S3")));

    let aggregator = FunnelAggregator::new(ds.clone(), ds.clone(), ds.clone(), ds.clone());
    let report = aggregator.run_daily(date(2025, 1, 10), None).await.unwrap();

    let funnel = &report.overall.funnel;
    assert_eq!(funnel.registered, 3);
    assert_eq!(funnel.install_completed, 2);
    assert_eq!(funnel.active, 0);
    assert_eq!(report.overall.conversion.install_to_active, 0.0);

    let stage_sum: u64 = report.overall.stage_counts.values().sum();
    assert_eq!(stage_sum, report.overall.total_stores);
}

/// Scenario B: a churn on day D and a reactivation on day D+1 feed the
/// recalculator; cumulative counters reflect both without going negative.
#[tokio::test]
async fn scenario_recalc_churn_and_reactivation() {
    let ds = Arc::new(MemoryDatastore::new());
    let day_d = date(2025, 2, 1);
    let day_d1 = date(2025, 2, 2);
    ds.record_event(transition(
        "st-x",
        Some(StoreStatus::InstallCompleted),
        StoreStatus::ServiceTerminated,
        day_d,
    ));
    ds.record_event(transition(
        "st-y",
        Some(StoreStatus::ServiceTerminated),
        StoreStatus::InstallCompleted,
        day_d1,
    ));

    let recalculator = ReactivationRecalculator::new(ds.clone(), ds.clone(), ds.clone());
    recalculator.run().await.unwrap();

    let on_d = ds.get_counters(day_d).await.unwrap().unwrap();
    assert_eq!(on_d.new_churns, 1);
    assert_eq!(on_d.uninstalls, 1);

    let on_d1 = ds.get_counters(day_d1).await.unwrap().unwrap();
    assert_eq!(on_d1.reactivations, 1);
    assert_eq!(on_d1.new_installs, 1);

    // The uninstall on day D has no prior install to cancel; the floor
    // clamp keeps the counter at zero instead of going negative.
    assert_eq!(on_d.cumulative_installed, 0);
    assert_eq!(on_d.cumulative_churned, 1);
    assert_eq!(on_d1.cumulative_installed, 1);
    assert_eq!(on_d1.cumulative_churned, 0);
}

/// Scenario C: three-day heatmap window with a single order on the middle
/// day.
#[tokio::test]
async fn scenario_heatmap_three_day_window() {
    let ds = Arc::new(MemoryDatastore::new());
    ds.insert_store(store("st-1", StoreStatus::InstallCompleted, Some("S1")));
    ds.insert_order("S1", date(2025, 1, 2), 1);

    let aggregator = HeatmapAggregator::new(ds.clone(), ds.clone());
    let report = aggregator
        .build(date(2025, 1, 1), date(2025, 1, 3))
        .await
        .unwrap();

    assert_eq!(
        report.dates,
        vec![date(2025, 1, 1), date(2025, 1, 2), date(2025, 1, 3)]
    );
    let row = &report.rows[0];
    assert_eq!(row.seq, "S1");
    assert_eq!(row.daily.get(&date(2025, 1, 1)), Some(&0));
    assert_eq!(row.daily.get(&date(2025, 1, 2)), Some(&1));
    assert_eq!(row.daily.get(&date(2025, 1, 3)), Some(&0));
    assert_eq!(row.total, 1);
}

/// Scenario D: a store with orders a week before the target date and none
/// on it shows up in the inactivity report with last week's count.
#[tokio::test]
async fn scenario_inactivity_week_over_week() {
    let ds = Arc::new(MemoryDatastore::new());
    let target = date(2025, 3, 10);
    ds.insert_store(store("st-2", StoreStatus::InstallCompleted, Some("S2")));
    ds.record_event(transition(
        "st-2",
        Some(StoreStatus::Registered),
        StoreStatus::InstallCompleted,
        date(2025, 1, 20),
    ));
    ds.insert_order("S2", target - Duration::days(7), 3);

    let detector = InactivityDetector::new(ds.clone(), ds.clone(), ds.clone(), LookupConfig::default());
    let report = detector.detect(target).await.unwrap();

    assert_eq!(report.stores.len(), 1);
    assert_eq!(report.stores[0].store_id, "st-2");
    assert_eq!(report.stores[0].last_week_order_count, 3);
}

/// Cohort bucket totals account for every store with a qualifying first
/// install on or before the base date.
#[tokio::test]
async fn scenario_cohort_totals_account_for_qualifying_stores() {
    let ds = Arc::new(MemoryDatastore::new());
    let installs = [
        ("st-1", date(2025, 1, 10)),
        ("st-2", date(2025, 2, 5)),
        ("st-3", date(2025, 2, 20)),
        ("st-4", date(2025, 3, 1)),
    ];
    for (id, on) in installs {
        ds.insert_store(store(id, StoreStatus::InstallCompleted, None));
        ds.record_event(transition(
            id,
            Some(StoreStatus::Registered),
            StoreStatus::InstallCompleted,
            on,
        ));
    }
    // Registered-only store: never qualifies.
    ds.insert_store(store("st-5", StoreStatus::Registered, None));
    // Installed after the base date: excluded.
    ds.insert_store(store("st-6", StoreStatus::InstallCompleted, None));
    ds.record_event(transition(
        "st-6",
        Some(StoreStatus::Registered),
        StoreStatus::InstallCompleted,
        date(2025, 6, 1),
    ));

    let analyzer = CohortAnalyzer::new(
        ds.clone(),
        ds.clone(),
        ds.clone(),
        CohortConfig::default(),
        LookupConfig::default(),
    );
    let report = analyzer.analyze(date(2025, 3, 15)).await.unwrap();

    let total: u64 = report.buckets.iter().map(|b| b.total).sum();
    assert_eq!(total, 4);
    let classified: u64 = report
        .buckets
        .iter()
        .map(|b| b.active + b.inactive + b.churned)
        .sum();
    assert_eq!(classified, total);
}

/// Running the whole daily pipeline twice against the same inputs leaves
/// byte-identical snapshots behind.
#[tokio::test]
async fn scenario_daily_pipeline_rerun_is_idempotent() {
    let ds = Arc::new(MemoryDatastore::new());
    ds.seed_demo_data(date(2025, 6, 1));

    let aggregator = FunnelAggregator::new(ds.clone(), ds.clone(), ds.clone(), ds.clone());
    let recalculator = ReactivationRecalculator::new(ds.clone(), ds.clone(), ds.clone());

    aggregator.run_daily(date(2025, 6, 1), None).await.unwrap();
    recalculator.run().await.unwrap();
    let first = ds
        .get_snapshot(date(2025, 6, 1), OVERALL_SCOPE)
        .await
        .unwrap()
        .unwrap();

    aggregator.run_daily(date(2025, 6, 1), None).await.unwrap();
    recalculator.run().await.unwrap();
    let second = ds
        .get_snapshot(date(2025, 6, 1), OVERALL_SCOPE)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}
