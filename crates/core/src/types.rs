use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::status::StoreStatus;

/// Owner bucket used when a store has no assigned owner.
pub const UNASSIGNED_OWNER: &str = "unassigned";

/// Snapshot scope covering the whole roster.
pub const OVERALL_SCOPE: &str = "overall";

/// Snapshot scope for a single owner.
pub fn owner_scope(owner_id: &str) -> String {
    format!("owner:{owner_id}")
}

/// A merchant store as read from the roster table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub store_id: String,
    pub name: String,
    /// Join key into the order-activity records. Stores without commerce
    /// integration have none and can never count as "active".
    pub seq: Option<String>,
    pub status: StoreStatus,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoreRecord {
    /// Owner this store attributes to, defaulting to the unassigned bucket.
    pub fn owner(&self) -> &str {
        self.owner_id.as_deref().unwrap_or(UNASSIGNED_OWNER)
    }
}

/// Upstream systems write `"N/A"` (or nothing) for the prior status of a
/// freshly registered store; both forms map to `None`.
fn de_prior_status<'de, D>(deserializer: D) -> Result<Option<StoreStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref() {
        None | Some("") | Some("N/A") => None,
        Some(code) => Some(StoreStatus::from_code(code)),
    })
}

/// One append-only status-change event. Ordered by `changed_at` within a
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub store_id: String,
    #[serde(default, deserialize_with = "de_prior_status")]
    pub old_status: Option<StoreStatus>,
    pub new_status: StoreStatus,
    pub changed_at: DateTime<Utc>,
    /// Calendar day of the change. Events missing it are skipped by
    /// date-grouped consumers.
    #[serde(default)]
    pub changed_date: Option<NaiveDate>,
}

impl StatusChangeEvent {
    /// An event with no prior status is a fresh registration.
    pub fn is_fresh_registration(&self) -> bool {
        self.old_status.is_none()
    }
}

/// Pre-aggregated order count for one store on one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyOrderAggregate {
    pub seq: String,
    pub order_date: NaiveDate,
    pub order_count: u64,
}

// ---------------------------------------------------------------------------
// Funnel snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelCounts {
    pub registered: u64,
    pub install_completed: u64,
    pub active: u64,
    pub churned: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionRates {
    /// install_completed / registered, percent, one decimal. 0 when the
    /// denominator is 0.
    pub register_to_install: f64,
    /// active / install_completed, percent, one decimal. 0 when the
    /// denominator is 0.
    pub install_to_active: f64,
}

/// Day-over-day movement derived from today's event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyChange {
    pub new_registrations: u64,
    pub new_installs: u64,
    pub new_churns: u64,
}

/// An overwritable, dated funnel aggregate for one reporting scope.
/// Upserted by `(snapshot_date, scope)` — never appended, never merged.
///
/// Map fields use `BTreeMap` so serializing the same snapshot twice yields
/// byte-identical output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelSnapshot {
    pub snapshot_date: NaiveDate,
    pub scope: String,
    pub total_stores: u64,
    pub stage_counts: BTreeMap<String, u64>,
    pub funnel: FunnelCounts,
    pub conversion: ConversionRates,
    /// Overall scope only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_change: Option<DailyChange>,
    /// Churn-source histogram keyed by prior status. Overall scope only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub churn_analysis: Option<BTreeMap<String, u64>>,
    /// Registered count minus yesterday's snapshot, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_day_delta: Option<i64>,
}

// ---------------------------------------------------------------------------
// Reactivation-aware daily counters
// ---------------------------------------------------------------------------

/// Per-date lifecycle counters rebuilt by the reactivation recalculator.
/// Cumulative fields are floor-clamped at zero. Upserted by date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLifecycleCounters {
    pub date: NaiveDate,
    pub cumulative_installed: u64,
    pub cumulative_churned: u64,
    pub new_installs: u64,
    pub uninstalls: u64,
    pub new_churns: u64,
    pub reactivations: u64,
}

// ---------------------------------------------------------------------------
// Cohort report
// ---------------------------------------------------------------------------

/// Month key of the sentinel bucket collecting installs from before the
/// configured cutover date. Always sorts after every `YYYY-MM` key.
pub const LEGACY_COHORT_KEY: &str = "legacy";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortBucket {
    /// `YYYY-MM`, or [`LEGACY_COHORT_KEY`] for pre-cutover installs.
    pub month_key: String,
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub churned: u64,
    pub member_store_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortFlowLink {
    pub source: String,
    pub target: String,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortFlowGraph {
    pub nodes: Vec<String>,
    pub links: Vec<CohortFlowLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortReport {
    pub base_date: NaiveDate,
    /// Most recent first, sentinel bucket last, truncated to the configured
    /// display count.
    pub buckets: Vec<CohortBucket>,
    pub flow: CohortFlowGraph,
}

// ---------------------------------------------------------------------------
// Heatmap report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapRow {
    pub store_id: String,
    pub name: String,
    pub owner_id: String,
    pub seq: String,
    /// Every date of the requested window appears, zero-filled.
    pub daily: BTreeMap<NaiveDate, u64>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dates: Vec<NaiveDate>,
    /// Sorted by total descending; zero-activity stores sort last.
    pub rows: Vec<HeatmapRow>,
}

// ---------------------------------------------------------------------------
// Inactivity report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InactiveStore {
    pub store_id: String,
    pub name: String,
    pub owner_id: String,
    pub seq: String,
    pub last_week_order_count: u64,
    pub first_install_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InactivityReport {
    pub target_date: NaiveDate,
    /// The same weekday one week earlier.
    pub compared_to: NaiveDate,
    /// Sorted by first-install date descending; unknown dates last.
    pub stores: Vec<InactiveStore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prior_status_na_is_fresh_registration() {
        let json = r#"{
            "store_id": "st-1",
            "old_status": "N/A",
            "new_status": "registered",
            "changed_at": "2025-01-10T09:00:00Z",
            "changed_date": "2025-01-10"
        }"#;
        let event: StatusChangeEvent = serde_json::from_str(json).unwrap();
        assert!(event.is_fresh_registration());
    }

    #[test]
    fn test_prior_status_absent_is_fresh_registration() {
        let json = r#"{
            "store_id": "st-1",
            "new_status": "registered",
            "changed_at": "2025-01-10T09:00:00Z"
        }"#;
        let event: StatusChangeEvent = serde_json::from_str(json).unwrap();
        assert!(event.is_fresh_registration());
        assert!(event.changed_date.is_none());
    }

    #[test]
    fn test_prior_status_real_code() {
        let json = r#"{
            "store_id": "st-1",
            "old_status": "install_completed",
            "new_status": "service_terminated",
            "changed_at": "2025-01-10T09:00:00Z",
            "changed_date": "2025-01-10"
        }"#;
        let event: StatusChangeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.old_status, Some(StoreStatus::InstallCompleted));
        assert!(!event.is_fresh_registration());
    }

    #[test]
    fn test_owner_defaults_to_unassigned() {
        let store = StoreRecord {
            store_id: "st-1".into(),
            name: "Test Store".into(),
            seq: None,
            status: StoreStatus::Registered,
            owner_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(store.owner(), UNASSIGNED_OWNER);
    }

    #[test]
    fn test_snapshot_serialization_is_deterministic() {
        let mut stage_counts = BTreeMap::new();
        stage_counts.insert("registered".to_string(), 2);
        stage_counts.insert("install_completed".to_string(), 1);
        let snapshot = FunnelSnapshot {
            snapshot_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            scope: OVERALL_SCOPE.into(),
            total_stores: 3,
            stage_counts,
            funnel: FunnelCounts {
                registered: 3,
                install_completed: 1,
                active: 0,
                churned: 0,
            },
            conversion: ConversionRates::default(),
            daily_change: None,
            churn_analysis: None,
            previous_day_delta: None,
        };
        let first = serde_json::to_string(&snapshot).unwrap();
        let second = serde_json::to_string(&snapshot.clone()).unwrap();
        assert_eq!(first, second);
    }
}
