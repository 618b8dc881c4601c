//! Monthly installation cohorts — buckets stores by first-install month,
//! classifies each member as active/inactive/churned, and emits a flow
//! graph for the most recent cohorts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use storepulse_core::config::{CohortConfig, LookupConfig};
use storepulse_core::types::{
    CohortBucket, CohortFlowGraph, CohortFlowLink, CohortReport, LEGACY_COHORT_KEY,
};
use storepulse_core::{PulseError, PulseResult};
use storepulse_datastore::{EventHistory, OrderActivity, StoreRoster};

/// Earliest transition into the final-install status per store, discovered
/// through concurrent per-store history lookups bounded by a semaphore of
/// `max_concurrent` permits. Stores with no qualifying event are absent
/// from the result. Lookup interleaving does not affect the outcome: the
/// results merge into a map keyed by store id.
pub(crate) async fn discover_first_installs(
    events: Arc<dyn EventHistory>,
    store_ids: impl IntoIterator<Item = String>,
    max_concurrent: usize,
) -> PulseResult<HashMap<String, DateTime<Utc>>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut lookups = JoinSet::new();
    for store_id in store_ids {
        let events = events.clone();
        let semaphore = semaphore.clone();
        lookups.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| PulseError::Report("lookup semaphore closed".to_string()))?;
            let history = events.events_for_store(&store_id).await?;
            let first = history
                .iter()
                .filter(|e| e.new_status.is_final_install())
                .map(|e| e.changed_at)
                .min();
            Ok::<_, PulseError>((store_id, first))
        });
    }

    let mut first_installs = HashMap::new();
    while let Some(joined) = lookups.join_next().await {
        let (store_id, first) = joined.map_err(|e| PulseError::Internal(e.into()))??;
        if let Some(at) = first {
            first_installs.insert(store_id, at);
        }
    }
    Ok(first_installs)
}

pub struct CohortAnalyzer {
    roster: Arc<dyn StoreRoster>,
    events: Arc<dyn EventHistory>,
    orders: Arc<dyn OrderActivity>,
    cohort_config: CohortConfig,
    lookup_config: LookupConfig,
}

impl CohortAnalyzer {
    pub fn new(
        roster: Arc<dyn StoreRoster>,
        events: Arc<dyn EventHistory>,
        orders: Arc<dyn OrderActivity>,
        cohort_config: CohortConfig,
        lookup_config: LookupConfig,
    ) -> Self {
        Self {
            roster,
            events,
            orders,
            cohort_config,
            lookup_config,
        }
    }

    fn month_key(&self, installed_on: NaiveDate) -> String {
        if installed_on < self.cohort_config.cutover_date {
            LEGACY_COHORT_KEY.to_string()
        } else {
            installed_on.format("%Y-%m").to_string()
        }
    }

    /// Build the cohort report as of `base_date` (end-of-day inclusive).
    ///
    /// The active check uses a point-in-time order-recency window while
    /// the churn check uses the live current status; a store's
    /// classification can move as its status changes even though its
    /// bucket never does.
    pub async fn analyze(&self, base_date: NaiveDate) -> PulseResult<CohortReport> {
        let roster = self.roster.scan_all().await?;
        let first_installs = discover_first_installs(
            self.events.clone(),
            roster.iter().map(|s| s.store_id.clone()),
            self.lookup_config.max_concurrent,
        )
        .await?;

        let window_start = base_date - Duration::days(self.cohort_config.recency_window_days);
        let active_seqs = self
            .orders
            .active_seqs(Some((window_start, base_date)))
            .await?;

        let mut buckets: BTreeMap<String, CohortBucket> = BTreeMap::new();
        for store in &roster {
            let installed_at = match first_installs.get(&store.store_id) {
                Some(at) => *at,
                None => continue,
            };
            let installed_on = installed_at.date_naive();
            if installed_on > base_date {
                continue;
            }

            let key = self.month_key(installed_on);
            let bucket = buckets
                .entry(key.clone())
                .or_insert_with(|| CohortBucket {
                    month_key: key,
                    total: 0,
                    active: 0,
                    inactive: 0,
                    churned: 0,
                    member_store_ids: Vec::new(),
                });
            bucket.total += 1;
            bucket.member_store_ids.push(store.store_id.clone());

            let has_recent_orders = store
                .seq
                .as_ref()
                .map(|seq| active_seqs.contains(seq))
                .unwrap_or(false);
            if has_recent_orders {
                bucket.active += 1;
            } else if store.status.is_churned() {
                bucket.churned += 1;
            } else {
                bucket.inactive += 1;
            }
        }

        // Most recent month first; the legacy bucket is pinned last no
        // matter what its literal key would sort as.
        let mut ordered_keys: Vec<String> = buckets
            .keys()
            .filter(|k| k.as_str() != LEGACY_COHORT_KEY)
            .cloned()
            .collect();
        ordered_keys.sort_by(|a, b| b.cmp(a));
        if buckets.contains_key(LEGACY_COHORT_KEY) {
            ordered_keys.push(LEGACY_COHORT_KEY.to_string());
        }
        ordered_keys.truncate(self.cohort_config.display_cohorts);

        let displayed: Vec<CohortBucket> = ordered_keys
            .iter()
            .filter_map(|k| buckets.get(k).cloned())
            .collect();

        let mut nodes: Vec<String> = displayed.iter().map(|b| b.month_key.clone()).collect();
        nodes.extend(["active", "inactive", "churned"].map(String::from));
        let mut links = Vec::new();
        for bucket in &displayed {
            for (target, value) in [
                ("active", bucket.active),
                ("inactive", bucket.inactive),
                ("churned", bucket.churned),
            ] {
                if value > 0 {
                    links.push(CohortFlowLink {
                        source: bucket.month_key.clone(),
                        target: target.to_string(),
                        value,
                    });
                }
            }
        }

        info!(
            base_date = %base_date,
            cohorts = displayed.len(),
            qualifying_stores = first_installs.len(),
            "cohort report built"
        );

        Ok(CohortReport {
            base_date,
            buckets: displayed,
            flow: CohortFlowGraph { nodes, links },
        })
    }
}
