//! Week-over-week inactivity detection — stores that had orders one week
//! ago but none on the target day.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::info;

use storepulse_core::config::LookupConfig;
use storepulse_core::status::FINAL_INSTALL;
use storepulse_core::types::{InactiveStore, InactivityReport};
use storepulse_core::PulseResult;
use storepulse_datastore::{EventHistory, OrderActivity, StoreRoster};

use crate::cohort::discover_first_installs;

pub struct InactivityDetector {
    roster: Arc<dyn StoreRoster>,
    events: Arc<dyn EventHistory>,
    orders: Arc<dyn OrderActivity>,
    lookup_config: LookupConfig,
}

impl InactivityDetector {
    pub fn new(
        roster: Arc<dyn StoreRoster>,
        events: Arc<dyn EventHistory>,
        orders: Arc<dyn OrderActivity>,
        lookup_config: LookupConfig,
    ) -> Self {
        Self {
            roster,
            events,
            orders,
            lookup_config,
        }
    }

    /// Report stores with orders on `target_date - 7 days` but none on
    /// `target_date`, restricted to stores currently in the final-install
    /// status.
    pub async fn detect(&self, target_date: NaiveDate) -> PulseResult<InactivityReport> {
        let last_week = target_date - Duration::days(7);
        let previous = self.orders.order_counts_on(last_week).await?;
        let current = self.orders.order_counts_on(target_date).await?;

        let roster = self.roster.scan_all().await?;
        let candidates: Vec<_> = roster
            .into_iter()
            .filter(|store| store.status == FINAL_INSTALL)
            .filter_map(|store| {
                let seq = store.seq.clone()?;
                if current.contains_key(&seq) {
                    return None;
                }
                let last_week_order_count = *previous.get(&seq)?;
                Some((store, seq, last_week_order_count))
            })
            .collect();

        let first_installs = discover_first_installs(
            self.events.clone(),
            candidates.iter().map(|(store, _, _)| store.store_id.clone()),
            self.lookup_config.max_concurrent,
        )
        .await?;

        let mut stores: Vec<InactiveStore> = candidates
            .into_iter()
            .map(|(store, seq, last_week_order_count)| InactiveStore {
                first_install_date: first_installs
                    .get(&store.store_id)
                    .map(|at| at.date_naive()),
                owner_id: store.owner().to_string(),
                store_id: store.store_id,
                name: store.name,
                seq,
                last_week_order_count,
            })
            .collect();

        // First install descending; unknown install dates count as the
        // oldest and land at the end.
        stores.sort_by(|a, b| match (a.first_install_date, b.first_install_date) {
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.store_id.cmp(&b.store_id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.store_id.cmp(&b.store_id),
        });

        info!(
            target_date = %target_date,
            compared_to = %last_week,
            inactive = stores.len(),
            "week-over-week inactivity computed"
        );

        Ok(InactivityReport {
            target_date,
            compared_to: last_week,
            stores,
        })
    }
}
