//! Reactivation-aware recalculation — replays the entire status-change
//! history to rebuild daily cumulative install/churn counters, handling
//! backward transitions (uninstalls, reactivations) correctly.
//!
//! Batch maintenance only: invoked directly, no HTTP surface. Idempotent
//! for a stable history; a mid-run failure aborts the remaining dates and
//! leaves already-written dates updated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use storepulse_core::types::DailyLifecycleCounters;
use storepulse_core::PulseResult;
use storepulse_datastore::{CounterStore, EventHistory, OrderActivity};

/// Status-change movement on a single calendar day, measured against the
/// dashboard install set and the churned set.
#[derive(Debug, Clone, Copy, Default)]
struct DayDeltas {
    new_installs: u64,
    uninstalls: u64,
    new_churns: u64,
    reactivations: u64,
}

#[derive(Debug, Clone)]
pub struct RecalcSummary {
    pub dates_written: usize,
    pub final_cumulative_installed: u64,
    pub final_cumulative_churned: u64,
}

pub struct ReactivationRecalculator {
    events: Arc<dyn EventHistory>,
    orders: Arc<dyn OrderActivity>,
    counters: Arc<dyn CounterStore>,
}

impl ReactivationRecalculator {
    pub fn new(
        events: Arc<dyn EventHistory>,
        orders: Arc<dyn OrderActivity>,
        counters: Arc<dyn CounterStore>,
    ) -> Self {
        Self {
            events,
            orders,
            counters,
        }
    }

    /// Replay the full event history and upsert the per-date counters.
    pub async fn run(&self) -> PulseResult<RecalcSummary> {
        let history = self.events.scan_all().await?;
        info!(events = history.len(), "recalculating daily lifecycle counters");

        let mut deltas: BTreeMap<NaiveDate, DayDeltas> = BTreeMap::new();
        for event in &history {
            let date = match event.changed_date {
                Some(date) => date,
                None => {
                    debug!(store_id = %event.store_id, "event without changed_date skipped");
                    continue;
                }
            };
            let day = deltas.entry(date).or_default();

            let was_installed = event
                .old_status
                .map(|s| s.in_dashboard_install_set())
                .unwrap_or(false);
            let is_installed = event.new_status.in_dashboard_install_set();
            if is_installed && !was_installed {
                day.new_installs += 1;
            }
            if was_installed && !is_installed {
                day.uninstalls += 1;
            }

            let was_churned = event.old_status.map(|s| s.is_churned()).unwrap_or(false);
            let is_churned = event.new_status.is_churned();
            if is_churned && !was_churned {
                day.new_churns += 1;
            }
            if was_churned && !is_churned {
                day.reactivations += 1;
            }
        }

        // Walk every known date in ascending order: aggregate-table dates
        // plus any event date missing from that table.
        let mut dates: BTreeSet<NaiveDate> = self.orders.known_dates().await?.into_iter().collect();
        dates.extend(deltas.keys().copied());

        let mut cumulative_installed: i64 = 0;
        let mut cumulative_churned: i64 = 0;
        let mut dates_written = 0;
        for date in dates {
            let day = deltas.get(&date).copied().unwrap_or_default();
            cumulative_installed += day.new_installs as i64 - day.uninstalls as i64;
            cumulative_installed = cumulative_installed.max(0);
            cumulative_churned += day.new_churns as i64 - day.reactivations as i64;
            cumulative_churned = cumulative_churned.max(0);

            self.counters
                .upsert_counters(DailyLifecycleCounters {
                    date,
                    cumulative_installed: cumulative_installed as u64,
                    cumulative_churned: cumulative_churned as u64,
                    new_installs: day.new_installs,
                    uninstalls: day.uninstalls,
                    new_churns: day.new_churns,
                    reactivations: day.reactivations,
                })
                .await?;
            dates_written += 1;
            info!(
                date = %date,
                cumulative_installed,
                cumulative_churned,
                "daily counters recalculated"
            );
        }

        Ok(RecalcSummary {
            dates_written,
            final_cumulative_installed: cumulative_installed as u64,
            final_cumulative_churned: cumulative_churned as u64,
        })
    }
}
