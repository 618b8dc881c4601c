//! Per-store order heatmap — a store × date matrix of order counts over an
//! arbitrary window, built from paginated scans of the day-level order
//! aggregate table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::info;

use storepulse_core::status::FINAL_INSTALL;
use storepulse_core::types::{HeatmapReport, HeatmapRow, StoreRecord};
use storepulse_core::PulseResult;
use storepulse_datastore::{OrderActivity, StoreRoster};

pub struct HeatmapAggregator {
    roster: Arc<dyn StoreRoster>,
    orders: Arc<dyn OrderActivity>,
}

impl HeatmapAggregator {
    pub fn new(roster: Arc<dyn StoreRoster>, orders: Arc<dyn OrderActivity>) -> Self {
        Self { roster, orders }
    }

    /// Build the heatmap for the inclusive window. A reversed window is
    /// swapped. Only stores currently in the final-install status appear;
    /// aggregate rows for any other seq are dropped.
    pub async fn build(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> PulseResult<HeatmapReport> {
        let (start, end) = if start_date <= end_date {
            (start_date, end_date)
        } else {
            (end_date, start_date)
        };

        let installed = self.roster.scan_by_status(FINAL_INSTALL).await?;
        let lookup: HashMap<String, StoreRecord> = installed
            .into_iter()
            .filter_map(|store| store.seq.clone().map(|seq| (seq, store)))
            .collect();

        // The scan must run to token exhaustion before anything is
        // surfaced; duplicate (seq, date) pairs merge additively.
        let mut counts: HashMap<String, BTreeMap<NaiveDate, u64>> = HashMap::new();
        let mut continuation = None;
        let mut pages = 0usize;
        loop {
            let page = self
                .orders
                .scan_page(Some((start, end)), continuation)
                .await?;
            pages += 1;
            for row in page.items {
                if !lookup.contains_key(&row.seq) {
                    continue;
                }
                *counts
                    .entry(row.seq)
                    .or_default()
                    .entry(row.order_date)
                    .or_insert(0) += row.order_count;
            }
            match page.next_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        let mut dates = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            dates.push(cursor);
            cursor = cursor + Duration::days(1);
        }

        let mut rows: Vec<HeatmapRow> = lookup
            .iter()
            .map(|(seq, store)| {
                let merged = counts.get(seq);
                let daily: BTreeMap<NaiveDate, u64> = dates
                    .iter()
                    .map(|date| {
                        let count = merged.and_then(|m| m.get(date)).copied().unwrap_or(0);
                        (*date, count)
                    })
                    .collect();
                let total = daily.values().sum();
                HeatmapRow {
                    store_id: store.store_id.clone(),
                    name: store.name.clone(),
                    owner_id: store.owner().to_string(),
                    seq: seq.clone(),
                    daily,
                    total,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| a.store_id.cmp(&b.store_id))
        });

        info!(
            start = %start,
            end = %end,
            pages,
            rows = rows.len(),
            "order heatmap built"
        );

        Ok(HeatmapReport {
            start_date: start,
            end_date: end,
            dates,
            rows,
        })
    }
}
