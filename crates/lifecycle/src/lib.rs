//! Store lifecycle analytics engine — daily funnel snapshots,
//! reactivation-aware counter recalculation, installation cohorts, order
//! heatmaps, and week-over-week inactivity detection.

pub mod cohort;
pub mod funnel;
pub mod heatmap;
pub mod inactivity;
pub mod recalc;

pub use cohort::CohortAnalyzer;
pub use funnel::{DailyFunnelReport, FunnelAggregator};
pub use heatmap::HeatmapAggregator;
pub use inactivity::InactivityDetector;
pub use recalc::{ReactivationRecalculator, RecalcSummary};
