//! Store status taxonomy — classification of lifecycle status codes into
//! funnel stages and churn/install sets.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a merchant store. Rows come from a schema-less
/// table, so unrecognized codes deserialize to [`StoreStatus::Unknown`]
/// instead of failing the whole scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Registered,
    Preparing,
    InstallCompleted,
    Suspended,
    Defect,
    ServiceTerminated,
    UnusedTerminated,
    #[serde(other)]
    Unknown,
}

/// The single final-install status. First-install detection, the heatmap
/// roster filter, and the inactivity filter all key on this exact status.
pub const FINAL_INSTALL: StoreStatus = StoreStatus::InstallCompleted;

/// Statuses counted as "install completed" by the daily funnel snapshot:
/// everything that has gone through install, including defect stores.
pub const INSTALL_COMPLETED_FOR_FUNNEL: &[StoreStatus] = &[
    StoreStatus::InstallCompleted,
    StoreStatus::Suspended,
    StoreStatus::Defect,
];

/// Statuses counted as "install completed" by the dashboard reports and the
/// reactivation recalculator. Narrower than the funnel set (no `defect`) —
/// the two sets intentionally stay separate per consuming report.
pub const INSTALL_COMPLETED_FOR_DASHBOARD: &[StoreStatus] =
    &[StoreStatus::InstallCompleted, StoreStatus::Suspended];

/// Terminated statuses counted as churned by every report.
pub const CHURNED: &[StoreStatus] = &[
    StoreStatus::ServiceTerminated,
    StoreStatus::UnusedTerminated,
];

impl StoreStatus {
    pub const ALL: &'static [StoreStatus] = &[
        StoreStatus::Registered,
        StoreStatus::Preparing,
        StoreStatus::InstallCompleted,
        StoreStatus::Suspended,
        StoreStatus::Defect,
        StoreStatus::ServiceTerminated,
        StoreStatus::UnusedTerminated,
    ];

    /// Wire/report form of the status code.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Registered => "registered",
            StoreStatus::Preparing => "preparing",
            StoreStatus::InstallCompleted => "install_completed",
            StoreStatus::Suspended => "suspended",
            StoreStatus::Defect => "defect",
            StoreStatus::ServiceTerminated => "service_terminated",
            StoreStatus::UnusedTerminated => "unused_terminated",
            StoreStatus::Unknown => "unknown",
        }
    }

    /// Parse a raw status code, mapping unrecognized codes to `Unknown`.
    pub fn from_code(code: &str) -> StoreStatus {
        match code {
            "registered" => StoreStatus::Registered,
            "preparing" => StoreStatus::Preparing,
            "install_completed" => StoreStatus::InstallCompleted,
            "suspended" => StoreStatus::Suspended,
            "defect" => StoreStatus::Defect,
            "service_terminated" => StoreStatus::ServiceTerminated,
            "unused_terminated" => StoreStatus::UnusedTerminated,
            _ => StoreStatus::Unknown,
        }
    }

    /// Membership in [`INSTALL_COMPLETED_FOR_FUNNEL`].
    pub fn in_funnel_install_set(&self) -> bool {
        matches!(
            self,
            StoreStatus::InstallCompleted | StoreStatus::Suspended | StoreStatus::Defect
        )
    }

    /// Membership in [`INSTALL_COMPLETED_FOR_DASHBOARD`].
    pub fn in_dashboard_install_set(&self) -> bool {
        matches!(self, StoreStatus::InstallCompleted | StoreStatus::Suspended)
    }

    /// Membership in [`CHURNED`].
    pub fn is_churned(&self) -> bool {
        matches!(
            self,
            StoreStatus::ServiceTerminated | StoreStatus::UnusedTerminated
        )
    }

    /// Whether this is the final-install status.
    pub fn is_final_install(&self) -> bool {
        *self == FINAL_INSTALL
    }
}
