// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster lifecycle status and the append-only status history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    /// Creation request accepted, infrastructure is being provisioned.
    Creating,
    /// Cluster is provisioned and healthy.
    Running,
    /// A mutation (node pools, version) is in progress.
    Updating,
    /// Teardown is in progress.
    Deleting,
    /// Cluster is usable but the last operation reported a problem.
    Warning,
    /// Unrecoverable failure.
    Error,
}

impl ClusterStatus {
    /// All statuses, in declaration order.
    pub const ALL: [ClusterStatus; 6] = [
        ClusterStatus::Creating,
        ClusterStatus::Running,
        ClusterStatus::Updating,
        ClusterStatus::Deleting,
        ClusterStatus::Warning,
        ClusterStatus::Error,
    ];

    /// Wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Updating => "UPDATING",
            Self::Deleting => "DELETING",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Whether the cluster can accept an update or be evaluated for TTL expiry.
    pub fn is_operable(&self) -> bool {
        matches!(self, Self::Running | Self::Warning)
    }

    /// Whether a non-forced delete may start from this status.
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Running | Self::Warning | Self::Error)
    }

    /// Check whether moving from `self` to `next` is a legal lifecycle transition.
    ///
    /// ```text
    /// Creating        -> Running | Warning | Error
    /// Running|Warning -> Updating | Deleting
    /// Updating        -> Running | Warning
    /// Error           -> Creating (recovery) | Deleting
    /// Deleting        -> Warning | Error (failed non-forced delete)
    /// any             -> Error
    /// ```
    pub fn can_transition_to(&self, next: ClusterStatus) -> bool {
        use ClusterStatus::*;

        if next == Error {
            return true;
        }

        match self {
            Creating => matches!(next, Running | Warning),
            Running | Warning => matches!(next, Updating | Deleting),
            Updating => matches!(next, Running | Warning),
            Error => matches!(next, Creating | Deleting),
            Deleting => matches!(next, Warning),
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cluster status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for ClusterStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClusterStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// Immutable audit record of a single status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Database primary key.
    pub id: i64,
    /// Cluster the transition belongs to.
    pub cluster_id: i64,
    /// Cluster name at the time of the transition (kept after the cluster row is gone).
    pub cluster_name: String,
    /// Previous status. `None` for the initial entry written on creation.
    pub from_status: Option<ClusterStatus>,
    /// New status.
    pub to_status: ClusterStatus,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// When the transition was recorded.
    pub created_at: DateTime<Utc>,
}

impl StatusChange {
    /// Whether this entry marks the end of provisioning (`Creating -> Running|Warning`).
    pub fn is_creation_completed(&self) -> bool {
        self.from_status == Some(ClusterStatus::Creating)
            && matches!(self.to_status, ClusterStatus::Running | ClusterStatus::Warning)
    }
}

/// Effective start time of a cluster derived from its status history.
///
/// Returns the timestamp of the earliest `Creating -> Running|Warning` transition,
/// or `None` when the cluster never finished provisioning. The history does not
/// need to be sorted.
pub fn cluster_start_time(history: &[StatusChange]) -> Option<DateTime<Utc>> {
    history
        .iter()
        .filter(|change| change.is_creation_completed())
        .map(|change| change.created_at)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn change(
        id: i64,
        from: Option<ClusterStatus>,
        to: ClusterStatus,
        at: DateTime<Utc>,
    ) -> StatusChange {
        StatusChange {
            id,
            cluster_id: 1,
            cluster_name: "test".to_string(),
            from_status: from,
            to_status: to,
            message: None,
            created_at: at,
        }
    }

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in ClusterStatus::ALL {
            let parsed: ClusterStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!("running".parse::<ClusterStatus>(), Ok(ClusterStatus::Running));
        assert!("PAUSED".parse::<ClusterStatus>().is_err());
    }

    #[test]
    fn test_transition_table() {
        use ClusterStatus::*;

        assert!(Creating.can_transition_to(Running));
        assert!(Creating.can_transition_to(Warning));
        assert!(Creating.can_transition_to(Error));
        assert!(!Creating.can_transition_to(Updating));
        assert!(!Creating.can_transition_to(Deleting));

        assert!(Running.can_transition_to(Updating));
        assert!(Warning.can_transition_to(Updating));
        assert!(Running.can_transition_to(Deleting));
        assert!(!Running.can_transition_to(Creating));

        assert!(Updating.can_transition_to(Running));
        assert!(Updating.can_transition_to(Warning));
        assert!(!Updating.can_transition_to(Deleting));

        assert!(Error.can_transition_to(Creating));
        assert!(Error.can_transition_to(Deleting));
        assert!(!Error.can_transition_to(Running));
        assert!(!Error.can_transition_to(Warning));

        assert!(Deleting.can_transition_to(Warning));
        assert!(Deleting.can_transition_to(Error));
        assert!(!Deleting.can_transition_to(Running));

        for status in ClusterStatus::ALL {
            assert!(status.can_transition_to(Error), "{status} -> ERROR must be legal");
        }
    }

    #[test]
    fn test_operable_statuses() {
        let operable: Vec<_> = ClusterStatus::ALL
            .into_iter()
            .filter(ClusterStatus::is_operable)
            .collect();
        assert_eq!(operable, vec![ClusterStatus::Running, ClusterStatus::Warning]);
    }

    #[test]
    fn test_start_time_absent_without_completed_creation() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let history = vec![
            change(1, None, ClusterStatus::Creating, t0),
            change(
                2,
                Some(ClusterStatus::Creating),
                ClusterStatus::Error,
                t0 + Duration::minutes(3),
            ),
        ];

        assert_eq!(cluster_start_time(&history), None);
        assert_eq!(cluster_start_time(&[]), None);
    }

    #[test]
    fn test_start_time_uses_earliest_transition() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let first = t0 + Duration::minutes(15);
        let second = t0 + Duration::minutes(90);
        // Deliberately out of order.
        let history = vec![
            change(
                5,
                Some(ClusterStatus::Creating),
                ClusterStatus::Running,
                second,
            ),
            change(1, None, ClusterStatus::Creating, t0),
            change(
                2,
                Some(ClusterStatus::Creating),
                ClusterStatus::Warning,
                first,
            ),
            change(
                3,
                Some(ClusterStatus::Warning),
                ClusterStatus::Updating,
                t0 + Duration::minutes(25),
            ),
        ];

        assert_eq!(cluster_start_time(&history), Some(first));
    }
}
