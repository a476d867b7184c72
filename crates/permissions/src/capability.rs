//! Capabilities, platform versions and per-capability status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform API level of the running OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlatformVersion(pub u32);

impl PlatformVersion {
    /// Exact alarms and idle-exempt scheduling.
    pub const M: PlatformVersion = PlatformVersion(23);
    /// Foreground services must be started explicitly.
    pub const O: PlatformVersion = PlatformVersion(26);
    /// Motion and background location become runtime permissions.
    pub const Q: PlatformVersion = PlatformVersion(29);
    /// Exact alarm scheduling becomes a grant.
    pub const S: PlatformVersion = PlatformVersion(31);
    /// Notifications become a runtime permission.
    pub const TIRAMISU: PlatformVersion = PlatformVersion(33);

    pub fn at_least(&self, other: PlatformVersion) -> bool {
        *self >= other
    }
}

/// A grant the engine may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ActivityRecognition,
    FineLocation,
    CoarseLocation,
    BackgroundLocation,
    Notifications,
    ExactAlarm,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ActivityRecognition,
        Capability::FineLocation,
        Capability::CoarseLocation,
        Capability::BackgroundLocation,
        Capability::Notifications,
        Capability::ExactAlarm,
    ];

    /// First platform version on which this capability is a runtime grant.
    /// Below it the capability is implicitly held.
    pub fn introduced_in(&self) -> Option<PlatformVersion> {
        match self {
            Capability::ActivityRecognition | Capability::BackgroundLocation => {
                Some(PlatformVersion::Q)
            }
            Capability::Notifications => Some(PlatformVersion::TIRAMISU),
            Capability::ExactAlarm => Some(PlatformVersion::S),
            Capability::FineLocation | Capability::CoarseLocation => None,
        }
    }

    pub fn applies_to(&self, version: PlatformVersion) -> bool {
        self.introduced_in().map_or(true, |v| version.at_least(v))
    }

    /// A denied critical capability fails a permission request outright.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Capability::ActivityRecognition | Capability::FineLocation | Capability::CoarseLocation
        )
    }

    /// Durable key recording that this capability was requested.
    ///
    /// Fine and coarse location share a key.
    pub fn ledger_key(&self) -> &'static str {
        match self {
            Capability::ActivityRecognition => "has_requested_activity_recognition",
            Capability::FineLocation | Capability::CoarseLocation => "has_requested_location",
            Capability::BackgroundLocation => "has_requested_background_location",
            Capability::Notifications => "has_requested_notifications",
            Capability::ExactAlarm => "has_requested_exact_alarm",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::ActivityRecognition => "activity_recognition",
            Capability::FineLocation => "fine_location",
            Capability::CoarseLocation => "coarse_location",
            Capability::BackgroundLocation => "background_location",
            Capability::Notifications => "notifications",
            Capability::ExactAlarm => "exact_alarm",
        };
        f.write_str(name)
    }
}

/// Status reported to the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionStatus {
    Authorized,
    Denied,
    PermanentlyDenied,
    NotDetermined,
}

impl PermissionStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(self, PermissionStatus::Authorized)
    }

    /// Classify a missing grant.
    ///
    /// Permanent denial is only reported when the capability was requested
    /// before and the platform no longer offers a rationale.
    pub fn classify_missing(should_show_rationale: bool, previously_requested: bool) -> Self {
        if should_show_rationale {
            PermissionStatus::Denied
        } else if previously_requested {
            PermissionStatus::PermanentlyDenied
        } else {
            PermissionStatus::NotDetermined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applicability_by_version() {
        let p = PlatformVersion(28);
        assert!(!Capability::ActivityRecognition.applies_to(p));
        assert!(!Capability::BackgroundLocation.applies_to(p));
        assert!(Capability::FineLocation.applies_to(p));

        let t = PlatformVersion::TIRAMISU;
        assert!(Capability::Notifications.applies_to(t));
        assert!(Capability::ExactAlarm.applies_to(t));
        assert!(!Capability::Notifications.applies_to(PlatformVersion::S));
    }

    #[test]
    fn test_location_shares_ledger_key() {
        assert_eq!(
            Capability::FineLocation.ledger_key(),
            Capability::CoarseLocation.ledger_key()
        );
    }

    #[test]
    fn test_classify_missing() {
        assert_eq!(
            PermissionStatus::classify_missing(true, true),
            PermissionStatus::Denied
        );
        assert_eq!(
            PermissionStatus::classify_missing(false, true),
            PermissionStatus::PermanentlyDenied
        );
        assert_eq!(
            PermissionStatus::classify_missing(false, false),
            PermissionStatus::NotDetermined
        );
    }
}
