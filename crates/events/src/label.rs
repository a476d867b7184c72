//! Activity labels reported by the motion classification services.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical activity as reported by the OS classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityLabel {
    Still,
    Walking,
    Running,
    OnFoot,
    OnBicycle,
    InVehicle,
    /// Device tilt. A known false positive, never forwarded.
    Tilting,
    #[default]
    Unknown,
}

/// Labels registered with the transition service (ENTER only).
pub const TRANSITION_LABELS: &[ActivityLabel] = &[
    ActivityLabel::InVehicle,
    ActivityLabel::OnBicycle,
    ActivityLabel::Running,
    ActivityLabel::OnFoot,
    ActivityLabel::Walking,
    ActivityLabel::Still,
];

impl ActivityLabel {
    /// Map a platform detected-activity code to a label.
    ///
    /// Codes outside the known set normalize to `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ActivityLabel::InVehicle,
            1 => ActivityLabel::OnBicycle,
            2 => ActivityLabel::OnFoot,
            3 => ActivityLabel::Still,
            5 => ActivityLabel::Tilting,
            7 => ActivityLabel::Walking,
            8 => ActivityLabel::Running,
            _ => ActivityLabel::Unknown,
        }
    }

    /// Platform code for this label.
    pub fn code(&self) -> i32 {
        match self {
            ActivityLabel::InVehicle => 0,
            ActivityLabel::OnBicycle => 1,
            ActivityLabel::OnFoot => 2,
            ActivityLabel::Still => 3,
            ActivityLabel::Unknown => 4,
            ActivityLabel::Tilting => 5,
            ActivityLabel::Walking => 7,
            ActivityLabel::Running => 8,
        }
    }

    /// Wire name, as delivered to the embedding application.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLabel::Still => "STILL",
            ActivityLabel::Walking => "WALKING",
            ActivityLabel::Running => "RUNNING",
            ActivityLabel::OnFoot => "ON_FOOT",
            ActivityLabel::OnBicycle => "ON_BICYCLE",
            ActivityLabel::InVehicle => "IN_VEHICLE",
            ActivityLabel::Tilting => "TILTING",
            ActivityLabel::Unknown => "UNKNOWN",
        }
    }

    /// Parse a wire name. Unrecognized names normalize to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "STILL" => ActivityLabel::Still,
            "WALKING" => ActivityLabel::Walking,
            "RUNNING" => ActivityLabel::Running,
            "ON_FOOT" => ActivityLabel::OnFoot,
            "ON_BICYCLE" => ActivityLabel::OnBicycle,
            "IN_VEHICLE" => ActivityLabel::InVehicle,
            "TILTING" => ActivityLabel::Tilting,
            _ => ActivityLabel::Unknown,
        }
    }

    pub fn is_tilting(&self) -> bool {
        matches!(self, ActivityLabel::Tilting)
    }
}

impl fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}
