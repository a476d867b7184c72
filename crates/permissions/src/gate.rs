//! Permission gate: decides whether recognition may run at all.

use crate::capability::{Capability, PermissionStatus, PlatformVersion};
use crate::provider::{GrantSource, PermissionLedger, PermissionRequester};
use std::sync::Arc;

/// Read-only view over grant state for one platform version.
#[derive(Clone)]
pub struct PermissionGate {
    version: PlatformVersion,
    grants: Arc<dyn GrantSource>,
    ledger: Arc<dyn PermissionLedger>,
}

impl PermissionGate {
    pub fn new(
        version: PlatformVersion,
        grants: Arc<dyn GrantSource>,
        ledger: Arc<dyn PermissionLedger>,
    ) -> Self {
        Self {
            version,
            grants,
            ledger,
        }
    }

    pub fn version(&self) -> PlatformVersion {
        self.version
    }

    /// Capabilities that must all be held before tracking starts.
    pub fn required_capabilities(&self) -> Vec<Capability> {
        [
            Capability::ActivityRecognition,
            Capability::BackgroundLocation,
            Capability::Notifications,
            Capability::FineLocation,
            Capability::CoarseLocation,
        ]
        .into_iter()
        .filter(|c| c.applies_to(self.version))
        .collect()
    }

    /// Capabilities that improve resilience but never gate tracking.
    pub fn advisory_capabilities(&self) -> Vec<Capability> {
        [Capability::ExactAlarm]
            .into_iter()
            .filter(|c| c.applies_to(self.version))
            .collect()
    }

    fn is_held(&self, capability: Capability) -> bool {
        if !capability.applies_to(self.version) {
            return true;
        }
        self.grants.is_granted(capability).unwrap_or(true)
    }

    /// Status of a single capability.
    pub fn status(&self, capability: Capability) -> PermissionStatus {
        if self.is_held(capability) {
            return PermissionStatus::Authorized;
        }
        PermissionStatus::classify_missing(
            self.grants.should_show_rationale(capability),
            self.ledger.has_requested(capability),
        )
    }

    fn location_status(&self) -> PermissionStatus {
        if self.is_held(Capability::FineLocation) && self.is_held(Capability::CoarseLocation) {
            return PermissionStatus::Authorized;
        }
        PermissionStatus::classify_missing(
            self.grants.should_show_rationale(Capability::FineLocation),
            self.ledger.has_requested(Capability::FineLocation),
        )
    }

    /// Aggregated status; the first missing capability decides.
    pub fn check_permission_status(&self) -> PermissionStatus {
        if !self.version.at_least(PlatformVersion::Q) {
            let status = self.location_status();
            tracing::debug!(?status, "location permission status");
            return status;
        }

        let checks: [(&str, PermissionStatus); 4] = [
            ("activity_recognition", self.status(Capability::ActivityRecognition)),
            ("location", self.location_status()),
            ("notifications", self.status(Capability::Notifications)),
            ("background_location", self.status(Capability::BackgroundLocation)),
        ];

        for (name, status) in checks {
            if !status.is_authorized() {
                tracing::debug!(capability = name, ?status, "permission missing");
                return status;
            }
        }
        PermissionStatus::Authorized
    }

    pub fn has_required_permissions(&self) -> bool {
        self.required_capabilities()
            .into_iter()
            .all(|c| self.is_held(c))
    }

    /// Minimum grants for the service process itself to run: motion plus
    /// either location precision.
    pub fn may_run(&self) -> bool {
        let location =
            self.is_held(Capability::FineLocation) || self.is_held(Capability::CoarseLocation);
        location && self.is_held(Capability::ActivityRecognition)
    }

    pub fn can_schedule_exact_alarms(&self) -> bool {
        self.is_held(Capability::ExactAlarm)
    }

    /// Run the request flow: basic capabilities first, then background
    /// location as a separate step once everything basic is granted.
    pub async fn request_permissions(&self, requester: &dyn PermissionRequester) -> bool {
        let basic: Vec<Capability> = [
            Capability::ActivityRecognition,
            Capability::Notifications,
            Capability::FineLocation,
            Capability::CoarseLocation,
        ]
        .into_iter()
        .filter(|c| c.applies_to(self.version) && !self.is_held(*c))
        .collect();

        if basic.is_empty() {
            return self.request_background_location(requester).await;
        }

        for capability in &basic {
            self.ledger.mark_requested(*capability);
        }

        let results = requester.request(&basic).await;

        let mut all_granted = true;
        for capability in &basic {
            let granted = results.get(capability).copied().unwrap_or(false);
            tracing::debug!(%capability, granted, "permission result");
            if !granted {
                all_granted = false;
                if capability.is_critical() {
                    tracing::info!(%capability, "critical permission denied");
                    return false;
                }
            }
        }

        if all_granted {
            self.request_background_location(requester).await
        } else {
            // Only non-critical grants (notifications) were refused.
            true
        }
    }

    async fn request_background_location(&self, requester: &dyn PermissionRequester) -> bool {
        let capability = Capability::BackgroundLocation;
        if !capability.applies_to(self.version) || self.is_held(capability) {
            return true;
        }

        self.ledger.mark_requested(capability);
        let results = requester.request(&[capability]).await;
        let granted = results.get(&capability).copied().unwrap_or(false);
        tracing::debug!(granted, "background location result");
        granted
    }
}
