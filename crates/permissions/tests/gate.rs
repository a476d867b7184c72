//! Integration tests for the permission gate.

use async_trait::async_trait;
use sentinel_permissions::{
    Capability, InMemoryLedger, PermissionGate, PermissionLedger, PermissionRequester,
    PermissionStatus, PlatformVersion, StaticGrants,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn gate(version: u32, grants: Arc<StaticGrants>, ledger: Arc<InMemoryLedger>) -> PermissionGate {
    PermissionGate::new(PlatformVersion(version), grants, ledger)
}

/// Requester that grants according to a fixed table and records each call.
struct ScriptedRequester {
    answers: HashMap<Capability, bool>,
    grants: Arc<StaticGrants>,
    calls: Mutex<Vec<Vec<Capability>>>,
}

impl ScriptedRequester {
    fn new(grants: Arc<StaticGrants>, answers: &[(Capability, bool)]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            grants,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Vec<Capability>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PermissionRequester for ScriptedRequester {
    async fn request(&self, capabilities: &[Capability]) -> HashMap<Capability, bool> {
        self.calls.lock().unwrap().push(capabilities.to_vec());
        capabilities
            .iter()
            .map(|c| {
                let granted = self.answers.get(c).copied().unwrap_or(true);
                self.grants.set(*c, granted);
                (*c, granted)
            })
            .collect()
    }
}

mod status {
    use super::*;

    #[test]
    fn test_all_granted_is_authorized() {
        let grants = Arc::new(StaticGrants::all_granted());
        let gate = gate(34, grants, Arc::new(InMemoryLedger::new()));
        assert_eq!(gate.check_permission_status(), PermissionStatus::Authorized);
        assert!(gate.has_required_permissions());
        assert!(gate.may_run());
    }

    #[test]
    fn test_pre_q_only_checks_location() {
        let grants = Arc::new(StaticGrants::new());
        grants.set(Capability::FineLocation, true);
        grants.set(Capability::CoarseLocation, true);
        let gate = gate(28, grants, Arc::new(InMemoryLedger::new()));

        // Motion is not a runtime grant before Q.
        assert_eq!(gate.status(Capability::ActivityRecognition), PermissionStatus::Authorized);
        assert_eq!(gate.check_permission_status(), PermissionStatus::Authorized);
        assert!(gate.has_required_permissions());
    }

    #[test]
    fn test_not_determined_before_any_request() {
        let grants = Arc::new(StaticGrants::new());
        let gate = gate(34, grants, Arc::new(InMemoryLedger::new()));
        assert_eq!(gate.check_permission_status(), PermissionStatus::NotDetermined);
        assert!(!gate.has_required_permissions());
        assert!(!gate.may_run());
    }

    #[test]
    fn test_permanently_denied_requires_prior_request() {
        let grants = Arc::new(StaticGrants::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let gate = gate(34, grants, ledger.clone());

        assert_eq!(
            gate.status(Capability::ActivityRecognition),
            PermissionStatus::NotDetermined
        );

        ledger.mark_requested(Capability::ActivityRecognition);
        assert_eq!(
            gate.status(Capability::ActivityRecognition),
            PermissionStatus::PermanentlyDenied
        );
    }

    #[test]
    fn test_rationale_means_denied() {
        let grants = Arc::new(StaticGrants::new());
        grants.set_rationale(Capability::ActivityRecognition, true);
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.mark_requested(Capability::ActivityRecognition);
        let gate = gate(34, grants, ledger);

        assert_eq!(gate.check_permission_status(), PermissionStatus::Denied);
    }

    #[test]
    fn test_missing_background_location_reported_last() {
        let grants = Arc::new(StaticGrants::all_granted());
        grants.set(Capability::BackgroundLocation, false);
        let gate = gate(34, grants, Arc::new(InMemoryLedger::new()));

        assert_eq!(gate.check_permission_status(), PermissionStatus::NotDetermined);
        assert!(!gate.has_required_permissions());
        // The service process itself can still run.
        assert!(gate.may_run());
    }

    #[test]
    fn test_one_location_precision_is_enough_to_run() {
        let grants = Arc::new(StaticGrants::all_granted());
        grants.set(Capability::FineLocation, false);
        let gate = gate(30, grants, Arc::new(InMemoryLedger::new()));
        assert!(gate.may_run());
        assert!(!gate.has_required_permissions());
    }

    #[test]
    fn test_exact_alarm_is_advisory() {
        let grants = Arc::new(StaticGrants::all_granted());
        grants.set(Capability::ExactAlarm, false);
        let gate = gate(34, grants, Arc::new(InMemoryLedger::new()));

        assert!(gate.has_required_permissions());
        assert!(!gate.can_schedule_exact_alarms());
        assert_eq!(gate.advisory_capabilities(), vec![Capability::ExactAlarm]);
        assert!(!gate.required_capabilities().contains(&Capability::ExactAlarm));
    }

    #[test]
    fn test_required_capabilities_by_version() {
        let grants = Arc::new(StaticGrants::new());
        let old = gate(28, grants.clone(), Arc::new(InMemoryLedger::new()));
        assert_eq!(
            old.required_capabilities(),
            vec![Capability::FineLocation, Capability::CoarseLocation]
        );

        let new = gate(33, grants, Arc::new(InMemoryLedger::new()));
        assert_eq!(new.required_capabilities().len(), 5);
    }
}

mod request {
    use super::*;

    #[tokio::test]
    async fn test_full_grant_requests_background_second() {
        let grants = Arc::new(StaticGrants::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let gate = gate(34, grants.clone(), ledger.clone());
        let requester = ScriptedRequester::new(grants, &[]);

        assert!(gate.request_permissions(&requester).await);

        let calls = requester.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains(&Capability::ActivityRecognition));
        assert!(!calls[0].contains(&Capability::BackgroundLocation));
        assert_eq!(calls[1], vec![Capability::BackgroundLocation]);

        assert!(ledger.has_requested(Capability::ActivityRecognition));
        assert!(ledger.has_requested(Capability::BackgroundLocation));
        assert!(gate.has_required_permissions());
    }

    #[tokio::test]
    async fn test_critical_denial_fails_without_background_step() {
        let grants = Arc::new(StaticGrants::new());
        let gate = gate(34, grants.clone(), Arc::new(InMemoryLedger::new()));
        let requester =
            ScriptedRequester::new(grants, &[(Capability::ActivityRecognition, false)]);

        assert!(!gate.request_permissions(&requester).await);
        assert_eq!(requester.calls().len(), 1);
        assert_eq!(
            gate.check_permission_status(),
            PermissionStatus::PermanentlyDenied
        );
    }

    #[tokio::test]
    async fn test_notification_denial_is_not_fatal() {
        let grants = Arc::new(StaticGrants::new());
        let gate = gate(34, grants.clone(), Arc::new(InMemoryLedger::new()));
        let requester = ScriptedRequester::new(grants, &[(Capability::Notifications, false)]);

        assert!(gate.request_permissions(&requester).await);
        // Background location is only asked for after a clean basic grant.
        assert_eq!(requester.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_missing_goes_straight_to_background() {
        let grants = Arc::new(StaticGrants::all_granted());
        grants.set(Capability::BackgroundLocation, false);
        let gate = gate(34, grants.clone(), Arc::new(InMemoryLedger::new()));
        let requester =
            ScriptedRequester::new(grants, &[(Capability::BackgroundLocation, false)]);

        assert!(!gate.request_permissions(&requester).await);
        assert_eq!(requester.calls(), vec![vec![Capability::BackgroundLocation]]);
    }

    #[tokio::test]
    async fn test_already_authorized_makes_no_requests() {
        let grants = Arc::new(StaticGrants::all_granted());
        let gate = gate(34, grants.clone(), Arc::new(InMemoryLedger::new()));
        let requester = ScriptedRequester::new(grants, &[]);

        assert!(gate.request_permissions(&requester).await);
        assert!(requester.calls().is_empty());
    }
}
