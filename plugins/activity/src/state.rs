use sentinel_engine::{RuntimeHandle, ServiceController};
use sentinel_permissions::PermissionRequester;
use std::sync::Arc;

/// Managed plugin state.
pub struct ActivityState {
    pub controller: ServiceController,
    pub requester: Arc<dyn PermissionRequester>,
    pub runtime: Arc<RuntimeHandle>,
}
