use crate::adapters::TauriEventBus;
use crate::error::Result;
use crate::state::ActivityState;
use sentinel_engine::ServiceLifecycleState;
use sentinel_events::TrackingConfig;
use sentinel_permissions::PermissionStatus;
use std::sync::Arc;
use tauri::{AppHandle, Runtime, State};

#[tauri::command]
pub async fn request_permissions(state: State<'_, ActivityState>) -> Result<bool> {
    let granted = state
        .controller
        .request_permissions(state.requester.as_ref())
        .await;
    tracing::info!(granted, "Permission request finished");
    Ok(granted)
}

#[tauri::command]
pub fn check_permission_status(state: State<'_, ActivityState>) -> PermissionStatus {
    state.controller.check_permission_status()
}

/// Start tracking. Missing fields fall back to defaults.
#[tauri::command]
pub async fn start_tracking(
    state: State<'_, ActivityState>,
    config: Option<TrackingConfig>,
) -> Result<bool> {
    let config = config.unwrap_or_default();
    Ok(state.controller.start_tracking(config).await?)
}

#[tauri::command]
pub async fn stop_tracking(state: State<'_, ActivityState>) -> Result<bool> {
    Ok(state.controller.stop_tracking().await)
}

#[tauri::command]
pub fn is_available(state: State<'_, ActivityState>) -> bool {
    state.controller.is_available()
}

/// Attach the webview as the activity consumer. Replaces any previous one.
#[tauri::command]
pub async fn listen_activity<R: Runtime>(
    app: AppHandle<R>,
    state: State<'_, ActivityState>,
) -> Result<()> {
    state
        .controller
        .attach(Arc::new(TauriEventBus::new(app)))
        .await;
    Ok(())
}

#[tauri::command]
pub fn unlisten_activity(state: State<'_, ActivityState>) {
    state.controller.detach();
}

#[tauri::command]
pub fn lifecycle_state(state: State<'_, ActivityState>) -> ServiceLifecycleState {
    state.controller.lifecycle()
}
