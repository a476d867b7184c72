//! Tauri control surface for the activity engine.
//!
//! The host supplies the OS bindings through [`ActivitySetup`]; this plugin
//! owns the controller, the dispatch loop and the webview commands.

mod adapters;
mod commands;
mod error;
mod state;

use sentinel_engine::{
    start_runtime, AlarmKind, EngineConfig, MotionEvent, Platform, RuntimeHandle,
    ServiceController,
};
use sentinel_permissions::{
    GrantSource, PermissionGate, PermissionLedger, PermissionRequester, PlatformVersion,
};
use sentinel_storage::{Database, IntentStore, MemoryStore};
use state::ActivityState;
use std::path::Path;
use std::sync::Arc;
use tauri::{
    plugin::{Builder, TauriPlugin},
    Manager, RunEvent, Runtime,
};
use tokio::sync::mpsc;

pub use adapters::TauriEventBus;
pub use error::{ActivityError, Result};

const DATABASE_FILE: &str = "activity.db";

/// OS bindings handed to the plugin by the host application.
pub struct ActivitySetup {
    pub config: EngineConfig,
    pub platform: Platform,
    pub version: PlatformVersion,
    pub grants: Arc<dyn GrantSource>,
    pub requester: Arc<dyn PermissionRequester>,
    pub alarms: mpsc::UnboundedReceiver<AlarmKind>,
    pub motion: mpsc::UnboundedReceiver<MotionEvent>,
}

pub fn init<R: Runtime>(setup: ActivitySetup) -> TauriPlugin<R> {
    Builder::new("sentinel-activity")
        .setup(move |app, _api| {
            let ActivitySetup {
                config,
                platform,
                version,
                grants,
                requester,
                alarms,
                motion,
            } = setup;

            let (ledger, store) = match app.path().app_data_dir() {
                Ok(dir) => open_store(&dir),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to get app data directory");
                    volatile_store()
                }
            };

            let gate = PermissionGate::new(version, grants, ledger);
            let controller = ServiceController::new(config, platform, gate, store);
            let runtime = Arc::new(RuntimeHandle::new());

            app.manage(ActivityState {
                controller: controller.clone(),
                requester,
                runtime: runtime.clone(),
            });

            tauri::async_runtime::spawn(async move {
                if let Err(e) = start_runtime(controller, alarms, motion, &runtime).await {
                    tracing::error!(error = %e, "Activity runtime task failed");
                }
            });

            Ok(())
        })
        .on_event(|app, event| {
            if let RunEvent::Exit = event {
                if let Some(state) = app.try_state::<ActivityState>() {
                    state.controller.on_task_removed();
                    state.runtime.stop();
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::request_permissions,
            commands::check_permission_status,
            commands::start_tracking,
            commands::stop_tracking,
            commands::is_available,
            commands::listen_activity,
            commands::unlisten_activity,
            commands::lifecycle_state,
        ])
        .build()
}

type Stores = (Arc<dyn PermissionLedger>, Arc<dyn IntentStore>);

fn open_store(dir: &Path) -> Stores {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::error!(error = %e, "Failed to create app data directory");
        return volatile_store();
    }
    match Database::open(&dir.join(DATABASE_FILE)) {
        Ok(db) => {
            let db = Arc::new(db);
            (db.clone(), db)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to open activity database, state will not persist");
            volatile_store()
        }
    }
}

fn volatile_store() -> Stores {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), store)
}
