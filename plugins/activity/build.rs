fn main() {
    tauri_plugin::Builder::new(&[
        "request_permissions",
        "check_permission_status",
        "start_tracking",
        "stop_tracking",
        "is_available",
        "listen_activity",
        "unlisten_activity",
        "lifecycle_state",
    ])
    .build();
}
