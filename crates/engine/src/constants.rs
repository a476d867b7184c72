use std::time::Duration;

/// Liveness wakeup period.
pub const LIVENESS_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Health-check period; the second, slower line of defense.
pub const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(30 * 60);

/// Extra hold after an action completes, to absorb late completion callbacks.
pub const WAKE_GRACE: Duration = Duration::from_secs(5);

/// Hard ceiling on any single wake-lock hold.
pub const WAKE_CEILING: Duration = Duration::from_secs(5 * 60);

/// Wake-lock hold for the standalone health-check receiver.
pub const HEALTH_CHECK_WAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the on-demand classification query for a new subscriber.
pub const INITIAL_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification title for the standard channel.
pub const NOTIFICATION_TITLE: &str = "Activity Recognition";

/// Stable request codes identifying each registration with the OS.
pub const CLASSIFICATION_REQUEST_CODE: i32 = 200;
pub const TRANSITION_REQUEST_CODE: i32 = 201;
