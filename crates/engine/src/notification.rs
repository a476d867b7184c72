//! Persistent notification content while the service runs in foreground.

use crate::constants::NOTIFICATION_TITLE;
use chrono::{Local, TimeZone};
use sentinel_events::ActivityLabel;

/// Which notification channel the content is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationChannel {
    /// Low-importance channel with title and current activity.
    Standard,
    /// Minimum-importance channel: no badge, lights, vibration or text,
    /// hidden from the lock screen.
    Silent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub channel: NotificationChannel,
    pub title: Option<String>,
    pub text: Option<String>,
    pub ongoing: bool,
    pub show_badge: bool,
}

impl NotificationContent {
    /// Content for `label`, changed at `changed_at_epoch_millis`.
    ///
    /// With `emit` false the notification still exists, since the OS
    /// requires one for foreground work, but carries nothing.
    pub fn render(label: ActivityLabel, changed_at_epoch_millis: i64, emit: bool) -> Self {
        if !emit {
            return Self {
                channel: NotificationChannel::Silent,
                title: None,
                text: None,
                ongoing: true,
                show_badge: false,
            };
        }

        Self {
            channel: NotificationChannel::Standard,
            title: Some(NOTIFICATION_TITLE.to_string()),
            text: Some(format!(
                "{} ({})",
                label.as_str(),
                format_clock(changed_at_epoch_millis)
            )),
            ongoing: true,
            show_badge: false,
        }
    }
}

/// Local wall-clock time as HH:mm:ss.
pub fn format_clock(epoch_millis: i64) -> String {
    match Local.timestamp_millis_opt(epoch_millis).single() {
        Some(time) => time.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Current activity and when it last changed, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayState {
    pub label: ActivityLabel,
    pub changed_at_epoch_millis: i64,
}

impl DisplayState {
    pub fn render(&self, emit: bool) -> NotificationContent {
        NotificationContent::render(self.label, self.changed_at_epoch_millis, emit)
    }
}
