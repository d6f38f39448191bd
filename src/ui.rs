//! Terminal status line
//!
//! A single indicatif spinner showing the session state, transport position,
//! and note counts. Notifications are printed above it.

use crate::session::{Notification, NotificationLevel, Session};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// `HH:MM:SS.mmm`. Negative and non-finite inputs show as zero.
pub fn format_position(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let millis = (seconds * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1000 % 60,
        millis % 1000
    )
}

pub fn status_message(session: &Session) -> String {
    let output = session
        .selected_output()
        .map(|d| d.name.as_str())
        .unwrap_or("none");
    let input = session.bound_input().unwrap_or("none");
    let position = session.position();
    let last = match session.recorded_notes().last() {
        Some(note) => format!(
            "  last: {} {:.2}s",
            note.note.name,
            note.display_duration(position)
        ),
        None => String::new(),
    };
    let state = match session.pending_transition() {
        Some(pending) => format!("{} ({})", session.state(), pending),
        None => session.state().to_string(),
    };
    format!(
        "{:<9} {}  active: {}  recorded: {}{}  in: {}  out: {}",
        state,
        format_position(position),
        session.active_notes().len(),
        session.recorded_notes().len(),
        last,
        input,
        output
    )
}

pub fn format_notification(notification: &Notification) -> String {
    match notification.level {
        NotificationLevel::Info => format!("* {}", notification.message),
        NotificationLevel::Error => format!("! {}", notification.message),
    }
}

pub struct StatusLine {
    pb: ProgressBar,
}

impl StatusLine {
    pub fn new() -> Self {
        let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        let style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_prefix("Session");
        pb.enable_steady_tick(Duration::from_millis(120));
        StatusLine { pb }
    }

    /// Draws nothing. Used when stderr is not wanted.
    pub fn hidden() -> Self {
        StatusLine {
            pb: ProgressBar::hidden(),
        }
    }

    pub fn update(&self, session: &Session) {
        self.pb.set_message(status_message(session));
    }

    pub fn notify(&self, notification: &Notification) {
        self.pb.println(format_notification(notification));
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}
