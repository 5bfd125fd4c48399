//! Spinner for tasks without a known duration.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Stream::Stderr};
use std::time::Duration;

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    /// Start a spinner. Hidden when stderr is not an attended terminal.
    pub fn new(message: &str) -> Self {
        let pb = if super::use_spinners() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self { pb }
    }

    pub fn set_message(&self, message: &str) {
        self.pb.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        if self.pb.is_hidden() {
            super::success(message);
        } else {
            self.pb.finish_with_message(format!("{} {}", "✓".if_supports_color(Stderr, |t| t.green()), message));
        }
    }

    pub fn fail(&self, message: &str) {
        if self.pb.is_hidden() {
            super::error(message);
        } else {
            self.pb.finish_with_message(format!("{} {}", "✗".if_supports_color(Stderr, |t| t.red()), message));
        }
    }
}
