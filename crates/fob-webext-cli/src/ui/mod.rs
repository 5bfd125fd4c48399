//! Terminal output: status lines, spinners, and the build summary.
//!
//! Everything here writes to stderr so stdout stays clean for piping.
//!
//! ```no_run
//! use fob_webext_cli::ui;
//!
//! ui::init_colors();
//! let spinner = ui::Spinner::new("Building extension...");
//! spinner.finish("Extension built");
//! ui::success("Load .extension as an unpacked extension");
//! ```

mod format;
mod messages;
mod spinner;

pub use format::{format_duration, format_size, print_build_summary};
pub use messages::{error, info, step, success, warning};
pub use spinner::Spinner;

/// Check if running in a CI environment.
pub fn is_ci() -> bool {
    std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok()
        || std::env::var("GITLAB_CI").is_ok()
        || std::env::var("CIRCLECI").is_ok()
}

/// Check if color output should be enabled.
///
/// Respects `NO_COLOR` and `FORCE_COLOR`, then falls back to terminal detection.
pub fn should_use_color() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }
    console::user_attended_stderr()
}

/// Apply the color decision to `owo-colors` for the rest of the process.
pub fn init_colors() {
    owo_colors::set_override(should_use_color());
}

/// Spinners are noise in CI logs and when stderr is not a terminal.
pub fn use_spinners() -> bool {
    !is_ci() && console::user_attended_stderr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_is_ci_with_ci_var() {
        unsafe { std::env::set_var("CI", "true") };
        assert!(is_ci());
        assert!(!use_spinners());
        unsafe { std::env::remove_var("CI") };
    }

    #[test]
    #[serial]
    fn test_should_use_color_no_color_overrides_force() {
        unsafe {
            std::env::set_var("NO_COLOR", "1");
            std::env::set_var("FORCE_COLOR", "1");
        }
        assert!(!should_use_color());
        unsafe {
            std::env::remove_var("NO_COLOR");
            std::env::remove_var("FORCE_COLOR");
        }
    }
}
