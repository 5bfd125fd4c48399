//! Status message functions for terminal output.

use owo_colors::{OwoColorize, Stream::Stderr};

pub fn success(message: &str) {
    eprintln!("{} {}", "✓".if_supports_color(Stderr, |t| t.green()), message);
}

pub fn info(message: &str) {
    eprintln!("{} {}", "ℹ".if_supports_color(Stderr, |t| t.blue()), message);
}

pub fn warning(message: &str) {
    eprintln!(
        "{} {}",
        "⚠".if_supports_color(Stderr, |t| t.yellow()),
        message.if_supports_color(Stderr, |t| t.yellow())
    );
}

pub fn error(message: &str) {
    eprintln!(
        "{} {}",
        "✗".if_supports_color(Stderr, |t| t.red()),
        message.if_supports_color(Stderr, |t| t.red())
    );
}

/// A progress line for multi-step commands such as `create`.
pub fn step(message: &str) {
    eprintln!("{} {}", ">".if_supports_color(Stderr, |t| t.green()), message);
}
