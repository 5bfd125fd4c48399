//! Formatting for sizes, durations, and the build summary.

use console::Term;
use fob_plugin_webext::BuildReport;
use owo_colors::{OwoColorize, Stream::Stderr};
use std::time::Duration;

/// Human-readable byte count: `0 B`, `512 B`, `1.50 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Print every written file with its size, then the totals.
pub fn print_build_summary(report: &BuildReport) {
    let width = (Term::stderr().size().1 as usize).clamp(20, 80);
    let rule = "─".repeat(width);

    eprintln!(
        "\n{} {}",
        "Extension".if_supports_color(Stderr, |t| t.bold()),
        format!("(manifest v{})", report.manifest_version.as_u32())
            .if_supports_color(Stderr, |t| t.dimmed())
    );
    eprintln!("{rule}");

    let mut files: Vec<_> = report.files.iter().collect();
    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    for file in files {
        eprintln!(
            "  {} {} {}",
            "▸".if_supports_color(Stderr, |t| t.blue()),
            file.file_name.if_supports_color(Stderr, |t| t.bright_white()),
            format_size(file.size as u64).if_supports_color(Stderr, |t| t.dimmed())
        );
    }

    eprintln!("{rule}");
    eprintln!(
        "  {} {} files, {} in {}",
        "Total:".if_supports_color(Stderr, |t| t.bold()),
        report.files.len(),
        format_size(report.total_size() as u64).if_supports_color(Stderr, |t| t.green()),
        format_duration(report.duration).if_supports_color(Stderr, |t| t.green())
    );
    eprintln!("  {} {}", "Output:".if_supports_color(Stderr, |t| t.bold()), report.out_dir.display());
}
