//! Conversion from CLI errors to miette reports.

use crate::error::{BuildError, CliError};
use miette::Report;

/// Convert a [`CliError`] into a report for the `main` boundary.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(e) => build_error_to_miette(e),
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        _ => miette::miette!("{}", err),
    }
}

fn build_error_to_miette(err: BuildError) -> Report {
    match err {
        BuildError::Extension { message, hint } => {
            miette::miette!(help = hint, "Extension build failed: {}", message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_error_carries_help() {
        let report = cli_error_to_miette(CliError::Build(BuildError::Extension {
            message: "Failed to find chunk info for src/content/main.ts".into(),
            hint: "Run with --verbose".into(),
        }));
        assert!(report.to_string().contains("src/content/main.ts"));
        assert_eq!(
            report.help().map(|h| h.to_string()).as_deref(),
            Some("Run with --verbose")
        );
    }

    #[test]
    fn test_other_errors_keep_message() {
        let report = cli_error_to_miette(CliError::Server("port 5173 in use".into()));
        assert_eq!(report.to_string(), "Server error: port 5173 in use");
    }
}
