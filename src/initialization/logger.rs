//! Logger initialization.
//!
//! Plain output is colored for terminals; JSON output is one object per line
//! so audit logs can be shipped next to the JSON reports.

use std::io::Write;

use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Record};

use crate::config::LogFormat;
use crate::error_handling::InitializationError;

/// Dependencies whose own logging drowns out the audit's.
const QUIET_MODULES: &[(&str, LevelFilter)] = &[
    ("html5ever", LevelFilter::Error),
    ("selectors", LevelFilter::Warn),
    ("reqwest", LevelFilter::Info),
    ("hyper", LevelFilter::Info),
    ("hyper_util", LevelFilter::Info),
    ("rustls", LevelFilter::Warn),
    ("tokio_rustls", LevelFilter::Warn),
];

fn colored_level(level: Level) -> ColoredString {
    let label = level.to_string();
    match level {
        Level::Error => label.red(),
        Level::Warn => label.yellow(),
        Level::Info => label.green(),
        Level::Debug => label.blue(),
        Level::Trace => label.purple(),
    }
}

/// One log record as a single-line JSON object.
fn json_line(ts_millis: i64, record: &Record<'_>) -> String {
    serde_json::json!({
        "ts": ts_millis,
        "level": record.level().as_str(),
        "target": record.target(),
        "msg": record.args().to_string(),
    })
    .to_string()
}

/// Initializes the logger with the specified level and format.
///
/// `RUST_LOG` is read first; `level` then overrides the global and crate
/// filters, so `--log-level` always wins.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
///
/// # Examples
///
/// ```bash
/// # Per-module filtering via RUST_LOG
/// RUST_LOG=seo_audit::robots=trace seo_audit https://example.com
/// ```
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    colored::control::set_override(true);

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    for (module, filter) in QUIET_MODULES {
        builder.filter_module(module, *filter);
    }
    builder.filter_module("seo_audit", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                writeln!(buf, "{}", json_line(chrono::Utc::now().timestamp_millis(), record))
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{} {} [{}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    record.target().cyan(),
                    colored_level(record.level()),
                    record.args()
                )
            });
        }
    }

    builder.try_init().map_err(InitializationError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_line_escapes_message() {
        let line = json_line(
            1_700_000_000_000,
            &Record::builder()
                .args(format_args!("fetched \"robots.txt\"\n"))
                .level(Level::Warn)
                .target("seo_audit::robots")
                .build(),
        );
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["level"], "WARN");
        assert_eq!(parsed["target"], "seo_audit::robots");
        assert_eq!(parsed["msg"], "fetched \"robots.txt\"\n");
        assert_eq!(parsed["ts"], 1_700_000_000_000i64);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_init_logger_second_call_does_not_panic() {
        let _ = init_logger_with(LevelFilter::Info, LogFormat::Plain);
        let second = init_logger_with(LevelFilter::Debug, LogFormat::Json);
        assert!(matches!(second, Err(InitializationError::LoggerError(_))));
    }
}
