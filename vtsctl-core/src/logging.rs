//! Tracing setup shared by the binaries
//!
//! Logs go to stderr unless `[logging] file` is set. `RUST_LOG` overrides
//! the per-binary default filter.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Directory and file name for file logging, if configured
pub fn log_target(logging: &LoggingConfig, default_file: &str) -> Option<(PathBuf, OsString)> {
    let log_file = logging.file.as_ref()?;

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = log_file
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from(default_file));

    Some((dir.to_path_buf(), name))
}

/// Install the global subscriber
pub fn init(logging: &LoggingConfig, default_filter: &str, default_file: &str) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    match log_target(logging, default_file) {
        Some((dir, name)) => {
            std::fs::create_dir_all(&dir)?;
            let file_appender = tracing_appender::rolling::never(dir, name);

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(file_appender),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(file: Option<&str>) -> LoggingConfig {
        LoggingConfig {
            file: file.map(PathBuf::from),
        }
    }

    #[test]
    fn test_stderr_when_unset() {
        assert_eq!(log_target(&logging(None), "vtsctl.log"), None);
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        let (dir, name) = log_target(&logging(Some("session.log")), "vtsctl.log").unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, OsString::from("session.log"));
    }

    #[test]
    fn test_nested_path_is_split() {
        let (dir, name) = log_target(&logging(Some("/var/log/vtsctl/run.log")), "vtsctl.log").unwrap();
        assert_eq!(dir, PathBuf::from("/var/log/vtsctl"));
        assert_eq!(name, OsString::from("run.log"));
    }

    #[test]
    fn test_directory_only_falls_back_to_default_name() {
        let (dir, name) = log_target(&logging(Some("/")), "vtsctl-chat.log").unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, OsString::from("vtsctl-chat.log"));
    }
}
