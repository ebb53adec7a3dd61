//! Durable, append-only audit trail of external actions.
//!
//! One file per provider plus a generic one, all under `<home>/logs/`:
//!
//! ```text
//! logs/
//! ├── kubelab.log        # generic entries
//! ├── kubelab-aws.log
//! ├── kubelab-azure.log
//! └── kubelab-gcp.log
//! ```
//!
//! Every entry is `[YYYY-MM-DD HH:MM:SS] LEVEL message` and is mirrored to
//! `tracing`. Raw command output is appended verbatim between entries.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::errors::{LabError, LabResult};
use crate::runner::LogTarget;

pub const GENERIC_LOG_FILE: &str = "kubelab.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionLog {
    logs_dir: PathBuf,
}

impl ActionLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            logs_dir: logs_dir.to_path_buf(),
        }
    }

    pub fn path(&self, target: LogTarget) -> PathBuf {
        match target {
            LogTarget::Generic => self.logs_dir.join(GENERIC_LOG_FILE),
            LogTarget::Provider(provider) => self.logs_dir.join(provider.log_file_name()),
        }
    }

    /// Open the log for appending, creating the logs directory if needed.
    pub fn open(&self, target: LogTarget) -> LabResult<File> {
        fs::create_dir_all(&self.logs_dir).map_err(|e| LabError::io(&self.logs_dir, e))?;
        let path = self.path(target);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LabError::io(path, e))
    }

    /// Append one timestamped entry.
    pub fn record(&self, level: Level, target: LogTarget, message: &str) -> LabResult<()> {
        match level {
            Level::Info => tracing::info!(log = %target, "{}", message),
            Level::Warn => tracing::warn!(log = %target, "{}", message),
            Level::Error => tracing::error!(log = %target, "{}", message),
        }

        let entry = format!(
            "[{}] {} {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.as_str(),
            message
        );
        self.open(target)?
            .write_all(entry.as_bytes())
            .map_err(|e| LabError::io(self.path(target), e))
    }

    /// Append captured command output as-is.
    pub fn append_output(&self, target: LogTarget, output: &str) -> LabResult<()> {
        if output.is_empty() {
            return Ok(());
        }
        let mut file = self.open(target)?;
        file.write_all(output.as_bytes())
            .and_then(|_| {
                if output.ends_with('\n') {
                    Ok(())
                } else {
                    file.write_all(b"\n")
                }
            })
            .map_err(|e| LabError::io(self.path(target), e))
    }

    pub fn info(&self, target: LogTarget, message: impl AsRef<str>) {
        self.record_or_warn(Level::Info, target, message.as_ref());
    }

    pub fn warn(&self, target: LogTarget, message: impl AsRef<str>) {
        self.record_or_warn(Level::Warn, target, message.as_ref());
    }

    pub fn error(&self, target: LogTarget, message: impl AsRef<str>) {
        self.record_or_warn(Level::Error, target, message.as_ref());
    }

    // A broken log file must not abort a half-finished teardown.
    fn record_or_warn(&self, level: Level, target: LogTarget, message: &str) {
        if let Err(err) = self.record(level, target, message) {
            tracing::warn!(error = %err, "failed to write action log");
        }
    }

    pub fn read(&self, target: LogTarget) -> LabResult<String> {
        let path = self.path(target);
        if !path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&path).map_err(|e| LabError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use tempfile::TempDir;

    #[test]
    fn test_entries_go_to_provider_file() {
        let dir = TempDir::new().unwrap();
        let log = ActionLog::new(&dir.path().join("logs"));

        log.info(LogTarget::Provider(Provider::Aws), "creating cluster eks");
        log.error(LogTarget::Generic, "something broke");

        let aws = log.read(LogTarget::Provider(Provider::Aws)).unwrap();
        assert!(aws.contains("INFO creating cluster eks"));
        assert!(!aws.contains("something broke"));

        let generic = log.read(LogTarget::Generic).unwrap();
        assert!(generic.contains("ERROR something broke"));
        assert!(dir.path().join("logs/kubelab.log").exists());
        assert!(dir.path().join("logs/kubelab-aws.log").exists());
    }

    #[test]
    fn test_entries_are_timestamped_and_appended() {
        let dir = TempDir::new().unwrap();
        let log = ActionLog::new(dir.path());
        let target = LogTarget::Provider(Provider::Gcp);

        log.info(target, "first");
        log.info(target, "second");

        let content = log.read(target).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("INFO first"));
        assert!(lines[1].ends_with("INFO second"));
    }

    #[test]
    fn test_append_output_terminates_lines() {
        let dir = TempDir::new().unwrap();
        let log = ActionLog::new(dir.path());
        let target = LogTarget::Provider(Provider::Azure);

        log.append_output(target, "line one\nline two").unwrap();
        log.append_output(target, "").unwrap();
        log.info(target, "after");

        let content = log.read(target).unwrap();
        assert!(content.starts_with("line one\nline two\n["));
    }

    #[test]
    fn test_read_missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = ActionLog::new(dir.path());
        assert_eq!(log.read(LogTarget::Generic).unwrap(), "");
    }
}
