//! Structured logging module for Boardroom
//!
//! Writes daily log files to the configured log directory with categories:
//! - SESSION: Conversation lifecycle (bootstrap, topic, resume)
//! - CONSENT: Consent gate decisions
//! - AGENT: Completion calls
//! - SETTINGS: Settings loads and saves
//! - ERROR: Errors

use chrono::Utc;
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Session,
    Consent,
    Agent,
    Settings,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Session => "SESSION",
            LogCategory::Consent => "CONSENT",
            LogCategory::Agent => "AGENT",
            LogCategory::Settings => "SETTINGS",
            LogCategory::Error => "ERROR",
        }
    }
}

static LOG_DIR: OnceCell<PathBuf> = OnceCell::new();

/// `boardroom.YYYY-MM-DD.log`, switching files at midnight.
fn daily_appender(log_dir: &Path) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("boardroom")
        .filename_suffix("log")
        .build(log_dir)?)
}

/// Install the global subscriber: console plus a daily log file.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }
    let _ = LOG_DIR.set(log_dir.to_path_buf());

    let file = daily_appender(log_dir)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(file),
        )
        .try_init()?;

    log(LogCategory::Session, None, "Boardroom logging initialized");
    Ok(())
}

/// Shorten a conversation id to its first 8 chars for log lines.
fn conversation_prefix(conversation_id: Option<&str>) -> String {
    conversation_id
        .map(|id| format!("conversation={} | ", &id[..id.char_indices().nth(8).map_or(id.len(), |(i, _)| i)]))
        .unwrap_or_default()
}

/// Log a message with category and optional conversation context
pub fn log(category: LogCategory, conversation_id: Option<&str>, message: &str) {
    let line = format!("{}{}", conversation_prefix(conversation_id), message);
    match category {
        LogCategory::Error => tracing::error!(category = category.as_str(), "{}", line),
        _ => tracing::info!(category = category.as_str(), "{}", line),
    }
}

pub fn log_session(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Session, conversation_id, message);
}

pub fn log_consent(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Consent, conversation_id, message);
}

pub fn log_agent(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Agent, conversation_id, message);
}

pub fn log_settings(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Settings, conversation_id, message);
}

pub fn log_error(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Error, conversation_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs() -> Result<usize, Box<dyn std::error::Error>> {
    match LOG_DIR.get() {
        Some(dir) => cleanup_logs_in(dir, chrono::Duration::days(7)),
        None => Ok(0),
    }
}

fn cleanup_logs_in(log_dir: &Path, keep: chrono::Duration) -> Result<usize, Box<dyn std::error::Error>> {
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - keep;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.extension().is_some_and(|ext| ext == "log");
        if !is_log {
            continue;
        }

        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified_time: chrono::DateTime<Utc> = modified.into();
            if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_prefix_is_shortened() {
        assert_eq!(
            conversation_prefix(Some("0123456789abcdef")),
            "conversation=01234567 | "
        );
        assert_eq!(conversation_prefix(Some("42")), "conversation=42 | ");
        assert_eq!(conversation_prefix(None), "");
    }

    #[test]
    fn test_category_names() {
        assert_eq!(LogCategory::Consent.as_str(), "CONSENT");
        assert_eq!(LogCategory::Error.as_str(), "ERROR");
    }

    #[test]
    fn test_daily_appender_writes_dated_log_file() {
        use std::io::Write;

        let dir = std::env::temp_dir().join(format!("boardroom-logs-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        let mut appender = daily_appender(&dir).unwrap();
        appender.write_all(b"line\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(names[0], format!("boardroom.{}.log", today));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_cleanup_keeps_fresh_logs() {
        let dir = std::env::temp_dir().join(format!("boardroom-logs-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("boardroom-today.log"), "x").unwrap();
        fs::write(dir.join("notes.txt"), "x").unwrap();

        assert_eq!(cleanup_logs_in(&dir, chrono::Duration::days(7)).unwrap(), 0);
        // everything is older than a negative retention window
        assert_eq!(cleanup_logs_in(&dir, chrono::Duration::days(-1)).unwrap(), 1);
        assert!(dir.join("notes.txt").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
