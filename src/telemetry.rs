use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::error::{QuestError, Result};

/// Where and how the host writes the quest log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub directory: PathBuf,
    pub file_name: String,
    /// One JSON object per line instead of plain text.
    pub json: bool,
    /// Overrides the build-type default filter, e.g. `"cosmic_quest=trace"`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "cosmic_quest.log".to_string(),
            json: false,
            filter: None,
        }
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    match &config.filter {
        Some(directives) => EnvFilter::new(directives),
        None if cfg!(debug_assertions) => EnvFilter::new("debug"),
        None => EnvFilter::new("info"),
    }
}

/// Installs the global subscriber writing to a daily rolling file.
///
/// Fails with [`QuestError::Logging`] if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.directory, &config.file_name);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(file_appender)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| QuestError::Logging(e.to_string()))?;

    info!(directory = %config.directory.display(), json = config.json, "Logging system initialized");
    debug!("Debug logging {}", if cfg!(debug_assertions) { "enabled" } else { "disabled" });
    Ok(())
}
