use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::bluetooth::constants::BROADCAST_CAPACITY;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Logger that echoes to stderr and feeds a log pane on the screen.
pub struct ScreenLogger {
    level: LevelFilter,
    feed: broadcast::Sender<LogMessage>,
}

impl ScreenLogger {
    pub fn new(level: LevelFilter) -> Self {
        let (feed, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { level, feed }
    }

    /// Receiver for every record this logger accepts from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LogMessage> {
        self.feed.subscribe()
    }

    /// Installs the logger globally and returns a receiver for its feed.
    pub fn init(level: LevelFilter) -> Result<broadcast::Receiver<LogMessage>, SetLoggerError> {
        let logger: &'static ScreenLogger = Box::leak(Box::new(ScreenLogger::new(level)));
        let receiver = logger.subscribe();
        log::set_logger(logger).map(|()| log::set_max_level(level))?;
        Ok(receiver)
    }

    fn emit_log(&self, record: &Record) {
        let log_message = LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        };

        // Nobody rendering the pane is fine.
        let _ = self.feed.send(log_message);
    }
}

impl log::Log for ScreenLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
            self.emit_log(record);
        }
    }

    fn flush(&self) {}
}

/// Installs the screen logger, falling back to `env_logger` if another
/// logger is already set. Returns the log feed when the screen logger won.
pub fn setup_logging(level: LevelFilter) -> Option<broadcast::Receiver<LogMessage>> {
    match ScreenLogger::init(level) {
        Ok(feed) => {
            log::info!("Logging initialized");
            Some(feed)
        }
        Err(_) => {
            let _ = env_logger::builder().filter_level(level).try_init();
            None
        }
    }
}
