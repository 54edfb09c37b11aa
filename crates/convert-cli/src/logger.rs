use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use std::io::Write;

/// Timestamped stderr logger
#[derive(Clone, Copy)]
pub struct CliLogger {
    level: LevelFilter,
}

impl CliLogger {
    /// `-v` count to level: warnings by default, then info, debug, trace
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        Self { level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn init(self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(self.level);
        Ok(())
    }
}

impl log::Log for CliLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let label = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "{} {} [{}] {}",
            Local::now().format("%H:%M:%S%.3f"),
            label,
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
