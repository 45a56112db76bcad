use log::{LevelFilter, Log, Metadata, Record};

/// Writes `[LEVEL target] message` lines to stderr
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// `-v` steps from warnings up to tracing; `--debug` is at least debug
pub fn level_for(verbose: u8, debug: bool) -> LevelFilter {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if debug {
        level.max(LevelFilter::Debug)
    } else {
        level
    }
}

/// Install the stderr logger; keeps an already installed one
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0, false), LevelFilter::Warn);
        assert_eq!(level_for(1, false), LevelFilter::Info);
        assert_eq!(level_for(0, true), LevelFilter::Debug);
        assert_eq!(level_for(3, true), LevelFilter::Trace);
        assert_eq!(level_for(9, false), LevelFilter::Trace);
    }
}
