use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Target prefix shared by every bridge crate (`hwbridge`, `hwbridge_core`, ...).
const BRIDGE_TARGET: &str = "hwbridge";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Debug output names the emitting crate so transport, session and
    /// protocol events can be told apart.
    fn shows_target(self) -> bool {
        matches!(self, LogLevel::Debug | LogLevel::Trace)
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` applies to the bridge crates. Dependencies (nusb, tokio) stay at
/// warnings unless a quieter level was asked for.
fn targets(level: LogLevel) -> Targets {
    let level = LevelFilter::from(level);
    Targets::new()
        .with_target(BRIDGE_TARGET, level)
        .with_default(level.min(LevelFilter::WARN))
}

/// Install the stderr subscriber. Stdout stays reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(level.shows_target());
    let registry = tracing_subscriber::registry().with(targets(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn bridge_crates_follow_the_requested_level() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("hwbridge_core::bridge", &Level::TRACE));
        assert!(filter.would_enable("hwbridge_device::usb", &Level::DEBUG));
        assert!(!filter.would_enable("nusb::platform", &Level::DEBUG));
        assert!(filter.would_enable("nusb::platform", &Level::WARN));
    }

    #[test]
    fn quiet_levels_apply_to_dependencies_too() {
        let filter = targets(LogLevel::Error);
        assert!(!filter.would_enable("hwbridge_sessions", &Level::WARN));
        assert!(!filter.would_enable("tokio::runtime", &Level::WARN));
        assert!(filter.would_enable("tokio::runtime", &Level::ERROR));
    }

    #[test]
    fn targets_shown_only_when_debugging() {
        assert!(!LogLevel::Info.shows_target());
        assert!(LogLevel::Debug.shows_target());
    }
}
