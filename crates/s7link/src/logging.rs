//! Stderr logging for the CLI.
//!
//! Only the link's own crates are let through; the level picked on the
//! command line applies to all of them. Worker threads are named after the
//! channel they serve (`s7link-inbound`, `s7link-outbound`, `s7link-scheduler`),
//! so thread names stay on in both formats.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose events reach stderr.
const LINK_TARGETS: [&str; 5] = [
    "s7link",
    "s7link_engine",
    "s7link_frame",
    "s7link_registry",
    "s7link_transport",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// One line per event, prefixed with the worker thread.
    Text,
    /// One flat JSON object per event.
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    /// Link state changes, released peers, dropped frames.
    Debug,
    /// Every read and write on the wire.
    Trace,
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

fn link_targets(level: LevelFilter) -> Targets {
    LINK_TARGETS
        .iter()
        .fold(Targets::new(), |targets, target| {
            targets.with_target(*target, level)
        })
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let level = LevelFilter::from(level);
    let filter = link_targets(level);

    let installed = match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(level)
            .with_ansi(false)
            .with_thread_names(true)
            .finish()
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .with_max_level(level)
            .with_thread_names(true)
            .finish()
            .with(filter)
            .try_init(),
    };
    if let Err(err) = installed {
        eprintln!("logging already initialised: {err}");
    }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn level_applies_to_every_link_crate() {
        let targets = link_targets(LogLevel::Debug.into());

        for target in LINK_TARGETS {
            assert!(targets.would_enable(target, &Level::DEBUG));
            assert!(!targets.would_enable(target, &Level::TRACE));
        }
        assert!(targets.would_enable("s7link_frame::reader", &Level::DEBUG));
    }

    #[test]
    fn foreign_crates_are_silenced() {
        let targets = link_targets(LogLevel::Trace.into());

        assert!(!targets.would_enable("mio::poll", &Level::ERROR));
        assert!(!targets.would_enable("clap_builder", &Level::WARN));
    }

    #[test]
    fn error_level_keeps_only_errors() {
        let targets = link_targets(LogLevel::Error.into());

        assert!(targets.would_enable("s7link_engine::scheduler", &Level::ERROR));
        assert!(!targets.would_enable("s7link_engine::scheduler", &Level::WARN));
    }
}
