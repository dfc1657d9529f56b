//! Terminal logging setup.

use std::{env, str::FromStr};

use slog::{Drain, Level, Logger, o};

/// Reads the log level from `RUST_LOG`, falling back to `default`.
pub fn level_from_env(default: Level) -> Level {
    env::var("RUST_LOG")
        .ok()
        .and_then(|env_str| Level::from_str(&env_str).ok())
        .unwrap_or(default)
}

/// Creates an asynchronous terminal logger filtered at `level`.
pub fn create_logger(level: Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain)
        .build()
        .fuse()
        .filter_level(level)
        .fuse();

    Logger::root(drain, o!("component" => "sequencer"))
}

/// Terminal logger for integration tests, level taken from `RUST_LOG`.
pub fn create_test_logger() -> Logger {
    create_logger(level_from_env(Level::Info))
}

/// Logger that discards everything.
pub fn create_quiet_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
