//! Heartbeat thread that keeps the chain moving between events.
//!
//! Appends one empty event per tick interval. The loop stops by itself when
//! the engine reports a fatal error, so a halted chain is never hammered.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use slog::Logger;

use crate::poh::engine::PohEngine;

/// Upper bound on a single sleep so shutdown is noticed promptly.
const MAX_SLEEP: Duration = Duration::from_millis(10);

/// Handle to the running heartbeat thread.
pub struct PohTicker {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
}

impl PohTicker {
    /// Spawns the ticker on a dedicated OS thread.
    pub fn spawn(
        engine: Arc<PohEngine>,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
        logger: Logger,
    ) -> anyhow::Result<Self> {
        let ticks = Arc::new(AtomicU64::new(0));
        let shutdown_clone = Arc::clone(&shutdown);
        let ticks_clone = Arc::clone(&ticks);

        let handle = thread::Builder::new()
            .name("poh-ticker".into())
            .spawn(move || ticker_loop(engine, interval, shutdown_clone, ticks_clone, logger))
            .context("Failed to spawn poh ticker thread")?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            ticks,
        })
    }

    /// Number of empty events appended so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Signals shutdown and waits for the thread to terminate.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Returns true if the ticker thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PohTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn ticker_loop(
    engine: Arc<PohEngine>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    logger: Logger,
) {
    slog::info!(logger, "PoH ticker started"; "interval_ms" => interval.as_millis() as u64);
    let mut next_tick = Instant::now() + interval;

    while !shutdown.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_tick {
            thread::sleep((next_tick - now).min(MAX_SLEEP));
            continue;
        }
        next_tick += interval;

        match engine.append_event(None) {
            Ok(_) => {
                ticks.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_fatal() => {
                slog::crit!(logger, "PoH ticker stopping on fatal chain error"; "error" => %e);
                break;
            }
            Err(e) => {
                slog::warn!(logger, "PoH tick failed"; "error" => %e);
            }
        }
    }

    slog::info!(
        logger,
        "PoH ticker stopped";
        "ticks" => ticks.load(Ordering::Relaxed),
        "height" => engine.current_height(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::PohConfig, crypto::hash::ZERO_HASH};

    fn logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn ticker_appends_empty_events() {
        let engine =
            Arc::new(PohEngine::new(PohConfig::default(), ZERO_HASH, logger()).unwrap());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut ticker = PohTicker::spawn(
            Arc::clone(&engine),
            Duration::from_millis(1),
            shutdown,
            logger(),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticker.ticks() < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        ticker.shutdown();

        assert!(ticker.ticks() >= 5);
        assert_eq!(engine.current_height(), ticker.ticks());
        assert_eq!(engine.head().empty_event_counter, ticker.ticks());
    }

    #[test]
    fn ticker_stops_when_chain_halts() {
        let config = PohConfig {
            empty_event_ceiling: 3,
            ..PohConfig::default()
        };
        let engine = Arc::new(PohEngine::new(config, ZERO_HASH, logger()).unwrap());
        let ticker = PohTicker::spawn(
            Arc::clone(&engine),
            Duration::from_millis(1),
            Arc::new(AtomicBool::new(false)),
            logger(),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticker.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        assert!(!ticker.is_running());
        assert!(engine.is_halted());
        assert_eq!(engine.current_height(), 3);
    }
}
