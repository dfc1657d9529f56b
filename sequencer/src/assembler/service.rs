//! Assembler Service - Thread Management
//!
//! Runs the [`BlockAssembler`] on a dedicated OS thread, driven by slot ticks
//! from a lock-free rtrb channel.
//!
//! ## Architecture
//!
//! ```text
//! SlotClock ──[tick_channel]──► Assembler ──[outcome_channel]──► Node
//!                                  │  ▲
//!                   select / requeue│  │stamp
//!                                  ▼  │
//!                      TransactionPool  PohEngine
//! ```
//!
//! ## Overruns
//!
//! When several ticks are queued, only the newest is assembled and the older
//! ones are counted as missed. A tick whose deadline has already passed is
//! skipped too. Neither case is an error: a missed slot only costs throughput.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use rtrb::{Consumer, Producer, RingBuffer};
use slog::Logger;

use super::{
    block_assembler::{BlockAssembler, SlotOutcome},
    clock::SlotTick,
};

/// Ring buffer size for slot outcomes.
const OUTCOME_RING_BUFFER_SIZE: usize = 256;

/// How often the loop logs its counters.
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Block assembler running on a dedicated OS thread.
pub struct AssemblerService {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

/// Channel endpoints for reading assembler results.
pub struct AssemblerChannels {
    /// Consumer for per-slot outcomes (Assembler → Node)
    pub outcome_consumer: Consumer<SlotOutcome>,
}

impl AssemblerService {
    /// Spawns the assembler service on a new OS thread.
    pub fn spawn(
        assembler: BlockAssembler,
        tick_consumer: Consumer<SlotTick>,
        shutdown: Arc<AtomicBool>,
        logger: Logger,
    ) -> anyhow::Result<(Self, AssemblerChannels)> {
        let (outcome_producer, outcome_consumer) =
            RingBuffer::<SlotOutcome>::new(OUTCOME_RING_BUFFER_SIZE);
        let shutdown_clone = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("block-assembler".into())
            .spawn(move || {
                assembler_loop(
                    assembler,
                    tick_consumer,
                    outcome_producer,
                    shutdown_clone,
                    logger,
                )
            })
            .context("Failed to spawn block assembler thread")?;

        Ok((
            Self {
                handle: Some(handle),
                shutdown,
            },
            AssemblerChannels { outcome_consumer },
        ))
    }

    /// Signals shutdown and waits for the thread to terminate.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Returns true if the service is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AssemblerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Main assembler event loop.
fn assembler_loop(
    mut assembler: BlockAssembler,
    mut tick_consumer: Consumer<SlotTick>,
    mut outcome_producer: Producer<SlotOutcome>,
    shutdown: Arc<AtomicBool>,
    logger: Logger,
) {
    let mut idle_count = 0_u32;
    let mut stats_interval = Instant::now();
    let mut missed_ticks = 0u64;
    let mut dropped_outcomes = 0u64;

    slog::info!(logger, "Block assembler started");

    while !shutdown.load(Ordering::Acquire) {
        let mut did_work = false;

        // Keep only the newest queued tick.
        let mut latest = None;
        while let Ok(tick) = tick_consumer.pop() {
            if latest.is_some() {
                missed_ticks += 1;
            }
            latest = Some(tick);
        }

        if let Some(tick) = latest {
            did_work = true;
            if tick.is_expired(Instant::now()) {
                missed_ticks += 1;
                slog::warn!(logger, "Slot deadline passed before assembly"; "slot" => tick.slot);
            } else {
                let outcome = assembler.on_slot(tick);
                if outcome_producer.push(outcome).is_err() {
                    dropped_outcomes += 1;
                    slog::debug!(logger, "Outcome channel full, outcome dropped"; "slot" => tick.slot);
                }
            }
        }

        if stats_interval.elapsed() >= STATS_INTERVAL {
            let stats = assembler.stats();
            slog::info!(
                logger,
                "Assembler stats";
                "committed" => stats.committed,
                "rejected" => stats.rejected,
                "stale" => stats.stale,
                "missed" => missed_ticks,
                "transactions" => stats.transactions_committed,
                "dropped" => stats.dropped,
                "oversized" => stats.oversized,
            );
            stats_interval = Instant::now();
        }

        // Progressive backoff when idle
        if did_work {
            idle_count = 0;
        } else {
            idle_count = idle_count.saturating_add(1);
            if idle_count < 10 {
                std::hint::spin_loop();
            } else if idle_count < 100 {
                thread::yield_now();
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    let stats = assembler.stats();
    slog::info!(
        logger,
        "Block assembler shutting down";
        "committed" => stats.committed,
        "rejected" => stats.rejected,
        "missed" => missed_ticks,
        "dropped_outcomes" => dropped_outcomes,
    );
}
