//! Slot clock.
//!
//! Emits one [`SlotTick`] per slot boundary into a ring buffer read by the
//! assembler service. Slot numbers are derived from elapsed time, so a slot
//! the consumer never saw is simply absent rather than delivered late.

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

/// Ring buffer size for slot ticks.
pub const TICK_RING_BUFFER_SIZE: usize = 64;

/// Upper bound on a single sleep so shutdown is noticed promptly.
const MAX_SLEEP: Duration = Duration::from_millis(10);

/// A slot boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTick {
    /// The slot that just started
    pub slot: u64,
    /// End of the slot's time budget
    pub deadline: Instant,
}

impl SlotTick {
    pub fn new(slot: u64, budget: Duration) -> Self {
        Self {
            slot,
            deadline: Instant::now() + budget,
        }
    }

    /// Whether the slot's budget is already spent at `now`.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Creates the tick channel between a clock and an assembler service.
pub fn tick_channel() -> (Producer<SlotTick>, Consumer<SlotTick>) {
    RingBuffer::<SlotTick>::new(TICK_RING_BUFFER_SIZE)
}

/// Handle to the running slot clock thread.
pub struct SlotClock {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl SlotClock {
    /// Spawns the clock. The first tick announces `first_slot` one
    /// `slot_duration` from now.
    pub fn spawn(
        first_slot: u64,
        slot_duration: Duration,
        producer: Producer<SlotTick>,
        shutdown: Arc<AtomicBool>,
        logger: Logger,
    ) -> anyhow::Result<Self> {
        let shutdown_clone = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("slot-clock".into())
            .spawn(move || {
                clock_loop(first_slot, slot_duration, producer, shutdown_clone, logger)
            })
            .context("Failed to spawn slot clock thread")?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }

    /// Signals shutdown and waits for the thread to terminate.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SlotClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn clock_loop(
    first_slot: u64,
    slot_duration: Duration,
    mut producer: Producer<SlotTick>,
    shutdown: Arc<AtomicBool>,
    logger: Logger,
) {
    slog::info!(
        logger,
        "Slot clock started";
        "first_slot" => first_slot,
        "slot_ms" => slot_duration.as_millis() as u64,
    );

    let start = Instant::now();
    let mut next_boundary = start + slot_duration;
    let mut emitted = 0u64;
    let mut dropped = 0u64;

    while !shutdown.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_boundary {
            thread::sleep((next_boundary - now).min(MAX_SLEEP));
            continue;
        }

        let elapsed_slots = (now - start).as_nanos() / slot_duration.as_nanos().max(1);
        let slot = first_slot + elapsed_slots.saturating_sub(1) as u64;
        next_boundary = start + slot_duration * (elapsed_slots as u32 + 1);

        match producer.push(SlotTick::new(slot, slot_duration)) {
            Ok(()) => emitted += 1,
            Err(rtrb::PushError::Full(_)) => {
                dropped += 1;
                slog::warn!(logger, "Slot tick dropped, assembler behind"; "slot" => slot);
            }
        }
    }

    slog::info!(logger, "Slot clock stopped"; "emitted" => emitted, "dropped" => dropped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_expiry() {
        let tick = SlotTick::new(3, Duration::from_millis(50));
        assert!(!tick.is_expired(Instant::now()));
        assert!(tick.is_expired(tick.deadline));
    }

    #[test]
    fn clock_emits_increasing_slots() {
        let (producer, mut consumer) = tick_channel();
        let mut clock = SlotClock::spawn(
            10,
            Duration::from_millis(2),
            producer,
            Arc::new(AtomicBool::new(false)),
            Logger::root(slog::Discard, slog::o!()),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut slots = Vec::new();
        while slots.len() < 3 && Instant::now() < deadline {
            if let Ok(tick) = consumer.pop() {
                slots.push(tick.slot);
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        clock.shutdown();

        assert_eq!(slots.len(), 3);
        assert!(slots[0] >= 10);
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }
}
