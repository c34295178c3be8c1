//! Interrupt-driven event flags.
//!
//! Events are produced by:
//! - GPIO ISRs (user button, accelerometer motion interrupt)
//! - Cloud callbacks (firmware update lifecycle, time sync)
//! - Software (state machine, supervisor)
//!
//! Events are consumed once per control-loop pass, which drains them in
//! FIFO order before the state machine ticks.  This replaces ad-hoc
//! volatile flags: an ISR records "it happened", the loop decides what it
//! means.

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 32;

/// System event types, ordered by rough priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    // ── Hardware interrupts ───────────────────────────────
    /// User button pressed (debounced in the ISR).
    ButtonPressed = 0,
    /// Accelerometer motion interrupt (lid knocked or bin moved).
    LidActivity = 1,

    // ── Firmware update lifecycle ─────────────────────────
    /// Cloud signalled an OTA download is starting.
    UpdateStarted = 10,
    /// OTA completed and a reboot is pending.
    UpdateCompleted = 11,
    /// OTA aborted or failed mid-transfer.
    UpdateFailed = 12,

    // ── Cloud ─────────────────────────────────────────────
    /// Wall clock synced from the network.
    TimeSynced = 20,
    /// Webhook acknowledgement arrived.
    HookResponse = 21,

    // ── Housekeeping ──────────────────────────────────────
    /// Watchdog pre-timeout warning fired.
    WatchdogWarning = 30,
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// ISRs write (produce), main loop reads (consume).
// Atomic head/tail indices; the buffer lives in a static so ISR
// callbacks can reach it without a handle.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: one producer (ISR context), one consumer (main loop).  The
// acquire/release pairs on head/tail order the buffer accesses.
static mut EVENT_BUFFER: [u8; EVENT_QUEUE_CAP] = [0; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from ISR context (lock-free).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false; // Queue full, drop event.
    }

    // SAFETY: single producer; the Release store below publishes the write.
    unsafe {
        EVENT_BUFFER[head as usize] = event as u8;
    }

    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Called from the main loop (single consumer).
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    let raw = unsafe { EVENT_BUFFER[tail as usize] };
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw)
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Number of pending events.
pub fn queue_len() -> usize {
    let head = EVENT_HEAD.load(Ordering::Relaxed) as usize;
    let tail = EVENT_TAIL.load(Ordering::Relaxed) as usize;
    (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
}

// ── Internal ──────────────────────────────────────────────────

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::ButtonPressed),
        1 => Some(Event::LidActivity),
        10 => Some(Event::UpdateStarted),
        11 => Some(Event::UpdateCompleted),
        12 => Some(Event::UpdateFailed),
        20 => Some(Event::TimeSynced),
        21 => Some(Event::HookResponse),
        30 => Some(Event::WatchdogWarning),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The queue is a process-wide static, so tests that touch it must not
    // run concurrently.  A single test exercises the full contract.
    #[test]
    fn fifo_order_and_overflow() {
        while pop_event().is_some() {}

        assert!(push_event(Event::ButtonPressed));
        assert!(push_event(Event::LidActivity));
        assert!(push_event(Event::TimeSynced));
        assert_eq!(queue_len(), 3);

        assert_eq!(pop_event(), Some(Event::ButtonPressed));
        assert_eq!(pop_event(), Some(Event::LidActivity));
        assert_eq!(pop_event(), Some(Event::TimeSynced));
        assert_eq!(pop_event(), None);

        // Fill to capacity - 1 (one slot is sacrificed to distinguish
        // full from empty), then confirm the next push is rejected.
        let mut pushed = 0;
        while push_event(Event::WatchdogWarning) {
            pushed += 1;
        }
        assert_eq!(pushed, 31);
        assert!(!push_event(Event::ButtonPressed));

        let mut drained = 0;
        drain_events(|e| {
            assert_eq!(e, Event::WatchdogWarning);
            drained += 1;
        });
        assert_eq!(drained, pushed);
        assert_eq!(queue_len(), 0);
    }
}
