//! # Stop signal and single-slot completion channels
//!
//! The controller never shares its state with the threads doing long-latency work. Instead each
//! request hands back a [`SlotReceiver`], which yields exactly one value, and the controller
//! blocks on it while watching the operator's [`StopSignal`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender},
        Arc,
    },
    time::{Duration, Instant},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period at which blocked waits check the stop signal. This bounds the reaction time to an
/// operator cancel.
pub const STOP_POLL_PERIOD: Duration = Duration::from_millis(20);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Cancellation flag shared between the operator's interrupt handler and the controller.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

/// Sending half of a single-slot channel. Consumed by [`SlotSender::fill`] so at most one value
/// is ever delivered.
#[derive(Debug)]
pub struct SlotSender<T>(SyncSender<T>);

/// Receiving half of a single-slot channel. Consumed by [`SlotReceiver::wait`] so the value is
/// consumed at most once.
#[derive(Debug)]
pub struct SlotReceiver<T>(Receiver<T>);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reasons a wait on a slot ended without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SlotWaitError {
    #[error("The stop signal was raised while waiting")]
    Stopped,

    #[error("No value arrived within {0:?}")]
    TimedOut(Duration),

    #[error("The producer was dropped without filling the slot")]
    Abandoned,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Create a new single-slot channel.
pub fn slot<T>() -> (SlotSender<T>, SlotReceiver<T>) {
    let (tx, rx) = sync_channel(1);
    (SlotSender(tx), SlotReceiver(rx))
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal which nothing else holds, and so is never raised.
    ///
    /// Used for moves which must run to completion regardless of an operator cancel, such as the
    /// final return to HOME.
    pub fn never() -> Self {
        Self::default()
    }

    /// Raise the signal.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl<T> SlotSender<T> {
    /// Deliver the value. Returns `false` if the receiver has already gone away, which happens
    /// when the controller abandoned the wait.
    pub fn fill(self, value: T) -> bool {
        self.0.try_send(value).is_ok()
    }
}

impl<T> SlotReceiver<T> {
    /// Block until the value arrives, the stop signal is raised, or `timeout` elapses.
    pub fn wait(self, stop: &StopSignal, timeout: Duration) -> Result<T, SlotWaitError> {
        let deadline = Instant::now() + timeout;

        loop {
            if stop.is_triggered() {
                return Err(SlotWaitError::Stopped);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SlotWaitError::TimedOut(timeout));
            }

            let poll = STOP_POLL_PERIOD.min(deadline - now);

            match self.0.recv_timeout(poll) {
                Ok(v) => return Ok(v),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(SlotWaitError::Abandoned),
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_slot_delivers_once() {
        let (tx, rx) = slot();
        let stop = StopSignal::new();

        let handle = thread::spawn(move || tx.fill(42u32));

        assert_eq!(rx.wait(&stop, Duration::from_secs(5)), Ok(42));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_slot_fill_after_receiver_dropped() {
        let (tx, rx) = slot::<u32>();
        drop(rx);
        assert!(!tx.fill(1));
    }

    #[test]
    fn test_slot_wait_errors() {
        let stop = StopSignal::new();

        // Producer gone
        let (tx, rx) = slot::<u32>();
        drop(tx);
        assert_eq!(
            rx.wait(&stop, Duration::from_secs(5)),
            Err(SlotWaitError::Abandoned)
        );

        // Timeout
        let (_tx, rx) = slot::<u32>();
        let timeout = Duration::from_millis(50);
        assert_eq!(rx.wait(&stop, timeout), Err(SlotWaitError::TimedOut(timeout)));

        // Stop raised from another thread while waiting
        let (_tx, rx) = slot::<u32>();
        let remote = stop.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.trigger();
        });
        let start = Instant::now();
        assert_eq!(
            rx.wait(&stop, Duration::from_secs(30)),
            Err(SlotWaitError::Stopped)
        );
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();

        assert!(!StopSignal::never().is_triggered());
    }
}
