//! # Vision Worker
//!
//! Threads owning the frame source and the oracle. The camera and the oracle each get their own
//! thread, so a slow inference the controller gave up on never holds up the next capture.
//!
//! Each request returns a single-slot receiver for its result, so the controller can wait on it
//! while watching the stop signal. A panic inside the source or the oracle is caught here and the
//! slot is dropped unfilled, which the controller sees as
//! [`SlotWaitError::Abandoned`](crate::signal::SlotWaitError::Abandoned).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::mpsc::{channel, Receiver, Sender},
    thread,
};

use comms_if::eqpt::cam::CamFrame;
use log::{debug, error};

use crate::{
    cam_client::{CaptureError, FrameSource},
    oracle::{Answer, OracleError, VisionOracle},
    signal::{slot, SlotReceiver, SlotSender},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the vision worker threads. The threads exit once the handle is dropped and any
/// running job finishes.
pub struct VisionWorker {
    capture_tx: Sender<CaptureJob>,

    ask_tx: Sender<AskJob>,
}

type CaptureJob = SlotSender<Result<CamFrame, CaptureError>>;

struct AskJob {
    frame: CamFrame,
    object: String,
    slot: SlotSender<Result<Answer, OracleError>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VisionWorker {
    /// Start the worker threads.
    pub fn spawn(
        source: Box<dyn FrameSource>,
        oracle: Box<dyn VisionOracle>,
    ) -> std::io::Result<Self> {
        let (capture_tx, capture_rx) = channel();
        let (ask_tx, ask_rx) = channel();

        // The threads are detached, an oracle request may outlive a cancelled search
        thread::Builder::new()
            .name("capture_worker".into())
            .spawn(move || capture_thread(source, capture_rx))?;
        thread::Builder::new()
            .name("oracle_worker".into())
            .spawn(move || oracle_thread(oracle, ask_rx))?;

        Ok(Self { capture_tx, ask_tx })
    }

    /// Request a frame.
    pub fn capture(&self) -> SlotReceiver<Result<CamFrame, CaptureError>> {
        let (tx, rx) = slot();

        // If the worker is gone the job, and with it the sender, is dropped here
        let _ = self.capture_tx.send(tx);

        rx
    }

    /// Ask the oracle whether `object` is in `frame`.
    pub fn ask(&self, frame: CamFrame, object: &str) -> SlotReceiver<Result<Answer, OracleError>> {
        let (tx, rx) = slot();

        let _ = self.ask_tx.send(AskJob {
            frame,
            object: object.to_string(),
            slot: tx,
        });

        rx
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn capture_thread(mut source: Box<dyn FrameSource>, job_rx: Receiver<CaptureJob>) {
    while let Ok(slot) = job_rx.recv() {
        match catch_unwind(AssertUnwindSafe(|| source.capture())) {
            Ok(result) => {
                if !slot.fill(result) {
                    debug!("Capture finished after the controller stopped waiting");
                }
            }
            Err(_) => error!("The frame source panicked during capture"),
        }
    }

    debug!("Capture worker stopped");
}

fn oracle_thread(mut oracle: Box<dyn VisionOracle>, job_rx: Receiver<AskJob>) {
    while let Ok(job) = job_rx.recv() {
        match catch_unwind(AssertUnwindSafe(|| oracle.ask(&job.frame, &job.object))) {
            Ok(result) => {
                if !job.slot.fill(result) {
                    debug!("Oracle answered after the controller stopped waiting");
                }
            }
            Err(_) => error!("The vision oracle panicked"),
        }
    }

    debug!("Oracle worker stopped");
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::signal::{SlotWaitError, StopSignal};
    use chrono::Utc;
    use comms_if::eqpt::cam::ImageFormat;
    use std::time::Duration;

    struct CountingSource(u32);

    impl FrameSource for CountingSource {
        fn capture(&mut self) -> Result<CamFrame, CaptureError> {
            self.0 += 1;
            if self.0 == 2 {
                panic!("camera driver fault");
            }
            Ok(CamFrame {
                timestamp: Utc::now(),
                format: ImageFormat::Png,
                data: vec![self.0 as u8],
            })
        }
    }

    struct EchoOracle;

    impl VisionOracle for EchoOracle {
        fn ask(&mut self, frame: &CamFrame, object: &str) -> Result<Answer, OracleError> {
            Ok(Answer::from_text(format!("yes {} {}", object, frame.data[0])))
        }
    }

    #[test]
    fn test_worker_contains_panics() {
        let worker = VisionWorker::spawn(Box::new(CountingSource(0)), Box::new(EchoOracle)).unwrap();
        let stop = StopSignal::new();
        let timeout = Duration::from_secs(5);

        let frame = worker.capture().wait(&stop, timeout).unwrap().unwrap();
        assert_eq!(frame.data, vec![1]);

        let answer = worker.ask(frame, "cube").wait(&stop, timeout).unwrap().unwrap();
        assert!(answer.found);
        assert_eq!(answer.raw_text, "yes cube 1");

        // The second capture panics, the worker survives
        assert_eq!(
            worker.capture().wait(&stop, timeout).map(|_| ()),
            Err(SlotWaitError::Abandoned)
        );

        let frame = worker.capture().wait(&stop, timeout).unwrap().unwrap();
        assert_eq!(frame.data, vec![3]);
    }

    struct SlowOracle;

    impl VisionOracle for SlowOracle {
        fn ask(&mut self, _: &CamFrame, _: &str) -> Result<Answer, OracleError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Answer::from_text("no"))
        }
    }

    #[test]
    fn test_capture_not_blocked_by_oracle() {
        let worker = VisionWorker::spawn(Box::new(CountingSource(0)), Box::new(SlowOracle)).unwrap();
        let stop = StopSignal::new();

        let frame = worker
            .capture()
            .wait(&stop, Duration::from_secs(5))
            .unwrap()
            .unwrap();

        // Abandon a slow decision, the camera must still answer straight away
        assert_eq!(
            worker
                .ask(frame, "cube")
                .wait(&stop, Duration::from_millis(20))
                .map(|_| ()),
            Err(SlotWaitError::TimedOut(Duration::from_millis(20)))
        );

        // The second capture panics, the third is served while the oracle is still busy
        assert_eq!(
            worker
                .capture()
                .wait(&stop, Duration::from_millis(100))
                .map(|_| ()),
            Err(SlotWaitError::Abandoned)
        );
        let frame = worker
            .capture()
            .wait(&stop, Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert_eq!(frame.data, vec![3]);
    }
}
