//! # Search Controller
//!
//! The search controller visits a set of checkpoints for the target object. At each checkpoint it
//! captures a frame and asks the vision oracle whether the object is there. On the first positive
//! answer it executes the checkpoint's pick and returns the arm to the active position. If no
//! checkpoint yields the object the arm is sent home.
//!
//! ```text
//!            +------------------------------------------------------+
//!            v                                                      |
//!         Active --> MovingToCheckpoint --> AwaitingVisionResult ---+ not found / failure
//!            |          |      ^                    |
//!            |          +------+ retry              | found
//!            |                                      v
//!            |                                ExecutingPick --> ReturningHome --> Succeeded
//!            v
//!        Exhausted
//! ```
//!
//! Every failure at a checkpoint, whether of the move, the capture, or the oracle, is logged and
//! the search moves on to the next checkpoint. An operator stop is honoured at every wait except
//! during the pick and the return to the active position which follows it, and always ends with
//! the arm commanded home.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod checkpoints;
mod report;
mod state;
mod worker;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use comms_if::eqpt::arm::PositionKey;
use log::{debug, error, info, warn};

use crate::{
    arm_client::{Actuator, ActuatorError},
    params::PnpExecParams,
    seq_store::ConfigError,
    signal::{SlotWaitError, StopSignal},
};

pub use checkpoints::{Checkpoint, CheckpointSet};
pub use report::{AttemptResult, CheckpointAttempt, SearchOutcome, SearchReport};
pub use state::{Decision, Phase, SearchState, Stage};
pub use worker::VisionWorker;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Fixed configuration of the search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub home_key: PositionKey,

    pub active_key: PositionKey,

    pub checkpoints: CheckpointSet,

    /// Additional attempts made after a failed move to a checkpoint
    pub max_move_retries: u32,

    pub shuffle_checkpoints: bool,

    pub shuffle_seed: Option<u64>,

    pub capture_timeout: Duration,

    pub decision_timeout: Duration,

    pub move_to_active_on_start: bool,
}

pub struct SearchController<A: Actuator> {
    config: SearchConfig,

    actuator: A,

    worker: VisionWorker,

    state: SearchState,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SearchConfig {
    pub fn from_params(params: &PnpExecParams) -> Result<Self, ConfigError> {
        let search = &params.search;

        Ok(Self {
            home_key: params.home_key,
            active_key: params.active_key,
            checkpoints: CheckpointSet::new(
                search.checkpoints.clone(),
                params.home_key,
                params.active_key,
            )?,
            max_move_retries: search.max_move_retries,
            shuffle_checkpoints: search.shuffle_checkpoints,
            shuffle_seed: search.shuffle_seed,
            capture_timeout: util::time::seconds_to_duration(search.capture_timeout_s),
            decision_timeout: util::time::seconds_to_duration(search.decision_timeout_s),
            move_to_active_on_start: search.move_to_active_on_start,
        })
    }

    /// Every key the controller may command, with the role it plays.
    pub fn required_keys(&self) -> Vec<(&'static str, PositionKey)> {
        let mut keys = vec![("home", self.home_key), ("active", self.active_key)];
        keys.extend(self.checkpoints.required_keys());
        keys
    }
}

impl<A: Actuator> SearchController<A> {
    pub fn new(config: SearchConfig, actuator: A, worker: VisionWorker) -> Self {
        Self {
            config,
            actuator,
            worker,
            state: SearchState::new(""),
        }
    }

    /// State of the current or last run.
    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Search for `target_object`, returning once the search has ended and the arm has been
    /// commanded to its final position.
    pub fn run(&mut self, target_object: &str, stop: &StopSignal) -> SearchReport {
        self.state = SearchState::new(target_object);

        let order = self
            .config
            .checkpoints
            .visit_order(self.config.shuffle_checkpoints, self.config.shuffle_seed);
        let mut report = SearchReport::new(target_object, order.iter().map(|cp| cp.key).collect());

        info!(
            "Searching for \"{}\" at checkpoints {:?}",
            target_object, report.order
        );

        if self.config.move_to_active_on_start {
            match self.actuator.move_to(self.config.active_key, stop) {
                Ok(_) => report.final_position = Some(self.config.active_key),
                Err(ActuatorError::Cancelled(_)) => self.set_stage(Stage::Cancelled),
                Err(e) => warn!(
                    "Could not reach the active position, continuing the search: {}",
                    e
                ),
            }
        }

        while !self.state.stage.is_terminal() {
            if stop.is_triggered() && self.state.stage.is_interruptible() {
                info!("Search stopped by the operator");
                self.set_stage(Stage::Cancelled);
                break;
            }

            let next = match self.state.stage.clone() {
                Stage::Active => self.select_checkpoint(&order, &mut report),
                Stage::MovingToCheckpoint {
                    checkpoint,
                    attempt,
                } => self.move_to_checkpoint(checkpoint, attempt, stop, &mut report),
                Stage::AwaitingVisionResult { checkpoint } => {
                    self.evaluate_checkpoint(checkpoint, stop, &mut report)
                }
                Stage::ExecutingPick {
                    checkpoint,
                    decision,
                } => self.execute_pick(checkpoint, decision, &mut report),
                Stage::ReturningHome { checkpoint } => {
                    self.return_to_active(checkpoint, &mut report)
                }
                Stage::Exhausted | Stage::Succeeded { .. } | Stage::Cancelled => break,
            };

            self.set_stage(next);
        }

        self.finish(stop, &mut report);

        report
    }

    fn set_stage(&mut self, stage: Stage) {
        if stage != self.state.stage {
            debug!("Search stage: {:?} -> {:?}", self.state.stage, stage);
        }
        self.state.phase = stage.phase();
        self.state.stage = stage;
    }

    /// Select the first unvisited checkpoint in probing order.
    fn select_checkpoint(&mut self, order: &[Checkpoint], report: &mut SearchReport) -> Stage {
        let next = order
            .iter()
            .find(|cp| !self.state.visited.contains(&cp.key));

        match next {
            Some(cp) => {
                self.state.visited.insert(cp.key);
                self.state.active_checkpoint = Some(cp.key);

                report.attempts.push(CheckpointAttempt {
                    checkpoint: cp.key,
                    move_attempts: 0,
                    result: AttemptResult::Pending,
                });

                info!(
                    "Checkpoint {} ({} of {})",
                    cp.key,
                    self.state.visited.len(),
                    order.len()
                );

                Stage::MovingToCheckpoint {
                    checkpoint: cp.key,
                    attempt: 0,
                }
            }
            None => {
                self.state.active_checkpoint = None;
                info!("Every checkpoint has been visited");
                Stage::Exhausted
            }
        }
    }

    fn move_to_checkpoint(
        &mut self,
        checkpoint: PositionKey,
        attempt: u32,
        stop: &StopSignal,
        report: &mut SearchReport,
    ) -> Stage {
        if let Some(a) = report.attempt_mut(checkpoint) {
            a.move_attempts = attempt + 1;
        }

        match self.actuator.move_to(checkpoint, stop) {
            Ok(ack) => {
                debug!("Reached checkpoint {} in {:?}", checkpoint, ack.elapsed);
                report.final_position = Some(checkpoint);
                Stage::AwaitingVisionResult { checkpoint }
            }
            Err(ActuatorError::Cancelled(_)) => Stage::Cancelled,
            Err(e) if attempt < self.config.max_move_retries => {
                warn!(
                    "Move to checkpoint {} failed, retrying ({} of {}): {}",
                    checkpoint,
                    attempt + 1,
                    self.config.max_move_retries,
                    e
                );
                Stage::MovingToCheckpoint {
                    checkpoint,
                    attempt: attempt + 1,
                }
            }
            Err(e) => {
                warn!(
                    "Could not reach checkpoint {} after {} attempts, skipping it: {}",
                    checkpoint,
                    attempt + 1,
                    e
                );
                self.checkpoint_failed(
                    checkpoint,
                    report,
                    AttemptResult::Unreachable {
                        error: e.to_string(),
                    },
                )
            }
        }
    }

    /// Capture a frame at the checkpoint and ask the oracle about it.
    fn evaluate_checkpoint(
        &mut self,
        checkpoint: PositionKey,
        stop: &StopSignal,
        report: &mut SearchReport,
    ) -> Stage {
        self.state.phase = Phase::Capturing;

        let frame = match self.worker.capture().wait(stop, self.config.capture_timeout) {
            Ok(Ok(f)) => f,
            Ok(Err(e)) => {
                warn!("Capture failed at checkpoint {}: {}", checkpoint, e);
                return self.checkpoint_failed(
                    checkpoint,
                    report,
                    AttemptResult::CaptureFailed {
                        error: e.to_string(),
                    },
                );
            }
            Err(SlotWaitError::Stopped) => return Stage::Cancelled,
            Err(e) => {
                warn!("No frame from checkpoint {}: {}", checkpoint, e);
                return self.checkpoint_failed(
                    checkpoint,
                    report,
                    AttemptResult::CaptureFailed {
                        error: e.to_string(),
                    },
                );
            }
        };

        self.state.phase = Phase::AwaitingDecision;
        report.oracle_calls += 1;

        let answer = match self
            .worker
            .ask(frame, &self.state.target_object)
            .wait(stop, self.config.decision_timeout)
        {
            Ok(Ok(a)) => a,
            Ok(Err(e)) => {
                warn!(
                    "Oracle failed at checkpoint {}, treating as not found: {}",
                    checkpoint, e
                );
                return self.checkpoint_failed(
                    checkpoint,
                    report,
                    AttemptResult::OracleFailed {
                        error: e.to_string(),
                    },
                );
            }
            Err(SlotWaitError::Stopped) => return Stage::Cancelled,
            Err(e) => {
                warn!(
                    "No decision for checkpoint {}, treating as not found: {}",
                    checkpoint, e
                );
                return self.checkpoint_failed(
                    checkpoint,
                    report,
                    AttemptResult::OracleFailed {
                        error: e.to_string(),
                    },
                );
            }
        };

        let decision = Decision::new(answer, checkpoint);

        info!(
            "Checkpoint {}: {} (\"{}\")",
            checkpoint,
            if decision.found { "found" } else { "not found" },
            decision.raw_text.trim()
        );

        if decision.found {
            Stage::ExecutingPick {
                checkpoint,
                decision,
            }
        } else {
            self.checkpoint_failed(
                checkpoint,
                report,
                AttemptResult::NotFound {
                    raw_text: decision.raw_text,
                },
            )
        }
    }

    /// Move to the pick position. Never retried and never interrupted.
    fn execute_pick(
        &mut self,
        checkpoint: PositionKey,
        decision: Decision,
        report: &mut SearchReport,
    ) -> Stage {
        let pick = match self.config.checkpoints.pick_for(checkpoint) {
            Some(p) => p,
            None => {
                error!("Checkpoint {} has no pick position", checkpoint);
                return self.checkpoint_failed(
                    checkpoint,
                    report,
                    AttemptResult::NotFound {
                        raw_text: decision.raw_text,
                    },
                );
            }
        };

        info!("Picking \"{}\" from position {}", self.state.target_object, pick);

        let pick_error = match self.actuator.move_to(pick, &StopSignal::never()) {
            Ok(_) => {
                report.final_position = Some(pick);
                None
            }
            Err(e) => {
                error!("Pick move to position {} failed: {}", pick, e);
                Some(e.to_string())
            }
        };

        if let Some(a) = report.attempt_mut(checkpoint) {
            a.result = AttemptResult::Picked {
                raw_text: decision.raw_text,
                pick,
                pick_error,
            };
        }

        Stage::ReturningHome { checkpoint }
    }

    /// Return to the active position after a pick, whatever its outcome.
    fn return_to_active(&mut self, checkpoint: PositionKey, report: &mut SearchReport) -> Stage {
        let active = self.config.active_key;

        match self.actuator.move_to(active, &StopSignal::never()) {
            Ok(_) => report.final_position = Some(active),
            Err(e) => error!(
                "Could not return to the active position {} after the pick: {}",
                active, e
            ),
        }

        self.state.active_checkpoint = None;

        // The lookup succeeded in execute_pick
        let pick = self
            .config
            .checkpoints
            .pick_for(checkpoint)
            .unwrap_or(active);

        Stage::Succeeded { checkpoint, pick }
    }

    /// Record the failure and go back to select the next checkpoint.
    fn checkpoint_failed(
        &mut self,
        checkpoint: PositionKey,
        report: &mut SearchReport,
        result: AttemptResult,
    ) -> Stage {
        if let Some(a) = report.attempt_mut(checkpoint) {
            a.result = result;
        }
        self.state.active_checkpoint = None;

        Stage::Active
    }

    fn finish(&mut self, stop: &StopSignal, report: &mut SearchReport) {
        match self.state.stage {
            Stage::Succeeded { .. } => {
                report.outcome = SearchOutcome::Succeeded;
                if stop.is_triggered() {
                    info!("Honouring the stop requested during the pick");
                    self.go_home(report);
                }
            }
            Stage::Cancelled => {
                report.outcome = SearchOutcome::Cancelled;
                if let Some(cp) = self.state.active_checkpoint.take() {
                    if let Some(a) = report.attempt_mut(cp) {
                        if a.result == AttemptResult::Pending {
                            a.result = AttemptResult::Cancelled;
                        }
                    }
                }
                self.go_home(report);
            }
            _ => {
                report.outcome = SearchOutcome::Exhausted;
                self.go_home(report);
            }
        }

        info!(
            "Search for \"{}\" finished: {:?} after {} checkpoints and {} oracle calls",
            report.target_object,
            report.outcome,
            report.attempts.len(),
            report.oracle_calls
        );
    }

    /// Command the home position. Not cancellable, failures are only logged.
    fn go_home(&mut self, report: &mut SearchReport) {
        let home = self.config.home_key;

        info!("Returning to the home position {}", home);

        match self.actuator.move_to(home, &StopSignal::never()) {
            Ok(_) => report.final_position = Some(home),
            Err(e) => error!("Could not return to the home position {}: {}", home, e),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
