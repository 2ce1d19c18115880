//! # Arm Service
//!
//! Executes the commands recieved by the arm server on a [`LocalArm`], reporting every stage of
//! the execution through a publish callback:
//!
//! | Command            | Statuses                                                     |
//! |--------------------|--------------------------------------------------------------|
//! | `move_to_position` | `received`, `started`, `in_progress` per waypoint, then `completed` or `error` |
//! | `status_check`     | `idle`, carrying the last position reached                   |
//! | `client_disconnecting` | none                                                     |
//!
//! Every status about a move echoes the command's `request_id`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::arm::{ArmCommand, ArmErrorCode, ArmStatus, PositionKey, StatusKind};
use log::{info, warn};
use pnp_lib::{
    arm_client::{
        local::{ArmDriver, LocalArm},
        ActuatorError,
    },
    signal::StopSignal,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Status reported in answer to a status check.
pub const IDLE_STATUS: &str = "idle";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ArmService<D: ArmDriver> {
    arm: LocalArm<D>,

    /// Last sequence executed to completion
    position: Option<PositionKey>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<D: ArmDriver> ArmService<D> {
    pub fn new(arm: LocalArm<D>) -> Self {
        Self {
            arm,
            position: None,
        }
    }

    pub fn position(&self) -> Option<PositionKey> {
        self.position
    }

    pub fn arm(&self) -> &LocalArm<D> {
        &self.arm
    }

    /// Move to the home sequence and announce that the service is ready.
    pub fn initialise<F>(
        &mut self,
        home_key: PositionKey,
        stop: &StopSignal,
        mut publish: F,
    ) -> Result<(), ActuatorError>
    where
        F: FnMut(ArmStatus),
    {
        info!("Moving to home position ({})", home_key);

        self.arm.move_to_with_progress(home_key, stop, |_, _| ())?;
        self.position = Some(home_key);

        publish(ArmStatus::new(StatusKind::Initialized, Some(home_key)));

        Ok(())
    }

    /// Execute a single command.
    pub fn handle<F>(&mut self, command: ArmCommand, stop: &StopSignal, mut publish: F)
    where
        F: FnMut(ArmStatus),
    {
        match command {
            ArmCommand::MoveToPosition {
                position_key,
                request_id,
            } => {
                info!("Move to position {} requested", position_key);

                let with_id = |mut status: ArmStatus| {
                    status.request_id = request_id;
                    status
                };

                publish(with_id(ArmStatus::new(
                    StatusKind::Received,
                    Some(position_key),
                )));

                if self.arm.table().contains(position_key) {
                    publish(with_id(ArmStatus::new(
                        StatusKind::Started,
                        Some(position_key),
                    )));
                }

                let result = self
                    .arm
                    .move_to_with_progress(position_key, stop, |index, total| {
                        let mut status = ArmStatus::new(StatusKind::InProgress, Some(position_key));
                        status.position_index = Some(index);
                        status.total_positions = Some(total);
                        publish(with_id(status));
                    });

                match result {
                    Ok(ack) => {
                        info!(
                            "Position {} reached in {:.2} s",
                            position_key,
                            ack.elapsed.as_secs_f64()
                        );
                        self.position = Some(position_key);
                        publish(with_id(ArmStatus::new(
                            StatusKind::Completed,
                            Some(position_key),
                        )));
                    }
                    Err(e) => {
                        warn!("Move to position {} failed: {}", position_key, e);
                        publish(with_id(error_status(position_key, &e)));
                    }
                }
            }
            ArmCommand::StatusCheck => {
                publish(ArmStatus::new(
                    StatusKind::Other(IDLE_STATUS.into()),
                    self.position,
                ));
            }
            ArmCommand::ClientDisconnecting => info!("Client disconnecting"),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn error_status(key: PositionKey, error: &ActuatorError) -> ArmStatus {
    let mut status = ArmStatus::new(StatusKind::Error, Some(key));

    match error {
        ActuatorError::UnknownPositionKey(_) => {
            status.error_code = Some(ArmErrorCode::UnknownPositionKey);
            status.error_message = Some(format!("No sequence found for position key {}", key));
        }
        e => {
            status.error_code = Some(ArmErrorCode::ExecutionFailed);
            status.error_message = Some(e.to_string());
        }
    }

    status
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use pnp_lib::{arm_client::local::SimArmDriver, seq_store::SequenceTable};
    use std::{sync::Arc, time::Duration};

    const SEQUENCES: &str = r#"[
        {"key": 0, "positions": [[0, 0]]},
        {"key": 2, "positions": [[1, 1], [2, 2], [3, 3]]}
    ]"#;

    fn service() -> ArmService<SimArmDriver> {
        let table = Arc::new(SequenceTable::from_json(SEQUENCES, 2).unwrap());
        ArmService::new(LocalArm::new(
            table,
            SimArmDriver::new(),
            Duration::ZERO,
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn test_initialise() {
        let mut service = service();
        let mut published = Vec::new();

        service
            .initialise(0, &StopSignal::never(), |s| published.push(s))
            .unwrap();

        assert_eq!(service.position(), Some(0));
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].status, StatusKind::Initialized);
        assert_eq!(published[0].position_key, Some(0));
    }

    #[test]
    fn test_move_statuses() {
        let mut service = service();
        let mut published = Vec::new();

        service.handle(
            ArmCommand::MoveToPosition {
                position_key: 2,
                request_id: Some(11),
            },
            &StopSignal::never(),
            |s| published.push(s),
        );

        let kinds: Vec<_> = published.iter().map(|s| s.status.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                StatusKind::Received,
                StatusKind::Started,
                StatusKind::InProgress,
                StatusKind::InProgress,
                StatusKind::InProgress,
                StatusKind::Completed,
            ]
        );
        assert!(published.iter().all(|s| s.request_id == Some(11)));
        assert!(published.iter().all(|s| s.position_key == Some(2)));
        assert_eq!(published[4].position_index, Some(2));
        assert_eq!(published[4].total_positions, Some(3));

        assert_eq!(service.position(), Some(2));
        assert_eq!(service.arm().driver().current(), Some(&vec![3.0, 3.0]));
    }

    #[test]
    fn test_unknown_key() {
        let mut service = service();
        let mut published = Vec::new();

        service.handle(
            ArmCommand::MoveToPosition {
                position_key: 9,
                request_id: None,
            },
            &StopSignal::never(),
            |s| published.push(s),
        );

        assert_eq!(published.len(), 2);
        assert_eq!(published[0].status, StatusKind::Received);
        assert_eq!(published[1].status, StatusKind::Error);
        assert_eq!(
            published[1].error_code,
            Some(ArmErrorCode::UnknownPositionKey)
        );
        assert_eq!(published[1].request_id, None);
        assert_eq!(service.position(), None);
    }

    #[test]
    fn test_cancelled_move() {
        let mut service = service();
        let mut published = Vec::new();

        let stop = StopSignal::new();
        stop.trigger();

        service.handle(
            ArmCommand::MoveToPosition {
                position_key: 2,
                request_id: Some(1),
            },
            &stop,
            |s| published.push(s),
        );

        let last = published.last().unwrap();
        assert_eq!(last.status, StatusKind::Error);
        assert_eq!(last.error_code, Some(ArmErrorCode::ExecutionFailed));
    }

    #[test]
    fn test_status_check() {
        let mut service = service();
        let mut published = Vec::new();

        service
            .initialise(0, &StopSignal::never(), |_| ())
            .unwrap();
        service.handle(ArmCommand::StatusCheck, &StopSignal::never(), |s| {
            published.push(s)
        });
        service.handle(ArmCommand::ClientDisconnecting, &StopSignal::never(), |s| {
            published.push(s)
        });

        assert_eq!(published.len(), 1);
        assert_eq!(published[0].status, StatusKind::Other("idle".into()));
        assert_eq!(published[0].position_key, Some(0));
    }
}
