//! # Local Actuator
//!
//! Steps the arm through a stored sequence directly, one waypoint at a time, through an
//! [`ArmDriver`]. This is used both by the pick-and-place executable when no actuator service is
//! running and by the actuator service itself.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use comms_if::eqpt::arm::PositionKey;
use log::{debug, trace};

use super::{Ack, Actuator, ActuatorError};
use crate::{
    seq_store::{SequenceTable, Waypoint},
    signal::{StopSignal, STOP_POLL_PERIOD},
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A driver capable of commanding every joint of the arm at once.
pub trait ArmDriver: Send {
    /// Command the joints to the given targets, returning once the demand has been accepted.
    fn goto_waypoint(&mut self, waypoint: &Waypoint) -> Result<(), DriverError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulated arm which accepts every demand and remembers the last one.
#[derive(Debug, Default)]
pub struct SimArmDriver {
    current: Option<Waypoint>,
}

/// Actuator stepping through the [`SequenceTable`] with an [`ArmDriver`].
pub struct LocalArm<D: ArmDriver> {
    table: Arc<SequenceTable>,

    driver: D,

    /// Time left for the arm to settle after each waypoint
    waypoint_pause: Duration,

    /// Bound on the duration of a whole move
    move_timeout: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("The demand has {found} joints but the arm has {expected}")]
    WrongJointCount { expected: usize, found: usize },

    #[error("Could not command the arm: {0}")]
    Io(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimArmDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last waypoint demanded, if any.
    pub fn current(&self) -> Option<&Waypoint> {
        self.current.as_ref()
    }
}

impl ArmDriver for SimArmDriver {
    fn goto_waypoint(&mut self, waypoint: &Waypoint) -> Result<(), DriverError> {
        trace!("SimArmDriver demand: {:?}", waypoint);
        self.current = Some(waypoint.clone());
        Ok(())
    }
}

impl<D: ArmDriver> LocalArm<D> {
    pub fn new(
        table: Arc<SequenceTable>,
        driver: D,
        waypoint_pause: Duration,
        move_timeout: Duration,
    ) -> Self {
        Self {
            table,
            driver,
            waypoint_pause,
            move_timeout,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn table(&self) -> &SequenceTable {
        &self.table
    }

    /// Execute the sequence stored under `key`, calling `progress(index, total)` after each
    /// waypoint is reached.
    pub fn move_to_with_progress<F>(
        &mut self,
        key: PositionKey,
        stop: &StopSignal,
        mut progress: F,
    ) -> Result<Ack, ActuatorError>
    where
        F: FnMut(usize, usize),
    {
        let start = Instant::now();
        let deadline = start + self.move_timeout;

        // Clone the handle so the sequence can be borrowed while the driver is borrowed mutably
        let table = self.table.clone();
        let sequence = table
            .get(key)
            .ok_or(ActuatorError::UnknownPositionKey(key))?;

        let total = sequence.len();
        debug!("Executing sequence {} ({} waypoints)", key, total);

        for (index, waypoint) in sequence.iter().enumerate() {
            if stop.is_triggered() {
                return Err(ActuatorError::Cancelled(key));
            }

            self.driver
                .goto_waypoint(waypoint)
                .map_err(|e| ActuatorError::TransportFailure(key, e.to_string()))?;

            self.settle(key, stop, deadline)?;

            progress(index, total);
        }

        Ok(Ack {
            key,
            elapsed: start.elapsed(),
        })
    }

    /// Wait for the arm to settle at the current waypoint.
    fn settle(
        &self,
        key: PositionKey,
        stop: &StopSignal,
        deadline: Instant,
    ) -> Result<(), ActuatorError> {
        let settled_at = Instant::now() + self.waypoint_pause;

        loop {
            let now = Instant::now();

            if now >= settled_at {
                return Ok(());
            }
            if now >= deadline {
                return Err(ActuatorError::Timeout(key, self.move_timeout));
            }
            if stop.is_triggered() {
                return Err(ActuatorError::Cancelled(key));
            }

            thread::sleep(STOP_POLL_PERIOD.min(settled_at.min(deadline) - now));
        }
    }
}

impl<D: ArmDriver> Actuator for LocalArm<D> {
    fn move_to(&mut self, key: PositionKey, stop: &StopSignal) -> Result<Ack, ActuatorError> {
        self.move_to_with_progress(key, stop, |_, _| ())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    struct FailingDriver;

    impl ArmDriver for FailingDriver {
        fn goto_waypoint(&mut self, _: &Waypoint) -> Result<(), DriverError> {
            Err(DriverError::Io("bus fault".into()))
        }
    }

    fn table() -> Arc<SequenceTable> {
        Arc::new(
            SequenceTable::from_records(
                vec![
                    (0, vec![vec![0.0, 0.0]]),
                    (2, vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]]),
                ],
                2,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_local_move() {
        let mut arm = LocalArm::new(
            table(),
            SimArmDriver::new(),
            Duration::from_millis(1),
            Duration::from_secs(5),
        );

        let mut steps = Vec::new();
        let ack = arm
            .move_to_with_progress(2, &StopSignal::new(), |i, n| steps.push((i, n)))
            .unwrap();

        assert_eq!(ack.key, 2);
        assert_eq!(steps, vec![(0, 3), (1, 3), (2, 3)]);
        assert_eq!(arm.driver().current(), Some(&vec![3.0, 3.0]));

        assert_eq!(
            arm.move_to(9, &StopSignal::new()),
            Err(ActuatorError::UnknownPositionKey(9))
        );
    }

    #[test]
    fn test_local_move_failures() {
        // Cancelled before the first waypoint
        let mut arm = LocalArm::new(
            table(),
            SimArmDriver::new(),
            Duration::from_millis(1),
            Duration::from_secs(5),
        );
        let stop = StopSignal::new();
        stop.trigger();
        assert_eq!(arm.move_to(2, &stop), Err(ActuatorError::Cancelled(2)));
        assert!(arm.driver().current().is_none());

        // Settling takes longer than the whole move is allowed
        let mut arm = LocalArm::new(
            table(),
            SimArmDriver::new(),
            Duration::from_secs(10),
            Duration::from_millis(50),
        );
        assert_eq!(
            arm.move_to(2, &StopSignal::new()),
            Err(ActuatorError::Timeout(2, Duration::from_millis(50)))
        );

        // Driver failure
        let mut arm = LocalArm::new(
            table(),
            FailingDriver,
            Duration::from_millis(1),
            Duration::from_secs(5),
        );
        assert!(matches!(
            arm.move_to(0, &StopSignal::new()),
            Err(ActuatorError::TransportFailure(0, _))
        ));
    }
}
