//! # Actuator Clients
//!
//! An actuator client moves the arm to the final waypoint of a stored sequence and blocks until
//! the arm has settled there. The controller is generic over [`Actuator`] so local and remote
//! actuation look identical to it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Direct control of the arm through an [`local::ArmDriver`]
pub mod local;

/// Control of the arm through the command/status bus of the actuator service
#[cfg(feature = "remote")]
pub mod remote;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use comms_if::eqpt::arm::PositionKey;

use crate::signal::StopSignal;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can move the arm to a stored position.
pub trait Actuator {
    /// Move to the sequence stored under `key`, returning once the arm has settled at its final
    /// waypoint.
    ///
    /// Implementations must check `stop` whenever they wait and return
    /// [`ActuatorError::Cancelled`] once it is raised.
    fn move_to(&mut self, key: PositionKey, stop: &StopSignal) -> Result<Ack, ActuatorError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Acknowledgement that a move completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ack {
    /// The position the arm reached
    pub key: PositionKey,

    /// Time taken between issuing the move and it completing
    pub elapsed: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActuatorError {
    #[error("No sequence is stored under position key {0}")]
    UnknownPositionKey(PositionKey),

    #[error("The move to position {0} did not complete within {1:?}")]
    Timeout(PositionKey, Duration),

    #[error("Transport failure while moving to position {0}: {1}")]
    TransportFailure(PositionKey, String),

    #[error("The move to position {0} was cancelled")]
    Cancelled(PositionKey),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn move_to(&mut self, key: PositionKey, stop: &StopSignal) -> Result<Ack, ActuatorError> {
        (**self).move_to(key, stop)
    }
}
