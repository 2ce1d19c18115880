//! # Arm Server Module
//!
//! This module abstracts over the networking side of the arm executable. Commands are recieved on
//! a bound SUB socket and status updates are published on a bound PUB socket, so any number of
//! clients may connect to either.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::arm::{ArmCommand, ArmStatus},
    net::{zmq, MessageError, MonitoredSocket, MonitoredSocketError, SocketOptions},
};
use log::{trace, warn};

use crate::params::ArmExecParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the networking part of the arm executable.
pub struct ArmServer {
    /// SUB socket on which commands arrive
    cmd_socket: MonitoredSocket,

    /// PUB socket on which status updates are sent
    status_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`ArmServer`]
#[derive(thiserror::Error, Debug)]
pub enum ArmServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not publish the status: {0}")]
    PublishError(MessageError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmServer {
    /// Create a new instance of the arm server.
    ///
    /// This function will not wait for a connection from a client before returning.
    pub fn new(params: &ArmExecParams) -> Result<Self, ArmServerError> {
        let ctx = zmq::Context::new();

        let cmd_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: 100,
            subscribe: Vec::new(),
            ..Default::default()
        };
        let status_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            send_timeout: 10,
            linger: 200,
            ..Default::default()
        };

        let cmd_socket = MonitoredSocket::new(
            &ctx,
            zmq::SUB,
            cmd_socket_options,
            &params.command_endpoint,
        )?;
        let status_socket = MonitoredSocket::new(
            &ctx,
            zmq::PUB,
            status_socket_options,
            &params.status_endpoint,
        )?;

        Ok(Self {
            cmd_socket,
            status_socket,
        })
    }

    /// Retrieve a command from a client.
    ///
    /// `None` is returned if no valid command arrived within the socket's recieve timeout.
    pub fn get_command(&self) -> Option<ArmCommand> {
        match self.cmd_socket.recv_json() {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read a command: {}", e);
                None
            }
        }
    }

    /// Publish a status update to all clients.
    pub fn publish(&self, status: &ArmStatus) -> Result<(), ArmServerError> {
        trace!("Publishing {:?}", status);

        self.status_socket
            .send_json(status)
            .map_err(ArmServerError::PublishError)
    }
}

impl From<MonitoredSocketError> for ArmServerError {
    fn from(e: MonitoredSocketError) -> Self {
        ArmServerError::SocketError(e)
    }
}
