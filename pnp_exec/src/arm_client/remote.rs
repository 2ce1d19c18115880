//! # Remote Actuator
//!
//! Drives the arm through the actuator service's command/status bus. Commands are published on
//! the service's command socket, and a listener thread watches the status socket for the
//! completion of the one outstanding move.
//!
//! The listener does nothing but match status messages against the outstanding request and fill
//! its completion slot. Each move gets a fresh request id, so a late status from a move which
//! already timed out can never complete a newer one.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use comms_if::{
    eqpt::arm::{ArmCommand, ArmErrorCode, ArmStatus, PositionKey, StatusKind},
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
};
use log::{debug, trace, warn};

use super::{Ack, Actuator, ActuatorError};
use crate::{
    params::RemoteArmParams,
    signal::{slot, SlotSender, SlotWaitError, StopSignal},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout of the status socket, bounds how quickly the listener notices a shutdown.
const STATUS_RECV_TIMEOUT_MS: i32 = 50;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Actuator client talking to the actuator service.
pub struct RemoteArm {
    cmd_socket: MonitoredSocket,

    register_tx: Sender<Outstanding>,

    shutdown: Arc<AtomicBool>,

    listener: Option<JoinHandle<()>>,

    move_timeout: Duration,

    last_request_id: u64,
}

/// The move currently awaiting completion.
struct Outstanding {
    key: PositionKey,
    request_id: u64,
    slot: SlotSender<Result<(), ActuatorError>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RemoteArmError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RemoteArm {
    /// Connect to the actuator service.
    ///
    /// Blocks for `connect_settle_ms` so the subscriptions are in place before the first command,
    /// since PUB/SUB drops anything sent before then.
    pub fn new(ctx: &zmq::Context, params: &RemoteArmParams) -> Result<Self, RemoteArmError> {
        let cmd_options = SocketOptions {
            block_on_first_connect: false,
            linger: 100,
            send_timeout: 100,
            ..Default::default()
        };
        let status_options = SocketOptions {
            block_on_first_connect: false,
            linger: 0,
            recv_timeout: STATUS_RECV_TIMEOUT_MS,
            subscribe: Vec::new(),
            ..Default::default()
        };

        let cmd_socket =
            MonitoredSocket::new(ctx, zmq::PUB, cmd_options, &params.command_endpoint)
                .map_err(RemoteArmError::SocketError)?;
        let status_socket =
            MonitoredSocket::new(ctx, zmq::SUB, status_options, &params.status_endpoint)
                .map_err(RemoteArmError::SocketError)?;

        let (register_tx, register_rx) = channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        let shutdown_clone = shutdown.clone();
        let listener =
            thread::spawn(move || status_listener(status_socket, register_rx, shutdown_clone));

        thread::sleep(Duration::from_millis(params.connect_settle_ms));

        let arm = Self {
            cmd_socket,
            register_tx,
            shutdown,
            listener: Some(listener),
            move_timeout: util::time::seconds_to_duration(params.move_timeout_s),
            last_request_id: 0,
        };

        if !arm.cmd_socket.connected() {
            warn!(
                "The actuator service is not yet reachable at {}, commands may be lost",
                params.command_endpoint
            );
        }

        // The service answers with its current status, which the listener logs
        if let Err(e) = arm.cmd_socket.send_json(&ArmCommand::StatusCheck) {
            warn!("Could not send a status check to the actuator service: {}", e);
        }

        Ok(arm)
    }

    fn next_request_id(&mut self) -> u64 {
        self.last_request_id += 1;
        self.last_request_id
    }
}

impl Actuator for RemoteArm {
    fn move_to(&mut self, key: PositionKey, stop: &StopSignal) -> Result<Ack, ActuatorError> {
        let start = Instant::now();
        let request_id = self.next_request_id();

        // Register before sending so the completion cannot arrive before the listener knows
        // what to look for
        let (tx, rx) = slot();
        self.register_tx
            .send(Outstanding {
                key,
                request_id,
                slot: tx,
            })
            .map_err(|_| {
                ActuatorError::TransportFailure(key, "the status listener has stopped".into())
            })?;

        self.cmd_socket
            .send_json(&ArmCommand::MoveToPosition {
                position_key: key,
                request_id: Some(request_id),
            })
            .map_err(|e| ActuatorError::TransportFailure(key, e.to_string()))?;

        debug!("Sent move to position {} (request {})", key, request_id);

        match rx.wait(stop, self.move_timeout) {
            Ok(Ok(())) => Ok(Ack {
                key,
                elapsed: start.elapsed(),
            }),
            Ok(Err(e)) => Err(e),
            Err(SlotWaitError::Stopped) => Err(ActuatorError::Cancelled(key)),
            Err(SlotWaitError::TimedOut(_)) => Err(ActuatorError::Timeout(key, self.move_timeout)),
            Err(SlotWaitError::Abandoned) => Err(ActuatorError::TransportFailure(
                key,
                "the status listener dropped the request".into(),
            )),
        }
    }
}

impl Drop for RemoteArm {
    fn drop(&mut self) {
        if let Err(e) = self.cmd_socket.send_json(&ArmCommand::ClientDisconnecting) {
            debug!("Could not notify the actuator service of disconnection: {}", e);
        }

        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(jh) = self.listener.take() {
            if jh.join().is_err() {
                warn!("The arm status listener panicked");
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn status_listener(
    socket: MonitoredSocket,
    register_rx: Receiver<Outstanding>,
    shutdown: Arc<AtomicBool>,
) {
    let mut outstanding: Option<Outstanding> = None;

    while !shutdown.load(Ordering::Relaxed) {
        let status = socket.recv_json::<ArmStatus>();

        // Pick up the newest registration before matching. A newer registration always replaces
        // an older one, whose receiver has been dropped by then.
        loop {
            match register_rx.try_recv() {
                Ok(o) => outstanding = Some(o),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        let status = match status {
            Ok(Some(s)) => s,
            Ok(None) => continue,
            Err(e) => {
                warn!("Invalid message on the arm status bus: {}", e);
                continue;
            }
        };

        trace!("Arm status: {:?}", status);

        let resolution = match outstanding.as_ref() {
            Some(o) => resolve(o.key, o.request_id, &status),
            None => None,
        };

        match (resolution, outstanding.take()) {
            (Some(result), Some(o)) => {
                if !o.slot.fill(result) {
                    debug!("Move {} resolved after its wait was abandoned", o.request_id);
                }
            }
            (None, o) => {
                outstanding = o;
                match status.status {
                    StatusKind::Initialized | StatusKind::Shutdown | StatusKind::Other(_) => {
                        debug!("Actuator service reports \"{}\"", status.status.as_str())
                    }
                    _ => (),
                }
            }
            (Some(_), None) => (),
        }
    }
}

/// Does this status message refer to the given request?
fn matches(key: PositionKey, request_id: u64, status: &ArmStatus) -> bool {
    if let Some(id) = status.request_id {
        if id != request_id {
            return false;
        }
    }

    match status.position_key {
        Some(k) => k == key,
        // Errors the service cannot attribute to a key, for example a rejected command, concern
        // the only command in flight
        None => status.request_id.is_some() || status.status == StatusKind::Error,
    }
}

/// Work out whether the status message completes the given request, and how.
fn resolve(
    key: PositionKey,
    request_id: u64,
    status: &ArmStatus,
) -> Option<Result<(), ActuatorError>> {
    if !status.status.is_terminal() || !matches(key, request_id, status) {
        return None;
    }

    match status.status {
        StatusKind::Completed => Some(Ok(())),
        _ => {
            let message = status
                .error_message
                .clone()
                .unwrap_or_else(|| "the actuator service reported an error".into());

            Some(Err(match status.error_code {
                Some(ArmErrorCode::UnknownPositionKey) => ActuatorError::UnknownPositionKey(key),
                _ => ActuatorError::TransportFailure(key, message),
            }))
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn status(json: &str) -> ArmStatus {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_resolve_completion() {
        // Completion for the outstanding request
        assert_eq!(
            resolve(
                4,
                7,
                &status(r#"{"status": "completed", "position_key": 4, "request_id": 7}"#)
            ),
            Some(Ok(()))
        );

        // Services which don't echo the request id are matched on the key
        assert_eq!(
            resolve(4, 7, &status(r#"{"status": "Done", "position_key": 4}"#)),
            Some(Ok(()))
        );

        // Progress never resolves
        assert_eq!(
            resolve(
                4,
                7,
                &status(r#"{"status": "in_progress", "position_key": 4, "request_id": 7}"#)
            ),
            None
        );
        assert_eq!(
            resolve(4, 7, &status(r#"{"status": "started", "position_key": 4}"#)),
            None
        );
    }

    #[test]
    fn test_resolve_ignores_stale() {
        // Completion of an earlier request for the same key
        assert_eq!(
            resolve(
                4,
                7,
                &status(r#"{"status": "completed", "position_key": 4, "request_id": 6}"#)
            ),
            None
        );

        // Completion of another key
        assert_eq!(
            resolve(4, 7, &status(r#"{"status": "completed", "position_key": 2}"#)),
            None
        );

        // Unattributable completion
        assert_eq!(resolve(4, 7, &status(r#"{"status": "completed"}"#)), None);
    }

    #[test]
    fn test_resolve_errors() {
        assert_eq!(
            resolve(
                9,
                3,
                &status(
                    r#"{"status": "error", "position_key": 9, "request_id": 3,
                        "error_code": "unknown_position_key",
                        "error_message": "No sequence found for position key 9"}"#
                )
            ),
            Some(Err(ActuatorError::UnknownPositionKey(9)))
        );

        assert_eq!(
            resolve(
                2,
                3,
                &status(r#"{"status": "error", "error_message": "Servo bus fault"}"#)
            ),
            Some(Err(ActuatorError::TransportFailure(
                2,
                "Servo bus fault".into()
            )))
        );

        // Error for a different request
        assert_eq!(
            resolve(
                2,
                3,
                &status(r#"{"status": "error", "request_id": 2, "error_message": "late"}"#)
            ),
            None
        );
    }
}
