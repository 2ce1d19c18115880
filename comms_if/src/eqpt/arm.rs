//! # Arm Equipment Commands
//!
//! Messages exchanged between the arm client in the pick-and-place executable and the actuator
//! service (`arm_exec`) over the command/status bus.
//!
//! Commands are JSON objects tagged by a `command` field, for example
//! `{"command": "move_to_position", "position_key": 2, "request_id": 7}`. Status messages carry a
//! free-form `status` string which is normalised into a [`StatusKind`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Identifier of a recorded arm sequence.
pub type PositionKey = u32;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Status update published by the actuator service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArmStatus {
    /// What the service is reporting
    pub status: StatusKind,

    /// The sequence the status refers to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_key: Option<PositionKey>,

    /// Echo of the `request_id` of the command being executed, if the command carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,

    /// Index of the waypoint just reached (progress updates only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_index: Option<usize>,

    /// Number of waypoints in the sequence being executed (progress updates only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_positions: Option<usize>,

    /// Human readable description of an error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Machine readable classification of an error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ArmErrorCode>,

    /// Unix time in seconds at which the status was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Commands accepted by the actuator service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ArmCommand {
    /// Execute the sequence stored under `position_key`.
    MoveToPosition {
        position_key: PositionKey,

        /// Monotonically increasing identifier chosen by the client, echoed in status messages
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// Ask the service to report that it is alive.
    StatusCheck,

    /// The client is about to disconnect.
    ClientDisconnecting,
}

/// Normalised value of the `status` field of an [`ArmStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    Received,
    Started,
    InProgress,
    Completed,
    Error,
    Initialized,
    Shutdown,

    /// Any status string not recognised above, kept verbatim
    Other(String),
}

/// Classification of errors reported by the actuator service.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArmErrorCode {
    /// No sequence is stored under the requested key
    UnknownPositionKey,

    /// The sequence could not be executed
    ExecutionFailed,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmStatus {
    /// Create a new status message with only the status and position key set.
    pub fn new(status: StatusKind, position_key: Option<PositionKey>) -> Self {
        Self {
            status,
            position_key,
            request_id: None,
            position_index: None,
            total_positions: None,
            error_message: None,
            error_code: None,
            timestamp: Some(chrono::Utc::now().timestamp_millis() as f64 * 1e-3),
        }
    }
}

impl StatusKind {
    /// Parse a status string.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace. Any status containing
    /// `done` is treated as [`StatusKind::Completed`].
    pub fn parse(status: &str) -> Self {
        let normalised = status.trim().to_lowercase();

        match normalised.as_str() {
            "received" => StatusKind::Received,
            "started" => StatusKind::Started,
            "in_progress" => StatusKind::InProgress,
            "completed" => StatusKind::Completed,
            "error" => StatusKind::Error,
            "initialized" => StatusKind::Initialized,
            "shutdown" => StatusKind::Shutdown,
            s if s.contains("done") => StatusKind::Completed,
            _ => StatusKind::Other(status.to_string()),
        }
    }

    /// The canonical string for this status.
    pub fn as_str(&self) -> &str {
        match self {
            StatusKind::Received => "received",
            StatusKind::Started => "started",
            StatusKind::InProgress => "in_progress",
            StatusKind::Completed => "completed",
            StatusKind::Error => "error",
            StatusKind::Initialized => "initialized",
            StatusKind::Shutdown => "shutdown",
            StatusKind::Other(s) => s.as_str(),
        }
    }

    /// Returns true if this status ends the execution of a command.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusKind::Completed | StatusKind::Error)
    }
}

impl Serialize for StatusKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StatusKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(StatusKind::parse(&s))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let cmd = ArmCommand::MoveToPosition {
            position_key: 2,
            request_id: None,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"command": "move_to_position", "position_key": 2})
        );

        let cmd: ArmCommand = serde_json::from_str(
            r#"{"command": "move_to_position", "position_key": 5, "request_id": 3}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ArmCommand::MoveToPosition {
                position_key: 5,
                request_id: Some(3)
            }
        );

        let cmd: ArmCommand = serde_json::from_str(r#"{"command": "status_check"}"#).unwrap();
        assert_eq!(cmd, ArmCommand::StatusCheck);
    }

    #[test]
    fn test_status_normalisation() {
        assert_eq!(StatusKind::parse("completed"), StatusKind::Completed);
        assert_eq!(StatusKind::parse("  COMPLETED "), StatusKind::Completed);
        assert_eq!(StatusKind::parse("Done"), StatusKind::Completed);
        assert_eq!(StatusKind::parse("move_done"), StatusKind::Completed);
        assert_eq!(StatusKind::parse("in_progress"), StatusKind::InProgress);
        assert_eq!(StatusKind::parse("error"), StatusKind::Error);
        assert_eq!(
            StatusKind::parse("success"),
            StatusKind::Other("success".into())
        );

        assert!(StatusKind::Completed.is_terminal());
        assert!(StatusKind::Error.is_terminal());
        assert!(!StatusKind::Started.is_terminal());
    }

    #[test]
    fn test_status_from_service() {
        // Services which do not echo the request id
        let status: ArmStatus = serde_json::from_str(
            r#"{"status": "in_progress", "position_key": 4, "position_index": 1,
                "total_positions": 3, "timestamp": 1700000000.5}"#,
        )
        .unwrap();
        assert_eq!(status.status, StatusKind::InProgress);
        assert_eq!(status.position_key, Some(4));
        assert_eq!(status.request_id, None);
        assert_eq!(status.total_positions, Some(3));

        // Errors may omit the position key entirely
        let status: ArmStatus =
            serde_json::from_str(r#"{"status": "error", "error_message": "No sequence"}"#)
                .unwrap();
        assert_eq!(status.status, StatusKind::Error);
        assert_eq!(status.position_key, None);
    }
}
