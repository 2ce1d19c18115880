//! # Arm Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;

use comms_if::eqpt::arm::PositionKey;
use pnp_lib::seq_store::ConfigError;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ArmExecParams {
    /// Path to the recorded sequences, relative to the software root if not absolute
    pub sequences_path: PathBuf,

    #[serde(default = "default_num_joints")]
    pub num_joints: usize,

    /// Sequence executed on startup
    #[serde(default)]
    pub home_key: PositionKey,

    /// Endpoint the command socket binds to
    pub command_endpoint: String,

    /// Endpoint the status socket binds to
    pub status_endpoint: String,

    #[serde(default = "default_waypoint_pause_s")]
    pub waypoint_pause_s: f64,

    #[serde(default = "default_move_timeout_s")]
    pub move_timeout_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmExecParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_joints == 0 {
            return Err(ConfigError::InvalidParameter(
                "num_joints",
                "the arm must have at least one joint".into(),
            ));
        }
        if !(self.waypoint_pause_s.is_finite() && self.waypoint_pause_s >= 0.0) {
            return Err(ConfigError::InvalidParameter(
                "waypoint_pause_s",
                format!("expected a non-negative number, found {}", self.waypoint_pause_s),
            ));
        }
        if !(self.move_timeout_s.is_finite() && self.move_timeout_s > 0.0) {
            return Err(ConfigError::InvalidParameter(
                "move_timeout_s",
                format!(
                    "expected a positive number of seconds, found {}",
                    self.move_timeout_s
                ),
            ));
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_num_joints() -> usize {
    6
}

fn default_waypoint_pause_s() -> f64 {
    0.5
}

fn default_move_timeout_s() -> f64 {
    60.0
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let params: ArmExecParams = toml::from_str(
            r#"
            sequences_path = "data/robot_sequences.json"
            command_endpoint = "tcp://*:5040"
            status_endpoint = "tcp://*:5041"
            "#,
        )
        .unwrap();

        assert_eq!(params.num_joints, 6);
        assert_eq!(params.home_key, 0);
        assert_eq!(params.waypoint_pause_s, 0.5);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_pause() {
        let params: ArmExecParams = toml::from_str(
            r#"
            sequences_path = "seq.json"
            command_endpoint = "tcp://*:5040"
            status_endpoint = "tcp://*:5041"
            waypoint_pause_s = -1.0
            "#,
        )
        .unwrap();

        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidParameter("waypoint_pause_s", _))
        ));
    }
}
