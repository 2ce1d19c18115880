//! # Pick-and-place Executable Parameters
//!
//! This module provides parameters for the pick-and-place executable, loaded from
//! `params/pnp_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;

use comms_if::eqpt::{arm::PositionKey, cam::ImageFormat};
use serde::{Deserialize, Serialize};

use crate::{search::Checkpoint, seq_store::ConfigError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnpExecParams {
    /// Path to the recorded sequences, relative to the software root if not absolute
    pub sequences_path: PathBuf,

    /// Number of joints of the arm, every waypoint must have this many entries
    #[serde(default = "default_num_joints")]
    pub num_joints: usize,

    /// Safe position the arm ends every run in
    #[serde(default)]
    pub home_key: PositionKey,

    /// Ready position the arm waits in between picks
    #[serde(default = "default_active_key")]
    pub active_key: PositionKey,

    /// Object to search for. If not given here or on the command line the operator is asked.
    #[serde(default)]
    pub target_object: Option<String>,

    pub search: SearchParams,

    pub actuator: ActuatorParams,

    pub frame_source: FrameSourceParams,

    #[serde(default)]
    pub oracle: OracleParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Checkpoints in the order they are visited
    pub checkpoints: Vec<Checkpoint>,

    /// Number of additional attempts made to reach a checkpoint after a failed move
    #[serde(default = "default_max_move_retries")]
    pub max_move_retries: u32,

    /// Shuffle the checkpoint order once at the start of the run
    #[serde(default)]
    pub shuffle_checkpoints: bool,

    /// Seed for a reproducible shuffle
    #[serde(default)]
    pub shuffle_seed: Option<u64>,

    /// Maximum time to wait for a frame
    #[serde(default = "default_capture_timeout_s")]
    pub capture_timeout_s: f64,

    /// Maximum time to wait for the oracle's decision
    #[serde(default = "default_decision_timeout_s")]
    pub decision_timeout_s: f64,

    /// Command the active position before the first checkpoint
    #[serde(default = "default_true")]
    pub move_to_active_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalArmParams {
    /// Settle time after each waypoint
    #[serde(default = "default_waypoint_pause_s")]
    pub waypoint_pause_s: f64,

    /// Bound on a single move
    #[serde(default = "default_move_timeout_s")]
    pub move_timeout_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteArmParams {
    /// Endpoint of the actuator service's command socket
    pub command_endpoint: String,

    /// Endpoint of the actuator service's status socket
    pub status_endpoint: String,

    /// Bound on a single move, including the service's acknowledgement
    #[serde(default = "default_move_timeout_s")]
    pub move_timeout_s: f64,

    /// Time given for the bus subscriptions to be established before the first command
    #[serde(default = "default_connect_settle_ms")]
    pub connect_settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleParams {
    /// Model name used in the request path
    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// Base URL of the generative language API
    #[serde(default = "default_oracle_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout of a single request
    #[serde(default = "default_oracle_timeout_s")]
    pub timeout_s: f64,

    /// Question asked of the model. `{object}` is replaced with the target object.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Selects how the arm is actuated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActuatorParams {
    Local(LocalArmParams),
    Remote(RemoteArmParams),
}

/// Selects where frames come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameSourceParams {
    /// Camera server reached over ZMQ
    Cam {
        endpoint: String,

        #[serde(default = "default_cam_timeout_ms")]
        timeout_ms: i32,

        #[serde(default = "default_image_format")]
        format: ImageFormat,
    },

    /// Still image loaded from disk on every capture
    File {
        path: PathBuf,

        #[serde(default = "default_image_format")]
        format: ImageFormat,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PnpExecParams {
    /// Check the values which cannot be checked by deserialisation alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_joints == 0 {
            return Err(ConfigError::InvalidParameter(
                "num_joints",
                "the arm must have at least one joint".into(),
            ));
        }

        let mut timeouts = vec![
            ("search.capture_timeout_s", self.search.capture_timeout_s),
            ("search.decision_timeout_s", self.search.decision_timeout_s),
            ("oracle.timeout_s", self.oracle.timeout_s),
        ];
        match &self.actuator {
            ActuatorParams::Local(l) => {
                timeouts.push(("actuator.move_timeout_s", l.move_timeout_s));
                if !(l.waypoint_pause_s.is_finite() && l.waypoint_pause_s >= 0.0) {
                    return Err(ConfigError::InvalidParameter(
                        "actuator.waypoint_pause_s",
                        format!("expected a non-negative number, found {}", l.waypoint_pause_s),
                    ));
                }
            }
            ActuatorParams::Remote(r) => timeouts.push(("actuator.move_timeout_s", r.move_timeout_s)),
        }

        for (name, value) in timeouts {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidParameter(
                    name,
                    format!("expected a positive number of seconds, found {}", value),
                ));
            }
        }

        // A client must give up before the controller does, otherwise an abandoned request keeps
        // its worker busy into the next checkpoint
        if self.search.decision_timeout_s <= self.oracle.timeout_s {
            return Err(ConfigError::InvalidParameter(
                "search.decision_timeout_s",
                format!(
                    "must be greater than oracle.timeout_s ({} s), found {} s",
                    self.oracle.timeout_s, self.search.decision_timeout_s
                ),
            ));
        }
        if let FrameSourceParams::Cam { timeout_ms, .. } = &self.frame_source {
            if *timeout_ms <= 0 {
                return Err(ConfigError::InvalidParameter(
                    "frame_source.timeout_ms",
                    format!("expected a positive number of milliseconds, found {}", timeout_ms),
                ));
            }
            if self.search.capture_timeout_s * 1000.0 <= f64::from(*timeout_ms) {
                return Err(ConfigError::InvalidParameter(
                    "search.capture_timeout_s",
                    format!(
                        "must be greater than frame_source.timeout_ms ({} ms), found {} s",
                        timeout_ms, self.search.capture_timeout_s
                    ),
                ));
            }
        }

        Ok(())
    }
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            model: default_oracle_model(),
            endpoint: default_oracle_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_s: default_oracle_timeout_s(),
            prompt_template: default_prompt_template(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// DEFAULTS
// ------------------------------------------------------------------------------------------------

fn default_num_joints() -> usize {
    6
}

fn default_active_key() -> PositionKey {
    1
}

fn default_max_move_retries() -> u32 {
    1
}

fn default_capture_timeout_s() -> f64 {
    5.0
}

fn default_decision_timeout_s() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

fn default_waypoint_pause_s() -> f64 {
    0.5
}

fn default_move_timeout_s() -> f64 {
    60.0
}

fn default_connect_settle_ms() -> u64 {
    500
}

fn default_cam_timeout_ms() -> i32 {
    2000
}

fn default_image_format() -> ImageFormat {
    ImageFormat::Jpeg(90)
}

fn default_oracle_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_oracle_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}

fn default_oracle_timeout_s() -> f64 {
    20.0
}

fn default_prompt_template() -> String {
    "Is there a {object} in this image? Answer yes or no first, then explain briefly.".into()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params: PnpExecParams = toml::from_str(
            r#"
            sequences_path = "data/robot_sequences.json"
            target_object = "red cube"

            [search]
            checkpoints = [
                { checkpoint = 2, pick = 3 },
                { checkpoint = 4, pick = 5 },
            ]
            shuffle_checkpoints = true
            shuffle_seed = 7

            [actuator]
            kind = "remote"
            command_endpoint = "tcp://localhost:5040"
            status_endpoint = "tcp://localhost:5041"

            [frame_source]
            kind = "file"
            path = "data/bench.png"
            format = "Png"
            "#,
        )
        .unwrap();

        assert_eq!(params.num_joints, 6);
        assert_eq!(params.home_key, 0);
        assert_eq!(params.active_key, 1);
        assert_eq!(params.target_object.as_deref(), Some("red cube"));

        assert_eq!(params.search.checkpoints.len(), 2);
        assert_eq!(params.search.checkpoints[1].pick, 5);
        assert_eq!(params.search.max_move_retries, 1);
        assert_eq!(params.search.shuffle_seed, Some(7));
        assert!(params.search.move_to_active_on_start);

        match &params.actuator {
            ActuatorParams::Remote(r) => {
                assert_eq!(r.status_endpoint, "tcp://localhost:5041");
                assert_eq!(r.connect_settle_ms, 500);
            }
            a => panic!("Unexpected actuator params {:?}", a),
        }

        match &params.frame_source {
            FrameSourceParams::File { format, .. } => assert_eq!(*format, ImageFormat::Png),
            f => panic!("Unexpected frame source params {:?}", f),
        }

        assert_eq!(params.oracle.api_key_env, "GEMINI_API_KEY");
        assert!(params.oracle.prompt_template.contains("{object}"));

        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_parse_local_and_cam() {
        let params: PnpExecParams = toml::from_str(
            r#"
            sequences_path = "seq.json"
            num_joints = 4

            [search]
            checkpoints = [{ checkpoint = 2, pick = 3 }]

            [actuator]
            kind = "local"
            waypoint_pause_s = 0.1

            [frame_source]
            kind = "cam"
            endpoint = "tcp://localhost:5050"
            format = { Jpeg = 80 }

            [oracle]
            model = "gemini-1.5-pro"
            "#,
        )
        .unwrap();

        assert!(matches!(params.actuator, ActuatorParams::Local(_)));
        match &params.frame_source {
            FrameSourceParams::Cam {
                format, timeout_ms, ..
            } => {
                assert_eq!(*format, ImageFormat::Jpeg(80));
                assert_eq!(*timeout_ms, 2000);
            }
            f => panic!("Unexpected frame source params {:?}", f),
        }
        assert_eq!(params.oracle.model, "gemini-1.5-pro");
        assert_eq!(params.oracle.api_key_env, "GEMINI_API_KEY");

        let mut bad = params.clone();
        bad.search.decision_timeout_s = -1.0;
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter("search.decision_timeout_s", _))
        ));

        let mut bad = params.clone();
        bad.num_joints = 0;
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter("num_joints", _))
        ));

        // Client timeouts must expire before the controller stops waiting
        params.validate().unwrap();

        let mut bad = params.clone();
        bad.search.decision_timeout_s = bad.oracle.timeout_s;
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter("search.decision_timeout_s", _))
        ));

        let mut bad = params.clone();
        bad.search.capture_timeout_s = 2.0;
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter("search.capture_timeout_s", _))
        ));

        let mut bad = params;
        if let FrameSourceParams::Cam { timeout_ms, .. } = &mut bad.frame_source {
            *timeout_ms = -1;
        }
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter("frame_source.timeout_ms", _))
        ));
    }
}
