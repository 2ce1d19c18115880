//! # Pick-and-place library.
//!
//! This library allows other crates in the workspace to access items defined inside the
//! pick-and-place crate, in particular the sequence store which is shared with the actuator
//! service.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actuator clients - move the arm to a stored position, either directly or over the bus
pub mod arm_client;

/// Frame sources - provide a single still image on demand
pub mod cam_client;

/// Vision oracle - asks a vision-language model whether the target object is visible
pub mod oracle;

/// Executable parameters
pub mod params;

/// Search controller - the checkpoint search/decide/act state machine
pub mod search;

/// Sequence store - the table of recorded arm sequences
pub mod seq_store;

/// Stop signal and single-slot completion channels
pub mod signal;
