//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the pick-and-place software: the messages
//! exchanged with the arm and camera equipment, and the networking abstractions used to carry them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command and response definitions for equipment (the arm and the camera)
pub mod eqpt;

/// Network module
pub mod net;
