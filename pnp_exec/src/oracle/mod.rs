//! # Vision Oracle
//!
//! The oracle is asked whether an object is visible in a frame. Its free-text reply is reduced to
//! a strict yes/no, and every way the request can fail is reported through [`OracleError`] so the
//! controller can treat it as "not found".

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Oracle backed by the Gemini `generateContent` API
pub mod gemini;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::cam::CamFrame;
use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Lowercase prefixes which make an answer affirmative.
pub const AFFIRMATIVE_TOKENS: [&str; 5] = ["yes", "found", "visible", "i can see", "there is"];

/// Words which, directly after an affirmative token, turn it into a denial ("there is no ...").
const NEGATIONS: [&str; 2] = ["no", "not"];

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// An inference service which can answer presence questions about a frame.
pub trait VisionOracle: Send {
    /// Ask whether `object` is visible in `frame`. A single attempt is made.
    fn ask(&mut self, frame: &CamFrame, object: &str) -> Result<Answer, OracleError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The oracle's normalised reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub found: bool,

    /// Reply as given by the oracle, kept for the log and the report
    pub raw_text: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("The oracle rejected the credentials: {0}")]
    Unauthenticated(String),

    #[error("Could not reach the oracle: {0}")]
    Network(String),

    #[error("The oracle's response could not be understood: {0}")]
    MalformedResponse(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Answer {
    /// Normalise a free-text reply.
    pub fn from_text<S: Into<String>>(text: S) -> Self {
        let raw_text = text.into();

        Self {
            found: is_affirmative(&raw_text),
            raw_text,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Returns true if the reply starts with one of the [`AFFIRMATIVE_TOKENS`].
///
/// Leading whitespace and case are ignored. The token must end on a word boundary, so
/// `"yesterday"` is not affirmative, and must not be directly followed by a negation, so
/// `"there is no cube"` is not affirmative either.
pub fn is_affirmative(text: &str) -> bool {
    let normalised = text.trim_start().to_lowercase();

    for token in AFFIRMATIVE_TOKENS.iter() {
        let rest = match normalised.strip_prefix(token) {
            Some(r) => r,
            None => continue,
        };

        if rest.chars().next().map_or(false, char::is_alphanumeric) {
            continue;
        }

        let next_word = rest
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("");

        return !NEGATIONS.contains(&next_word);
    }

    false
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
