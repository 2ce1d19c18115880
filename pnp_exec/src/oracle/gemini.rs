//! # Gemini Oracle
//!
//! Asks a Gemini model about a frame with a single `generateContent` request carrying the prompt
//! and the frame as inline base64 data. No conversation state is kept between requests.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::cam::CamFrame;
use log::{debug, trace};
use reqwest::{blocking::Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{Answer, OracleError, VisionOracle};
use crate::params::OracleParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Placeholder in the prompt template replaced by the target object.
pub const OBJECT_PLACEHOLDER: &str = "{object}";

/// Header carrying the API key. Used instead of the `key` query parameter so the key never
/// appears in a logged URL.
const API_KEY_HEADER: &str = "x-goog-api-key";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct GeminiOracle {
    client: Client,

    url: String,

    api_key: Option<String>,

    prompt_template: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GeminiOracle {
    /// Create the oracle, reading the API key from the environment variable named in `params`.
    ///
    /// A missing key is not an error here, every request will instead fail as
    /// [`OracleError::Unauthenticated`].
    pub fn new(params: &OracleParams) -> Result<Self, OracleError> {
        let api_key = std::env::var(&params.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self::with_key(params, api_key)
    }

    /// Create the oracle with an explicit API key.
    pub fn with_key(params: &OracleParams, api_key: Option<String>) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(util::time::seconds_to_duration(params.timeout_s))
            .build()
            .map_err(|e| OracleError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: format!(
                "{}/models/{}:generateContent",
                params.endpoint.trim_end_matches('/'),
                params.model
            ),
            api_key,
            prompt_template: params.prompt_template.clone(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The question asked about `object`.
    pub fn prompt(&self, object: &str) -> String {
        self.prompt_template.replace(OBJECT_PLACEHOLDER, object)
    }
}

impl VisionOracle for GeminiOracle {
    fn ask(&mut self, frame: &CamFrame, object: &str) -> Result<Answer, OracleError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            OracleError::Unauthenticated("no API key is configured".into())
        })?;

        let prompt = self.prompt(object);
        let body = build_request(&prompt, frame);

        debug!("Asking {} about \"{}\"", self.url, object);

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .map_err(|e| OracleError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| OracleError::Network(e.to_string()))?;

        check_status(status, &text)?;

        trace!("Oracle response: {}", text);

        extract_text(&text).map(Answer::from_text)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn build_request<'a>(prompt: &'a str, frame: &'a CamFrame) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: prompt },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: frame.format.mime_type(),
                        data: base64::encode(&frame.data),
                    },
                },
            ],
        }],
    }
}

fn check_status(status: StatusCode, body: &str) -> Result<(), OracleError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(OracleError::Unauthenticated(format!("HTTP {}", status)))
        }
        s => Err(OracleError::Network(format!(
            "HTTP {}: {}",
            s,
            body.chars().take(200).collect::<String>()
        ))),
    }
}

/// Pull the text of the first candidate out of a response body.
fn extract_text(body: &str) -> Result<String, OracleError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

    let text = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(OracleError::MalformedResponse(
            "the response contains no text".into(),
        ));
    }

    Ok(text)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use comms_if::eqpt::cam::ImageFormat;

    #[test]
    fn test_request_body() {
        let frame = CamFrame {
            timestamp: Utc::now(),
            format: ImageFormat::Jpeg(90),
            data: vec![1, 2, 3],
        };

        let body = serde_json::to_value(build_request("Is there a cube?", &frame)).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "contents": [{
                    "parts": [
                        {"text": "Is there a cube?"},
                        {"inline_data": {"mime_type": "image/jpeg", "data": "AQID"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_extract_text() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Yes, "}, {"text": "on the left."}], "role": "model"},
                "finishReason": "STOP"
            }]
        }"#;
        assert_eq!(extract_text(body).unwrap(), "Yes, on the left.");

        assert!(matches!(
            extract_text(r#"{"candidates": []}"#),
            Err(OracleError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_text(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#),
            Err(OracleError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_text("<html>"),
            Err(OracleError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(StatusCode::OK, "").is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED, ""),
            Err(OracleError::Unauthenticated(_))
        ));
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN, ""),
            Err(OracleError::Unauthenticated(_))
        ));
        assert!(matches!(
            check_status(StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
            Err(OracleError::Network(_))
        ));
    }

    #[test]
    fn test_missing_key() {
        let params = OracleParams {
            prompt_template: "Can you see a {object}?".into(),
            ..Default::default()
        };
        let mut oracle = GeminiOracle::with_key(&params, None).unwrap();

        assert!(!oracle.has_api_key());
        assert_eq!(oracle.prompt("blue ball"), "Can you see a blue ball?");

        let frame = CamFrame {
            timestamp: Utc::now(),
            format: ImageFormat::Png,
            data: Vec::new(),
        };
        assert!(matches!(
            oracle.ask(&frame, "blue ball"),
            Err(OracleError::Unauthenticated(_))
        ));
    }
}
