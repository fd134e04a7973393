//! Caption event record published to subscribers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One caption line with its presentation metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleEvent {
    pub text: String,
    /// Category / emotion tag
    pub emotion: String,
    pub language: String,
    pub timestamp: String,
    pub speaker: i64,
    pub is_final: bool,
    /// Display glyph
    pub emoji: String,
    pub lang_code: String,
}

impl SubtitleEvent {
    /// Parse a request body; the body must be a JSON object
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| Error::MalformedEvent(e.to_string()))?;

        // A sequence would otherwise fill the fields positionally
        if !value.is_object() {
            return Err(Error::MalformedEvent(
                "event body must be a JSON object".to_string(),
            ));
        }

        serde_json::from_value(value).map_err(|e| Error::MalformedEvent(e.to_string()))
    }

    /// Serialized form broadcast to subscribers
    pub fn to_message(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
