//! Message text extraction for injected payloads.
//!
//! Non-interactive producers post payloads of varying shape. Shapes are
//! tried in a fixed order and the first one that yields a string wins:
//!
//! 1. `{"message": "..."}`
//! 2. `{"content": [{"text": "..."}, ...]}` (first content block)
//! 3. `"..."` (plain top-level string)

use serde_json::Value;

use crate::error::{Error, Result};

/// Locate the message text in `payload` and trim it.
///
/// Fails with [`Error::NoExtractableMessage`] when no shape matches and with
/// [`Error::EmptyMessage`] when the matched text is blank.
pub fn extract_message(payload: &Value) -> Result<String> {
    let raw = direct_field(payload)
        .or_else(|| first_content_block(payload))
        .or_else(|| payload.as_str())
        .ok_or(Error::NoExtractableMessage)?;

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyMessage);
    }
    Ok(trimmed.to_string())
}

fn direct_field(payload: &Value) -> Option<&str> {
    payload.get("message")?.as_str()
}

fn first_content_block(payload: &Value) -> Option<&str> {
    payload
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}
