//! Layer name and record key validation.
//!
//! Valid layer names:
//! - Must be non-empty and at most 128 bytes
//! - Must not contain whitespace, control characters, `/`, `#`, `?`, or `%`
//! - Must not start with `.`
//!
//! Record keys are looser: they address a single resource segment but may
//! contain `/` (keys are matched verbatim, never traversed).

use crate::error::{Result, TypeError};

/// Characters that are forbidden anywhere in a layer name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '/', '#', '?', '%'];

const MAX_LAYER_NAME_BYTES: usize = 128;
const MAX_RECORD_KEY_BYTES: usize = 512;

/// Validate a layer name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use carto_types::names::validate_layer_name;
///
/// assert!(validate_layer_name("cities").is_ok());
/// assert!(validate_layer_name("restaurants-fr").is_ok());
/// assert!(validate_layer_name("").is_err());
/// assert!(validate_layer_name("a/b").is_err());
/// ```
pub fn validate_layer_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TypeError::InvalidLayerName {
            name: name.to_string(),
            reason: "layer name must not be empty".into(),
        });
    }

    if name.len() > MAX_LAYER_NAME_BYTES {
        return Err(TypeError::InvalidLayerName {
            name: name.to_string(),
            reason: format!("layer name exceeds {MAX_LAYER_NAME_BYTES} bytes"),
        });
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(TypeError::InvalidLayerName {
                name: name.to_string(),
                reason: format!("contains forbidden character: {ch:?}"),
            });
        }
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(TypeError::InvalidLayerName {
            name: name.to_string(),
            reason: "must not contain control characters".into(),
        });
    }

    if name.starts_with('.') {
        return Err(TypeError::InvalidLayerName {
            name: name.to_string(),
            reason: "must not start with '.'".into(),
        });
    }

    Ok(())
}

/// Validate a record key, returning `Ok(())` if valid.
pub fn validate_record_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(TypeError::InvalidRecordKey {
            key: key.to_string(),
            reason: "record key must not be empty".into(),
        });
    }

    if key.len() > MAX_RECORD_KEY_BYTES {
        return Err(TypeError::InvalidRecordKey {
            key: key.to_string(),
            reason: format!("record key exceeds {MAX_RECORD_KEY_BYTES} bytes"),
        });
    }

    if key.chars().any(|c| c.is_control()) {
        return Err(TypeError::InvalidRecordKey {
            key: key.to_string(),
            reason: "must not contain control characters".into(),
        });
    }

    Ok(())
}
