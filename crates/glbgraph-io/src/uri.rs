//! URI helpers: `data:` URIs and percent-encoded relative paths.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use glbgraph_core::{GraphError, Result};

/// A decoded `data:[<mediatype>][;base64],<payload>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decodes a `data:` URI.
///
/// # Errors
///
/// Returns `GraphError::Format` if the URI has no payload separator or the
/// base64 payload is invalid.
pub fn decode_data_uri(uri: &str) -> Result<DataUri> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| GraphError::format("Not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| GraphError::format("Invalid data URI: no comma"))?;

    let (mime_type, base64) = match header.strip_suffix(";base64") {
        Some(mime_type) => (mime_type, true),
        None => (header, false),
    };
    let bytes = if base64 {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| GraphError::format(format!("Invalid base64 in data URI: {}", e)))?
    } else {
        percent_decode(payload)
    };
    Ok(DataUri {
        mime_type: (!mime_type.is_empty()).then(|| mime_type.to_string()),
        bytes,
    })
}

/// Decodes `%XX` escapes; malformed escapes are kept literally.
pub fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                output.push(value);
                i += 3;
                continue;
            }
        }
        output.push(bytes[i]);
        i += 1;
    }
    output
}
