//! Binary container parsing.
//!
//! Input is either a bare JSON document or a GLB envelope:
//!
//! ```text
//! magic u32 | version u32 | total_length u32
//! chunk_length u32 | chunk_type u32 | data[chunk_length]   (JSON, required)
//! chunk_length u32 | chunk_type u32 | data[chunk_length]   (BIN, optional)
//! ```
//!
//! All integers are little-endian. Producers pad chunk data to 4 bytes and the
//! parser trusts the declared chunk lengths as given.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{GraphError, Result};

pub const GLB_MAGIC: u32 = 0x46546C67; // "glTF" in little-endian
pub const GLB_VERSION: u32 = 2;
pub const GLB_CHUNK_JSON: u32 = 0x4E4F534A; // "JSON"
pub const GLB_CHUNK_BIN: u32 = 0x004E4942; // "BIN\0"

const HEADER_SIZE: usize = 12;
const CHUNK_HEADER_SIZE: usize = 8;

/// How the caller expects the input to be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceHint {
    /// Sniff the first four bytes for the envelope magic.
    #[default]
    Auto,
    /// The input is known to be a binary envelope.
    Binary,
}

impl SourceHint {
    /// Derives a hint from a file name; `.glb` forces envelope parsing.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let is_glb = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("glb"));
        if is_glb {
            SourceHint::Binary
        } else {
            SourceHint::Auto
        }
    }
}

/// One chunk record of a binary envelope.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub length: u32,
    pub chunk_type: u32,
    pub data: &'a [u8],
}

/// A validated binary envelope.
#[derive(Debug, Clone)]
pub struct Container<'a> {
    pub magic: u32,
    pub version: u32,
    pub total_length: u32,
    pub chunks: Vec<Chunk<'a>>,
}

impl<'a> Container<'a> {
    /// Parses and validates a binary envelope.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Format` if the header is short or wrong, the
    /// declared length exceeds the input, a chunk overruns the input, there
    /// are not one or two chunks, or the chunk types are not JSON then BIN.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(GraphError::format("File too small for GLB header"));
        }

        let magic = LittleEndian::read_u32(&data[0..4]);
        let version = LittleEndian::read_u32(&data[4..8]);
        let total_length = LittleEndian::read_u32(&data[8..12]);

        if magic != GLB_MAGIC {
            return Err(GraphError::format(format!(
                "Invalid magic number found in GLB header. Expected 0x{:08X}, found 0x{:08X}",
                GLB_MAGIC, magic
            )));
        }
        if version != GLB_VERSION {
            return Err(GraphError::format(format!(
                "Invalid version number found in GLB header. Expected {}, found {}",
                GLB_VERSION, version
            )));
        }
        let length = total_length as usize;
        if length < HEADER_SIZE || length > data.len() {
            return Err(GraphError::format(format!(
                "Invalid length found in GLB header. Found {}",
                total_length
            )));
        }

        let mut chunks = Vec::with_capacity(2);
        let mut offset = HEADER_SIZE;
        while offset < length {
            if offset + CHUNK_HEADER_SIZE > data.len() {
                return Err(GraphError::format("Truncated chunk header in GLB"));
            }
            let chunk_length = LittleEndian::read_u32(&data[offset..offset + 4]);
            let chunk_type = LittleEndian::read_u32(&data[offset + 4..offset + 8]);
            let start = offset + CHUNK_HEADER_SIZE;
            let end = start
                .checked_add(chunk_length as usize)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| {
                    GraphError::format(format!(
                        "Invalid chunk length found in GLB. Found {}",
                        chunk_length
                    ))
                })?;

            chunks.push(Chunk {
                length: chunk_length,
                chunk_type,
                data: &data[start..end],
            });
            offset = end;
        }

        if chunks.len() != 1 && chunks.len() != 2 {
            return Err(GraphError::format(format!(
                "Invalid number of chunks found in GLB: {}",
                chunks.len()
            )));
        }
        if chunks[0].chunk_type != GLB_CHUNK_JSON {
            return Err(GraphError::format(format!(
                "Invalid chunk type found in GLB. Expected 0x{:08X}, found 0x{:08X}",
                GLB_CHUNK_JSON, chunks[0].chunk_type
            )));
        }
        if let Some(bin) = chunks.get(1) {
            if bin.chunk_type != GLB_CHUNK_BIN {
                return Err(GraphError::format(format!(
                    "Invalid chunk type found in GLB. Expected 0x{:08X}, found 0x{:08X}",
                    GLB_CHUNK_BIN, bin.chunk_type
                )));
            }
        }

        Ok(Self {
            magic,
            version,
            total_length,
            chunks,
        })
    }

    pub fn json_chunk(&self) -> &'a [u8] {
        self.chunks[0].data
    }

    pub fn binary_chunk(&self) -> Option<&'a [u8]> {
        self.chunks.get(1).map(|chunk| chunk.data)
    }
}

/// Schema bytes and optional binary payload split out of an input.
#[derive(Debug, Clone, Copy)]
pub struct Parsed<'a> {
    pub schema: &'a [u8],
    pub binary: Option<&'a [u8]>,
}

/// Returns true if the input starts with the envelope magic.
pub fn has_glb_magic(data: &[u8]) -> bool {
    data.len() >= 4 && LittleEndian::read_u32(&data[0..4]) == GLB_MAGIC
}

/// Splits raw input into schema bytes and an optional binary payload.
///
/// # Errors
///
/// Returns `GraphError::Format` if the input is a malformed envelope, or if it
/// is not an envelope and does not look like a JSON document either.
pub fn parse(data: &[u8], hint: SourceHint) -> Result<Parsed<'_>> {
    if hint == SourceHint::Binary || has_glb_magic(data) {
        let container = Container::parse(data)?;
        debug!(
            chunks = container.chunks.len(),
            total_length = container.total_length,
            "parsed GLB envelope"
        );
        return Ok(Parsed {
            schema: container.json_chunk(),
            binary: container.binary_chunk(),
        });
    }

    if !looks_like_json(data) {
        return Err(GraphError::format(
            "Input is neither a GLB envelope nor a JSON document",
        ));
    }
    Ok(Parsed {
        schema: data,
        binary: None,
    })
}

fn looks_like_json(data: &[u8]) -> bool {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    data.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

/// Writes a binary envelope around `json` and an optional `binary` payload.
///
/// JSON is padded with spaces and the payload with zeros to 4-byte multiples.
pub fn assemble(json: &[u8], binary: Option<&[u8]>) -> Vec<u8> {
    let json_padded = json.len().next_multiple_of(4);
    let bin_padded = binary.map(|b| b.len().next_multiple_of(4));
    let total = HEADER_SIZE
        + CHUNK_HEADER_SIZE
        + json_padded
        + bin_padded.map_or(0, |len| CHUNK_HEADER_SIZE + len);

    let mut output = Vec::with_capacity(total);
    let mut word = [0u8; 4];
    for value in [GLB_MAGIC, GLB_VERSION, total as u32] {
        LittleEndian::write_u32(&mut word, value);
        output.extend_from_slice(&word);
    }

    // JSON chunk
    LittleEndian::write_u32(&mut word, json_padded as u32);
    output.extend_from_slice(&word);
    LittleEndian::write_u32(&mut word, GLB_CHUNK_JSON);
    output.extend_from_slice(&word);
    output.extend_from_slice(json);
    output.resize(output.len() + json_padded - json.len(), b' ');

    // Binary chunk
    if let (Some(bin), Some(padded)) = (binary, bin_padded) {
        LittleEndian::write_u32(&mut word, padded as u32);
        output.extend_from_slice(&word);
        LittleEndian::write_u32(&mut word, GLB_CHUNK_BIN);
        output.extend_from_slice(&word);
        output.extend_from_slice(bin);
        output.resize(output.len() + padded - bin.len(), 0);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: u32, version: u32, length: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&magic.to_le_bytes());
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out
    }

    fn chunk(out: &mut Vec<u8>, chunk_type: u32, data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&chunk_type.to_le_bytes());
        out.extend_from_slice(data);
    }

    #[test]
    fn test_glb_magic() {
        // "glTF" in ASCII = 0x67, 0x6C, 0x54, 0x46
        let magic = u32::from_le_bytes(*b"glTF");
        assert_eq!(magic, GLB_MAGIC);
    }

    #[test]
    fn test_parse_json_and_bin() {
        let glb = assemble(b"{\"a\":1}", Some(&[1, 2, 3]));
        let parsed = parse(&glb, SourceHint::Auto).unwrap();
        assert_eq!(parsed.schema, b"{\"a\":1} ");
        assert_eq!(parsed.binary.unwrap(), &[1, 2, 3, 0]);
    }

    #[test]
    fn test_parse_json_only_envelope() {
        let glb = assemble(b"{}  ", None);
        let container = Container::parse(&glb).unwrap();
        assert_eq!(container.chunks.len(), 1);
        assert!(container.binary_chunk().is_none());
        assert_eq!(container.total_length as usize, glb.len());
    }

    #[test]
    fn test_bare_json() {
        let json = b"  {\"asset\":{\"version\":\"2.0\"}}";
        let parsed = parse(json, SourceHint::Auto).unwrap();
        assert_eq!(parsed.schema, json);
        assert!(parsed.binary.is_none());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse(b"\x00\x01\x02\x03garbage", SourceHint::Auto)
            .unwrap_err()
            .is_format());
    }

    #[test]
    fn test_binary_hint_forces_envelope() {
        let err = parse(b"{\"asset\":{}}", SourceHint::Binary).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_bad_version() {
        let mut data = header(GLB_MAGIC, 1, 20);
        chunk(&mut data, GLB_CHUNK_JSON, b"{}  ");
        let err = Container::parse(&data).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_declared_length_exceeds_input() {
        let mut data = header(GLB_MAGIC, 2, 400);
        chunk(&mut data, GLB_CHUNK_JSON, b"{}  ");
        let err = Container::parse(&data).unwrap_err();
        assert!(err.to_string().contains("length"));
    }

    #[test]
    fn test_chunk_overrun() {
        let mut data = header(GLB_MAGIC, 2, 24);
        data.extend_from_slice(&64u32.to_le_bytes());
        data.extend_from_slice(&GLB_CHUNK_JSON.to_le_bytes());
        data.extend_from_slice(b"{}  ");
        assert!(Container::parse(&data).unwrap_err().is_format());
    }

    #[test]
    fn test_wrong_chunk_order() {
        let mut data = header(GLB_MAGIC, 2, 0);
        chunk(&mut data, GLB_CHUNK_BIN, &[0; 4]);
        chunk(&mut data, GLB_CHUNK_JSON, b"{}  ");
        let len = data.len() as u32;
        data[8..12].copy_from_slice(&len.to_le_bytes());
        let err = Container::parse(&data).unwrap_err();
        assert!(err.to_string().contains("chunk type"));
    }

    #[test]
    fn test_too_many_chunks() {
        let mut data = header(GLB_MAGIC, 2, 0);
        chunk(&mut data, GLB_CHUNK_JSON, b"{}  ");
        chunk(&mut data, GLB_CHUNK_BIN, &[0; 4]);
        chunk(&mut data, GLB_CHUNK_BIN, &[0; 4]);
        let len = data.len() as u32;
        data[8..12].copy_from_slice(&len.to_le_bytes());
        let err = Container::parse(&data).unwrap_err();
        assert!(err.to_string().contains("number of chunks"));
    }

    #[test]
    fn test_hint_from_path() {
        assert_eq!(SourceHint::from_path("models/Duck.GLB"), SourceHint::Binary);
        assert_eq!(SourceHint::from_path("models/Duck.gltf"), SourceHint::Auto);
        assert_eq!(SourceHint::from_path("no_extension"), SourceHint::Auto);
    }
}
