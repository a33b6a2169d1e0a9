//! Value codecs.
//!
//! A [`Transcoder`] turns whole-document [`Content`] into bytes plus common
//! format flags, and a [`JsonSerializer`] encodes subdocument fragments.
//! Both are stateless and safe to share between concurrent builders.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Common flags: JSON document (with the legacy JSON bits).
pub const JSON_COMMON_FLAGS: u32 = 0x0200_0006;
/// Common flags: opaque binary document (with the legacy binary bits).
pub const BINARY_COMMON_FLAGS: u32 = 0x0300_0008;
/// Common flags: UTF-8 string document.
pub const STRING_COMMON_FLAGS: u32 = 0x0400_0000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{0}")]
    Serialize(String),

    #[error("{0}")]
    Deserialize(String),

    #[error("{transcoder} does not support {content} content")]
    Unsupported {
        transcoder: &'static str,
        content: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Binary,
    String,
    Unknown,
}

impl DataFormat {
    pub fn from_flags(flags: u32) -> Self {
        match flags >> 24 {
            0x02 => DataFormat::Json,
            0x03 => DataFormat::Binary,
            0x04 => DataFormat::String,
            // legacy flags written by older clients
            0x00 if flags == 0 => DataFormat::Json,
            0x00 if flags & 0x08 != 0 => DataFormat::Binary,
            0x00 if flags & 0x06 != 0 => DataFormat::Json,
            _ => DataFormat::Unknown,
        }
    }
}

/// Application value of a whole document.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Json(Value),
    Binary(Vec<u8>),
    Text(String),
}

impl Content {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, CodecError> {
        serde_json::to_value(value)
            .map(Content::Json)
            .map_err(|err| CodecError::Serialize(err.to_string()))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Content::Json(value) => Some(value),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Content::Json(_) => "json",
            Content::Binary(_) => "binary",
            Content::Text(_) => "text",
        }
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Json(value)
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Content::Binary(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_string())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    pub bytes: Vec<u8>,
    pub flags: u32,
}

pub trait Transcoder: Send + Sync {
    fn encode(&self, content: &Content) -> Result<EncodedValue, CodecError>;
    fn decode(&self, bytes: &[u8], flags: u32) -> Result<Content, CodecError>;
}

/// Default transcoder: JSON documents, text stored as JSON strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTranscoder;

impl Transcoder for JsonTranscoder {
    fn encode(&self, content: &Content) -> Result<EncodedValue, CodecError> {
        let bytes = match content {
            Content::Json(value) => serde_json::to_vec(value),
            Content::Text(text) => serde_json::to_vec(text),
            Content::Binary(_) => {
                return Err(CodecError::Unsupported {
                    transcoder: "JsonTranscoder",
                    content: content.kind(),
                });
            }
        }
        .map_err(|err| CodecError::Serialize(err.to_string()))?;

        Ok(EncodedValue {
            bytes,
            flags: JSON_COMMON_FLAGS,
        })
    }

    fn decode(&self, bytes: &[u8], flags: u32) -> Result<Content, CodecError> {
        match DataFormat::from_flags(flags) {
            DataFormat::Json => serde_json::from_slice(bytes)
                .map(Content::Json)
                .map_err(|err| CodecError::Deserialize(err.to_string())),
            DataFormat::Binary => Ok(Content::Binary(bytes.to_vec())),
            DataFormat::String => String::from_utf8(bytes.to_vec())
                .map(Content::Text)
                .map_err(|err| CodecError::Deserialize(err.to_string())),
            DataFormat::Unknown => Err(CodecError::Deserialize(format!(
                "unknown document flags {:#010x}",
                flags
            ))),
        }
    }
}

/// Passes binary documents through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBinaryTranscoder;

impl Transcoder for RawBinaryTranscoder {
    fn encode(&self, content: &Content) -> Result<EncodedValue, CodecError> {
        match content {
            Content::Binary(bytes) => Ok(EncodedValue {
                bytes: bytes.clone(),
                flags: BINARY_COMMON_FLAGS,
            }),
            other => Err(CodecError::Unsupported {
                transcoder: "RawBinaryTranscoder",
                content: other.kind(),
            }),
        }
    }

    fn decode(&self, bytes: &[u8], _flags: u32) -> Result<Content, CodecError> {
        Ok(Content::Binary(bytes.to_vec()))
    }
}

/// Stores text documents as plain UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStringTranscoder;

impl Transcoder for RawStringTranscoder {
    fn encode(&self, content: &Content) -> Result<EncodedValue, CodecError> {
        match content {
            Content::Text(text) => Ok(EncodedValue {
                bytes: text.as_bytes().to_vec(),
                flags: STRING_COMMON_FLAGS,
            }),
            other => Err(CodecError::Unsupported {
                transcoder: "RawStringTranscoder",
                content: other.kind(),
            }),
        }
    }

    fn decode(&self, bytes: &[u8], _flags: u32) -> Result<Content, CodecError> {
        String::from_utf8(bytes.to_vec())
            .map(Content::Text)
            .map_err(|err| CodecError::Deserialize(err.to_string()))
    }
}

/// Encodes subdocument fragments.
pub trait JsonSerializer: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultJsonSerializer;

impl JsonSerializer for DefaultJsonSerializer {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|err| CodecError::Serialize(err.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|err| CodecError::Deserialize(err.to_string()))
    }
}
