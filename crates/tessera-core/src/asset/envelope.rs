// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the binary envelope prefixed to every fetched asset payload.
//!
//! The envelope is a fixed 4-byte magic sequence followed by a version byte.
//! Version 0 payloads additionally embed a type tag and a length-prefixed name
//! before the per-type payload; from version 1 on that information lives in
//! the [`AssetMetadata`](super::AssetMetadata) instead. Decoders must receive
//! the bytes after the envelope.

use thiserror::Error;

/// A unique byte sequence identifying an enveloped asset payload ("VTAB").
pub const ENVELOPE_MAGIC: [u8; 4] = *b"VTAB";

/// The envelope version written by [`EnvelopeHeader::current`].
pub const CURRENT_ENVELOPE_VERSION: u8 = 1;

const PREFIX_LEN: usize = ENVELOPE_MAGIC.len() + 1;

/// Errors raised while stripping an envelope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The buffer ended before the header did.
    #[error("envelope truncated: needed {needed} bytes, got {available}")]
    Truncated {
        /// Bytes needed to finish the header.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
    /// The first four bytes are not [`ENVELOPE_MAGIC`].
    #[error("invalid envelope magic {0:?}")]
    BadMagic([u8; 4]),
    /// The embedded name of a version 0 envelope is not UTF-8.
    #[error("embedded asset name is not valid UTF-8")]
    BadName,
}

/// The parsed header of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeHeader {
    /// Version 0: type tag and name are embedded in the payload.
    Legacy {
        /// Declared asset type tag.
        type_tag: i32,
        /// Declared asset name.
        name: String,
    },
    /// Version 1 and later: metadata comes from the locator.
    Current {
        /// The version byte as read.
        version: u8,
    },
}

impl EnvelopeHeader {
    /// Header for newly written payloads.
    pub fn current() -> Self {
        EnvelopeHeader::Current {
            version: CURRENT_ENVELOPE_VERSION,
        }
    }

    /// The version byte.
    pub fn version(&self) -> u8 {
        match self {
            EnvelopeHeader::Legacy { .. } => 0,
            EnvelopeHeader::Current { version } => *version,
        }
    }

    /// Size of the encoded header in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            EnvelopeHeader::Legacy { name, .. } => PREFIX_LEN + 4 + 4 + name.len(),
            EnvelopeHeader::Current { .. } => PREFIX_LEN,
        }
    }

    /// Writes the header followed by `payload`.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len() + payload.len());
        out.extend_from_slice(&ENVELOPE_MAGIC);
        out.push(self.version());
        if let EnvelopeHeader::Legacy { type_tag, name } = self {
            out.extend_from_slice(&type_tag.to_le_bytes());
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
        }
        out.extend_from_slice(payload);
        out
    }
}

/// A borrowed view of an enveloped payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// The parsed header.
    pub header: EnvelopeHeader,
    /// The bytes following the header.
    pub payload: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Parses the header at the start of `bytes` and returns the remainder.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, EnvelopeError> {
        let prefix = take(bytes, 0, PREFIX_LEN)?;
        let magic = [prefix[0], prefix[1], prefix[2], prefix[3]];
        if magic != ENVELOPE_MAGIC {
            return Err(EnvelopeError::BadMagic(magic));
        }

        let version = prefix[4];
        if version != 0 {
            return Ok(Self {
                header: EnvelopeHeader::Current { version },
                payload: &bytes[PREFIX_LEN..],
            });
        }

        let tag = take(bytes, PREFIX_LEN, 4)?;
        let type_tag = i32::from_le_bytes([tag[0], tag[1], tag[2], tag[3]]);
        let len = take(bytes, PREFIX_LEN + 4, 4)?;
        let name_len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
        let name_start = PREFIX_LEN + 8;
        let name_bytes = take(bytes, name_start, name_len)?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| EnvelopeError::BadName)?
            .to_string();

        Ok(Self {
            header: EnvelopeHeader::Legacy { type_tag, name },
            payload: &bytes[name_start + name_len..],
        })
    }
}

fn take(bytes: &[u8], start: usize, len: usize) -> Result<&[u8], EnvelopeError> {
    let end = start.saturating_add(len);
    bytes.get(start..end).ok_or(EnvelopeError::Truncated {
        needed: end,
        available: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_header_is_five_bytes() {
        let bytes = [b'V', b'T', b'A', b'B', 1, 0xAA, 0xBB];
        let envelope = Envelope::parse(&bytes).unwrap();
        assert_eq!(envelope.header, EnvelopeHeader::Current { version: 1 });
        assert_eq!(envelope.payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn legacy_header_embeds_tag_and_name() {
        let header = EnvelopeHeader::Legacy {
            type_tag: 7,
            name: "portrait".to_string(),
        };
        let bytes = header.encode(b"pixels");
        let envelope = Envelope::parse(&bytes).unwrap();
        assert_eq!(envelope.header, header);
        assert_eq!(envelope.payload, b"pixels");
    }

    #[test]
    fn rejects_foreign_magic() {
        let err = Envelope::parse(b"RIFF\x01data").unwrap_err();
        assert_eq!(err, EnvelopeError::BadMagic(*b"RIFF"));
    }

    #[test]
    fn rejects_truncated_legacy_name() {
        let mut bytes = EnvelopeHeader::Legacy {
            type_tag: 1,
            name: "long-name".to_string(),
        }
        .encode(&[]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            Envelope::parse(&bytes),
            Err(EnvelopeError::Truncated { .. })
        ));
    }

    #[test]
    fn empty_payload_after_current_header() {
        let bytes = EnvelopeHeader::current().encode(&[]);
        assert_eq!(bytes.len(), 5);
        assert!(Envelope::parse(&bytes).unwrap().payload.is_empty());
    }
}
