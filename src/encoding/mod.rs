// ── Encoding resolution ───────────────────────────────────────────────────────
//
// Turns file bytes into text and back.  Pure functions over byte slices plus
// thin read/write wrappers; no UI, no hidden state.
//
// Detection order for `decode_bytes`:
//   1. UTF-16 LE BOM (`FF FE`) / UTF-16 BE BOM (`FE FF`), if the payload is
//      valid UTF-16
//   2. Each of `CANDIDATE_ENCODINGS`, strictly, first success wins
//   3. `LAST_RESORT_ENCODING` in replacement mode, which cannot fail
//
// Content sniffing is a guess.  A file that happens to be valid UTF-8 or
// GB18030 is reported as such even if the author meant something else.

use std::{borrow::Cow, fs, path::Path};

use encoding_rs::{Encoding, GB18030, GBK, UTF_16BE, UTF_16LE, UTF_8};
use log::{debug, warn};

use crate::error::{DecodeError, EncodeError};

// ── Names ─────────────────────────────────────────────────────────────────────

/// Encodings tried, in order, when a file is opened without a pinned encoding.
pub const CANDIDATE_ENCODINGS: [&str; 4] = ["utf-8", "gb18030", "gbk", "latin-1"];

/// Decoded in replacement mode when every strict candidate fails.
pub const LAST_RESORT_ENCODING: &str = "latin-1";

/// Used for the single retry when a strict write fails.
pub const SAFE_ENCODING: &str = "utf-8";

// ── Codec ─────────────────────────────────────────────────────────────────────

/// A resolved encoding label.
///
/// `encoding_rs` follows the WHATWG label table, where `latin1` and
/// `iso-8859-1` mean windows-1252 and where UTF-16 is never produced on
/// output.  Those two cases are handled here directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    /// ISO-8859-1: byte `n` is code point `U+00nn`, both ways.
    Latin1,
    /// UTF-16 Little-Endian; written with a BOM.
    Utf16Le,
    /// UTF-16 Big-Endian; written with a BOM.
    Utf16Be,
    Whatwg(&'static Encoding),
}

impl Codec {
    fn for_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        if matches!(
            label.as_str(),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "l1"
        ) {
            return Some(Self::Latin1);
        }
        let enc = Encoding::for_label(label.as_bytes())?;
        Some(if enc == UTF_16LE {
            Self::Utf16Le
        } else if enc == UTF_16BE {
            Self::Utf16Be
        } else {
            Self::Whatwg(enc)
        })
    }

    fn name(self) -> String {
        match self {
            Self::Latin1 => "latin-1".to_owned(),
            Self::Utf16Le => "utf-16le".to_owned(),
            Self::Utf16Be => "utf-16be".to_owned(),
            Self::Whatwg(enc) => enc.name().to_ascii_lowercase(),
        }
    }

    fn as_encoding_rs(self) -> Option<&'static Encoding> {
        match self {
            Self::Latin1 => None,
            Self::Utf16Le => Some(UTF_16LE),
            Self::Utf16Be => Some(UTF_16BE),
            Self::Whatwg(enc) => Some(enc),
        }
    }

    /// Strict decode: `None` on any malformed sequence.
    fn decode_strict(self, bytes: &[u8]) -> Option<String> {
        match self.as_encoding_rs() {
            None => Some(latin1_to_string(bytes)),
            Some(enc) => enc
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(Cow::into_owned),
        }
    }

    /// Permissive decode: malformed sequences become U+FFFD.
    fn decode_lossy(self, bytes: &[u8]) -> String {
        match self.as_encoding_rs() {
            None => latin1_to_string(bytes),
            Some(enc) => enc.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }

    /// Strict encode: fails on the first character the encoding cannot hold.
    fn encode_strict(self, text: &str) -> Result<Vec<u8>, EncodeError> {
        match self {
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| self.unmappable(c)))
                .collect(),
            Self::Utf16Le => {
                let mut out = vec![0xFF_u8, 0xFE]; // LE BOM
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                Ok(out)
            }
            Self::Utf16Be => {
                let mut out = vec![0xFE_u8, 0xFF]; // BE BOM
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
                Ok(out)
            }
            Self::Whatwg(enc) => {
                // e.g. `replacement`, which encoding_rs silently turns into UTF-8.
                if enc.output_encoding() != enc {
                    return Err(EncodeError::Unwritable(self.name()));
                }
                let (bytes, _, had_errors) = enc.encode(text);
                if had_errors {
                    let first = first_unmappable(enc, text).unwrap_or(char::REPLACEMENT_CHARACTER);
                    return Err(self.unmappable(first));
                }
                Ok(bytes.into_owned())
            }
        }
    }

    fn unmappable(self, first: char) -> EncodeError {
        EncodeError::Unmappable {
            encoding: self.name(),
            first,
        }
    }
}

fn candidates() -> [Codec; 4] {
    [
        Codec::Whatwg(UTF_8),
        Codec::Whatwg(GB18030),
        Codec::Whatwg(GBK),
        Codec::Latin1,
    ]
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

fn first_unmappable(enc: &'static Encoding, text: &str) -> Option<char> {
    let mut buf = [0u8; 4];
    text.chars().find(|c| enc.encode(c.encode_utf8(&mut buf)).2)
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Text recovered from a file plus the encoding that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: String,
}

/// What actually reached disk in `encode_and_write`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Canonical name of the encoding of the bytes on disk.
    pub encoding: String,
    /// `true` when the requested encoding failed and the UTF-8 retry was used.
    pub fell_back: bool,
}

/// Validate an encoding label and return its display name.
///
/// `"UTF8"` → `"utf-8"`, `"Latin1"` → `"latin-1"`, `"gb2312"` → `"gbk"`.
pub fn canonical_name(label: &str) -> Option<String> {
    Codec::for_label(label).map(Codec::name)
}

/// Detect the encoding of `bytes` and decode them.  Total: never fails.
pub fn decode_bytes(bytes: &[u8]) -> Decoded {
    for (bom, codec) in [
        (&[0xFF_u8, 0xFE][..], Codec::Utf16Le),
        (&[0xFE_u8, 0xFF][..], Codec::Utf16Be),
    ] {
        if let Some(payload) = bytes.strip_prefix(bom) {
            if let Some(text) = codec.decode_strict(payload) {
                return Decoded {
                    text,
                    encoding: codec.name(),
                };
            }
        }
    }

    for codec in candidates() {
        if let Some(text) = codec.decode_strict(bytes) {
            return Decoded {
                text,
                encoding: codec.name(),
            };
        }
        debug!("not valid {}", codec.name());
    }

    // Unreachable while latin-1 is a candidate: a single-byte table admits
    // every byte value.  Kept so the function stays total if the list changes.
    let last = Codec::Latin1;
    Decoded {
        text: last.decode_lossy(bytes),
        encoding: LAST_RESORT_ENCODING.to_owned(),
    }
}

/// Read `path` and auto-detect its encoding.
///
/// Only the read itself can fail; decoding is total.
pub fn decode(path: &Path) -> Result<Decoded, DecodeError> {
    let bytes = fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_owned(),
        source,
    })?;
    let decoded = decode_bytes(&bytes);
    debug!("{} decoded as {}", path.display(), decoded.encoding);
    Ok(decoded)
}

/// Read `path` under one pinned encoding, strictly.
///
/// A leading UTF-16 BOM matching the pinned encoding is skipped.
pub fn decode_with(path: &Path, encoding: &str) -> Result<String, DecodeError> {
    let codec =
        Codec::for_label(encoding).ok_or_else(|| DecodeError::UnknownEncoding(encoding.to_owned()))?;
    let bytes = fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_owned(),
        source,
    })?;
    let payload = match codec {
        Codec::Utf16Le => bytes.strip_prefix(&[0xFF, 0xFE]).unwrap_or(&bytes[..]),
        Codec::Utf16Be => bytes.strip_prefix(&[0xFE, 0xFF]).unwrap_or(&bytes[..]),
        _ => &bytes[..],
    };
    codec.decode_strict(payload).ok_or_else(|| DecodeError::Malformed {
        path: path.to_owned(),
        encoding: codec.name(),
    })
}

/// Write `text` to `path` under `encoding`, retrying once as UTF-8.
///
/// The strict attempt fails on an unknown label, an unwritable encoding, an
/// unmappable character or an I/O error; any of these triggers the retry.
/// Only a failed retry is returned as an error.
pub fn encode_and_write(path: &Path, text: &str, encoding: &str) -> Result<WriteOutcome, EncodeError> {
    match write_strict(path, text, encoding) {
        Ok(name) => Ok(WriteOutcome {
            encoding: name,
            fell_back: false,
        }),
        Err(primary) => {
            warn!("saving {} as {encoding} failed ({primary}), retrying as {SAFE_ENCODING}", path.display());
            // A Rust string is always valid UTF-8, so the retry can only fail on I/O.
            fs::write(path, text.as_bytes()).map_err(|source| EncodeError::Io {
                path: path.to_owned(),
                source,
            })?;
            Ok(WriteOutcome {
                encoding: SAFE_ENCODING.to_owned(),
                fell_back: true,
            })
        }
    }
}

fn write_strict(path: &Path, text: &str, encoding: &str) -> Result<String, EncodeError> {
    let codec =
        Codec::for_label(encoding).ok_or_else(|| EncodeError::UnknownEncoding(encoding.to_owned()))?;
    let bytes = codec.encode_strict(text)?;
    fs::write(path, bytes).map_err(|source| EncodeError::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(codec.name())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
