// src/io/codec.rs
//
// Text codec layer: raw bytes <-> hex groups and best-effort text.
//
// Decoding is total; any byte sequence renders. Encoding is partial and
// reports the first invalid token of an operator line.

use std::fmt;
use std::str::FromStr;

use super::error::{HextermError, HextermResult};

/// Glyph used for bytes that have no printable mapping in the active codec.
pub const PLACEHOLDER: char = '.';

/// Windows-1252 mappings for 0x80..=0x9F. `None` marks the five undefined slots.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None,             Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None,             Some('\u{017D}'), None,
    None,             Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None,             Some('\u{017E}'), Some('\u{0178}'),
];

// ============================================================================
// Codec Selection
// ============================================================================

/// Supported text codecs, resolved once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CodecSpec {
    /// 7-bit ASCII; bytes >= 0x80 have no mapping
    Ascii,
    /// ISO-8859-1, one char per byte
    #[default]
    Latin1,
    /// Windows-1252 (Latin-1 with printable 0x80..=0x9F)
    Cp1252,
    /// UTF-8; invalid bytes render one placeholder each
    Utf8,
}

impl CodecSpec {
    pub fn name(&self) -> &'static str {
        match self {
            CodecSpec::Ascii => "ascii",
            CodecSpec::Latin1 => "latin1",
            CodecSpec::Cp1252 => "cp1252",
            CodecSpec::Utf8 => "utf8",
        }
    }

    /// Map one byte of a single-byte codec to a char.
    fn byte_to_char(&self, byte: u8) -> Option<char> {
        match self {
            CodecSpec::Ascii => byte.is_ascii().then_some(byte as char),
            CodecSpec::Latin1 => Some(byte as char),
            CodecSpec::Cp1252 => match byte {
                0x80..=0x9F => CP1252_HIGH[(byte - 0x80) as usize],
                _ => Some(byte as char),
            },
            // Multi-byte; handled in decode_text
            CodecSpec::Utf8 => None,
        }
    }

    /// Append the encoding of `c` to `out`, or return false if unrepresentable.
    fn encode_char(&self, c: char, out: &mut Vec<u8>) -> bool {
        let code = c as u32;
        match self {
            CodecSpec::Ascii if code < 0x80 => out.push(code as u8),
            CodecSpec::Latin1 if code < 0x100 => out.push(code as u8),
            CodecSpec::Cp1252 => {
                if code < 0x80 || (0xA0..0x100).contains(&code) {
                    out.push(code as u8);
                } else if let Some(idx) = CP1252_HIGH.iter().position(|m| *m == Some(c)) {
                    out.push(0x80 + idx as u8);
                } else {
                    return false;
                }
            }
            CodecSpec::Utf8 => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            _ => return false,
        }
        true
    }
}

impl FromStr for CodecSpec {
    type Err = HextermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" | "us-ascii" => Ok(CodecSpec::Ascii),
            "latin1" | "latin-1" | "l1" | "iso-8859-1" | "iso8859-1" => Ok(CodecSpec::Latin1),
            "cp1252" | "windows-1252" => Ok(CodecSpec::Cp1252),
            "utf8" | "utf-8" => Ok(CodecSpec::Utf8),
            other => Err(HextermError::config(format!(
                "unknown codec \"{}\" (expected ascii, latin1, cp1252 or utf8)",
                other
            ))),
        }
    }
}

impl fmt::Display for CodecSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Render bytes as space-separated lower-case hex pairs.
pub fn render_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&hex::encode([*byte]));
    }
    out
}

fn printable(c: char) -> char {
    if c.is_control() {
        PLACEHOLDER
    } else {
        c
    }
}

/// Best-effort text rendering. Never fails.
pub fn decode_text(codec: CodecSpec, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    if codec == CodecSpec::Utf8 {
        for chunk in bytes.utf8_chunks() {
            out.extend(chunk.valid().chars().map(printable));
            out.extend(std::iter::repeat(PLACEHOLDER).take(chunk.invalid().len()));
        }
    } else {
        out.extend(
            bytes
                .iter()
                .map(|&b| codec.byte_to_char(b).map(printable).unwrap_or(PLACEHOLDER)),
        );
    }
    out
}

/// Render bytes as (hex groups, decoded text).
pub fn decode(codec: CodecSpec, bytes: &[u8]) -> (String, String) {
    (render_hex(bytes), decode_text(codec, bytes))
}

// ============================================================================
// Encoding
// ============================================================================

enum Token<'a> {
    Bare(&'a str),
    Literal(&'a str),
}

/// Split a line into whitespace-separated tokens. Quoted literals may contain spaces.
fn tokenize(text: &str) -> HextermResult<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        if let Some(body) = rest.strip_prefix('"') {
            let end = body.find('"').ok_or_else(|| {
                HextermError::input_parse(tokens.len() + 1, rest, "unterminated string literal")
            })?;
            tokens.push(Token::Literal(&body[..end]));
            rest = &body[end + 1..];
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            tokens.push(Token::Bare(&rest[..end]));
            rest = &rest[end..];
        }
        rest = rest.trim_start();
    }

    Ok(tokens)
}

/// Encode an operator line into bytes.
///
/// Two-hex-digit tokens are literal bytes, `"..."` tokens go through the codec.
/// A lone hex digit is rejected rather than padded.
pub fn encode(codec: CodecSpec, text: &str) -> HextermResult<Vec<u8>> {
    let mut out = Vec::new();

    for (idx, token) in tokenize(text)?.into_iter().enumerate() {
        let position = idx + 1;
        match token {
            Token::Literal(s) => {
                for c in s.chars() {
                    if !codec.encode_char(c, &mut out) {
                        return Err(HextermError::input_parse(
                            position,
                            s,
                            format!("{:?} cannot be encoded as {}", c, codec),
                        ));
                    }
                }
            }
            Token::Bare(tok) if tok.len() == 2 => {
                let byte = hex::decode(tok)
                    .map_err(|_| HextermError::input_parse(position, tok, "not a hex byte"))?;
                out.extend_from_slice(&byte);
            }
            Token::Bare(tok) if tok.len() == 1 && tok.chars().all(|c| c.is_ascii_hexdigit()) => {
                return Err(HextermError::input_parse(
                    position,
                    tok,
                    "single hex digit is ambiguous, write bytes as two digits",
                ));
            }
            Token::Bare(tok) => {
                return Err(HextermError::input_parse(position, tok, "unknown token"));
            }
        }
    }

    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty() {
        let (hex, text) = decode(CodecSpec::Latin1, &[]);
        assert_eq!(hex, "");
        assert_eq!(text, "");
    }

    #[test]
    fn test_decode_all_bytes_every_codec() {
        let all: Vec<u8> = (0..=255).collect();
        for codec in [CodecSpec::Ascii, CodecSpec::Latin1, CodecSpec::Cp1252, CodecSpec::Utf8] {
            let (hex, text) = decode(codec, &all);
            assert_eq!(hex.len(), 256 * 3 - 1);
            assert_eq!(text.chars().count(), 256, "codec {}", codec);
        }
    }

    #[test]
    fn test_decode_replaces_controls_and_unmapped() {
        let (hex, text) = decode(CodecSpec::Ascii, &[0x48, 0x69, 0x0D, 0x0A, 0xFF]);
        assert_eq!(hex, "48 69 0d 0a ff");
        assert_eq!(text, "Hi...");

        assert_eq!(decode_text(CodecSpec::Cp1252, &[0x80, 0x81]), "\u{20AC}.");
        assert_eq!(decode_text(CodecSpec::Latin1, &[0xE9]), "\u{E9}");
    }

    #[test]
    fn test_decode_utf8_invalid_bytes() {
        // "é" followed by a stray continuation byte and a truncated sequence
        let text = decode_text(CodecSpec::Utf8, &[0xC3, 0xA9, 0x80, 0x41, 0xE2, 0x82]);
        assert_eq!(text, "\u{E9}.A..");
    }

    #[test]
    fn test_encode_hex_roundtrip() {
        let line = "00 7f 80 FF 48 65";
        let bytes = encode(CodecSpec::Latin1, line).unwrap();
        assert_eq!(bytes, vec![0x00, 0x7F, 0x80, 0xFF, 0x48, 0x65]);
        assert_eq!(render_hex(&bytes), line.to_lowercase());
    }

    #[test]
    fn test_encode_mixed_literal() {
        let bytes = encode(CodecSpec::Ascii, "02 \"AT OK\" 0d 0a").unwrap();
        assert_eq!(bytes, b"\x02AT OK\r\n".to_vec());
    }

    #[test]
    fn test_encode_codec_literals() {
        assert_eq!(encode(CodecSpec::Cp1252, "\"\u{20AC}\"").unwrap(), vec![0x80]);
        assert_eq!(encode(CodecSpec::Utf8, "\"\u{E9}\"").unwrap(), vec![0xC3, 0xA9]);
        assert_eq!(encode(CodecSpec::Latin1, "\"\u{E9}\"").unwrap(), vec![0xE9]);

        let err = encode(CodecSpec::Ascii, "41 \"\u{E9}\"").unwrap_err();
        assert!(matches!(err, HextermError::InputParse { position: 2, .. }));
    }

    #[test]
    fn test_single_digit_rejected() {
        let err = encode(CodecSpec::Latin1, "4").unwrap_err();
        assert!(matches!(err, HextermError::InputParse { position: 1, ref token, .. } if token == "4"));

        let err = encode(CodecSpec::Latin1, "41 42 a 43").unwrap_err();
        assert!(matches!(err, HextermError::InputParse { position: 3, .. }));
    }

    #[test]
    fn test_unknown_tokens_rejected() {
        for line in ["zz", "123", "0x41", "g1", "\"open"] {
            let err = encode(CodecSpec::Latin1, line).unwrap_err();
            assert!(matches!(err, HextermError::InputParse { .. }), "line {:?}", line);
        }
    }

    #[test]
    fn test_encode_blank_line() {
        assert!(encode(CodecSpec::Latin1, "   ").unwrap().is_empty());
    }

    #[test]
    fn test_codec_names() {
        assert_eq!("UTF-8".parse::<CodecSpec>().unwrap(), CodecSpec::Utf8);
        assert_eq!("iso-8859-1".parse::<CodecSpec>().unwrap(), CodecSpec::Latin1);
        assert_eq!("windows-1252".parse::<CodecSpec>().unwrap(), CodecSpec::Cp1252);
        assert!(matches!("ebcdic".parse::<CodecSpec>(), Err(HextermError::Config(_))));
        assert_eq!(CodecSpec::default(), CodecSpec::Latin1);
    }
}
