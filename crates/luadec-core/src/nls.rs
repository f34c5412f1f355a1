//! Text encodings for string constants.
//!
//! Script blobs shipped with Japanese and Chinese releases keep their string
//! constants in the legacy code page of the game, not in UTF-8.

use std::borrow::Cow;
use std::str::FromStr;

use encoding_rs::{Encoding as RsEncoding, GB18030, SHIFT_JIS, UTF_8};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Nls {
    #[default]
    Utf8,
    ShiftJis,
    /// Decoded as GB18030, a superset that also covers GBK-era assets.
    Gbk,
}

impl Nls {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Nls::Utf8 => UTF_8,
            Nls::ShiftJis => SHIFT_JIS,
            Nls::Gbk => GB18030,
        }
    }

    /// Decode raw constant bytes. Malformed sequences are replaced, never rejected.
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Nls::Utf8 => match std::str::from_utf8(bytes) {
                Ok(s) => Cow::Borrowed(s),
                Err(_) => {
                    log::warn!("invalid UTF-8 in string constant, decoding lossily");
                    Cow::Owned(String::from_utf8_lossy(bytes).into_owned())
                }
            },
            Nls::ShiftJis | Nls::Gbk => {
                let (s, _, had_err) = self.as_encoding_rs().decode(bytes);
                if had_err {
                    log::warn!("{:?} decode error in string constant", self);
                }
                s
            }
        }
    }

    /// Encode a string back into the code page (used by the bytecode writer).
    pub fn encode<'a>(self, s: &'a str) -> Cow<'a, [u8]> {
        match self {
            Nls::Utf8 => Cow::Borrowed(s.as_bytes()),
            Nls::ShiftJis | Nls::Gbk => {
                let (bytes, _, _) = self.as_encoding_rs().encode(s);
                bytes
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNls(pub String);

impl std::fmt::Display for UnknownNls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown NLS '{}' (expected utf8, sjis or gbk)", self.0)
    }
}

impl std::error::Error for UnknownNls {}

impl FromStr for Nls {
    type Err = UnknownNls;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "utf8" | "utf-8" => Ok(Nls::Utf8),
            "sjis" | "shift_jis" | "shiftjis" => Ok(Nls::ShiftJis),
            "gbk" | "gb18030" => Ok(Nls::Gbk),
            _ => Err(UnknownNls(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("SJIS".parse::<Nls>(), Ok(Nls::ShiftJis));
        assert_eq!("utf-8".parse::<Nls>(), Ok(Nls::Utf8));
        assert_eq!("gbk".parse::<Nls>(), Ok(Nls::Gbk));
        assert!("latin1".parse::<Nls>().is_err());
    }

    #[test]
    fn shift_jis_round_trip() {
        let text = "こんにちは";
        let raw = Nls::ShiftJis.encode(text);
        assert_ne!(raw.as_ref(), text.as_bytes());
        assert_eq!(Nls::ShiftJis.decode(&raw), text);
    }

    #[test]
    fn invalid_utf8_is_lossy() {
        assert_eq!(Nls::Utf8.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }
}
