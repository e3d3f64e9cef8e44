//! Filename and comment encodings.
//!
//! If an entry's "language encoding" flag (general purpose bit 11) is set,
//! its name and comment are UTF-8 and we decode them strictly.
//! Everything else goes through the caller's configured encoding,
//! which defaults to UTF-8 but can be CP437 for archives from older tools.
//!
//! On the way out, a name the configured encoding can't represent either
//! falls back to UTF-8 (setting the flag) or gets Info-ZIP style `%Uxxxx`
//! escapes, one per UTF-16 code unit, so the bytes stay stable across a
//! round trip.

use std::borrow::Cow;

use codepage_437::{ToCp437, CP437_CONTROL};

/// The character encoding applied to names and comments whose UTF-8 flag
/// is clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// Interpret raw names as UTF-8 (the modern default).
    #[default]
    Utf8,
    /// Interpret raw names as IBM code page 437, the encoding of PKZIP
    /// for DOS and still the APPNOTE's nominal default.
    Cp437,
}

impl TextEncoding {
    /// Decodes header bytes, replacing anything unmappable with `?`.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            TextEncoding::Utf8 => utf8_with_replacement(bytes),
            TextEncoding::Cp437 => {
                // Every byte maps in CP437, so this can't lose anything.
                use codepage_437::BorrowFromCp437;
                Cow::borrow_from_cp437(bytes, &CP437_CONTROL)
            }
        }
    }

    /// Can the whole string be represented in this encoding?
    pub fn can_encode(&self, s: &str) -> bool {
        match self {
            TextEncoding::Utf8 => true,
            TextEncoding::Cp437 => s.to_cp437(&CP437_CONTROL).is_ok(),
        }
    }

    /// Encodes a string, or returns `None` if some character doesn't map.
    pub fn encode<'a>(&self, s: &'a str) -> Option<Cow<'a, [u8]>> {
        match self {
            TextEncoding::Utf8 => Some(Cow::Borrowed(s.as_bytes())),
            TextEncoding::Cp437 => s.to_cp437(&CP437_CONTROL).ok(),
        }
    }

    /// Encodes a string, escaping each unmappable code point as `%Uxxxx`
    /// (the `U` literal plus four uppercase hex digits per UTF-16 unit).
    ///
    /// This is the Info-ZIP convention; paired with a Unicode path extra
    /// field it keeps mangled names recoverable.
    pub fn encode_lossy<'a>(&self, s: &'a str) -> Cow<'a, [u8]> {
        if let Some(encoded) = self.encode(s) {
            return encoded;
        }
        let mut out = Vec::with_capacity(s.len());
        let mut unit_buf = [0u16; 2];
        for c in s.chars() {
            let one = c.to_string();
            match self.encode(&one) {
                Some(bytes) => out.extend_from_slice(&bytes),
                None => {
                    for unit in c.encode_utf16(&mut unit_buf) {
                        out.extend_from_slice(format!("%U{unit:04X}").as_bytes());
                    }
                }
            }
        }
        Cow::Owned(out)
    }
}

/// UTF-8 decode where malformed sequences become `?` instead of U+FFFD.
fn utf8_with_replacement(mut bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let mut out = String::with_capacity(bytes.len());
            loop {
                match std::str::from_utf8(bytes) {
                    Ok(tail) => {
                        out.push_str(tail);
                        break;
                    }
                    Err(e) => {
                        let valid = e.valid_up_to();
                        out.push_str(std::str::from_utf8(&bytes[..valid]).unwrap());
                        out.push('?');
                        let skip = e.error_len().unwrap_or(bytes.len() - valid);
                        bytes = &bytes[valid + skip..];
                    }
                }
            }
            Cow::Owned(out)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn utf8_passthrough() {
        let enc = TextEncoding::Utf8;
        assert_eq!(enc.decode("héllo.txt".as_bytes()), "héllo.txt");
        assert!(enc.can_encode("好"));
    }

    #[test]
    fn malformed_utf8_becomes_question_marks() {
        let enc = TextEncoding::Utf8;
        assert_eq!(enc.decode(b"a\xFFb"), "a?b");
        assert_eq!(enc.decode(b"\xC3"), "?");
    }

    #[test]
    fn cp437_round_trip() {
        let enc = TextEncoding::Cp437;
        // é is 0x82 in CP437.
        let bytes = enc.encode("é").unwrap();
        assert_eq!(&*bytes, &[0x82]);
        assert_eq!(enc.decode(&bytes), "é");
    }

    #[test]
    fn unencodable_gets_percent_u_escapes() {
        let enc = TextEncoding::Cp437;
        assert!(!enc.can_encode("名前.txt"));
        let bytes = enc.encode_lossy("名.txt");
        assert_eq!(&*bytes, b"%U540D.txt");
    }

    #[test]
    fn astral_code_points_escape_as_surrogate_pairs() {
        let enc = TextEncoding::Cp437;
        let bytes = enc.encode_lossy("\u{1F600}");
        assert_eq!(&*bytes, b"%UD83D%UDE00");
    }
}
