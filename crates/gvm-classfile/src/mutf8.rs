//! Modified UTF-8 as stored in `CONSTANT_Utf8` entries
//!
//! Differences from standard UTF-8: NUL is encoded as `0xC0 0x80`, and
//! supplementary characters are stored as two 3-byte encoded surrogates.

/// Decode modified UTF-8 bytes into a Rust string
///
/// Malformed sequences and unpaired surrogates decode to U+FFFD.
pub fn decode(bytes: &[u8]) -> String {
    if bytes.iter().all(|&b| b != 0 && b < 0x80) {
        // ASCII fast path
        return bytes.iter().map(|&b| b as char).collect();
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let a = bytes[i] as u16;
        if a & 0x80 == 0 {
            units.push(a);
            i += 1;
        } else if a & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            let b = bytes[i + 1] as u16;
            units.push(((a & 0x1F) << 6) | (b & 0x3F));
            i += 2;
        } else if a & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            let b = bytes[i + 1] as u16;
            let c = bytes[i + 2] as u16;
            units.push(((a & 0x0F) << 12) | ((b & 0x3F) << 6) | (c & 0x3F));
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }

    String::from_utf16_lossy(&units)
}

/// Encode a Rust string as modified UTF-8
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        assert_eq!(decode(b"java/lang/Object"), "java/lang/Object");
    }

    #[test]
    fn test_embedded_nul() {
        assert_eq!(decode(&[b'a', 0xC0, 0x80, b'b']), "a\0b");
        assert_eq!(encode("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
    }

    #[test]
    fn test_supplementary_character_uses_surrogates() {
        let text = "x\u{1F600}";
        let bytes = encode(text);
        // 1 byte for 'x', two 3-byte surrogates
        assert_eq!(bytes.len(), 7);
        assert_eq!(decode(&bytes), text);
    }

    #[test]
    fn test_two_byte_form() {
        assert_eq!(decode(&encode("héllo")), "héllo");
    }
}
