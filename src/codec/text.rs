//! NUL-terminated string handling for emulator memory and string replies.
//!
//! Strings are treated as UTF-8; invalid sequences are replaced rather
//! than rejected, since game memory is not guaranteed to hold valid text.

use bytes::Bytes;

use crate::error::{PineError, Result};

/// Text up to (not including) the first NUL.
pub fn decode_c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// NUL-separated strings, stopping at the first empty entry.
pub fn decode_c_string_array(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == 0)
        .take_while(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

/// `text` followed by a NUL terminator.
pub fn encode_c_string(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 1);
    out.extend_from_slice(text.as_bytes());
    out.push(0);
    out
}

/// Each entry followed by its own NUL terminator.
pub fn encode_c_string_array<S: AsRef<str>>(items: &[S]) -> Vec<u8> {
    let total: usize = items.iter().map(|s| s.as_ref().len() + 1).sum();
    let mut out = Vec::with_capacity(total);
    for item in items {
        out.extend_from_slice(item.as_ref().as_bytes());
        out.push(0);
    }
    out
}

/// Decode a string-valued reply: `[u32 LE length][bytes...]`.
///
/// The length counts the terminating NUL when the emulator sends one;
/// anything after the first NUL is dropped.
pub fn decode_sized_string(argument: &Bytes) -> Result<String> {
    let Some((prefix, rest)) = argument.split_first_chunk::<4>() else {
        return Err(PineError::InvalidReply(format!(
            "string reply of {} bytes has no length field",
            argument.len()
        )));
    };

    let declared = u32::from_le_bytes(*prefix) as usize;
    if declared > rest.len() {
        return Err(PineError::InvalidReply(format!(
            "string reply declares {} bytes but carries {}",
            declared,
            rest.len()
        )));
    }

    Ok(decode_c_string(&rest[..declared]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_stops_at_nul() {
        assert_eq!(decode_c_string(b"SLUS-20002\0garbage"), "SLUS-20002");
        assert_eq!(decode_c_string(b"no terminator"), "no terminator");
        assert_eq!(decode_c_string(b"\0"), "");
    }

    #[test]
    fn test_decode_lossy_utf8() {
        assert_eq!(decode_c_string(&[b'a', 0xFF, b'b', 0]), "a\u{FFFD}b");
    }

    #[test]
    fn test_string_array() {
        assert_eq!(
            decode_c_string_array(b"one\0two\0\0three\0"),
            vec!["one".to_string(), "two".to_string()]
        );
        assert!(decode_c_string_array(b"\0abc").is_empty());
        assert_eq!(decode_c_string_array(b"tail"), vec!["tail".to_string()]);
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode_c_string("hi"), b"hi\0".to_vec());
        assert_eq!(encode_c_string_array(&["a", "bc"]), b"a\0bc\0".to_vec());
        assert!(encode_c_string_array::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_sized_string_reply() {
        let mut raw = 9u32.to_le_bytes().to_vec();
        raw.extend_from_slice(b"PCSX2 1.7\0\0\0");
        let reply = Bytes::from(raw);
        assert_eq!(decode_sized_string(&reply).unwrap(), "PCSX2 1.7");
    }

    #[test]
    fn test_sized_string_reply_with_terminator_in_length() {
        let mut raw = 4u32.to_le_bytes().to_vec();
        raw.extend_from_slice(b"abc\0");
        assert_eq!(decode_sized_string(&Bytes::from(raw)).unwrap(), "abc");
    }

    #[test]
    fn test_sized_string_reply_errors() {
        assert!(matches!(
            decode_sized_string(&Bytes::from_static(&[1, 0])),
            Err(PineError::InvalidReply(_))
        ));

        let mut raw = 100u32.to_le_bytes().to_vec();
        raw.extend_from_slice(b"short");
        assert!(matches!(
            decode_sized_string(&Bytes::from(raw)),
            Err(PineError::InvalidReply(_))
        ));
    }
}
