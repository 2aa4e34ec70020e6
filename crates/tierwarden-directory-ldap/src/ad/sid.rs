//! Security identifier decoding.
//!
//! Binary layout: revision (1 byte), sub-authority count (1 byte),
//! identifier authority (6 bytes, big-endian), then each sub-authority as a
//! little-endian u32.

/// Decode a binary SID to its `S-1-…` string form.
pub fn decode_sid(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 8 {
        return None;
    }
    let revision = bytes[0];
    let count = usize::from(bytes[1]);
    if bytes.len() != 8 + count * 4 {
        return None;
    }

    let authority = bytes[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut sid = format!("S-{revision}-{authority}");
    for chunk in bytes[8..].chunks_exact(4) {
        let sub = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        sid.push('-');
        sid.push_str(&sub.to_string());
    }
    Some(sid)
}

/// Check that a string looks like a SID.
pub fn is_sid(value: &str) -> bool {
    let mut parts = value.split('-');
    parts.next().is_some_and(|p| p.eq_ignore_ascii_case("S"))
        && parts.clone().count() >= 2
        && parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_domain_sid() {
        // S-1-5-21-1004336348-1177238915-682003330
        let bytes = [
            0x01, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x15, 0x00, 0x00, 0x00, 0xDC, 0xF4,
            0xDC, 0x3B, 0x83, 0x3D, 0x2B, 0x46, 0x82, 0x8B, 0xA6, 0x28,
        ];
        assert_eq!(
            decode_sid(&bytes).as_deref(),
            Some("S-1-5-21-1004336348-1177238915-682003330")
        );
    }

    #[test]
    fn test_decode_builtin_sid() {
        let bytes = [
            0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x20, 0x00, 0x00, 0x00, 0x20, 0x02,
            0x00, 0x00,
        ];
        assert_eq!(decode_sid(&bytes).as_deref(), Some("S-1-5-32-544"));
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert_eq!(decode_sid(&[0x01, 0x02, 0x00]), None);
        assert_eq!(
            decode_sid(&[0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x20, 0x00]),
            None
        );
    }

    #[test]
    fn test_is_sid() {
        assert!(is_sid("S-1-5-32-544"));
        assert!(!is_sid("Administrator"));
        assert!(!is_sid("S-1-"));
    }
}
