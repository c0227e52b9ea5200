//! Per-buffer CRC-32/IEEE framing: each buffer on the wire is `versz - 4`
//! bytes of body followed by a 4-byte little-endian CRC-32/IEEE over the body.

use ne_common::crc32_ieee;

/// A buffer that has been split into its body and trailing CRC, with the
/// verification already performed.
pub struct FramedBuffer<'a> {
    pub body: &'a [u8],
    pub stored_crc: u32,
    pub ok: bool,
}

/// Splits `raw` into `(body, stored_crc)` and checks the body against it.
/// `None` if `raw` is too short to contain a trailer at all.
#[must_use]
pub fn verify_framed(raw: &[u8]) -> Option<FramedBuffer<'_>> {
    if raw.len() < 4 {
        return None;
    }
    let (body, trailer) = raw.split_at(raw.len() - 4);
    let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let ok = crc32_ieee(body) == stored_crc;
    Some(FramedBuffer { body, stored_crc, ok })
}

/// Appends `body`'s CRC-32/IEEE as a 4-byte little-endian trailer, returning
/// the CRC that was written (so the caller can fold it into a running sum).
pub fn append_crc(framed: &mut Vec<u8>, body: &[u8]) -> u32 {
    let crc = crc32_ieee(body);
    framed.extend_from_slice(body);
    framed.extend_from_slice(&crc.to_le_bytes());
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_append_and_verify() {
        let mut framed = Vec::new();
        let crc = append_crc(&mut framed, b"hello");
        let parsed = verify_framed(&framed).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.body, b"hello");
        assert_eq!(parsed.stored_crc, crc);
    }

    #[test]
    fn detects_corruption() {
        let mut framed = Vec::new();
        append_crc(&mut framed, b"hello");
        let last = framed.len() - 1;
        framed[0] ^= 0xff;
        let parsed = verify_framed(&framed).unwrap();
        let _ = last;
        assert!(!parsed.ok);
    }

    #[test]
    fn too_short_is_none() {
        assert!(verify_framed(&[1, 2, 3]).is_none());
    }
}
