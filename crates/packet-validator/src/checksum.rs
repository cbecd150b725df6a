//! ALDL Checksum and Length Arithmetic
//!
//! Every ALDL frame ends in a checksum byte chosen so that the sum of all
//! bytes in the frame, including the checksum, is zero modulo 256.

/// Offset added to the body length to form the length byte of a request
pub const MSGLENGTH_OFFSET: u8 = 0x55;

/// Generate the checksum byte for `buf`
pub fn checksum_generate(buf: &[u8]) -> u8 {
    0u8.wrapping_sub(byte_sum(buf))
}

/// Test the trailing checksum byte of the first `length` bytes of `buf`
///
/// Returns `false` instead of failing when `buf` is shorter than `length` or
/// `length` leaves no room for a payload byte.
pub fn checksum_test(buf: &[u8], length: usize) -> bool {
    if length < 2 || buf.len() < length {
        return false;
    }
    let (payload, trailer) = buf[..length].split_at(length - 1);
    checksum_generate(payload) == trailer[0]
}

/// Residue of the first `length` bytes; zero for a valid frame
pub fn checksum_residue(buf: &[u8], length: usize) -> u8 {
    byte_sum(&buf[..length.min(buf.len())])
}

/// Generate the length byte for a request carrying `body_len` bytes after it
pub fn calc_msglength(body_len: u8) -> u8 {
    MSGLENGTH_OFFSET.wrapping_add(body_len)
}

fn byte_sum(buf: &[u8]) -> u8 {
    buf.iter().fold(0u8, |acc, &x| acc.wrapping_add(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_request_checksum() {
        // Mode 1 message 0 request to an ECM at F4
        let body = [0xF4, 0x57, 0x01, 0x00];
        assert_eq!(checksum_generate(&body), 0xB4);
        assert!(checksum_test(&[0xF4, 0x57, 0x01, 0x00, 0xB4], 5));
    }

    #[test]
    fn test_zero_sum_payload() {
        // 256 - 0 wraps to a zero checksum byte
        assert_eq!(checksum_generate(&[0x80, 0x80]), 0x00);
        assert!(checksum_test(&[0x80, 0x80, 0x00], 3));
    }

    #[test]
    fn test_short_buffers_are_invalid() {
        assert!(!checksum_test(&[], 0));
        assert!(!checksum_test(&[0x00], 1));
        assert!(!checksum_test(&[0xF4, 0x0C], 5));
    }

    #[test]
    fn test_length_prefix_only() {
        // Trailing garbage past `length` is ignored
        assert!(checksum_test(&[0xF4, 0x56, 0x08, 0xAE, 0xFF, 0xFF], 4));
    }

    #[test]
    fn test_msglength() {
        assert_eq!(calc_msglength(2), 0x57);
        assert_eq!(calc_msglength(1), 0x56);
    }

    proptest! {
        #[test]
        fn test_embedded_checksum_validates(payload in proptest::collection::vec(any::<u8>(), 1..64)) {
            let mut frame = payload.clone();
            frame.push(checksum_generate(&payload));
            prop_assert!(checksum_test(&frame, frame.len()));
            prop_assert_eq!(checksum_residue(&frame, frame.len()), 0);
        }

        #[test]
        fn test_single_byte_corruption_detected(
            payload in proptest::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
            delta in 1u8..=255,
        ) {
            let mut frame = payload.clone();
            frame.push(checksum_generate(&payload));
            let i = index.index(payload.len());
            frame[i] = frame[i].wrapping_add(delta);
            prop_assert!(!checksum_test(&frame, frame.len()));
        }
    }
}
