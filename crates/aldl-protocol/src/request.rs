//! ALDL Request Framing
//!
//! Requests are `[address, length, mode, message.., checksum]` where the
//! length byte is `0x55` plus the number of bytes between it and the checksum.

use packet_validator::{calc_msglength, checksum_generate};
use std::fmt::Write;

/// Build a request for `message` in `mode`
pub fn generate_request(address: u8, mode: u8, message: u8) -> Vec<u8> {
    frame(address, &[mode, message])
}

/// Build a bare mode change request
pub fn generate_mode(address: u8, mode: u8) -> Vec<u8> {
    frame(address, &[mode])
}

fn frame(address: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 3);
    out.push(address);
    out.push(calc_msglength(body.len() as u8));
    out.extend_from_slice(body);
    out.push(checksum_generate(&out));
    out
}

/// Position of the first occurrence of `needle` in `haystack`
pub fn cmp_bytestring(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Format bytes as space separated hex, e.g. `F4 57 01 00 B4`
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}
