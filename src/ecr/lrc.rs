//! Longitudinal redundancy check used by Protocol E frames.
//!
//! The LRC is a plain XOR of every byte from the first payload byte through
//! ETX inclusive; STX is excluded.

/// XOR of all bytes. An empty slice yields `0x00`, the identity of XOR.
pub fn lrc(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// True iff `frame[1..len-1]` XORs to the final byte.
///
/// Frames shorter than two bytes carry no checksum and are rejected.
pub fn lrc_check(frame: &[u8]) -> bool {
    match frame {
        [_, body @ .., last] => lrc(body) == *last,
        _ => false,
    }
}
