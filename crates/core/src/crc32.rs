// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! CRC-32 (IEEE 802.3, reflected polynomial `0xEDB88320`).
//!
//! Every frame trailer carries the CRC of msgId‖payload; the table-driven
//! form keeps the per-frame cost at one lookup per byte.

const POLYNOMIAL: u32 = 0xEDB8_8320;

/// 256-entry lookup table, built once at first use.
fn table() -> &'static [u32; 256] {
    static TABLE: std::sync::OnceLock<[u32; 256]> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ POLYNOMIAL } else { crc >> 1 };
            }
            *entry = crc;
        }
        table
    })
}

/// CRC-32 of `data`.
pub fn calculate(data: &[u8]) -> u32 {
    let table = table();
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = (crc >> 8) ^ table[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    crc ^ 0xFFFF_FFFF
}

/// Verify `data` against an expected CRC.
pub fn verify(data: &[u8], expected: u32) -> bool {
    calculate(data) == expected
}

/// Hex rendering, zero-padded to 8 lowercase digits.
pub fn to_hex(crc: u32) -> String {
    format!("{crc:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // Standard CRC-32 check value.
        assert_eq!(calculate(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(calculate(b""), 0);
    }

    #[test]
    fn test_verify() {
        let crc = calculate(b"gibberlink");
        assert!(verify(b"gibberlink", crc));
        assert!(!verify(b"gibberlink", crc ^ 1));
    }

    #[test]
    fn test_single_byte_corruption_changes_crc() {
        let mut data = b"the quick brown fox".to_vec();
        let crc = calculate(&data);
        data[3] ^= 0x01;
        assert_ne!(calculate(&data), crc);
    }

    #[test]
    fn test_hex_formatting() {
        assert_eq!(to_hex(0xCBF4_3926), "cbf43926");
        assert_eq!(to_hex(0x1A), "0000001a");
    }
}
