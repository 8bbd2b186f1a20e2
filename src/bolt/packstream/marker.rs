//! PackStream marker bytes.
//!
//! Every encoded value starts with a marker byte. Small sizes are folded
//! into the marker itself (the "tiny" forms); larger sizes follow the
//! marker as a big-endian unsigned integer.

/// Null marker
pub const NULL: u8 = 0xC0;

/// Float marker (64-bit IEEE 754, big-endian)
pub const FLOAT_64: u8 = 0xC1;

/// `false`
pub const FALSE: u8 = 0xC2;
/// `true`
pub const TRUE: u8 = 0xC3;

// Integers. Tiny integers (-16 to 127) are the marker byte itself.

/// Smallest tiny integer
pub const TINY_INT_MIN: i64 = -16;
/// Largest tiny integer
pub const TINY_INT_MAX: i64 = 127;
/// 8-bit signed integer
pub const INT_8: u8 = 0xC8;
/// 16-bit signed integer
pub const INT_16: u8 = 0xC9;
/// 32-bit signed integer
pub const INT_32: u8 = 0xCA;
/// 64-bit signed integer
pub const INT_64: u8 = 0xCB;

// Byte arrays have no tiny form.

/// Byte array, 8-bit size
pub const BYTES_8: u8 = 0xCC;
/// Byte array, 16-bit size
pub const BYTES_16: u8 = 0xCD;
/// Byte array, 32-bit size
pub const BYTES_32: u8 = 0xCE;

/// Tiny string (0-15 bytes), 0x80-0x8F
pub const TINY_STRING: u8 = 0x80;
/// String, 8-bit size
pub const STRING_8: u8 = 0xD0;
/// String, 16-bit size
pub const STRING_16: u8 = 0xD1;
/// String, 32-bit size
pub const STRING_32: u8 = 0xD2;

/// Tiny list (0-15 items), 0x90-0x9F
pub const TINY_LIST: u8 = 0x90;
/// List, 8-bit size
pub const LIST_8: u8 = 0xD4;
/// List, 16-bit size
pub const LIST_16: u8 = 0xD5;
/// List, 32-bit size
pub const LIST_32: u8 = 0xD6;
/// List of unknown size, ended by [`END_OF_STREAM`]
pub const LIST_STREAM: u8 = 0xD7;

/// Tiny map (0-15 entries), 0xA0-0xAF
pub const TINY_MAP: u8 = 0xA0;
/// Map, 8-bit size
pub const MAP_8: u8 = 0xD8;
/// Map, 16-bit size
pub const MAP_16: u8 = 0xD9;
/// Map, 32-bit size
pub const MAP_32: u8 = 0xDA;
/// Map of unknown size, ended by [`END_OF_STREAM`]
pub const MAP_STREAM: u8 = 0xDB;

/// Tiny structure (0-15 fields), 0xB0-0xBF, followed by the signature
pub const TINY_STRUCT: u8 = 0xB0;
/// Structure, 8-bit field count
pub const STRUCT_8: u8 = 0xDC;
/// Structure, 16-bit field count
pub const STRUCT_16: u8 = 0xDD;

/// Terminates a list or map stream.
pub const END_OF_STREAM: u8 = 0xDF;

/// Largest size that fits in a tiny marker.
pub const TINY_MAX_SIZE: usize = 15;

/// Check if a byte is a tiny integer (0x00-0x7F or 0xF0-0xFF)
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= 0x7F || marker >= 0xF0
}

/// Check if an integer can be encoded as a tiny int
#[inline]
pub fn can_encode_tiny_int(value: i64) -> bool {
    (TINY_INT_MIN..=TINY_INT_MAX).contains(&value)
}

/// High nibble of the marker, used to detect tiny sized forms.
#[inline]
pub fn high_nibble(marker: u8) -> u8 {
    marker & 0xF0
}

/// Size carried by a tiny marker.
#[inline]
pub fn tiny_size(marker: u8) -> usize {
    (marker & 0x0F) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_int_ranges() {
        assert!(is_tiny_int(0x00));
        assert!(is_tiny_int(0x7F));
        assert!(is_tiny_int(0xF0));
        assert!(is_tiny_int(0xFF));
        assert!(!is_tiny_int(0x80));
        assert!(!is_tiny_int(END_OF_STREAM));
        assert!(!is_tiny_int(NULL));
    }

    #[test]
    fn test_can_encode_tiny_int() {
        assert!(can_encode_tiny_int(-16));
        assert!(can_encode_tiny_int(127));
        assert!(!can_encode_tiny_int(-17));
        assert!(!can_encode_tiny_int(128));
    }

    #[test]
    fn test_tiny_size() {
        assert_eq!(high_nibble(0x85), TINY_STRING);
        assert_eq!(tiny_size(0x85), 5);
        assert_eq!(high_nibble(0x9F), TINY_LIST);
        assert_eq!(tiny_size(0x9F), 15);
        assert_eq!(high_nibble(0xA0), TINY_MAP);
        assert_eq!(tiny_size(0xB3), 3);
    }
}
