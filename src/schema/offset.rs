//! Byte.bit offsets
//!
//! A data block address is written as a decimal number: the integer part is
//! the byte index, the first decimal digit is the bit index (`4.3` = byte 4,
//! bit 3). The bit part only means something for `Bool` fields.

use std::fmt;
use std::str::FromStr;

/// Fixed-point data block address
///
/// Kept as integers so ordering and window arithmetic never go through
/// floating point. `tenths` is the first decimal digit (0-9); values 8 and 9
/// are representable on purpose: an out-of-range bit index is a decode-time
/// condition, not a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset {
    byte: usize,
    tenths: u8,
}

impl Offset {
    pub const fn new(byte: usize, tenths: u8) -> Self {
        Self { byte, tenths }
    }

    /// Byte index (integer part)
    pub fn byte(&self) -> usize {
        self.byte
    }

    /// Bit index (first decimal digit), only meaningful for `Bool` fields
    pub fn bit(&self) -> u8 {
        self.tenths
    }

    /// `ceil(offset)` as a byte index
    pub fn ceil_byte(&self) -> usize {
        if self.tenths > 0 {
            self.byte + 1
        } else {
            self.byte
        }
    }

    /// Build an offset from a spreadsheet-style number (`4.3`)
    ///
    /// Returns `None` for negative or non-finite values.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 || value > usize::MAX as f64 {
            return None;
        }
        let byte = value.floor();
        let tenths = ((value - byte) * 10.0).round() as u8;
        // 4.96 rounds up to the next whole byte
        if tenths >= 10 {
            return Some(Self::new(byte as usize + 1, 0));
        }
        Some(Self::new(byte as usize, tenths))
    }
}

impl FromStr for Offset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (s, None),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{}' is not a byte.bit offset", s));
        }
        let byte = int_part
            .parse::<usize>()
            .map_err(|e| format!("'{}': {}", s, e))?;

        let tenths = match frac_part {
            None => 0,
            Some(f) if !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) => f.as_bytes()[0] - b'0',
            Some(_) => return Err(format!("'{}' is not a byte.bit offset", s)),
        };

        Ok(Self::new(byte, tenths))
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.byte, self.tenths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte_bit() {
        let offset: Offset = "4.3".parse().unwrap();
        assert_eq!(offset.byte(), 4);
        assert_eq!(offset.bit(), 3);
        assert_eq!(offset.ceil_byte(), 5);
    }

    #[test]
    fn test_parse_whole_byte() {
        let offset: Offset = "10".parse().unwrap();
        assert_eq!(offset, Offset::new(10, 0));
        assert_eq!(offset.ceil_byte(), 10);

        let offset: Offset = " 10.0 ".parse().unwrap();
        assert_eq!(offset, Offset::new(10, 0));
    }

    #[test]
    fn test_parse_keeps_out_of_range_bit() {
        let offset: Offset = "2.9".parse().unwrap();
        assert_eq!(offset.bit(), 9);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Offset>().is_err());
        assert!("abc".parse::<Offset>().is_err());
        assert!("-1.0".parse::<Offset>().is_err());
        assert!("4.".parse::<Offset>().is_err());
        assert!(".3".parse::<Offset>().is_err());
        assert!("4.x".parse::<Offset>().is_err());
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(Offset::from_f64(4.3), Some(Offset::new(4, 3)));
        assert_eq!(Offset::from_f64(0.0), Some(Offset::new(0, 0)));
        assert_eq!(Offset::from_f64(12.7), Some(Offset::new(12, 7)));
        assert_eq!(Offset::from_f64(4.96), Some(Offset::new(5, 0)));
        assert_eq!(Offset::from_f64(-0.5), None);
        assert_eq!(Offset::from_f64(f64::NAN), None);
    }

    #[test]
    fn test_ordering() {
        let mut offsets = vec![Offset::new(4, 3), Offset::new(0, 0), Offset::new(4, 0)];
        offsets.sort();
        assert_eq!(
            offsets,
            vec![Offset::new(0, 0), Offset::new(4, 0), Offset::new(4, 3)]
        );
    }
}
