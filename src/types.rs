//! Core enumerations shared across the engine.
//!
//! These types describe how raster data is laid out (interleave), how a
//! single element is encoded (encoding + endianness), and where the active
//! data lives while it is being processed (processing location).

use serde::{Deserialize, Serialize};

/// Ordering of band, row, and column data on disk or in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interleave {
    /// Band sequential: all pixels of one band, then the next band.
    Bsq,
    /// Band interleaved by pixel: all bands of one pixel stored together.
    Bip,
    /// Band interleaved by line: one row of each band, then the next row.
    Bil,
}

impl Interleave {
    /// Get the display name for this interleave.
    pub fn name(&self) -> &'static str {
        match self {
            Interleave::Bsq => "BSQ",
            Interleave::Bip => "BIP",
            Interleave::Bil => "BIL",
        }
    }

    /// All interleave formats.
    pub fn all() -> &'static [Interleave] {
        &[Interleave::Bsq, Interleave::Bip, Interleave::Bil]
    }
}

/// Where the active data of an element is materialized.
///
/// Fixed when the owning element is created; switching locations means
/// importing again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingLocation {
    /// The full active subset is copied into a memory block.
    InMemory,
    /// Data is served straight from the original file; no bytes are copied
    /// and no writes are possible.
    OnDiskReadOnly,
    /// Data is copied into a temporary file that supports both reads and
    /// write-back.
    OnDiskReadWrite,
}

impl ProcessingLocation {
    /// Get the display name for this processing location.
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingLocation::InMemory => "In Memory",
            ProcessingLocation::OnDiskReadOnly => "On Disk (read-only)",
            ProcessingLocation::OnDiskReadWrite => "On Disk (read-write)",
        }
    }
}

/// Byte order of multi-byte elements in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// The byte order of the host platform.
    pub fn native() -> Endian {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

/// Numeric encoding of a single raster element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl Encoding {
    /// Number of bytes occupied by one element.
    pub fn bytes(&self) -> usize {
        match self {
            Encoding::U8 | Encoding::I8 => 1,
            Encoding::U16 | Encoding::I16 => 2,
            Encoding::U32 | Encoding::I32 | Encoding::F32 => 4,
            Encoding::F64 => 8,
        }
    }

    /// Whether elements are stored as floating point.
    pub fn is_floating_point(&self) -> bool {
        matches!(self, Encoding::F32 | Encoding::F64)
    }

    /// Get the display name for this encoding.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::U8 => "u8",
            Encoding::I8 => "i8",
            Encoding::U16 => "u16",
            Encoding::I16 => "i16",
            Encoding::U32 => "u32",
            Encoding::I32 => "i32",
            Encoding::F32 => "f32",
            Encoding::F64 => "f64",
        }
    }

    /// Decode one element from `bytes` (which must hold at least
    /// [`Encoding::bytes`] bytes) into an `f64`.
    ///
    /// All supported integer widths fit exactly in the 52-bit `f64`
    /// mantissa, so the conversion is lossless for integer encodings.
    pub fn decode(&self, bytes: &[u8], endian: Endian) -> f64 {
        match self {
            Encoding::U8 => f64::from(bytes[0]),
            Encoding::I8 => f64::from(bytes[0] as i8),
            Encoding::U16 => {
                let raw = [bytes[0], bytes[1]];
                f64::from(match endian {
                    Endian::Little => u16::from_le_bytes(raw),
                    Endian::Big => u16::from_be_bytes(raw),
                })
            }
            Encoding::I16 => {
                let raw = [bytes[0], bytes[1]];
                f64::from(match endian {
                    Endian::Little => i16::from_le_bytes(raw),
                    Endian::Big => i16::from_be_bytes(raw),
                })
            }
            Encoding::U32 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                f64::from(match endian {
                    Endian::Little => u32::from_le_bytes(raw),
                    Endian::Big => u32::from_be_bytes(raw),
                })
            }
            Encoding::I32 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                f64::from(match endian {
                    Endian::Little => i32::from_le_bytes(raw),
                    Endian::Big => i32::from_be_bytes(raw),
                })
            }
            Encoding::F32 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                f64::from(match endian {
                    Endian::Little => f32::from_le_bytes(raw),
                    Endian::Big => f32::from_be_bytes(raw),
                })
            }
            Encoding::F64 => {
                let raw = [
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ];
                match endian {
                    Endian::Little => f64::from_le_bytes(raw),
                    Endian::Big => f64::from_be_bytes(raw),
                }
            }
        }
    }

    /// Encode `value` into `out` (which must hold at least
    /// [`Encoding::bytes`] bytes).
    ///
    /// Integer encodings truncate toward zero and saturate at the type's
    /// range, matching Rust's float-to-int cast semantics.
    pub fn encode(&self, value: f64, endian: Endian, out: &mut [u8]) {
        match self {
            Encoding::U8 => out[0] = value as u8,
            Encoding::I8 => out[0] = (value as i8) as u8,
            Encoding::U16 => {
                let raw = match endian {
                    Endian::Little => (value as u16).to_le_bytes(),
                    Endian::Big => (value as u16).to_be_bytes(),
                };
                out[..2].copy_from_slice(&raw);
            }
            Encoding::I16 => {
                let raw = match endian {
                    Endian::Little => (value as i16).to_le_bytes(),
                    Endian::Big => (value as i16).to_be_bytes(),
                };
                out[..2].copy_from_slice(&raw);
            }
            Encoding::U32 => {
                let raw = match endian {
                    Endian::Little => (value as u32).to_le_bytes(),
                    Endian::Big => (value as u32).to_be_bytes(),
                };
                out[..4].copy_from_slice(&raw);
            }
            Encoding::I32 => {
                let raw = match endian {
                    Endian::Little => (value as i32).to_le_bytes(),
                    Endian::Big => (value as i32).to_be_bytes(),
                };
                out[..4].copy_from_slice(&raw);
            }
            Encoding::F32 => {
                let raw = match endian {
                    Endian::Little => (value as f32).to_le_bytes(),
                    Endian::Big => (value as f32).to_be_bytes(),
                };
                out[..4].copy_from_slice(&raw);
            }
            Encoding::F64 => {
                let raw = match endian {
                    Endian::Little => value.to_le_bytes(),
                    Endian::Big => value.to_be_bytes(),
                };
                out[..8].copy_from_slice(&raw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_bytes() {
        assert_eq!(Encoding::U8.bytes(), 1);
        assert_eq!(Encoding::I16.bytes(), 2);
        assert_eq!(Encoding::F32.bytes(), 4);
        assert_eq!(Encoding::F64.bytes(), 8);
    }

    #[test]
    fn test_decode_encode_roundtrip() {
        let cases = [
            (Encoding::U8, 200.0),
            (Encoding::I8, -100.0),
            (Encoding::U16, 54321.0),
            (Encoding::I16, -12345.0),
            (Encoding::U32, 4_000_000_000.0),
            (Encoding::I32, -2_000_000_000.0),
            (Encoding::F32, 1.5),
            (Encoding::F64, -1234.56789),
        ];

        for endian in [Endian::Little, Endian::Big] {
            for (encoding, value) in cases {
                let mut buf = [0u8; 8];
                encoding.encode(value, endian, &mut buf);
                let decoded = encoding.decode(&buf, endian);
                assert_eq!(decoded, value, "{} {:?}", encoding.name(), endian);
            }
        }
    }

    #[test]
    fn test_decode_respects_endianness() {
        let bytes = [0x01, 0x02];
        assert_eq!(Encoding::U16.decode(&bytes, Endian::Little), 0x0201 as f64);
        assert_eq!(Encoding::U16.decode(&bytes, Endian::Big), 0x0102 as f64);
    }

    #[test]
    fn test_integer_encode_saturates() {
        let mut buf = [0u8; 1];
        Encoding::U8.encode(300.0, Endian::Little, &mut buf);
        assert_eq!(buf[0], 255);
        Encoding::U8.encode(-5.0, Endian::Little, &mut buf);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Interleave::Bsq).unwrap();
        assert_eq!(json, "\"bsq\"");
        let enc: Encoding = serde_json::from_str("\"u16\"").unwrap();
        assert_eq!(enc, Encoding::U16);
    }
}
