//! Value descriptors and raw payload codec
//!
//! Every event record carries its payload as a single `i64` regardless of
//! the value's real width. The [`Descriptor`] attached to the site's
//! metadata says how to reinterpret that payload: IEEE-754 bit patterns
//! for floats, sign-extension for the signed integrals, zero-extension
//! for `char`, 0/1 for booleans. Encoding then decoding through the same
//! descriptor is bit-exact.

use serde::{Deserialize, Serialize};

use crate::error::TraceError;

/// Runtime representation of an event's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Descriptor {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Surrogate object id; 0 means "no object"
    Object,
    /// The event carries no value
    Void,
}

impl Descriptor {
    /// Single-character code used in the data-id table
    pub fn code(&self) -> char {
        match self {
            Descriptor::Boolean => 'Z',
            Descriptor::Byte => 'B',
            Descriptor::Char => 'C',
            Descriptor::Short => 'S',
            Descriptor::Int => 'I',
            Descriptor::Long => 'J',
            Descriptor::Float => 'F',
            Descriptor::Double => 'D',
            Descriptor::Object => 'L',
            Descriptor::Void => 'V',
        }
    }

    /// Parse a single-character table code
    pub fn from_code(code: char) -> Result<Self, TraceError> {
        match code {
            'Z' => Ok(Descriptor::Boolean),
            'B' => Ok(Descriptor::Byte),
            'C' => Ok(Descriptor::Char),
            'S' => Ok(Descriptor::Short),
            'I' => Ok(Descriptor::Int),
            'J' => Ok(Descriptor::Long),
            'F' => Ok(Descriptor::Float),
            'D' => Ok(Descriptor::Double),
            'L' => Ok(Descriptor::Object),
            'V' => Ok(Descriptor::Void),
            _ => Err(TraceError::InvalidDescriptor { code }),
        }
    }

    /// Reinterpret a raw record payload under this descriptor
    pub fn decode(&self, raw: i64) -> RecordedValue {
        match self {
            Descriptor::Boolean => RecordedValue::Boolean(raw != 0),
            Descriptor::Byte => RecordedValue::Byte(raw as i8),
            Descriptor::Char => RecordedValue::Char(raw as u16),
            Descriptor::Short => RecordedValue::Short(raw as i16),
            Descriptor::Int => RecordedValue::Int(raw as i32),
            Descriptor::Long => RecordedValue::Long(raw),
            Descriptor::Float => RecordedValue::Float(f32::from_bits(raw as u32)),
            Descriptor::Double => RecordedValue::Double(f64::from_bits(raw as u64)),
            Descriptor::Object => RecordedValue::Object(raw),
            Descriptor::Void => RecordedValue::Void,
        }
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A decoded event payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Surrogate object id
    Object(i64),
    Void,
}

impl RecordedValue {
    /// The surrogate id if this is an object value
    pub fn object_id(&self) -> Option<i64> {
        match self {
            RecordedValue::Object(id) => Some(*id),
            _ => None,
        }
    }
}

/// Encode a boolean payload (0/1)
pub fn encode_bool(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Encode a byte payload (sign-extended)
pub fn encode_i8(value: i8) -> i64 {
    value as i64
}

/// Encode a char payload (zero-extended)
pub fn encode_u16(value: u16) -> i64 {
    value as i64
}

/// Encode a short payload (sign-extended)
pub fn encode_i16(value: i16) -> i64 {
    value as i64
}

/// Encode an int payload (sign-extended)
pub fn encode_i32(value: i32) -> i64 {
    value as i64
}

/// Encode a float payload (IEEE-754 bits, zero-extended)
pub fn encode_f32(value: f32) -> i64 {
    value.to_bits() as i64
}

/// Encode a double payload (IEEE-754 bits)
pub fn encode_f64(value: f64) -> i64 {
    value.to_bits() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for desc in [
            Descriptor::Boolean,
            Descriptor::Byte,
            Descriptor::Char,
            Descriptor::Short,
            Descriptor::Int,
            Descriptor::Long,
            Descriptor::Float,
            Descriptor::Double,
            Descriptor::Object,
            Descriptor::Void,
        ] {
            assert_eq!(Descriptor::from_code(desc.code()).unwrap(), desc);
        }
        assert!(Descriptor::from_code('X').is_err());
    }

    #[test]
    fn test_float_bits_round_trip() {
        for value in [0.0f32, -0.0, 1.5, f32::MIN, f32::MAX, f32::INFINITY] {
            let raw = encode_f32(value);
            match Descriptor::Float.decode(raw) {
                RecordedValue::Float(decoded) => {
                    assert_eq!(decoded.to_bits(), value.to_bits());
                }
                other => panic!("unexpected value: {:?}", other),
            }
        }
        // NaN payload bits survive too
        let nan_raw = encode_f32(f32::NAN);
        match Descriptor::Float.decode(nan_raw) {
            RecordedValue::Float(decoded) => assert_eq!(decoded.to_bits(), f32::NAN.to_bits()),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn test_double_bits_round_trip() {
        for value in [0.0f64, -1.0e308, std::f64::consts::PI, f64::NEG_INFINITY] {
            let raw = encode_f64(value);
            match Descriptor::Double.decode(raw) {
                RecordedValue::Double(decoded) => {
                    assert_eq!(decoded.to_bits(), value.to_bits());
                }
                other => panic!("unexpected value: {:?}", other),
            }
        }
    }

    #[test]
    fn test_integral_extension() {
        assert_eq!(Descriptor::Byte.decode(encode_i8(-1)), RecordedValue::Byte(-1));
        assert_eq!(
            Descriptor::Short.decode(encode_i16(-32768)),
            RecordedValue::Short(-32768)
        );
        assert_eq!(
            Descriptor::Char.decode(encode_u16(0xFFFF)),
            RecordedValue::Char(0xFFFF)
        );
        assert_eq!(encode_u16(0xFFFF), 0xFFFF); // zero-extended, not negative
        assert_eq!(
            Descriptor::Int.decode(encode_i32(i32::MIN)),
            RecordedValue::Int(i32::MIN)
        );
    }

    #[test]
    fn test_bool_and_object() {
        assert_eq!(encode_bool(true), 1);
        assert_eq!(encode_bool(false), 0);
        assert_eq!(Descriptor::Boolean.decode(1), RecordedValue::Boolean(true));
        assert_eq!(
            Descriptor::Object.decode(42).object_id(),
            Some(42)
        );
        assert_eq!(Descriptor::Void.decode(123), RecordedValue::Void);
    }
}
